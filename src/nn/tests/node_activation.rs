use super::numeric_grad;
use crate::assert_err;
use crate::nn::{GraphError, GraphInner};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

#[test]
fn test_tanh_forward_and_backward() {
    let mut graph = GraphInner::new();
    let x = graph.new_parameter_node(&[1, 3], None).unwrap();
    let y = graph.new_tanh_node(x, None).unwrap();
    graph
        .set_node_value(x, Some(&Tensor::new(&[-1., 0., 2.], &[1, 3])))
        .unwrap();
    graph.forward(y).unwrap();

    let expected: Vec<f32> = [-1.0f32, 0., 2.].iter().map(|v| v.tanh()).collect();
    let value = graph.get_node_value(y).unwrap().unwrap();
    assert_abs_diff_eq!(value.data_as_slice(), expected.as_slice(), epsilon = 1e-6);

    graph
        .backward_with_grad(y, &Tensor::new(&[1., 1., 1.], &[1, 3]))
        .unwrap();
    let grad = graph.get_node_grad(x).unwrap().unwrap();
    let local: Vec<f32> = expected.iter().map(|t| 1.0 - t * t).collect();
    assert_abs_diff_eq!(grad.data_as_slice(), local.as_slice(), epsilon = 1e-6);
}

#[test]
fn test_sigmoid_forward_and_backward() {
    let mut graph = GraphInner::new();
    let x = graph.new_parameter_node(&[2, 1], None).unwrap();
    let y = graph.new_sigmoid_node(x, Some("gate")).unwrap();
    graph
        .set_node_value(x, Some(&Tensor::new(&[0., 3.], &[2, 1])))
        .unwrap();
    graph.forward(y).unwrap();

    let s3 = 1.0 / (1.0 + (-3.0f32).exp());
    let value = graph.get_node_value(y).unwrap().unwrap();
    assert_abs_diff_eq!(value.data_as_slice(), &[0.5f32, s3][..], epsilon = 1e-6);

    graph
        .backward_with_grad(y, &Tensor::new(&[2., 1.], &[2, 1]))
        .unwrap();
    let grad = graph.get_node_grad(x).unwrap().unwrap();
    assert_abs_diff_eq!(
        grad.data_as_slice(),
        &[0.5f32, s3 * (1.0 - s3)][..],
        epsilon = 1e-6
    );
}

#[test]
fn test_activation_grads_against_numeric() {
    let mut graph = GraphInner::new();
    let x = graph.new_parameter_node(&[2, 3], None).unwrap();
    let target = graph.new_input_node(&[2, 3], None).unwrap();
    let h = graph.new_tanh_node(x, None).unwrap();
    let y = graph.new_sigmoid_node(h, None).unwrap();
    let loss = graph.new_mse_loss_node(y, target, None).unwrap();
    graph
        .set_node_value(x, Some(&Tensor::normal_seeded(0.0, 1.0, &[2, 3], 3)))
        .unwrap();
    graph
        .set_node_value(target, Some(&Tensor::normal_seeded(0.5, 0.2, &[2, 3], 4)))
        .unwrap();
    graph.forward(loss).unwrap();
    graph.backward(loss).unwrap();

    let analytic = graph.get_node_grad(x).unwrap().unwrap().clone();
    let numeric = numeric_grad(&mut graph, loss, x, 1e-2);
    assert_abs_diff_eq!(analytic.data_as_slice(), numeric.as_slice(), epsilon = 1e-3);
}

#[test]
fn test_activation_single_parent_shape() {
    let mut graph = GraphInner::new();
    let x = graph.new_input_node(&[2, 3, 4, 5], None).unwrap();
    let t = graph.new_tanh_node(x, None).unwrap();
    let s = graph.new_sigmoid_node(x, None).unwrap();
    assert_eq!(graph.get_node_value_expected_shape(t).unwrap(), &[2, 3, 4, 5]);
    assert_eq!(graph.get_node_value_expected_shape(s).unwrap(), &[2, 3, 4, 5]);
    assert_eq!(graph.get_node_name(t).unwrap(), "tanh_1");
    assert_eq!(graph.get_node_name(s).unwrap(), "sigmoid_1");
    assert_err!(
        graph.new_tanh_node(crate::nn::NodeId(42), None),
        GraphError::NodeNotFound(crate::nn::NodeId(42))
    );
}
