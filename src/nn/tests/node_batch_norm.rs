use super::numeric_grad;
use crate::assert_err;
use crate::nn::{BatchNormOptions, GraphError, GraphInner, NodeId};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

struct BnGraph {
    graph: GraphInner,
    x: NodeId,
    gamma: NodeId,
    beta: NodeId,
    mean: NodeId,
    var: NodeId,
    bn: NodeId,
}

fn bn_graph(x_value: &Tensor, gamma: &[f32], beta: &[f32], options: BatchNormOptions) -> BnGraph {
    let c = gamma.len();
    let mut graph = GraphInner::new();
    let x = graph.new_parameter_node(x_value.shape(), Some("x")).unwrap();
    let gamma_id = graph.new_parameter_node(&[c], Some("gamma")).unwrap();
    let beta_id = graph.new_parameter_node(&[c], Some("beta")).unwrap();
    let mean = graph.new_state_node(&[c], Some("running_mean")).unwrap();
    let var = graph.new_state_node(&[c], Some("running_var")).unwrap();
    graph.set_node_value(x, Some(x_value)).unwrap();
    graph.set_node_value(gamma_id, Some(&Tensor::new(gamma, &[c]))).unwrap();
    graph.set_node_value(beta_id, Some(&Tensor::new(beta, &[c]))).unwrap();
    graph.set_node_value(mean, Some(&Tensor::zeros(&[c]))).unwrap();
    graph.set_node_value(var, Some(&Tensor::ones(&[c]))).unwrap();
    let bn = graph
        .new_batch_norm_node(x, gamma_id, beta_id, mean, var, options, None)
        .unwrap();
    BnGraph {
        graph,
        x,
        gamma: gamma_id,
        beta: beta_id,
        mean,
        var,
        bn,
    }
}

#[test]
fn test_batch_norm_creation_validation() {
    let mut graph = GraphInner::new();
    let x = graph.new_input_node(&[2, 3, 4, 4], None).unwrap();
    let x3d = graph.new_input_node(&[3, 4, 4], None).unwrap();
    let c3 = graph.new_parameter_node(&[3], None).unwrap();
    let c2 = graph.new_parameter_node(&[2], None).unwrap();
    let s3 = graph.new_state_node(&[3], None).unwrap();
    let options = BatchNormOptions::default();

    assert_err!(
        graph.new_batch_norm_node(x3d, c3, c3, s3, s3, options, None),
        GraphError::DimensionMismatch(4, 3)
    );
    assert_err!(
        graph.new_batch_norm_node(x, c3, c2, s3, s3, options, None),
        GraphError::ShapeMismatch([3], [2], "BatchNorm2d 的 beta 形状必须是 [C]")
    );
    assert_err!(
        graph.new_batch_norm_node(
            x,
            c3,
            c3,
            s3,
            s3,
            BatchNormOptions {
                momentum: 1.5,
                ..options
            },
            None
        ),
        GraphError::InvalidOperation(_)
    );

    let bn = graph
        .new_batch_norm_node(x, c3, c3, s3, s3, options, None)
        .unwrap();
    assert_eq!(graph.get_node_name(bn).unwrap(), "batch_norm_1");
    assert_eq!(graph.get_node_value_expected_shape(bn).unwrap(), &[2, 3, 4, 4]);
}

#[test]
fn test_batch_norm_default_options() {
    let options = BatchNormOptions::default();
    assert_eq!(options.momentum, 0.9);
    assert_eq!(options.epsilon, 1e-5);
    assert!(options.training);
}

#[test]
fn test_batch_norm_forward_training() {
    // c0 = [1, 3]（均值 2，方差 1），c1 = [10, 10]（方差 0）
    let x = Tensor::new(&[1., 3., 10., 10.], &[1, 2, 1, 2]);
    let mut g = bn_graph(&x, &[2., 3.], &[0.5, -1.], BatchNormOptions::default());
    g.graph.forward(g.bn).unwrap();

    let s = (1.0f32 + 1e-5).sqrt();
    let y = g.graph.get_node_value(g.bn).unwrap().unwrap();
    assert_abs_diff_eq!(
        y.data_as_slice(),
        &[0.5 - 2. / s, 0.5 + 2. / s, -1., -1.][..],
        epsilon = 1e-5
    );

    // 滑动统计量：running = 0.9 * running + 0.1 * batch，方差做 Bessel 校正（m = 2）
    let mean = g.graph.get_node_value(g.mean).unwrap().unwrap();
    let var = g.graph.get_node_value(g.var).unwrap().unwrap();
    assert_abs_diff_eq!(mean.data_as_slice(), &[0.2f32, 1.0][..], epsilon = 1e-5);
    assert_abs_diff_eq!(var.data_as_slice(), &[1.1f32, 0.9][..], epsilon = 1e-5);
}

#[test]
fn test_batch_norm_forward_eval_uses_running_stats() {
    let x = Tensor::new(&[3., 5., 2., 4.], &[1, 2, 1, 2]);
    let options = BatchNormOptions {
        training: false,
        ..Default::default()
    };
    let mut g = bn_graph(&x, &[1., 1.], &[0., 0.], options);
    g.graph
        .set_node_value(g.mean, Some(&Tensor::new(&[1., 2.], &[2])))
        .unwrap();
    g.graph
        .set_node_value(g.var, Some(&Tensor::new(&[4., 1.], &[2])))
        .unwrap();
    g.graph.forward(g.bn).unwrap();

    let y = g.graph.get_node_value(g.bn).unwrap().unwrap();
    assert_abs_diff_eq!(y.data_as_slice(), &[1.0f32, 2.0, 0.0, 2.0][..], epsilon = 1e-4);

    // 推理模式不回写
    assert_eq!(
        g.graph.get_node_value(g.mean).unwrap().unwrap(),
        &Tensor::new(&[1., 2.], &[2])
    );
    assert_eq!(
        g.graph.get_node_value(g.var).unwrap().unwrap(),
        &Tensor::new(&[4., 1.], &[2])
    );
}

fn check_grads_against_numeric(options: BatchNormOptions) {
    let x = Tensor::normal_seeded(0.0, 1.0, &[2, 2, 2, 2], 7);
    let mut g = bn_graph(&x, &[1.5, 0.5], &[0.1, -0.2], options);
    let t = g.graph.new_input_node(&[2, 2, 2, 2], None).unwrap();
    g.graph
        .set_node_value(t, Some(&Tensor::normal_seeded(0.0, 1.0, &[2, 2, 2, 2], 8)))
        .unwrap();
    let loss = g.graph.new_mse_loss_node(g.bn, t, None).unwrap();
    g.graph.forward(loss).unwrap();
    g.graph.backward(loss).unwrap();

    for id in [g.x, g.gamma, g.beta] {
        let analytic = g.graph.get_node_grad(id).unwrap().unwrap().clone();
        let numeric = numeric_grad(&mut g.graph, loss, id, 5e-3);
        assert_abs_diff_eq!(analytic.data_as_slice(), numeric.as_slice(), epsilon = 3e-3);
    }
}

#[test]
fn test_batch_norm_backward_training() {
    check_grads_against_numeric(BatchNormOptions::default());
}

#[test]
fn test_batch_norm_backward_eval() {
    check_grads_against_numeric(BatchNormOptions {
        training: false,
        ..Default::default()
    });
}

#[test]
fn test_batch_norm_beta_grad_is_channel_sum() {
    let x = Tensor::normal_seeded(0.0, 1.0, &[2, 2, 1, 2], 11);
    let mut g = bn_graph(&x, &[1., 1.], &[0., 0.], BatchNormOptions::default());
    g.graph.forward(g.bn).unwrap();
    let seed = Tensor::new(&[1., 2., 3., 4., 5., 6., 7., 8.], &[2, 2, 1, 2]);
    g.graph.backward_with_grad(g.bn, &seed).unwrap();

    // 通道 0：1+2+5+6，通道 1：3+4+7+8
    assert_eq!(
        g.graph.get_node_grad(g.beta).unwrap().unwrap(),
        &Tensor::new(&[14., 22.], &[2])
    );
    // 状态节点不接收梯度
    assert_err!(g.graph.get_node_grad(g.mean), GraphError::InvalidOperation(_));
}
