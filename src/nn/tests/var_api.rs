use crate::assert_err;
use crate::nn::{
    BatchNormOptions, Graph, GraphError, Init, NodeId, Padding, VarActivationOps, VarConvOps,
    VarLossOps, VarShapeOps,
};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

#[test]
fn test_graph_leaf_creation() {
    let graph = Graph::with_name("g");
    let x = graph.input(&Tensor::ones(&[1, 2])).unwrap();
    let y = graph.input_named(&Tensor::zeros(&[1, 2]), "target").unwrap();
    let w = graph.parameter(&[2, 2], Init::Constant(3.0), "w").unwrap();
    let s = graph.state(&Tensor::zeros(&[2]), "running").unwrap();

    assert_eq!(x.name().unwrap(), "input_1");
    assert_eq!(y.name().unwrap(), "target");
    assert_eq!(w.value().unwrap().unwrap(), Tensor::new(&[3.; 4], &[2, 2]));
    assert_eq!(s.value_expected_shape().unwrap(), vec![2]);
    assert_eq!(graph.inner().name(), "g");
    assert_eq!(graph.inner().nodes_count(), 4);

    assert_err!(
        graph.input_named(&Tensor::zeros(&[1]), "target"),
        GraphError::DuplicateNodeName("节点target在图g中重复")
    );
}

#[test]
fn test_var_chain_forward_and_backward() {
    let graph = Graph::new();
    let x = graph.input(&Tensor::new(&[-1., 2.], &[1, 2])).unwrap();
    let p = graph
        .parameter_with_value(&Tensor::new(&[1., 1.], &[1, 2]), "p")
        .unwrap();
    let target = graph.input(&Tensor::zeros(&[1, 2])).unwrap();

    // relu(x) 只在第二个元素上放行
    let h = x.relu().unwrap();
    let loss = h.mse_loss(&target).unwrap();
    let loss_p = p.tanh().unwrap().mse_loss(&target).unwrap();

    graph.forward(&loss).unwrap();
    assert_abs_diff_eq!(loss.item().unwrap(), 2.0, epsilon = 1e-6);

    let value = graph.backward(&loss_p).unwrap();
    let t = 1.0f32.tanh();
    assert_abs_diff_eq!(value, t * t, epsilon = 1e-6);
    let grad = p.grad().unwrap().unwrap();
    let expected = t * (1.0 - t * t);
    assert_abs_diff_eq!(grad.data_as_slice(), &[expected, expected][..], epsilon = 1e-6);
}

#[test]
fn test_var_conv_pipeline() {
    let graph = Graph::new();
    let x = graph.input(&Tensor::ones(&[1, 2, 2, 1])).unwrap();
    let k = graph.parameter(&[1, 1, 1, 2], Init::Ones, "k").unwrap();
    let b = graph.parameter(&[2], Init::Constant(0.5), "b").unwrap();

    let y = x
        .permute(&[0, 3, 1, 2])
        .unwrap()
        .conv2d(&k, (1, 1), Padding::Same)
        .unwrap()
        .channel_bias_add(&b)
        .unwrap()
        .sigmoid()
        .unwrap()
        .permute(&[0, 2, 3, 1])
        .unwrap();
    assert_eq!(y.value_expected_shape().unwrap(), vec![1, 2, 2, 2]);
    y.forward().unwrap();
    let s = 1.0 / (1.0 + (-1.5f32).exp());
    let value = y.value().unwrap().unwrap();
    assert!(value.data_as_slice().iter().all(|v| (v - s).abs() < 1e-6));
}

#[test]
fn test_var_batch_norm_and_clip() {
    let graph = Graph::new();
    let x = graph
        .input(&Tensor::new(&[1., 3., 5., 7.], &[2, 1, 1, 2]))
        .unwrap();
    let gamma = graph.parameter(&[1], Init::Ones, "gamma").unwrap();
    let beta = graph.parameter(&[1], Init::Zeros, "beta").unwrap();
    let mean = graph.state(&Tensor::zeros(&[1]), "mean").unwrap();
    let var = graph.state(&Tensor::ones(&[1]), "var").unwrap();

    let y = x
        .batch_norm(&gamma, &beta, &mean, &var, BatchNormOptions::default())
        .unwrap()
        .clip_grad(-1.0, 1.0)
        .unwrap();
    y.backward_with_grad(&Tensor::new(&[5., 5., 5., 5.], &[2, 1, 1, 2]))
        .unwrap();

    // 上游梯度被裁剪到 1，dbeta = 4 * 1
    assert_eq!(beta.grad().unwrap().unwrap(), Tensor::new(&[4.], &[1]));
    // 滑动均值只更新一次：0.1 * 4
    assert_abs_diff_eq!(mean.value().unwrap().unwrap()[[0]], 0.4, epsilon = 1e-6);
}

#[test]
fn test_cross_graph_operation_fails() {
    let g1 = Graph::new();
    let g2 = Graph::new();
    let x = g1.input(&Tensor::zeros(&[1, 1, 3, 3])).unwrap();
    let k = g2.parameter(&[3, 3, 1, 1], Init::Zeros, "k").unwrap();
    assert!(!x.same_graph(&k));
    assert_err!(
        x.conv2d(&k, (1, 1), Padding::Same),
        GraphError::InvalidOperation("不能对来自不同 Graph 的 Var 执行卷积")
    );

    let t = g2.input(&Tensor::zeros(&[1, 1, 3, 3])).unwrap();
    assert_err!(
        x.mse_loss(&t),
        GraphError::InvalidOperation(msg) if msg.contains("不同 Graph")
    );
}

#[test]
fn test_item_requires_single_element() {
    let graph = Graph::new();
    let x = graph.input(&Tensor::zeros(&[2, 2])).unwrap();
    assert_err!(
        x.item(),
        GraphError::InvalidOperation("Tensor 不是单元素张量")
    );
    let h = x.tanh().unwrap();
    assert_err!(h.item(), GraphError::ComputationError(_));
}

#[test]
fn test_trainable_parameters_and_wrap() {
    let graph = Graph::new();
    let _x = graph.input(&Tensor::zeros(&[1])).unwrap();
    let a = graph.parameter(&[1], Init::Zeros, "a").unwrap();
    let _s = graph.state(&Tensor::zeros(&[1]), "s").unwrap();
    let b = graph.parameter(&[1], Init::Zeros, "b").unwrap();

    let params = graph.trainable_parameters();
    let ids: Vec<NodeId> = params.iter().map(|p| p.node_id()).collect();
    assert_eq!(ids, vec![a.node_id(), b.node_id()]);

    let wrapped = graph.wrap_node_id(a.node_id()).unwrap();
    assert!(wrapped.same_graph(&a));
    assert_eq!(wrapped.name().unwrap(), "a");
    assert_err!(
        graph.wrap_node_id(NodeId(100)),
        GraphError::NodeNotFound(NodeId(100))
    );

    let g = a.get_graph();
    assert_eq!(g.inner().nodes_count(), 4);
}

#[test]
fn test_train_eval_switch() {
    let graph = Graph::new();
    assert!(!graph.is_eval());
    graph.eval();
    assert!(graph.is_eval());
    graph.train();
    assert!(!graph.is_eval());
}

#[test]
fn test_zero_grad_via_handle() {
    let graph = Graph::new();
    let p = graph.parameter(&[1, 1], Init::Ones, "p").unwrap();
    let t = graph.input(&Tensor::zeros(&[1, 1])).unwrap();
    let loss = p.mse_loss(&t).unwrap();
    loss.backward().unwrap();
    assert_eq!(p.grad().unwrap().unwrap(), Tensor::new(&[2.], &[1, 1]));
    loss.backward().unwrap();
    assert_eq!(p.grad().unwrap().unwrap(), Tensor::new(&[4.], &[1, 1]));
    graph.zero_grad().unwrap();
    assert_eq!(p.grad().unwrap(), None);
}
