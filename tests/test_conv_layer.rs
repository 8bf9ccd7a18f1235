/*
 * @Author       : 老董
 * @Date         : 2026-03-08
 * @Description  : ConvLayer 集成测试
 *                 验证：形状推导、参数初始化的确定性、各激活函数、[batch, H, W, C] 输入输出、
 *                 梯度裁剪以及一个最小的手写 SGD 训练循环
 */

use approx::assert_abs_diff_eq;
use conv_layer::nn::layer::{
    Activation, ConvLayer, ConvLayerConfig, DataFormat, OutputShape, ShapeTriple,
};
use conv_layer::nn::{Graph, GraphError, Module, Padding, VarConvOps, VarLossOps, VarShapeOps};
use conv_layer::tensor::Tensor;

fn layer_config(name: &str, n_filter: usize, input: ShapeTriple) -> ConvLayerConfig {
    ConvLayerConfig::new((3, 3), (1, 1), n_filter)
        .with_input_shape(input)
        .with_name(name)
}

/// 默认的通道在前布局同样接受并返回 [batch, H, W, C]
#[test]
fn test_zero_input_channels_first() -> Result<(), GraphError> {
    let graph = Graph::new();
    let config = layer_config("conv", 16, ShapeTriple::new(32, 32, 3));
    assert_eq!(config.data_format, DataFormat::ChannelsFirst);
    let mut layer = ConvLayer::new(&graph, config, None)?;

    let x = graph.input(&Tensor::zeros(&[2, 32, 32, 3]))?;
    let y = layer.compute(&x, true)?;
    let value = y.value()?.unwrap();
    assert_eq!(value.shape(), &[2, 32, 32, 16]);
    assert!(value.data_as_slice().iter().all(|&v| v == 0.0));
    Ok(())
}

/// 全零输入经过 relu 卷积层后仍为全零，且通道在后布局的输出形状正确
#[test]
fn test_zero_input_channels_last() -> Result<(), GraphError> {
    let graph = Graph::new();
    let config = layer_config("conv", 16, ShapeTriple::new(32, 32, 3))
        .with_data_format(DataFormat::ChannelsLast);
    let mut layer = ConvLayer::new(&graph, config, None)?;
    assert_eq!(layer.output_shape(), ShapeTriple::new(32, 32, 16));

    let x = graph.input(&Tensor::zeros(&[2, 32, 32, 3]))?;
    let y = layer.compute(&x, true)?;
    let value = y.value()?.unwrap();
    assert_eq!(value.shape(), &[2, 32, 32, 16]);
    assert!(value.data_as_slice().iter().all(|&v| v == 0.0));
    Ok(())
}

/// 输出空间尺寸按 floor(输入 / 步长) 计算
#[test]
fn test_output_shape_uses_floor() -> Result<(), GraphError> {
    let graph = Graph::new();
    let config = ConvLayerConfig::new((3, 3), (2, 2), 4)
        .with_input_shape(ShapeTriple::new(7, 5, 2))
        .with_name("strided");
    let mut layer = ConvLayer::new(&graph, config, None)?;
    assert_eq!(layer.output_shape(), ShapeTriple::new(3, 2, 4));

    let x = graph.input(&Tensor::normal_seeded(0.0, 1.0, &[1, 7, 5, 2], 1))?;
    let y = layer.compute(&x, true)?;
    assert_eq!(y.value()?.unwrap().shape(), &[1, 3, 2, 4]);
    Ok(())
}

#[test]
fn test_missing_input_shape() {
    let graph = Graph::new();
    let result = ConvLayer::new(&graph, ConvLayerConfig::new((3, 3), (1, 1), 8), None);
    assert!(matches!(
        result,
        Err(GraphError::InvalidConfig(ref msg)) if msg.contains("缺少输入形状")
    ));
}

/// 权重使用固定种子：超参数相同的层无论中间构造了多少别的层，初始权重都相同
#[test]
fn test_weight_init_is_deterministic() -> Result<(), GraphError> {
    let graph = Graph::new();
    let input = ShapeTriple::new(8, 8, 3);
    let a = ConvLayer::new(&graph, layer_config("a", 16, input), None)?;
    let _b = ConvLayer::new(&graph, layer_config("b", 4, input), None)?;
    let _c = ConvLayer::new(&graph, layer_config("c", 16, input).with_batch_normal(true), None)?;
    let d = ConvLayer::new(&graph, layer_config("d", 16, input), None)?;
    assert_eq!(a.weight().value()?, d.weight().value()?);

    // 另一张图中的同构层也一样
    let other = Graph::new();
    let e = ConvLayer::new(&other, layer_config("e", 16, input), None)?;
    assert_eq!(a.weight().value()?, e.weight().value()?);
    Ok(())
}

/// 参数表只含 weight（以及启用批归一化时的 gamma）
#[test]
fn test_param_map_sizes() -> Result<(), GraphError> {
    let graph = Graph::new();
    let input = ShapeTriple::new(4, 4, 1);
    let mut plain = ConvLayer::new(&graph, layer_config("plain", 2, input), None)?;
    let mut bn = ConvLayer::new(
        &graph,
        layer_config("bn", 2, input).with_batch_normal(true),
        None,
    )?;
    let x = graph.input(&Tensor::normal_seeded(0.0, 1.0, &[3, 4, 4, 1], 2))?;
    plain.compute(&x, true)?;
    bn.compute(&x, false)?;
    assert_eq!(plain.params().len(), 1);
    assert_eq!(bn.params().len(), 2);
    assert_eq!(plain.num_params(), 2);
    assert_eq!(bn.num_params(), 3);
    Ok(())
}

/// activation = none 时输出就是卷积 + 偏置
#[test]
fn test_no_activation_is_conv_plus_bias() -> Result<(), GraphError> {
    let graph = Graph::new();
    let config = layer_config("linear", 3, ShapeTriple::new(5, 5, 2)).with_activation(Activation::None);
    let mut layer = ConvLayer::new(&graph, config, None)?;
    let bias = layer.bias().unwrap().clone();
    bias.set_value(&Tensor::new(&[0.5, -0.5, 1.0], &[3]))?;

    let x = graph.input(&Tensor::normal_seeded(0.0, 1.0, &[2, 5, 5, 2], 3))?;
    let y = layer.compute(&x, true)?;
    let manual = x
        .permute(&[0, 3, 1, 2])?
        .conv2d(layer.weight(), (1, 1), Padding::Same)?
        .channel_bias_add(&bias)?
        .permute(&[0, 2, 3, 1])?;
    manual.forward()?;
    assert_eq!(y.value()?, manual.value()?);
    Ok(())
}

/// leaky_relu：正值不变，负值乘以 0.1
#[test]
fn test_leaky_relu_activation() -> Result<(), GraphError> {
    let graph = Graph::new();
    let input = ShapeTriple::new(6, 6, 2);
    let mut raw = ConvLayer::new(
        &graph,
        layer_config("raw", 4, input).with_activation(Activation::None),
        None,
    )?;
    let mut leaky = ConvLayer::new(
        &graph,
        layer_config("leaky", 4, input).with_activation(Activation::LeakyRelu),
        None,
    )?;
    let x = graph.input(&Tensor::normal_seeded(0.0, 1.0, &[1, 6, 6, 2], 4))?;
    let pre = raw.compute(&x, true)?.value()?.unwrap();
    let out = leaky.compute(&x, true)?.value()?.unwrap();

    assert!(pre.data_as_slice().iter().any(|&v| v < 0.0));
    for (&p, &o) in pre.data_as_slice().iter().zip(out.data_as_slice()) {
        let expected = if p > 0.0 { p } else { 0.1 * p };
        assert_abs_diff_eq!(o, expected, epsilon = 1e-6);
    }
    Ok(())
}

/// 反向传播时到达激活输出的梯度被裁剪到 [-1, 1]
#[test]
fn test_gradient_is_clipped() -> Result<(), GraphError> {
    let graph = Graph::new();
    let config = layer_config("clip", 4, ShapeTriple::new(4, 4, 2)).with_activation(Activation::None);
    let mut layer = ConvLayer::new(&graph, config, None)?;
    let x = graph.input(&Tensor::normal_seeded(0.0, 1.0, &[1, 4, 4, 2], 5))?;
    let y = layer.compute(&x, true)?;

    y.backward_with_grad(&Tensor::new(&[5.0; 64], &[1, 4, 4, 4]))?;
    // 每个通道 16 个位置，每处梯度被裁剪为 1
    let bias_grad = layer.bias().unwrap().grad()?.unwrap();
    assert_eq!(bias_grad, Tensor::new(&[16.0; 4], &[4]));
    Ok(())
}

#[test]
fn test_summary_and_calculation() -> Result<(), GraphError> {
    let graph = Graph::new();
    let first = ConvLayer::new(
        &graph,
        ConvLayerConfig::new((5, 5), (2, 2), 8)
            .with_input_shape(ShapeTriple::new(28, 28, 1))
            .with_name("conv1"),
        None,
    )?;
    let second = ConvLayer::new(
        &graph,
        ConvLayerConfig::new((3, 3), (2, 2), 16).with_name("conv2"),
        Some(&first),
    )?;
    assert_eq!(first.calculation(), 14 * 14 * 8 * 1 * 5 * 5);
    assert_eq!(second.calculation(), 7 * 7 * 16 * 8 * 3 * 3);
    assert!(second.summary_line().starts_with("conv2"));
    assert!(second.summary_line().ends_with("(7, 7, 16)          "));
    Ok(())
}

/// 手写 SGD：几步更新后损失下降
#[test]
fn test_sgd_steps_reduce_loss() -> Result<(), GraphError> {
    let graph = Graph::new();
    let config = layer_config("fit", 4, ShapeTriple::new(8, 8, 3))
        .with_activation(Activation::None)
        .with_batch_normal(true);
    let mut layer = ConvLayer::new(&graph, config, None)?;
    let x = graph.input(&Tensor::normal_seeded(0.0, 1.0, &[2, 8, 8, 3], 6))?;
    let target = graph.input(&Tensor::normal_seeded(0.0, 0.5, &[2, 8, 8, 4], 7))?;
    let y = layer.compute(&x, true)?;
    let loss = y.mse_loss(&target)?;

    let learning_rate = 0.05;
    let first_loss = loss.backward()?;
    let mut last_loss = first_loss;
    for step in 0..5 {
        for param in layer.parameters() {
            let value = param.value()?.unwrap();
            let grad = param.grad()?.unwrap();
            param.set_value(&(&value - &(&grad * learning_rate)))?;
        }
        graph.zero_grad()?;
        last_loss = loss.backward()?;
        println!("step {step}: loss = {last_loss:.6}");
    }
    assert!(last_loss < first_loss, "{last_loss} >= {first_loss}");
    Ok(())
}
