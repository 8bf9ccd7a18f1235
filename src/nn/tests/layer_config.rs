use crate::assert_err;
use crate::nn::GraphError;
use crate::nn::layer::{Activation, ConvLayerConfig, DataFormat, ShapeTriple};
use std::str::FromStr;

#[test]
fn test_activation_from_str_and_display() {
    for (text, activation) in [
        ("relu", Activation::Relu),
        ("tanh", Activation::Tanh),
        ("leaky_relu", Activation::LeakyRelu),
        ("sigmoid", Activation::Sigmoid),
        ("none", Activation::None),
    ] {
        assert_eq!(Activation::from_str(text).unwrap(), activation);
        assert_eq!(activation.to_string(), text);
    }
    assert_err!(
        Activation::from_str("swish"),
        GraphError::InvalidConfig("未知的激活函数：`swish`")
    );
    assert_eq!(Activation::default(), Activation::Relu);
}

#[test]
fn test_data_format_from_str() {
    assert_eq!(
        "channels_last".parse::<DataFormat>().unwrap(),
        DataFormat::ChannelsLast
    );
    assert_eq!(DataFormat::default(), DataFormat::ChannelsFirst);
    assert_err!(
        "NHWC".parse::<DataFormat>(),
        GraphError::InvalidConfig("未知的数据布局：`NHWC`")
    );
}

#[test]
fn test_shape_triple_display() {
    assert_eq!(ShapeTriple::new(32, 16, 3).to_string(), "(32, 16, 3)");
    assert_eq!(ShapeTriple::from((1, 2, 3)), ShapeTriple::new(1, 2, 3));
}

#[test]
fn test_config_defaults_and_builders() {
    let config = ConvLayerConfig::new((3, 3), (1, 1), 16);
    assert_eq!(config.activation, Activation::Relu);
    assert!(!config.batch_normal);
    assert_eq!(config.data_format, DataFormat::ChannelsFirst);
    assert_eq!(config.input_shape, None);
    assert_eq!(config.name, "conv");

    let config = config
        .with_activation(Activation::Tanh)
        .with_batch_normal(true)
        .with_data_format(DataFormat::ChannelsLast)
        .with_input_shape(ShapeTriple::new(8, 8, 3))
        .with_name("conv1");
    assert_eq!(config.activation, Activation::Tanh);
    assert!(config.batch_normal);
    assert_eq!(config.data_format, DataFormat::ChannelsLast);
    assert_eq!(config.input_shape, Some(ShapeTriple::new(8, 8, 3)));
    assert_eq!(config.name, "conv1");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validate() {
    assert_err!(
        ConvLayerConfig::new((0, 3), (1, 1), 4).validate(),
        GraphError::InvalidConfig("卷积层conv的卷积核 (0, 3) 与步长 (1, 1) 必须为正")
    );
    assert_err!(
        ConvLayerConfig::new((3, 3), (1, 0), 4).validate(),
        GraphError::InvalidConfig(_)
    );
    assert_err!(
        ConvLayerConfig::new((3, 3), (1, 1), 0).validate(),
        GraphError::InvalidConfig("卷积层conv的 n_filter 必须为正")
    );
    assert_err!(
        ConvLayerConfig::new((3, 3), (1, 1), 4).with_name("").validate(),
        GraphError::InvalidConfig("卷积层的名称不能为空")
    );
}

#[test]
fn test_config_json_defaults() {
    let config =
        ConvLayerConfig::from_json(r#"{"kernel_size": [5, 3], "stride": [1, 2], "n_filter": 4}"#)
            .unwrap();
    assert_eq!(config, ConvLayerConfig::new((5, 3), (1, 2), 4));
}

#[test]
fn test_config_json_round_trip() {
    let config = ConvLayerConfig::new((3, 3), (2, 2), 8)
        .with_activation(Activation::None)
        .with_data_format(DataFormat::ChannelsLast)
        .with_input_shape(ShapeTriple::new(28, 28, 1))
        .with_name("stem");
    let json = config.to_json().unwrap();
    assert!(json.contains(r#""activation": "none""#));
    assert!(json.contains(r#""data_format": "channels_last""#));
    assert_eq!(ConvLayerConfig::from_json(&json).unwrap(), config);

    // 未设置的 input_shape 不会出现在 JSON 中
    let json = ConvLayerConfig::new((1, 1), (1, 1), 1).to_json().unwrap();
    assert!(!json.contains("input_shape"));
}

#[test]
fn test_config_json_errors() {
    assert_err!(
        ConvLayerConfig::from_json(r#"{"kernel_size": [3, 3], "stride": [1, 1]}"#),
        GraphError::InvalidConfig(msg) if msg.starts_with("解析卷积层配置失败")
    );
    assert_err!(
        ConvLayerConfig::from_json(
            r#"{"kernel_size": [3, 3], "stride": [1, 1], "n_filter": 2, "activation": "gelu"}"#
        ),
        GraphError::InvalidConfig(_)
    );
}

#[test]
fn test_config_json_file() {
    let path = std::env::temp_dir().join(format!("conv_layer_config_{}.json", std::process::id()));
    let config = ConvLayerConfig::new((3, 3), (1, 1), 2).with_name("from_file");
    std::fs::write(&path, config.to_json().unwrap()).unwrap();
    let loaded = ConvLayerConfig::from_json_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.unwrap(), config);

    assert_err!(
        ConvLayerConfig::from_json_file("/nonexistent/conv_layer.json"),
        GraphError::InvalidConfig(msg) if msg.starts_with("读取配置文件")
    );
}
