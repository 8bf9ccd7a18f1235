mod layer_config;
mod node_activation;
mod node_batch_norm;
mod var_api;

use crate::nn::{GraphInner, NodeId};
use crate::tensor::Tensor;

/// 中心差分估计 loss 对某个参数节点每个元素的梯度
///
/// `loss_id` 应为只含 1 个元素的节点；每次扰动后都会重新前向传播。
fn numeric_grad(graph: &mut GraphInner, loss_id: NodeId, param_id: NodeId, eps: f32) -> Vec<f32> {
    let original = graph.get_node_value(param_id).unwrap().unwrap().clone();
    let mut grads = Vec::with_capacity(original.size());
    for i in 0..original.size() {
        let mut data = original.data_as_slice().to_vec();
        data[i] = original.data_as_slice()[i] + eps;
        graph
            .set_node_value(param_id, Some(&Tensor::new(&data, original.shape())))
            .unwrap();
        graph.forward(loss_id).unwrap();
        let plus = graph.get_node_value(loss_id).unwrap().unwrap().get_data_number().unwrap();

        data[i] = original.data_as_slice()[i] - eps;
        graph
            .set_node_value(param_id, Some(&Tensor::new(&data, original.shape())))
            .unwrap();
        graph.forward(loss_id).unwrap();
        let minus = graph.get_node_value(loss_id).unwrap().unwrap().get_data_number().unwrap();

        grads.push((plus - minus) / (2.0 * eps));
    }
    graph.set_node_value(param_id, Some(&original)).unwrap();
    graph.forward(loss_id).unwrap();
    grads
}
