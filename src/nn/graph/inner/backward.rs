/*
 * @Author       : 老董
 * @Date         : 2026-03-01
 * @Description  : GraphInner VJP 反向传播
 */

use super::super::error::GraphError;
use super::GraphInner;
use crate::nn::NodeId;
use crate::tensor::Tensor;
use std::collections::HashSet;

impl GraphInner {
    // ========== VJP 反向传播核心 ==========

    /// 反向传播：要求损失只含 1 个元素，以 1 作为种子梯度，返回损失值
    pub fn backward(&mut self, loss: NodeId) -> Result<f32, GraphError> {
        let loss_node = self.get_node(loss)?;
        let loss_value = loss_node.value().ok_or_else(|| {
            GraphError::ComputationError(format!("损失{loss_node}没有值，请先执行 forward"))
        })?;

        let loss_scalar = loss_value.get_data_number().ok_or_else(|| {
            GraphError::InvalidOperation(format!(
                "反向传播要求损失为标量 [1, 1]，但得到 {:?}",
                loss_value.shape()
            ))
        })?;

        let seed = Tensor::ones(loss_value.shape());
        self.backward_vjp_core(loss, &seed)?;
        Ok(loss_scalar)
    }

    /// 以显式给定的上游梯度从任意输出节点开始反向传播
    pub fn backward_with_grad(&mut self, output: NodeId, seed: &Tensor) -> Result<(), GraphError> {
        let output_node = self.get_node(output)?;
        let output_value = output_node.value().ok_or_else(|| {
            GraphError::ComputationError(format!("{output_node}没有值，请先执行 forward"))
        })?;
        if output_value.shape() != seed.shape() {
            return Err(GraphError::ShapeMismatch {
                expected: output_value.shape().to_vec(),
                got: seed.shape().to_vec(),
                message: format!("{output_node}的种子梯度形状必须与其值一致"),
            });
        }

        self.backward_vjp_core(output, seed)
    }

    /// VJP 反向传播核心实现
    fn backward_vjp_core(&mut self, start_id: NodeId, seed: &Tensor) -> Result<(), GraphError> {
        if !self.is_train_mode() {
            eprintln!("[conv_layer 警告] 在 eval 模式下调用 backward，这通常是误用。");
        }

        self.reset_intermediate_grad();

        if self.get_node(start_id)?.node_type().is_grad_sink() {
            return Err(GraphError::InvalidOperation(format!(
                "{}不参与梯度计算，不能作为反向传播的起点",
                self.get_node(start_id)?
            )));
        }
        let start_node = self.get_node_mut(start_id)?;
        let accumulated = match start_node.grad() {
            Some(existing) => existing + seed,
            None => seed.clone(),
        };
        start_node.set_grad(Some(&accumulated))?;

        let topo_order = self.topological_sort_backward(start_id)?;
        for node_id in topo_order {
            self.propagate_grad_to_parents(node_id)?;
        }

        Ok(())
    }

    /// 将梯度从当前节点传播到其父节点
    fn propagate_grad_to_parents(&mut self, node_id: NodeId) -> Result<(), GraphError> {
        let node = self.get_node(node_id)?;
        if node.is_detached() {
            return Ok(());
        }

        let parent_ids = self.get_node_parents(node_id)?;
        if parent_ids.is_empty() {
            return Ok(());
        }

        let parent_grads: Vec<(NodeId, Tensor)> = {
            let upstream_grad = match node.grad() {
                Some(g) => g,
                None => return Ok(()),
            };

            let mut grads = Vec::with_capacity(parent_ids.len());
            for parent_id in &parent_ids {
                let parent = self.get_node(*parent_id)?;

                // 输入/状态节点不接收梯度，detach 的节点也不再累积梯度
                if parent.node_type().is_grad_sink() || parent.is_detached() {
                    continue;
                }

                let assistant = parent_ids
                    .iter()
                    .find(|&&id| id != *parent_id)
                    .map(|&id| self.get_node(id))
                    .transpose()?;

                let parent_grad = node.calc_grad_to_parent(parent, upstream_grad, assistant)?;
                grads.push((*parent_id, parent_grad));
            }
            grads
        };

        for (parent_id, parent_grad) in parent_grads {
            let parent_node = self.get_node_mut(parent_id)?;
            let new_grad = match parent_node.grad() {
                Some(existing_grad) => existing_grad + &parent_grad,
                None => parent_grad,
            };
            parent_node.set_grad(Some(&new_grad))?;
        }

        Ok(())
    }

    /// 反向拓扑序：从起点出发对父节点做后序 DFS，再整体逆序。
    /// 保证每个节点在其全部子节点（位于起点子图内的）之后才向父节点传播
    fn topological_sort_backward(&self, start_id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        fn dfs(
            graph: &GraphInner,
            node_id: NodeId,
            visited: &mut HashSet<NodeId>,
            post_order: &mut Vec<NodeId>,
        ) -> Result<(), GraphError> {
            if !visited.insert(node_id) {
                return Ok(());
            }
            for parent_id in graph.get_node_parents(node_id)? {
                dfs(graph, parent_id, visited, post_order)?;
            }
            post_order.push(node_id);
            Ok(())
        }

        let mut visited = HashSet::new();
        let mut post_order = Vec::new();
        dfs(self, start_id, &mut visited, &mut post_order)?;
        post_order.reverse();
        Ok(post_order)
    }

    /// 清除非参数节点的梯度（参数梯度跨多次反向传播累积，直到 zero_grad）
    fn reset_intermediate_grad(&mut self) {
        for node in self.nodes.values_mut() {
            if !matches!(node.node_type(), crate::nn::nodes::NodeType::Parameter(_)) {
                let _ = node.clear_grad();
            }
        }
    }

    /// 清零所有节点的梯度
    pub fn zero_grad(&mut self) -> Result<(), GraphError> {
        for node in self.nodes.values_mut() {
            node.clear_grad()?;
        }
        Ok(())
    }
}
