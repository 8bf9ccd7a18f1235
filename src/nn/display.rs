/*
 * @Author       : 老董
 * @Date         : 2026-03-01
 * @Description  : 节点的显示格式
 */

use super::NodeId;

/// 格式：`节点[id=3, name=conv_1#weight, type=Parameter]`
pub(in crate::nn) fn format_node_display(id: NodeId, name: &str, type_name: &str) -> String {
    format!("节点[id={id}, name={name}, type={type_name}]")
}
