//! 节点接口
//!
//! 路由器和客户端都是连接的端点，帧到达与连接状态变化都交给节点处理。

use super::frame::Frame;
use super::id::ConnId;
use super::network::Network;
use crate::sim::Simulator;

/// 连接端点上的节点
pub trait Node: Send {
    fn name(&self) -> &str;

    /// 处理经由 `conn` 到达的帧
    fn on_frame(&mut self, conn: ConnId, frame: Frame, sim: &mut Simulator, net: &mut Network);

    fn on_connection_opened(&mut self, _conn: ConnId, _sim: &mut Simulator, _net: &mut Network) {}

    fn on_connection_lost(&mut self, _conn: ConnId, _sim: &mut Simulator, _net: &mut Network) {}
}
