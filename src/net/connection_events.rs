//! 连接状态事件
//!
//! 连接建立、丢失以及 inter-router 拓扑变化都作为事件排队，
//! 在每个节点上与帧按同一顺序处理。

use super::id::{ConnId, Endpoint, RouterId};
use super::network::NetWorld;
use crate::sim::{Event, Simulator, World};
use tracing::warn;

fn net_world(world: &mut dyn World) -> Option<&mut NetWorld> {
    let w = world.as_any_mut().downcast_mut::<NetWorld>();
    if w.is_none() {
        warn!("world 不是 NetWorld，忽略连接事件");
    }
    w
}

/// 事件：连接在 `to` 一端可用
#[derive(Debug)]
pub struct ConnectionOpened {
    pub to: Endpoint,
    pub conn: ConnId,
}

impl Event for ConnectionOpened {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        if let Some(w) = net_world(world) {
            w.net.on_connection_opened(self.to, self.conn, sim);
        }
    }
}

/// 事件：连接在 `to` 一端丢失
#[derive(Debug)]
pub struct ConnectionLost {
    pub to: Endpoint,
    pub conn: ConnId,
}

impl Event for ConnectionLost {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        if let Some(w) = net_world(world) {
            w.net.on_connection_lost(self.to, self.conn, sim);
        }
    }
}

/// 事件：inter-router 拓扑变化，通知路由器重新检查远端条目
#[derive(Debug)]
pub struct TopologyChanged {
    pub router: RouterId,
}

impl Event for TopologyChanged {
    fn execute(self: Box<Self>, _sim: &mut Simulator, world: &mut dyn World) {
        if let Some(w) = net_world(world) {
            w.net.on_topology_changed(self.router);
        }
    }
}
