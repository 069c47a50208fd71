//! 帧交付事件

use super::frame::Frame;
use super::id::{ConnId, Endpoint};
use super::network::NetWorld;
use crate::sim::{Event, Simulator, World};
use tracing::{debug, trace, warn};

/// 事件：把经由 `conn` 传输的一帧交给端点处理。
#[derive(Debug)]
pub struct DeliverFrame {
    pub to: Endpoint,
    pub conn: ConnId,
    pub frame: Frame,
}

impl Event for DeliverFrame {
    #[tracing::instrument(skip(self, sim, world), fields(to = ?self.to, conn = %self.conn, frame = self.frame.kind()))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverFrame { to, conn, frame } = *self;
        debug!(now = ?sim.now(), "📨 帧到达");

        let Some(w) = world.as_any_mut().downcast_mut::<NetWorld>() else {
            warn!("world 不是 NetWorld，丢弃帧");
            return;
        };
        w.net.deliver(to, conn, frame, sim);
        trace!("DeliverFrame::execute 完成");
    }
}
