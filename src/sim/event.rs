//! 事件与世界
//!
//! 帧到达、连接建立/断开、拓扑变化都实现为 [`Event`]；[`World`] 是事件作用的对象，
//! 由路由网络实现，事件执行时再向下转型取回具体类型。

use super::simulator::Simulator;
use std::any::Any;

/// 事件：可被调度执行。使用 `self: Box<Self>` 以便把帧的所有权交给处理方。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}

pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
