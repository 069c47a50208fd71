//! 仿真核心模块
//!
//! 事件驱动执行器：路由器之间的帧传递、连接建立/断开都以事件形式按 `(时间, 序号)` 顺序执行，
//! 每个路由器因此成为自身状态的唯一写者。

// 子模块声明
mod event;
mod scenario;
mod simulator;
mod time;

// 重新导出公共接口
pub use event::{Event, World};
pub use scenario::{
    ClientSpec, ConnectorRole, ConnectorSpec, FanoutSpec, BiasSpec, FixedAddressSpec,
    LinkRoutePatternSpec, PatternDirSpec, RoleSpec, RouterSettingsSpec, RouterSpec, ScenarioSpec,
    StepSpec,
};
pub use simulator::Simulator;
pub use time::SimTime;
