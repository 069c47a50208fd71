//! 统计信息

use serde::Serialize;

/// 全网统计
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// 所有连接上发送的帧
    pub frames_sent: u64,
    /// 其中的拓扑控制消息
    pub control_messages: u64,
    /// 因连接已断开而丢失的帧
    pub frames_lost: u64,
    pub attaches_refused: u64,
    pub topology_inconsistencies: u64,
    /// 没有出口时丢弃的预结算投递
    pub deliveries_dropped: u64,
    /// 以 released 结算的非预结算投递
    pub deliveries_released: u64,
}
