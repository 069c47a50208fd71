//! 帧类型
//!
//! 协议层已解码的 attach/transfer/flow/disposition/detach 帧，以及路由器之间的
//! 消息路由帧和控制面消息。链路在一条连接上以名称标识。

use serde::Serialize;

use super::address::AddressKey;
use super::error::ErrorCondition;
use super::id::RouterId;

/// attach 发起方在链路上的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sender,
    Receiver,
}

/// 消息（负载对本引擎不透明）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: u64,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Attach {
    pub name: String,
    pub role: Role,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct Transfer {
    pub link: String,
    pub delivery_id: u32,
    pub settled: bool,
    pub message: Message,
}

/// 由接收方发出：`delivery_count` 是它已收到的投递数，`credit` 是在此基础上还允许的数量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowState {
    pub delivery_count: u32,
    pub credit: u32,
}

#[derive(Debug, Clone)]
pub struct Flow {
    pub link: String,
    pub state: FlowState,
}

/// 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Rejected,
    Released,
}

#[derive(Debug, Clone)]
pub struct Disposition {
    pub link: String,
    pub delivery_id: u32,
    pub outcome: Outcome,
    pub settled: bool,
}

#[derive(Debug, Clone)]
pub struct Detach {
    pub link: String,
    pub error: Option<ErrorCondition>,
}

/// 路由器之间按消息路由转发的投递（预结算，at-most-once）。
#[derive(Debug, Clone)]
pub struct Routed {
    pub key: AddressKey,
    /// 目的路由器：地址在那里有本地绑定
    pub dest: RouterId,
    pub message: Message,
}

/// 可达性通告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advert {
    pub key: AddressKey,
    pub origin: RouterId,
    pub seq: u64,
    pub hops: u32,
}

/// 控制面消息，只在 inter-router 连接上出现。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// 连接建立时的全量快照
    Snapshot(Vec<Advert>),
    Add(Advert),
    /// 由 origin 发起的撤销，全网生效
    Retract {
        key: AddressKey,
        origin: RouterId,
        seq: u64,
    },
    /// 发送方不再经由自己可达该条目（只影响这一条边）
    Withdraw { key: AddressKey, origin: RouterId },
}

#[derive(Debug, Clone)]
pub enum Frame {
    Attach(Attach),
    Transfer(Transfer),
    Flow(Flow),
    Disposition(Disposition),
    Detach(Detach),
    Routed(Routed),
    Control(ControlMessage),
}

impl Frame {
    /// 用于日志的帧类型名
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Attach(_) => "attach",
            Frame::Transfer(_) => "transfer",
            Frame::Flow(_) => "flow",
            Frame::Disposition(_) => "disposition",
            Frame::Detach(_) => "detach",
            Frame::Routed(_) => "routed",
            Frame::Control(_) => "control",
        }
    }
}
