//! 错误类型
//!
//! 配置错误在加载时致命；路由错误以带错误条件的 detach 反馈给对端；
//! 拓扑不一致仅记录日志并忽略。

use super::address::AddressKey;
use super::id::RouterId;
use super::pattern::PatternDirection;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate link-route pattern: prefix {prefix:?} dir {dir:?}")]
    DuplicatePattern { prefix: String, dir: PatternDirection },

    #[error("link-route pattern has an empty prefix")]
    EmptyPrefix,

    #[error("link-route pattern {prefix:?} references unknown connector {connector:?}")]
    UnknownConnector { prefix: String, connector: String },

    #[error("duplicate connector name {0:?}")]
    DuplicateConnector(String),

    #[error("duplicate router name {0:?}")]
    DuplicateRouter(String),

    #[error("unknown router {0:?}")]
    UnknownRouter(String),

    #[error("duplicate client name {0:?}")]
    DuplicateClient(String),

    #[error("unknown client {0:?}")]
    UnknownClient(String),

    #[error("no connection between {router:?} and {peer:?}")]
    NoConnection { router: String, peer: String },

    #[error("duplicate fixed address prefix {0:?}")]
    DuplicateFixedAddress(String),

    #[error("unsupported schema version {0}")]
    UnsupportedSchema(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no route available for {address:?}")]
    NoRouteAvailable { address: String },

    #[error("forwarding failure on link {link:?}")]
    ForwardingFailure { link: String },
}

impl RouteError {
    /// 对应 detach 帧中的错误条件
    pub fn condition(&self) -> ErrorCondition {
        match self {
            RouteError::NoRouteAvailable { .. } => ErrorCondition::NoRouteAvailable,
            RouteError::ForwardingFailure { .. } => ErrorCondition::ForwardingFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("retraction of {key} from {origin} that was never advertised")]
    Inconsistency { key: AddressKey, origin: RouterId },
}

/// detach 帧携带的错误条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorCondition {
    NoRouteAvailable,
    ForwardingFailure,
    TransferLimitExceeded,
}

impl ErrorCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCondition::NoRouteAvailable => "qd:no-route-to-dest",
            ErrorCondition::ForwardingFailure => "qd:forwarding-failure",
            ErrorCondition::TransferLimitExceeded => "amqp:link:transfer-limit-exceeded",
        }
    }
}
