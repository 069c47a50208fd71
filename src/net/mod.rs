//! 链路路由引擎
//!
//! 此模块包含路由器网络的核心组件：前缀表、地址注册表、拓扑传播、
//! attach 处理、代理链路转发和扇出选择，以及承载它们的连接与节点。

// 子模块声明
mod id;
mod address;
mod error;
mod frame;
mod pattern;
mod registry;
mod topology;
mod routing;
mod fanout;
mod link;
mod attach;
mod forwarder;
mod router;
mod management;
mod client;
mod node;
mod stats;
mod network;
mod deliver_frame;
mod connection_events;

// 重新导出公共接口
pub use id::{ClientId, ConnId, Endpoint, LinkId, ProxyId, RouterId};
pub use address::{AddressClass, AddressKey, normalize, normalize_prefix, prefix_matches};
pub use error::{ConfigError, ErrorCondition, RouteError, TopologyError};
pub use frame::{
    Advert, Attach, ControlMessage, Detach, Disposition, Flow, FlowState, Frame, Message, Outcome, Role, Routed,
    Transfer,
};
pub use pattern::{LinkRoutePattern, PatternDirection, PatternTable};
pub use registry::{
    AddressEntry, AddressRegistry, BindKind, DestinationChange, Reachability, RemoteSupport, Transition, ViaRemoval,
};
pub use topology::{Outbound, TopologyEdge, TopologyPropagator};
pub use routing::RoutingTable;
pub use fanout::{Bias, Candidate, Distribution, Egress, Fanout, FanoutSelector, FanoutTable, FixedAddress};
pub use link::{Link, LinkDirection, LinkOwner, LinkTable};
pub use attach::Resolution;
pub use forwarder::{ProxyLink, ProxyState, ProxyTarget};
pub use router::{Router, RouterConfig, RouterSettings};
pub use management::{AddressRecord, LinkRecord, ProxyRecord};
pub use client::{Client, ClientLink};
pub use node::Node;
pub use stats::Stats;
pub use network::{Connection, ConnectionRole, NetWorld, Network};
pub use deliver_frame::DeliverFrame;
pub use connection_events::{ConnectionLost, ConnectionOpened, TopologyChanged};
