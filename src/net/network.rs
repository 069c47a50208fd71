//! 网络拓扑管理
//!
//! 持有全部路由器、客户端和连接。节点之间只通过连接上的帧通信：
//! `send` 按连接时延调度 `DeliverFrame`，`deliver` 把帧交给目标节点。
//! 同一连接上的帧按发送顺序到达。

use std::any::Any;
use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::client::Client;
use super::connection_events::{ConnectionLost, ConnectionOpened, TopologyChanged};
use super::deliver_frame::DeliverFrame;
use super::error::ConfigError;
use super::frame::{Frame, Message};
use super::id::{ClientId, ConnId, Endpoint, RouterId};
use super::node::Node;
use super::router::{Router, RouterConfig};
use super::routing::RoutingTable;
use super::stats::Stats;
use crate::sim::{SimTime, Simulator, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    /// 路由器之间的拓扑边
    InterRouter,
    /// 客户端、broker 等普通连接
    Normal,
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnId,
    pub a: Endpoint,
    pub b: Endpoint,
    pub role: ConnectionRole,
    pub latency: SimTime,
    pub up: bool,
}

impl Connection {
    pub fn peer_of(&self, me: Endpoint) -> Option<Endpoint> {
        if me == self.a {
            Some(self.b)
        } else if me == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Default)]
pub struct Network {
    routers: Vec<Option<Router>>,
    clients: Vec<Option<Client>>,
    router_names: HashMap<String, RouterId>,
    client_names: HashMap<String, ClientId>,
    conns: Vec<Connection>,
    routing: RoutingTable,
    next_msg_id: u64,
    pub stats: Stats,
}

impl Network {
    /// 添加路由器；配置非法时失败。
    pub fn add_router(&mut self, name: impl Into<String>, config: RouterConfig) -> Result<RouterId, ConfigError> {
        let name = name.into();
        if self.router_names.contains_key(&name) {
            return Err(ConfigError::DuplicateRouter(name));
        }
        let id = RouterId(self.routers.len());
        let router = Router::new(id, name.clone(), config)?;
        info!(router = %name, id = %id, "➕ 添加路由器");
        self.routers.push(Some(router));
        self.router_names.insert(name, id);
        self.routing.mark_dirty();
        Ok(id)
    }

    /// 建立 `from` 到 `to` 的连接；`connector` 为 `from` 上的连接器名。
    ///
    /// 连接在 `open` 之前不可用。
    pub fn add_connector(
        &mut self,
        from: RouterId,
        connector: Option<&str>,
        role: ConnectionRole,
        to: RouterId,
    ) -> Result<ConnId, ConfigError> {
        let latency = self
            .router(from)
            .map(|r| r.settings().link_latency)
            .ok_or_else(|| ConfigError::UnknownRouter(from.to_string()))?;
        if self.router(to).is_none() {
            return Err(ConfigError::UnknownRouter(to.to_string()));
        }
        let id = self.push_conn(Endpoint::Router(from), Endpoint::Router(to), role, latency);
        if let Some(name) = connector {
            if let Some(Some(router)) = self.routers.get_mut(from.0) {
                router.install_connector(name, id)?;
            }
        }
        debug!(conn = %id, from = %from, to = %to, ?role, connector, "添加连接");
        Ok(id)
    }

    /// 添加连接到 `router` 的客户端
    pub fn add_client(&mut self, name: impl Into<String>, router: RouterId) -> Result<ClientId, ConfigError> {
        let name = name.into();
        if self.client_names.contains_key(&name) {
            return Err(ConfigError::DuplicateClient(name));
        }
        let latency = self
            .router(router)
            .map(|r| r.settings().link_latency)
            .ok_or_else(|| ConfigError::UnknownRouter(router.to_string()))?;
        let id = ClientId(self.clients.len());
        let conn = self.push_conn(Endpoint::Client(id), Endpoint::Router(router), ConnectionRole::Normal, latency);
        self.clients.push(Some(Client::new(id, name.clone(), conn)));
        self.client_names.insert(name, id);
        Ok(id)
    }

    fn push_conn(&mut self, a: Endpoint, b: Endpoint, role: ConnectionRole, latency: SimTime) -> ConnId {
        let id = ConnId(self.conns.len());
        self.conns.push(Connection {
            id,
            a,
            b,
            role,
            latency,
            up: false,
        });
        id
    }

    /// 打开所有尚未打开的连接
    pub fn start(&mut self, sim: &mut Simulator) {
        let pending: Vec<ConnId> = self.conns.iter().filter(|c| !c.up).map(|c| c.id).collect();
        for conn in pending {
            self.open(conn, sim);
        }
    }

    /// 打开（或重新打开）连接，两端在当前时刻收到 `ConnectionOpened`。
    pub fn open(&mut self, conn: ConnId, sim: &mut Simulator) {
        let Some(c) = self.conns.get_mut(conn.0) else {
            return;
        };
        if c.up {
            return;
        }
        c.up = true;
        let (a, b, role) = (c.a, c.b, c.role);
        if role == ConnectionRole::InterRouter {
            self.routing.mark_dirty();
        }
        info!(conn = %conn, ?role, "🔗 连接建立");
        let now = sim.now();
        sim.schedule(now, ConnectionOpened { to: a, conn });
        sim.schedule(now, ConnectionOpened { to: b, conn });
    }

    /// 断开连接：立即标记为不可用，两端随后在当前时刻收到 `ConnectionLost`。
    /// 在途帧在到达时被丢弃。
    pub fn disconnect(&mut self, conn: ConnId, sim: &mut Simulator) {
        let Some(c) = self.conns.get_mut(conn.0) else {
            return;
        };
        if !c.up {
            return;
        }
        c.up = false;
        let (a, b, role) = (c.a, c.b, c.role);
        info!(conn = %conn, ?role, "❌ 连接断开");
        let now = sim.now();
        sim.schedule(now, ConnectionLost { to: a, conn });
        sim.schedule(now, ConnectionLost { to: b, conn });
        if role == ConnectionRole::InterRouter {
            self.routing.mark_dirty();
            for router in 0..self.routers.len() {
                sim.schedule(now, TopologyChanged { router: RouterId(router) });
            }
        }
    }

    /// 在连接上发送一帧；连接不可用时丢弃。
    pub fn send(&mut self, from: Endpoint, conn: ConnId, frame: Frame, sim: &mut Simulator) {
        let Some(c) = self.conns.get(conn.0) else {
            warn!(conn = %conn, "未知连接，丢弃帧");
            return;
        };
        let Some(to) = c.peer_of(from) else {
            warn!(conn = %conn, ?from, "发送方不是连接端点，丢弃帧");
            return;
        };
        if !c.up {
            debug!(conn = %conn, frame = frame.kind(), "连接不可用，丢弃帧");
            self.stats.frames_lost += 1;
            return;
        }
        self.stats.frames_sent += 1;
        if matches!(frame, Frame::Control(_)) {
            self.stats.control_messages += 1;
        }
        let at = sim.now().after(c.latency);
        trace!(conn = %conn, ?to, frame = frame.kind(), at = ?at, "调度帧到达");
        sim.schedule(at, DeliverFrame { to, conn, frame });
    }

    /// 将帧交付给端点处理
    pub fn deliver(&mut self, to: Endpoint, conn: ConnId, frame: Frame, sim: &mut Simulator) {
        if !self.is_up(conn) {
            debug!(conn = %conn, frame = frame.kind(), "连接已断开，丢弃在途帧");
            self.stats.frames_lost += 1;
            return;
        }
        self.with_node(to, |node, net| node.on_frame(conn, frame, sim, net));
    }

    pub(crate) fn on_connection_opened(&mut self, to: Endpoint, conn: ConnId, sim: &mut Simulator) {
        if !self.is_up(conn) {
            return;
        }
        self.with_node(to, |node, net| node.on_connection_opened(conn, sim, net));
    }

    pub(crate) fn on_connection_lost(&mut self, to: Endpoint, conn: ConnId, sim: &mut Simulator) {
        self.with_node(to, |node, net| node.on_connection_lost(conn, sim, net));
    }

    pub(crate) fn on_topology_changed(&mut self, router: RouterId) {
        let Some(mut r) = self.routers.get_mut(router.0).and_then(Option::take) else {
            return;
        };
        r.on_topology_changed(self);
        self.routers[router.0] = Some(r);
    }

    /// 暂时把节点取出来，避免 &mut self 与 &mut node 的重叠借用。
    fn with_node(&mut self, to: Endpoint, f: impl FnOnce(&mut dyn Node, &mut Network)) {
        match to {
            Endpoint::Router(id) => {
                let Some(mut router) = self.routers.get_mut(id.0).and_then(Option::take) else {
                    warn!(router = %id, "路由器不存在");
                    return;
                };
                f(&mut router, self);
                self.routers[id.0] = Some(router);
            }
            Endpoint::Client(id) => {
                let Some(mut client) = self.clients.get_mut(id.0).and_then(Option::take) else {
                    warn!(client = id.0, "客户端不存在");
                    return;
                };
                f(&mut client, self);
                self.clients[id.0] = Some(client);
            }
        }
    }

    /// 对客户端执行操作（操作期间客户端被取出）
    pub fn with_client<R>(&mut self, id: ClientId, f: impl FnOnce(&mut Client, &mut Network) -> R) -> Option<R> {
        let mut client = self.clients.get_mut(id.0).and_then(Option::take)?;
        let out = f(&mut client, self);
        self.clients[id.0] = Some(client);
        Some(out)
    }

    pub fn make_message(&mut self, body: impl Into<String>) -> Message {
        let id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);
        Message {
            id,
            body: body.into(),
        }
    }

    pub fn connection(&self, conn: ConnId) -> Option<&Connection> {
        self.conns.get(conn.0)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.conns
    }

    pub fn is_up(&self, conn: ConnId) -> bool {
        self.conns.get(conn.0).is_some_and(|c| c.up)
    }

    pub fn is_inter_router(&self, conn: ConnId) -> bool {
        self.conns
            .get(conn.0)
            .is_some_and(|c| c.role == ConnectionRole::InterRouter)
    }

    /// inter-router 连接上 `me` 对端的路由器
    pub fn peer_router(&self, conn: ConnId, me: RouterId) -> Option<RouterId> {
        match self.conns.get(conn.0)?.peer_of(Endpoint::Router(me))? {
            Endpoint::Router(r) => Some(r),
            Endpoint::Client(_) => None,
        }
    }

    /// 两个路由器之间的连接（任一方向，优先已建立的）
    pub fn conn_between(&self, a: RouterId, b: RouterId) -> Option<ConnId> {
        let between = |c: &&Connection| {
            (c.a == Endpoint::Router(a) && c.b == Endpoint::Router(b))
                || (c.a == Endpoint::Router(b) && c.b == Endpoint::Router(a))
        };
        self.conns
            .iter()
            .filter(between)
            .find(|c| c.up)
            .or_else(|| self.conns.iter().find(between))
            .map(|c| c.id)
    }

    /// 按当前已建立的 inter-router 连接重建路由表（如有变化）。
    pub fn ensure_routes(&mut self) {
        if !self.routing.is_dirty() {
            return;
        }
        let mut adj: Vec<Vec<RouterId>> = vec![Vec::new(); self.routers.len()];
        for c in self.conns.iter().filter(|c| c.up && c.role == ConnectionRole::InterRouter) {
            if let (Endpoint::Router(a), Endpoint::Router(b)) = (c.a, c.b) {
                adj[a.0].push(b);
                adj[b.0].push(a);
            }
        }
        self.routing.ensure_built(&adj);
    }

    pub fn is_reachable(&self, from: RouterId, to: RouterId) -> bool {
        self.routing.is_reachable(from, to)
    }

    /// `from` 去往 `to` 的下一跳连接
    pub fn next_hop_conn(&mut self, from: RouterId, to: RouterId) -> Option<ConnId> {
        self.ensure_routes();
        let hop = self.routing.next_hop(from, to)?;
        self.conns
            .iter()
            .filter(|c| c.up && c.role == ConnectionRole::InterRouter)
            .find(|c| c.peer_of(Endpoint::Router(from)) == Some(Endpoint::Router(hop)))
            .map(|c| c.id)
    }

    pub fn routing(&mut self) -> &RoutingTable {
        self.ensure_routes();
        &self.routing
    }

    pub fn router(&self, id: RouterId) -> Option<&Router> {
        self.routers.get(id.0).and_then(Option::as_ref)
    }

    pub fn router_id(&self, name: &str) -> Option<RouterId> {
        self.router_names.get(name).copied()
    }

    pub fn router_by_name(&self, name: &str) -> Option<&Router> {
        self.router_id(name).and_then(|id| self.router(id))
    }

    pub fn routers(&self) -> impl Iterator<Item = &Router> {
        self.routers.iter().flatten()
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(id.0).and_then(Option::as_ref)
    }

    pub fn client_id(&self, name: &str) -> Option<ClientId> {
        self.client_names.get(name).copied()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter().flatten()
    }
}

/// 承载路由网络的仿真世界；事件执行时由 `World` 向下转型取回。
#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
