//! 路由器节点
//!
//! 把前缀表、地址注册表、拓扑传播器、链路表和代理链路组合在一起。
//! 每个路由器是自身全部状态的唯一写者：所有修改都来自按序执行的事件。

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, trace, warn};

use super::address::AddressKey;
use super::error::{ConfigError, RouteError};
use super::fanout::{Bias, Candidate, Egress, Fanout, FanoutSelector, FanoutTable};
use super::forwarder::ProxyLink;
use super::frame::{
    ControlMessage, Detach, Disposition, Flow, Frame, Message, Outcome, Routed, Transfer,
};
use super::id::{ConnId, Endpoint, LinkId, ProxyId, RouterId};
use super::link::{LinkDirection, LinkOwner, LinkTable};
use super::network::Network;
use super::node::Node;
use super::pattern::{LinkRoutePattern, PatternTable};
use super::registry::{AddressRegistry, BindKind, DestinationChange};
use super::topology::{Outbound, TopologyPropagator};
use crate::sim::{SimTime, Simulator};

/// 路由器运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterSettings {
    /// 代理链路上游可获得的最大信用（在途窗口）
    pub max_in_flight: u32,
    /// 消息路由入向链路的初始信用
    pub link_capacity: u32,
    /// 本路由器发起的连接的单向时延
    pub link_latency: SimTime,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 250,
            link_capacity: 250,
            link_latency: SimTime::from_micros(1),
        }
    }
}

/// 构造路由器所需的配置（由外部配置加载器提供）
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    pub settings: RouterSettings,
    /// 声明的具名连接器
    pub connectors: Vec<String>,
    pub link_route_patterns: Vec<LinkRoutePattern>,
    pub fixed_addresses: Vec<(String, Fanout, Option<Bias>)>,
}

#[derive(Debug)]
pub struct Router {
    id: RouterId,
    pub(crate) name: String,
    settings: RouterSettings,
    pub(crate) patterns: PatternTable,
    pub(crate) fanout_table: FanoutTable,
    pub(crate) selector: FanoutSelector,
    declared_connectors: BTreeSet<String>,
    pub(crate) connectors: BTreeMap<String, ConnId>,
    pub(crate) registry: AddressRegistry,
    pub(crate) topology: TopologyPropagator,
    pub(crate) links: LinkTable,
    pub(crate) proxies: BTreeMap<ProxyId, ProxyLink>,
    next_proxy: u64,
}

impl Router {
    /// 校验并加载配置。重复或有歧义的前缀、未声明的连接器都会导致失败。
    pub fn new(id: RouterId, name: impl Into<String>, config: RouterConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        let mut declared_connectors = BTreeSet::new();
        for connector in &config.connectors {
            if !declared_connectors.insert(connector.clone()) {
                return Err(ConfigError::DuplicateConnector(connector.clone()));
            }
        }

        let mut patterns = PatternTable::default();
        for pattern in config.link_route_patterns {
            if let Some(connector) = &pattern.connector {
                if !declared_connectors.contains(connector) {
                    return Err(ConfigError::UnknownConnector {
                        prefix: pattern.prefix.clone(),
                        connector: connector.clone(),
                    });
                }
            }
            patterns.register(pattern)?;
        }

        let mut fanout_table = FanoutTable::default();
        for (prefix, fanout, bias) in &config.fixed_addresses {
            fanout_table.register(prefix, *fanout, *bias)?;
        }

        let mut router = Self {
            id,
            name,
            settings: config.settings,
            patterns,
            fanout_table,
            selector: FanoutSelector::default(),
            declared_connectors,
            connectors: BTreeMap::new(),
            registry: AddressRegistry::default(),
            topology: TopologyPropagator::new(id),
            links: LinkTable::default(),
            proxies: BTreeMap::new(),
            next_proxy: 0,
        };

        // 以自己的连接器终结的前缀：作为归属条目通告给其它路由器
        let owned: BTreeSet<String> = router.patterns.owned_prefixes().map(str::to_string).collect();
        for prefix in owned {
            let key = AddressKey::owner(&prefix);
            router.registry.bind(&key, BindKind::Local, None);
            // 此时还没有任何边，快照会带上这个序号
            router.topology.assign_local_seq(&key);
        }
        Ok(router)
    }

    pub fn id(&self) -> RouterId {
        self.id
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub fn topology(&self) -> &TopologyPropagator {
        &self.topology
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn proxies(&self) -> impl Iterator<Item = &ProxyLink> {
        self.proxies.values()
    }

    /// 连接器名 -> 连接
    pub fn connector(&self, name: &str) -> Option<ConnId> {
        self.connectors.get(name).copied()
    }

    pub(crate) fn connector_name(&self, conn: ConnId) -> Option<&str> {
        self.connectors
            .iter()
            .find(|(_, c)| **c == conn)
            .map(|(n, _)| n.as_str())
    }

    pub(crate) fn install_connector(&mut self, name: &str, conn: ConnId) -> Result<(), ConfigError> {
        if !self.declared_connectors.contains(name) {
            self.declared_connectors.insert(name.to_string());
        }
        if self.connectors.insert(name.to_string(), conn).is_some() {
            return Err(ConfigError::DuplicateConnector(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn alloc_proxy_id(&mut self) -> ProxyId {
        let id = ProxyId(self.next_proxy);
        self.next_proxy += 1;
        id
    }

    pub(crate) fn send(&self, conn: ConnId, frame: Frame, sim: &mut Simulator, net: &mut Network) {
        net.send(Endpoint::Router(self.id), conn, frame, sim);
    }

    pub(crate) fn send_control(&self, out: Vec<Outbound>, sim: &mut Simulator, net: &mut Network) {
        for (conn, msg) in out {
            self.send(conn, Frame::Control(msg), sim, net);
        }
    }

    /// 本地绑定；本路由器成为该地址的目的地（第一个接收者）时通告给所有边。
    pub(crate) fn bind_local(&mut self, key: &AddressKey, egress: Option<LinkId>, sim: &mut Simulator, net: &mut Network) {
        let t = self.registry.bind(key, BindKind::Local, egress);
        trace!(key = %key, reachability = ?t.reachability, destination = ?t.destination, "bind");
        self.advertise_change(key, t.destination, sim, net);
    }

    /// 本地解绑；最后一个接收者离开时撤销通告，引用计数归零后删除条目。
    pub(crate) fn unbind_local(&mut self, key: &AddressKey, egress: Option<LinkId>, sim: &mut Simulator, net: &mut Network) {
        let t = self.registry.unbind(key, egress);
        trace!(key = %key, reachability = ?t.reachability, destination = ?t.destination, "unbind");
        self.advertise_change(key, t.destination, sim, net);
        self.prune_cursors();
    }

    fn advertise_change(&mut self, key: &AddressKey, change: DestinationChange, sim: &mut Simulator, net: &mut Network) {
        let out = match change {
            DestinationChange::Became => self.topology.local_added(key),
            DestinationChange::Ceased => self.topology.local_removed(key),
            DestinationChange::Unchanged => return,
        };
        self.send_control(out, sim, net);
    }

    /// 地址条目被回收后，其轮询游标一并丢弃。
    pub(crate) fn prune_cursors(&mut self) {
        let registry = &self.registry;
        self.selector.retain(|key| registry.get(key).is_some());
    }

    /// inter-router 拓扑变化后清除 origin 已不可达的远端条目。
    pub fn on_topology_changed(&mut self, net: &mut Network) {
        net.ensure_routes();
        let id = self.id;
        let purged = self
            .topology
            .purge_unreachable(|origin| net.is_reachable(id, origin), &mut self.registry);
        if !purged.is_empty() {
            debug!(router = %self.name, purged = purged.len(), "清除不可达 origin 的条目");
            self.prune_cursors();
        }
    }

    #[tracing::instrument(skip(self, msg, sim, net), fields(router = %self.name, conn = %conn))]
    fn on_control(&mut self, conn: ConnId, msg: ControlMessage, sim: &mut Simulator, net: &mut Network) {
        if !self.topology.has_edge(conn) {
            warn!("控制消息来自非 inter-router 连接，忽略");
            return;
        }
        match self.topology.on_control(conn, msg, &mut self.registry) {
            Ok(out) => {
                self.send_control(out, sim, net);
                self.prune_cursors();
            }
            Err(e) => {
                warn!(error = %e, "拓扑不一致，忽略");
                net.stats.topology_inconsistencies += 1;
            }
        }
    }

    #[tracing::instrument(skip(self, t, sim, net), fields(router = %self.name, conn = %conn, link = %t.link, delivery = t.delivery_id))]
    fn on_transfer(&mut self, conn: ConnId, t: Transfer, sim: &mut Simulator, net: &mut Network) {
        let Some(id) = self.links.find(conn, &t.link) else {
            // 代理已拆除时仍在途的投递：按 at-most-once 丢弃
            debug!("链路不存在，丢弃在途投递");
            net.stats.deliveries_dropped += 1;
            return;
        };
        let owner = self.links.get(id).map(|l| l.owner.clone());
        match owner {
            Some(LinkOwner::Proxy(pid)) => self.proxy_transfer(pid, id, t, sim, net),
            Some(LinkOwner::MessageRouted(key)) => self.route_message(id, key, t, sim, net),
            None => {}
        }
    }

    fn on_flow(&mut self, conn: ConnId, f: Flow, sim: &mut Simulator, net: &mut Network) {
        let Some(id) = self.links.find(conn, &f.link) else {
            trace!(link = %f.link, "flow 对应的链路不存在");
            return;
        };
        let owner = self.links.get(id).map(|l| l.owner.clone());
        match owner {
            Some(LinkOwner::Proxy(pid)) => self.proxy_flow(pid, id, f, sim, net),
            Some(LinkOwner::MessageRouted(key)) => {
                let Some(link) = self.links.get_mut(id) else {
                    return;
                };
                if link.direction != LinkDirection::Outgoing {
                    return;
                }
                link.apply_flow(f.state);
                self.drain_pending(id, &key, sim, net);
            }
            None => {}
        }
    }

    fn on_disposition(&mut self, conn: ConnId, d: Disposition, sim: &mut Simulator, net: &mut Network) {
        let Some(id) = self.links.find(conn, &d.link) else {
            trace!(link = %d.link, "disposition 对应的链路不存在");
            return;
        };
        if let Some(LinkOwner::Proxy(pid)) = self.links.get(id).map(|l| l.owner.clone()) {
            self.proxy_disposition(pid, id, d, sim, net);
        } else {
            // 消息路由的出向投递都是预结算的，对端的 disposition 无需处理
            trace!(outcome = ?d.outcome, "忽略消息路由链路上的 disposition");
        }
    }

    #[tracing::instrument(skip(self, d, sim, net), fields(router = %self.name, conn = %conn, link = %d.link))]
    fn on_detach(&mut self, conn: ConnId, d: Detach, sim: &mut Simulator, net: &mut Network) {
        let Some(id) = self.links.find(conn, &d.link) else {
            trace!("detach 对应的链路不存在");
            return;
        };
        match self.links.get(id).map(|l| l.owner.clone()) {
            Some(LinkOwner::Proxy(pid)) => self.teardown_proxy(pid, Some(id), d.error, sim, net),
            Some(LinkOwner::MessageRouted(_)) => self.close_message_link(id, sim, net),
            None => {}
        }
    }

    /// 关闭一条消息路由链路并释放地址引用。
    pub(crate) fn close_message_link(&mut self, id: LinkId, sim: &mut Simulator, net: &mut Network) {
        let Some(link) = self.links.remove(id) else {
            return;
        };
        let LinkOwner::MessageRouted(key) = &link.owner else {
            return;
        };
        if !link.pending.is_empty() {
            warn!(link = %link.name, pending = link.pending.len(), "链路关闭，丢弃暂存消息");
            net.stats.deliveries_dropped += link.pending.len() as u64;
        }
        let egress = (link.direction == LinkDirection::Outgoing).then_some(id);
        self.unbind_local(key, egress, sim, net);
        debug!(router = %self.name, link = %link.name, "消息路由链路关闭");
    }

    /// 消息路由：入向链路收到投递后由扇出选择器决定出口。
    fn route_message(&mut self, id: LinkId, key: AddressKey, t: Transfer, sim: &mut Simulator, net: &mut Network) {
        let capacity = self.settings.link_capacity;
        let Some(link) = self.links.get_mut(id) else {
            return;
        };
        if link.direction != LinkDirection::Incoming {
            warn!(link = %link.name, "对端在出向链路上发送投递，忽略");
            return;
        }
        link.consume();
        let replenish = link.credit <= capacity / 2;
        if replenish {
            link.credit = capacity;
        }
        let (link_name, link_conn, flow) = (link.name.clone(), link.conn, link.flow_state());
        self.registry.record_ingress(&key);
        if replenish {
            self.send(link_conn, Frame::Flow(Flow { link: link_name.clone(), state: flow }), sim, net);
        }

        let delivered = self.forward_to_egress(&key, t.message, true, sim, net);
        if !t.settled {
            let outcome = if delivered { Outcome::Accepted } else { Outcome::Released };
            self.send(
                link_conn,
                Frame::Disposition(Disposition {
                    link: link_name,
                    delivery_id: t.delivery_id,
                    outcome,
                    settled: true,
                }),
                sim,
                net,
            );
        }
        if !delivered {
            warn!(key = %key, settled = t.settled, "没有可用出口");
            if t.settled {
                net.stats.deliveries_dropped += 1;
            } else {
                net.stats.deliveries_released += 1;
            }
        }
    }

    /// 在目的路由器上交付，或沿下一跳继续转发。
    fn on_routed(&mut self, r: Routed, sim: &mut Simulator, net: &mut Network) {
        if r.dest == self.id {
            if !self.forward_to_egress(&r.key, r.message, false, sim, net) {
                warn!(router = %self.name, key = %r.key, "远端投递到达时本地已无出口");
                net.stats.deliveries_dropped += 1;
            }
            return;
        }
        match net.next_hop_conn(self.id, r.dest) {
            Some(next) => {
                self.registry.record_transit(&r.key);
                self.send(next, Frame::Routed(r), sim, net);
            }
            None => {
                warn!(router = %self.name, dest = %r.dest, "目的路由器不可达，丢弃");
                net.stats.deliveries_dropped += 1;
            }
        }
    }

    /// 把消息交给扇出选择器选中的出口；返回是否至少交给了一个出口。
    fn forward_to_egress(
        &mut self,
        key: &AddressKey,
        message: Message,
        allow_remote: bool,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> bool {
        let Some(entry) = self.registry.get(key) else {
            return false;
        };
        let mut candidates: Vec<Candidate> = entry
            .egress_links
            .iter()
            .map(|l| Candidate {
                hops: 0,
                egress: Egress::Local(*l),
            })
            .collect();
        let mut next_hops = BTreeMap::new();
        if allow_remote {
            for (origin, hops) in entry.remote_origins() {
                if let Some(conn) = net.next_hop_conn(self.id, origin) {
                    next_hops.insert(origin, conn);
                    candidates.push(Candidate {
                        hops,
                        egress: Egress::Remote(origin),
                    });
                }
            }
        }

        let dist = self.fanout_table.distribution(key.address());
        let targets = self.selector.select(key, dist, candidates);
        trace!(key = %key, ?dist, targets = ?targets, "扇出选择");
        for target in &targets {
            match *target {
                Egress::Local(link) => self.send_on_local(link, key, message.clone(), sim, net),
                Egress::Remote(origin) => {
                    if let Some(conn) = next_hops.get(&origin).copied() {
                        let routed = Routed {
                            key: key.clone(),
                            dest: origin,
                            message: message.clone(),
                        };
                        self.send(conn, Frame::Routed(routed), sim, net);
                    }
                }
            }
        }
        !targets.is_empty()
    }

    fn send_on_local(&mut self, id: LinkId, key: &AddressKey, message: Message, sim: &mut Simulator, net: &mut Network) {
        let Some(link) = self.links.get_mut(id) else {
            return;
        };
        link.pending.push_back(message);
        self.drain_pending(id, key, sim, net);
    }

    /// 在信用允许的范围内发送出向链路上暂存的消息。
    fn drain_pending(&mut self, id: LinkId, key: &AddressKey, sim: &mut Simulator, net: &mut Network) {
        let mut ready = Vec::new();
        let Some(link) = self.links.get_mut(id) else {
            return;
        };
        while link.credit > 0 {
            let Some(message) = link.pending.pop_front() else {
                break;
            };
            let delivery_id = link.consume();
            ready.push(Transfer {
                link: link.name.clone(),
                delivery_id,
                settled: true,
                message,
            });
        }
        let conn = link.conn;
        for t in ready {
            self.registry.record_egress(key);
            self.send(conn, Frame::Transfer(t), sim, net);
        }
    }
}

impl Node for Router {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, frame, sim, net), fields(router = %self.name, conn = %conn, frame = frame.kind()))]
    fn on_frame(&mut self, conn: ConnId, frame: Frame, sim: &mut Simulator, net: &mut Network) {
        match frame {
            Frame::Attach(a) => self.on_attach(conn, a, sim, net),
            Frame::Transfer(t) => self.on_transfer(conn, t, sim, net),
            Frame::Flow(f) => self.on_flow(conn, f, sim, net),
            Frame::Disposition(d) => self.on_disposition(conn, d, sim, net),
            Frame::Detach(d) => self.on_detach(conn, d, sim, net),
            Frame::Routed(r) => self.on_routed(r, sim, net),
            Frame::Control(m) => self.on_control(conn, m, sim, net),
        }
    }

    fn on_connection_opened(&mut self, conn: ConnId, sim: &mut Simulator, net: &mut Network) {
        if !net.is_inter_router(conn) {
            return;
        }
        let Some(remote) = net.peer_router(conn, self.id) else {
            return;
        };
        info!(router = %self.name, conn = %conn, remote = %remote, "inter-router 连接建立");
        let out = self.topology.edge_up(conn, remote, &self.registry);
        self.send_control(out, sim, net);
    }

    #[tracing::instrument(skip(self, sim, net), fields(router = %self.name))]
    fn on_connection_lost(&mut self, conn: ConnId, sim: &mut Simulator, net: &mut Network) {
        info!("连接断开");
        for id in self.links.on_conn(conn) {
            let Some(link) = self.links.get(id) else {
                continue;
            };
            match link.owner.clone() {
                LinkOwner::Proxy(pid) => {
                    let e = RouteError::ForwardingFailure {
                        link: link.name.clone(),
                    };
                    warn!(error = %e, proxy = pid.0, "代理链路的一半随连接丢失");
                    self.teardown_proxy(pid, Some(id), Some(e.condition()), sim, net);
                }
                LinkOwner::MessageRouted(_) => self.close_message_link(id, sim, net),
            }
        }
        if self.topology.has_edge(conn) {
            let out = self.topology.edge_down(conn, &mut self.registry);
            self.send_control(out, sim, net);
            self.prune_cursors();
        }
    }
}
