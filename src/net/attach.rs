//! 链路 attach 处理
//!
//! 每个到达的 attach 依次经过：
//!
//! ```text
//! Received -> PatternCheck -+-> 消息路由绑定（无匹配前缀）
//!                           +-> LocalProxyCreate -> Proxied -> Closed
//!                           +-> 拒绝（NoRouteAvailable）
//! ```
//!
//! 有匹配前缀时，出向半朝前缀上的连接器发起；前缀没有连接器时朝最近的归属路由器的
//! 下一跳发起。attach 是乐观的：不等对端确认，对端拒绝时以 detach 回传。

use tracing::{debug, info, warn};

use super::address::{AddressKey, normalize};
use super::error::RouteError;
use super::forwarder::{ProxyLink, ProxyTarget};
use super::frame::{Attach, Detach, Flow, Frame};
use super::id::ConnId;
use super::link::{LinkDirection, LinkOwner};
use super::network::Network;
use super::registry::BindKind;
use super::router::Router;
use crate::sim::Simulator;

/// PatternCheck 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// 没有匹配的前缀：按消息路由处理
    MessageRouted,
    /// 建立代理链路，出向半在 `conn` 上
    Proxy { conn: ConnId, target: ProxyTarget },
    Refused(RouteError),
}

impl Router {
    /// 对 `address` 做 PatternCheck。`arrival` 是 attach 到达的连接。
    pub fn resolve(&self, arrival: ConnId, address: &str, direction: LinkDirection, net: &mut Network) -> Resolution {
        let Some(pattern) = self.patterns.lookup(address, direction) else {
            return Resolution::MessageRouted;
        };
        let found = match &pattern.connector {
            Some(name) => self
                .connectors
                .get(name)
                .copied()
                .filter(|c| net.is_up(*c))
                .map(|conn| (conn, ProxyTarget::Connector { name: name.clone() })),
            None => self.owner_next_hop(&pattern.prefix, net),
        };
        match found {
            // 出向半不能回到到达的连接上
            Some((conn, target)) if conn != arrival => Resolution::Proxy { conn, target },
            _ => Resolution::Refused(RouteError::NoRouteAvailable {
                address: address.to_string(),
            }),
        }
    }

    /// 最近的前缀归属路由器（跳数相同取 id 较小者）以及去往它的下一跳。
    fn owner_next_hop(&self, prefix: &str, net: &mut Network) -> Option<(ConnId, ProxyTarget)> {
        let entry = self.registry.get(&AddressKey::owner(prefix))?;
        let mut owners = entry.remote_origins();
        owners.sort_by_key(|(origin, hops)| (*hops, *origin));
        owners.into_iter().find_map(|(owner, _)| {
            net.next_hop_conn(self.id(), owner)
                .map(|conn| (conn, ProxyTarget::NextHop { owner }))
        })
    }

    #[tracing::instrument(skip(self, attach, sim, net), fields(router = %self.name, conn = %conn, link = %attach.name, address = %attach.address))]
    pub(crate) fn on_attach(&mut self, conn: ConnId, attach: Attach, sim: &mut Simulator, net: &mut Network) {
        if self.links.contains(conn, &attach.name) {
            warn!("链路名在此连接上已存在，忽略 attach");
            return;
        }
        let direction = LinkDirection::from_peer_role(attach.role);
        let address = normalize(&attach.address).to_string();
        match self.resolve(conn, &address, direction, net) {
            Resolution::MessageRouted => self.attach_message_routed(conn, &attach.name, direction, &address, sim, net),
            Resolution::Proxy { conn: target_conn, target } => {
                self.create_proxy(conn, &attach.name, direction, &address, target_conn, target, sim, net)
            }
            Resolution::Refused(e) => {
                warn!(error = %e, "拒绝 attach");
                net.stats.attaches_refused += 1;
                let detach = Detach {
                    link: attach.name,
                    error: Some(e.condition()),
                };
                self.send(conn, Frame::Detach(detach), sim, net);
            }
        }
    }

    fn attach_message_routed(
        &mut self,
        conn: ConnId,
        name: &str,
        direction: LinkDirection,
        address: &str,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let key = AddressKey::mobile(address);
        let id = self
            .links
            .insert(conn, name, direction, address, LinkOwner::MessageRouted(key.clone()));
        let egress = (direction == LinkDirection::Outgoing).then_some(id);
        self.bind_local(&key, egress, sim, net);
        debug!(key = %key, ?direction, "消息路由链路");

        if direction == LinkDirection::Incoming {
            let capacity = self.settings().link_capacity;
            let Some(link) = self.links.get_mut(id) else {
                return;
            };
            link.credit = capacity;
            let flow = Flow {
                link: link.name.clone(),
                state: link.flow_state(),
            };
            self.send(conn, Frame::Flow(flow), sim, net);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_proxy(
        &mut self,
        arrival: ConnId,
        name: &str,
        direction: LinkDirection,
        address: &str,
        target_conn: ConnId,
        target: ProxyTarget,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let pid = self.alloc_proxy_id();
        let key = AddressKey::link_routed(address);
        let outbound_dir = match direction {
            LinkDirection::Incoming => LinkDirection::Outgoing,
            LinkDirection::Outgoing => LinkDirection::Incoming,
        };
        let outbound_name = format!("{}.lr.{}", self.name, pid.0);
        let inbound = self
            .links
            .insert(arrival, name, direction, address, LinkOwner::Proxy(pid));
        let outbound = self
            .links
            .insert(target_conn, &outbound_name, outbound_dir, address, LinkOwner::Proxy(pid));
        self.registry.bind(&key, BindKind::LinkRouted, None);
        self.proxies
            .insert(pid, ProxyLink::new(pid, key, inbound, direction, outbound, target.clone()));

        info!(proxy = pid.0, outbound = %outbound_name, to = %target_conn, ?target, "🔀 创建代理链路");
        let attach = Attach {
            name: outbound_name,
            role: outbound_dir.local_role(),
            address: address.to_string(),
        };
        self.send(target_conn, Frame::Attach(attach), sim, net);
    }
}
