//! 代理链路转发
//!
//! 一条代理链路由两半组成：入向半（attach 到达的连接）和出向半（本路由器朝连接器或
//! 下一跳发起的 attach）。投递从 source 半流向 sink 半，信用从 sink 半回流到 source 半：
//! source 半的授信 = min(sink 半剩余信用, max_in_flight)，只在变化时重发。
//! disposition 通过双向 delivery-id 映射在两半之间转发。

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::address::AddressKey;
use super::error::ErrorCondition;
use super::frame::{Detach, Disposition, Flow, Frame, Outcome, Transfer};
use super::id::{LinkId, ProxyId, RouterId};
use super::link::LinkDirection;
use super::network::Network;
use super::router::Router;
use crate::sim::Simulator;

/// 出向半的去处
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyTarget {
    /// 本地具名连接器（例如 broker）
    Connector { name: String },
    /// 朝前缀归属路由器方向的下一跳
    NextHop { owner: RouterId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyState {
    Proxied,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ProxyLink {
    pub id: ProxyId,
    /// `D` 类地址键
    pub key: AddressKey,
    pub inbound: LinkId,
    pub outbound: LinkId,
    pub target: ProxyTarget,
    pub state: ProxyState,
    /// 投递到达的一半
    source: LinkId,
    /// 投递发出的一半
    sink: LinkId,
    /// sink 上的 delivery id -> source 上的 delivery id（未结算的投递）
    sink_to_source: HashMap<u32, u32>,
    source_to_sink: HashMap<u32, u32>,
}

impl ProxyLink {
    /// `inbound_dir` 是入向半在本路由器上的方向。
    pub fn new(
        id: ProxyId,
        key: AddressKey,
        inbound: LinkId,
        inbound_dir: LinkDirection,
        outbound: LinkId,
        target: ProxyTarget,
    ) -> Self {
        let (source, sink) = match inbound_dir {
            LinkDirection::Incoming => (inbound, outbound),
            LinkDirection::Outgoing => (outbound, inbound),
        };
        Self {
            id,
            key,
            inbound,
            outbound,
            target,
            state: ProxyState::Proxied,
            source,
            sink,
            sink_to_source: HashMap::new(),
            source_to_sink: HashMap::new(),
        }
    }

    pub fn source(&self) -> LinkId {
        self.source
    }

    pub fn sink(&self) -> LinkId {
        self.sink
    }

    /// 另一半
    pub fn other(&self, half: LinkId) -> LinkId {
        if half == self.inbound { self.outbound } else { self.inbound }
    }

    /// 尚未结算的投递数
    pub fn unsettled(&self) -> usize {
        self.sink_to_source.len()
    }
}

impl Router {
    /// source 半到达的投递：有信用则转发到 sink 半，否则按结算模式释放或拆除。
    pub(crate) fn proxy_transfer(&mut self, pid: ProxyId, half: LinkId, t: Transfer, sim: &mut Simulator, net: &mut Network) {
        let Some(proxy) = self.proxies.get(&pid) else {
            return;
        };
        let (source, sink, key) = (proxy.source, proxy.sink, proxy.key.clone());
        if half != source {
            warn!(proxy = pid.0, link = %t.link, "对端在 sink 半上发送投递，忽略");
            return;
        }
        let sink_credit = self.links.get(sink).map_or(0, |l| l.credit);
        let Some(src) = self.links.get_mut(source) else {
            return;
        };
        let src_credit = src.credit;
        src.consume();
        let (src_name, src_conn) = (src.name.clone(), src.conn);

        if src_credit == 0 || sink_credit == 0 {
            if t.settled {
                warn!(proxy = pid.0, "预结算投递超出信用，拆除代理链路");
                self.teardown_proxy(pid, None, Some(ErrorCondition::TransferLimitExceeded), sim, net);
            } else {
                debug!(proxy = pid.0, delivery = t.delivery_id, "无信用，释放投递");
                net.stats.deliveries_released += 1;
                let released = Disposition {
                    link: src_name,
                    delivery_id: t.delivery_id,
                    outcome: Outcome::Released,
                    settled: true,
                };
                self.send(src_conn, Frame::Disposition(released), sim, net);
            }
            return;
        }

        let Some(snk) = self.links.get_mut(sink) else {
            return;
        };
        let sink_id = snk.consume();
        let (snk_name, snk_conn) = (snk.name.clone(), snk.conn);
        self.registry.record_ingress(&key);
        self.registry.record_egress(&key);
        if !t.settled {
            if let Some(proxy) = self.proxies.get_mut(&pid) {
                proxy.sink_to_source.insert(sink_id, t.delivery_id);
                proxy.source_to_sink.insert(t.delivery_id, sink_id);
            }
        }
        trace!(proxy = pid.0, from = t.delivery_id, to = sink_id, "转发投递");
        let forwarded = Transfer {
            link: snk_name,
            delivery_id: sink_id,
            settled: t.settled,
            message: t.message,
        };
        self.send(snk_conn, Frame::Transfer(forwarded), sim, net);
        self.regrant(pid, sim, net);
    }

    /// sink 半的 flow 更新可用信用，再把窗口传递给 source 半。
    pub(crate) fn proxy_flow(&mut self, pid: ProxyId, half: LinkId, f: Flow, sim: &mut Simulator, net: &mut Network) {
        let Some(proxy) = self.proxies.get(&pid) else {
            return;
        };
        if half != proxy.sink {
            // source 半上的 flow 只是对端告知自己的投递计数
            trace!(proxy = pid.0, "忽略 source 半上的 flow");
            return;
        }
        if let Some(link) = self.links.get_mut(half) {
            link.apply_flow(f.state);
        }
        self.regrant(pid, sim, net);
    }

    /// 按 delivery-id 映射把结算结果转发到另一半。
    pub(crate) fn proxy_disposition(
        &mut self,
        pid: ProxyId,
        half: LinkId,
        d: Disposition,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(proxy) = self.proxies.get_mut(&pid) else {
            return;
        };
        let (mapped, other) = if half == proxy.sink {
            let mapped = proxy.sink_to_source.get(&d.delivery_id).copied();
            if d.settled {
                if let Some(src_id) = mapped {
                    proxy.sink_to_source.remove(&d.delivery_id);
                    proxy.source_to_sink.remove(&src_id);
                }
            }
            (mapped, proxy.source)
        } else {
            let mapped = proxy.source_to_sink.get(&d.delivery_id).copied();
            if d.settled {
                if let Some(sink_id) = mapped {
                    proxy.source_to_sink.remove(&d.delivery_id);
                    proxy.sink_to_source.remove(&sink_id);
                }
            }
            (mapped, proxy.sink)
        };
        let Some(delivery_id) = mapped else {
            trace!(proxy = pid.0, delivery = d.delivery_id, "未知投递的 disposition，忽略");
            return;
        };
        let Some(link) = self.links.get(other) else {
            return;
        };
        let relayed = Disposition {
            link: link.name.clone(),
            delivery_id,
            outcome: d.outcome,
            settled: d.settled,
        };
        let conn = link.conn;
        self.send(conn, Frame::Disposition(relayed), sim, net);
    }

    /// 重新计算 source 半的授信，变化时告知上游。
    fn regrant(&mut self, pid: ProxyId, sim: &mut Simulator, net: &mut Network) {
        let Some(proxy) = self.proxies.get(&pid) else {
            return;
        };
        let (source, sink) = (proxy.source, proxy.sink);
        let window = self.settings().max_in_flight;
        let target = self.links.get(sink).map_or(0, |l| l.credit.min(window));
        let Some(src) = self.links.get_mut(source) else {
            return;
        };
        if src.credit == target {
            return;
        }
        src.credit = target;
        let flow = Flow {
            link: src.name.clone(),
            state: src.flow_state(),
        };
        let conn = src.conn;
        trace!(proxy = pid.0, credit = target, "更新上游授信");
        self.send(conn, Frame::Flow(flow), sim, net);
    }

    /// 拆除代理链路。
    ///
    /// `closed` 为已由对端关闭（或随连接丢失）的一半，只向另一半发送 detach；
    /// 为 `None` 时两半都发送。
    pub(crate) fn teardown_proxy(
        &mut self,
        pid: ProxyId,
        closed: Option<LinkId>,
        error: Option<ErrorCondition>,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(mut proxy) = self.proxies.remove(&pid) else {
            return;
        };
        proxy.state = ProxyState::Closed;
        for half in [proxy.inbound, proxy.outbound] {
            let Some(link) = self.links.remove(half) else {
                continue;
            };
            if Some(half) == closed || !net.is_up(link.conn) {
                continue;
            }
            let detach = Detach {
                link: link.name,
                error,
            };
            self.send(link.conn, Frame::Detach(detach), sim, net);
        }
        self.registry.unbind(&proxy.key, None);
        info!(
            proxy = pid.0,
            key = %proxy.key,
            unsettled = proxy.unsettled(),
            error = ?error.map(ErrorCondition::as_str),
            "🔌 代理链路拆除"
        );
    }
}
