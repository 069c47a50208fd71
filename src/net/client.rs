//! 客户端
//!
//! 连接到某个路由器的 AMQP 端点（也用来扮演 broker 后面的应用）。
//! 接收方按 prefetch 持续补充信用，并自动接受未结算的投递；
//! 发送方在没有信用时把消息排队，收到 flow 后再发送。

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info, trace};

use super::error::ErrorCondition;
use super::frame::{Attach, Detach, Disposition, Flow, FlowState, Frame, Message, Outcome, Role, Transfer};
use super::id::{ClientId, ConnId, Endpoint};
use super::network::Network;
use super::node::Node;
use crate::sim::Simulator;

#[derive(Debug, Clone, Serialize)]
pub struct ClientLink {
    pub name: String,
    pub role: Role,
    pub address: String,
    pub delivery_count: u32,
    pub credit: u32,
    /// 接收方保持的信用窗口（0 表示不自动补充）
    pub prefetch: u32,
    pub received: Vec<Message>,
    /// 发送方收到的 (delivery id, 结果)
    pub outcomes: Vec<(u32, Outcome)>,
    pub detached: bool,
    pub error: Option<ErrorCondition>,
    #[serde(skip)]
    pending: VecDeque<(Message, bool)>,
}

impl ClientLink {
    pub fn bodies(&self) -> Vec<&str> {
        self.received.iter().map(|m| m.body.as_str()).collect()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug)]
pub struct Client {
    id: ClientId,
    name: String,
    conn: ConnId,
    links: BTreeMap<String, ClientLink>,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>, conn: ConnId) -> Self {
        Self {
            id,
            name: name.into(),
            conn,
            links: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }

    pub fn link(&self, name: &str) -> Option<&ClientLink> {
        self.links.get(name)
    }

    pub fn links(&self) -> impl Iterator<Item = &ClientLink> {
        self.links.values()
    }

    fn send_frame(&self, frame: Frame, sim: &mut Simulator, net: &mut Network) {
        net.send(Endpoint::Client(self.id), self.conn, frame, sim);
    }

    /// 发起 attach；接收方随即按 prefetch 授信。
    pub fn attach(&mut self, name: &str, role: Role, address: &str, prefetch: u32, sim: &mut Simulator, net: &mut Network) {
        info!(client = %self.name, link = name, ?role, address, "📎 attach");
        let link = ClientLink {
            name: name.to_string(),
            role,
            address: address.to_string(),
            delivery_count: 0,
            credit: 0,
            prefetch,
            received: Vec::new(),
            outcomes: Vec::new(),
            detached: false,
            error: None,
            pending: VecDeque::new(),
        };
        self.links.insert(name.to_string(), link);
        let attach = Attach {
            name: name.to_string(),
            role,
            address: address.to_string(),
        };
        self.send_frame(Frame::Attach(attach), sim, net);
        if role == Role::Receiver && prefetch > 0 {
            self.top_up(name, sim, net);
        }
    }

    /// 在发送链路上发送一条消息；没有信用时排队。
    pub fn send(&mut self, link: &str, message: Message, settled: bool, sim: &mut Simulator, net: &mut Network) {
        let Some(l) = self.links.get_mut(link) else {
            debug!(client = %self.name, link, "链路不存在，忽略发送");
            return;
        };
        if l.role != Role::Sender || l.detached {
            debug!(client = %self.name, link, "链路不可发送，忽略");
            return;
        }
        l.pending.push_back((message, settled));
        self.flush(link, sim, net);
    }

    pub fn detach(&mut self, link: &str, sim: &mut Simulator, net: &mut Network) {
        let Some(l) = self.links.get_mut(link) else {
            return;
        };
        if l.detached {
            return;
        }
        l.detached = true;
        info!(client = %self.name, link, "detach");
        let detach = Detach {
            link: link.to_string(),
            error: None,
        };
        self.send_frame(Frame::Detach(detach), sim, net);
    }

    fn flush(&mut self, link: &str, sim: &mut Simulator, net: &mut Network) {
        let Some(l) = self.links.get_mut(link) else {
            return;
        };
        let mut ready = Vec::new();
        while l.credit > 0 {
            let Some((message, settled)) = l.pending.pop_front() else {
                break;
            };
            let delivery_id = l.delivery_count;
            l.delivery_count = l.delivery_count.wrapping_add(1);
            l.credit -= 1;
            ready.push(Transfer {
                link: link.to_string(),
                delivery_id,
                settled,
                message,
            });
        }
        for t in ready {
            self.send_frame(Frame::Transfer(t), sim, net);
        }
    }

    /// 把接收链路的信用补到 prefetch
    fn top_up(&mut self, link: &str, sim: &mut Simulator, net: &mut Network) {
        let Some(l) = self.links.get_mut(link) else {
            return;
        };
        if l.detached || l.prefetch == 0 || l.credit > l.prefetch / 2 {
            return;
        }
        l.credit = l.prefetch;
        let flow = Flow {
            link: link.to_string(),
            state: FlowState {
                delivery_count: l.delivery_count,
                credit: l.credit,
            },
        };
        self.send_frame(Frame::Flow(flow), sim, net);
    }

    fn on_transfer(&mut self, t: Transfer, sim: &mut Simulator, net: &mut Network) {
        let Some(l) = self.links.get_mut(&t.link) else {
            return;
        };
        l.delivery_count = l.delivery_count.wrapping_add(1);
        l.credit = l.credit.saturating_sub(1);
        trace!(client = %self.name, link = %t.link, body = %t.message.body, "收到消息");
        l.received.push(t.message);
        if !t.settled {
            let accept = Disposition {
                link: t.link.clone(),
                delivery_id: t.delivery_id,
                outcome: Outcome::Accepted,
                settled: true,
            };
            self.send_frame(Frame::Disposition(accept), sim, net);
        }
        self.top_up(&t.link, sim, net);
    }
}

impl Node for Client {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_frame(&mut self, _conn: ConnId, frame: Frame, sim: &mut Simulator, net: &mut Network) {
        match frame {
            Frame::Transfer(t) => self.on_transfer(t, sim, net),
            Frame::Flow(f) => {
                let Some(l) = self.links.get_mut(&f.link) else {
                    return;
                };
                if l.role != Role::Sender {
                    return;
                }
                let limit = u64::from(f.state.delivery_count) + u64::from(f.state.credit);
                let available = limit.saturating_sub(u64::from(l.delivery_count));
                l.credit = u32::try_from(available).unwrap_or(u32::MAX);
                self.flush(&f.link, sim, net);
            }
            Frame::Disposition(d) => {
                if let Some(l) = self.links.get_mut(&d.link) {
                    l.outcomes.push((d.delivery_id, d.outcome));
                }
            }
            Frame::Detach(d) => {
                if let Some(l) = self.links.get_mut(&d.link) {
                    info!(client = %self.name, link = %d.link, error = ?d.error.map(ErrorCondition::as_str), "链路被路由器关闭");
                    l.detached = true;
                    l.error = d.error;
                }
            }
            other => trace!(client = %self.name, frame = other.kind(), "忽略"),
        }
    }

    fn on_connection_lost(&mut self, _conn: ConnId, _sim: &mut Simulator, _net: &mut Network) {
        for l in self.links.values_mut() {
            l.detached = true;
        }
    }
}
