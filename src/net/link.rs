//! 链路表
//!
//! 路由器上每条已 attach 的链路：所在连接、方向、地址、信用状态，以及它归属于
//! 消息路由地址还是某个代理链路。

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

use super::address::AddressKey;
use super::frame::{FlowState, Message, Role};
use super::id::{ConnId, LinkId, ProxyId};

/// 从路由器视角看的链路方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LinkDirection {
    /// 路由器在此链路上接收投递
    #[serde(rename = "in")]
    Incoming,
    /// 路由器在此链路上发送投递
    #[serde(rename = "out")]
    Outgoing,
}

impl LinkDirection {
    /// 对端以 `role` 发起 attach 时本端链路的方向
    pub fn from_peer_role(role: Role) -> Self {
        match role {
            Role::Sender => LinkDirection::Incoming,
            Role::Receiver => LinkDirection::Outgoing,
        }
    }

    /// 本端在链路上的角色
    pub fn local_role(self) -> Role {
        match self {
            LinkDirection::Incoming => Role::Receiver,
            LinkDirection::Outgoing => Role::Sender,
        }
    }
}

/// 链路归属
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOwner {
    MessageRouted(AddressKey),
    Proxy(ProxyId),
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: LinkId,
    pub name: String,
    pub conn: ConnId,
    pub direction: LinkDirection,
    pub address: String,
    pub owner: LinkOwner,
    /// 已在此链路上传输的投递数
    pub delivery_count: u32,
    /// 出向：对端给予的剩余信用；入向：本端已授予且尚未用掉的信用
    pub credit: u32,
    /// 消息路由的出向链路在无信用时暂存的消息
    pub pending: VecDeque<Message>,
}

impl Link {
    /// 出向链路收到对端 flow 后重新计算可用信用。
    pub fn apply_flow(&mut self, flow: FlowState) {
        let limit = u64::from(flow.delivery_count) + u64::from(flow.credit);
        let available = limit.saturating_sub(u64::from(self.delivery_count));
        self.credit = u32::try_from(available).unwrap_or(u32::MAX);
    }

    /// 入向链路当前应告知对端的 flow 状态
    pub fn flow_state(&self) -> FlowState {
        FlowState {
            delivery_count: self.delivery_count,
            credit: self.credit,
        }
    }

    /// 记录一次投递：消耗一份信用并返回该投递在本链路上的编号。
    pub fn consume(&mut self) -> u32 {
        let id = self.delivery_count;
        self.delivery_count = self.delivery_count.wrapping_add(1);
        self.credit = self.credit.saturating_sub(1);
        id
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.owner, LinkOwner::Proxy(_))
    }
}

#[derive(Debug, Default)]
pub struct LinkTable {
    next_id: u64,
    links: BTreeMap<LinkId, Link>,
    by_name: HashMap<(ConnId, String), LinkId>,
}

impl LinkTable {
    pub fn insert(
        &mut self,
        conn: ConnId,
        name: &str,
        direction: LinkDirection,
        address: &str,
        owner: LinkOwner,
    ) -> LinkId {
        let id = LinkId(self.next_id);
        self.next_id += 1;
        self.links.insert(
            id,
            Link {
                id,
                name: name.to_string(),
                conn,
                direction,
                address: address.to_string(),
                owner,
                delivery_count: 0,
                credit: 0,
                pending: VecDeque::new(),
            },
        );
        self.by_name.insert((conn, name.to_string()), id);
        id
    }

    pub fn find(&self, conn: ConnId, name: &str) -> Option<LinkId> {
        self.by_name.get(&(conn, name.to_string())).copied()
    }

    pub fn contains(&self, conn: ConnId, name: &str) -> bool {
        self.find(conn, name).is_some()
    }

    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn get_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(&id)
    }

    pub fn remove(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        self.by_name.remove(&(link.conn, link.name.clone()));
        Some(link)
    }

    /// 某条连接上的全部链路（按创建顺序）
    pub fn on_conn(&self, conn: ConnId) -> Vec<LinkId> {
        self.links
            .values()
            .filter(|l| l.conn == conn)
            .map(|l| l.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
