//! 管理视图
//!
//! 只读的地址与链路记录，供测试和命令行输出使用。

use serde::Serialize;

use super::address::AddressKey;
use super::forwarder::ProxyTarget;
use super::link::LinkDirection;
use super::registry::{AddressEntry, Reachability};
use super::router::Router;

/// 地址记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRecord {
    pub key: AddressKey,
    pub reachability: Reachability,
    pub ref_count: u32,
    pub deliveries_ingress: u64,
    pub deliveries_egress: u64,
    pub deliveries_transit: u64,
    /// (origin 路由器 id, 最小跳数)
    pub remote_origins: Vec<(usize, u32)>,
}

impl From<&AddressEntry> for AddressRecord {
    fn from(e: &AddressEntry) -> Self {
        Self {
            key: e.key.clone(),
            reachability: e.reachability(),
            ref_count: e.ref_count,
            deliveries_ingress: e.deliveries_ingress,
            deliveries_egress: e.deliveries_egress,
            deliveries_transit: e.deliveries_transit,
            remote_origins: e
                .remote_origins()
                .into_iter()
                .map(|(origin, hops)| (origin.0, hops))
                .collect(),
        }
    }
}

/// 链路记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub name: String,
    pub direction: LinkDirection,
    pub address: String,
    pub connection: usize,
    /// 是否是代理链路的一半
    pub proxied: bool,
    /// 链路所在连接对应的本地连接器
    pub peer_connector: Option<String>,
    pub delivery_count: u32,
    pub credit: u32,
}

/// 代理链路记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRecord {
    pub id: u64,
    pub key: AddressKey,
    pub inbound: String,
    pub outbound: String,
    pub target: ProxyTarget,
    pub unsettled: usize,
}

impl Router {
    /// 按地址键读取，例如 `M0org.apache.dev`、`Dorg.apache`、`Corg.apache`。
    pub fn read_address(&self, key: &str) -> Option<AddressRecord> {
        let key = AddressKey::parse(key)?;
        self.registry.get(&key).map(AddressRecord::from)
    }

    pub fn address_records(&self) -> Vec<AddressRecord> {
        self.registry.entries().map(AddressRecord::from).collect()
    }

    pub fn link_records(&self) -> Vec<LinkRecord> {
        self.links
            .iter()
            .map(|l| LinkRecord {
                name: l.name.clone(),
                direction: l.direction,
                address: l.address.clone(),
                connection: l.conn.0,
                proxied: l.is_proxy(),
                peer_connector: self.connector_name(l.conn).map(str::to_string),
                delivery_count: l.delivery_count,
                credit: l.credit,
            })
            .collect()
    }

    /// 按名称查找链路记录
    pub fn find_link_record(&self, name: &str) -> Option<LinkRecord> {
        self.link_records().into_iter().find(|l| l.name == name)
    }

    pub fn proxy_records(&self) -> Vec<ProxyRecord> {
        let link_name = |id| self.links.get(id).map(|l| l.name.clone()).unwrap_or_default();
        self.proxies
            .values()
            .map(|p| ProxyRecord {
                id: p.id.0,
                key: p.key.clone(),
                inbound: link_name(p.inbound),
                outbound: link_name(p.outbound),
                target: p.target.clone(),
                unsettled: p.unsettled(),
            })
            .collect()
    }
}
