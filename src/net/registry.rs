//! 地址注册表
//!
//! 每个路由器一份：地址键 -> 可达性（本地绑定 / 链路路由 / 远端可达）、引用计数与投递计数。
//! 引用计数是链路级的（活动链路或代理链路数），投递计数是投递级的，两者互不影响。

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::address::{AddressClass, AddressKey};
use super::id::{ConnId, LinkId, RouterId};

/// 绑定种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindKind {
    /// 本地终结（消息路由，或本路由器拥有的链路路由前缀）
    Local,
    /// 本跳只是代理
    LinkRouted,
}

/// 对外可见的可达性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reachability {
    Local,
    LinkRouted,
    Remote { hops: u32 },
    Unreachable,
}

/// 某个 origin 对地址的支撑：经由哪些 inter-router 连接、各自跳数
#[derive(Debug, Clone, Default)]
pub struct RemoteSupport {
    pub seq: u64,
    pub via: BTreeMap<ConnId, u32>,
}

impl RemoteSupport {
    pub fn hops(&self) -> Option<u32> {
        self.via.values().copied().min()
    }
}

/// 移除一条边的支撑后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViaRemoval {
    NotPresent,
    StillSupported,
    Emptied,
}

#[derive(Debug, Clone)]
pub struct AddressEntry {
    pub key: AddressKey,
    pub kind: BindKind,
    pub ref_count: u32,
    /// 绑定在该地址上的本地出向链路（LinkId 即创建顺序）
    pub egress_links: BTreeSet<LinkId>,
    pub remote: BTreeMap<RouterId, RemoteSupport>,
    pub deliveries_ingress: u64,
    pub deliveries_egress: u64,
    pub deliveries_transit: u64,
}

impl AddressEntry {
    fn new(key: AddressKey, kind: BindKind) -> Self {
        Self {
            key,
            kind,
            ref_count: 0,
            egress_links: BTreeSet::new(),
            remote: BTreeMap::new(),
            deliveries_ingress: 0,
            deliveries_egress: 0,
            deliveries_transit: 0,
        }
    }

    pub fn reachability(&self) -> Reachability {
        if self.ref_count > 0 {
            return match self.kind {
                BindKind::Local => Reachability::Local,
                BindKind::LinkRouted => Reachability::LinkRouted,
            };
        }
        match self.remote.values().filter_map(RemoteSupport::hops).min() {
            Some(hops) => Reachability::Remote { hops },
            None => Reachability::Unreachable,
        }
    }

    /// (origin, 最小跳数)，按 origin 排序
    pub fn remote_origins(&self) -> Vec<(RouterId, u32)> {
        self.remote
            .iter()
            .filter_map(|(origin, s)| s.hops().map(|h| (*origin, h)))
            .collect()
    }

    /// 本路由器是否是该地址的目的地：有本地接收者，或拥有该链路路由前缀。
    /// 只有发送者的消息路由地址虽被绑定，但不对外通告。
    pub fn is_destination(&self) -> bool {
        self.ref_count > 0
            && self.kind == BindKind::Local
            && (self.key.class() == AddressClass::LinkRouteOwner || !self.egress_links.is_empty())
    }

    fn is_dead(&self) -> bool {
        self.ref_count == 0 && self.remote.is_empty()
    }
}

/// 本路由器作为目的地的变化，决定是否需要通告或撤销
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationChange {
    Unchanged,
    Became,
    Ceased,
}

impl DestinationChange {
    fn between(before: bool, after: bool) -> Self {
        match (before, after) {
            (false, true) => Self::Became,
            (true, false) => Self::Ceased,
            _ => Self::Unchanged,
        }
    }
}

/// bind/unbind 引起的状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub reachability: Reachability,
    /// 引用计数是否跨越了 0（0->1 或 1->0）
    pub crossed_zero: bool,
    pub destination: DestinationChange,
}

#[derive(Debug, Default, Clone)]
pub struct AddressRegistry {
    entries: BTreeMap<AddressKey, AddressEntry>,
}

impl AddressRegistry {
    /// 增加引用；条目不存在时创建。
    pub fn bind(&mut self, key: &AddressKey, kind: BindKind, egress: Option<LinkId>) -> Transition {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| AddressEntry::new(key.clone(), kind));
        let before = entry.is_destination();
        if entry.ref_count == 0 {
            entry.kind = kind;
        }
        entry.ref_count += 1;
        if let Some(link) = egress {
            entry.egress_links.insert(link);
        }
        Transition {
            reachability: entry.reachability(),
            crossed_zero: entry.ref_count == 1,
            destination: DestinationChange::between(before, entry.is_destination()),
        }
    }

    /// 减少引用；计数归零且没有远端支撑时删除条目。
    pub fn unbind(&mut self, key: &AddressKey, egress: Option<LinkId>) -> Transition {
        let Some(entry) = self.entries.get_mut(key) else {
            return Transition {
                reachability: Reachability::Unreachable,
                crossed_zero: false,
                destination: DestinationChange::Unchanged,
            };
        };
        let before = entry.is_destination();
        if let Some(link) = egress {
            entry.egress_links.remove(&link);
        }
        let crossed_zero = entry.ref_count == 1;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        let reachability = entry.reachability();
        let destination = DestinationChange::between(before, entry.is_destination());
        self.collect(key);
        Transition {
            reachability,
            crossed_zero,
            destination,
        }
    }

    pub fn lookup(&self, key: &AddressKey) -> Reachability {
        self.entries
            .get(key)
            .map_or(Reachability::Unreachable, AddressEntry::reachability)
    }

    pub fn get(&self, key: &AddressKey) -> Option<&AddressEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AddressEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_ingress(&mut self, key: &AddressKey) {
        if let Some(e) = self.entries.get_mut(key) {
            e.deliveries_ingress += 1;
        }
    }

    pub fn record_egress(&mut self, key: &AddressKey) {
        if let Some(e) = self.entries.get_mut(key) {
            e.deliveries_egress += 1;
        }
    }

    pub fn record_transit(&mut self, key: &AddressKey) {
        if let Some(e) = self.entries.get_mut(key) {
            e.deliveries_transit += 1;
        }
    }

    /// 以本路由器为目的地的地址（有接收者的消息路由地址与链路路由归属），即快照内容
    pub fn local_keys(&self) -> impl Iterator<Item = &AddressKey> {
        self.entries
            .values()
            .filter(|e| e.is_destination())
            .map(|e| &e.key)
    }

    /// 所有远端条目：(key, origin, seq, 最小跳数)
    pub fn remote_entries(&self) -> Vec<(AddressKey, RouterId, u64, u32)> {
        self.entries
            .values()
            .flat_map(|e| {
                e.remote.iter().filter_map(|(origin, s)| {
                    s.hops().map(|h| (e.key.clone(), *origin, s.seq, h))
                })
            })
            .collect()
    }

    pub fn remote_support(&self, key: &AddressKey, origin: RouterId) -> Option<&RemoteSupport> {
        self.entries.get(key).and_then(|e| e.remote.get(&origin))
    }

    /// 记录 origin 经由 `conn` 的支撑。返回该 (key, origin) 是否是新知识。
    pub fn add_remote(
        &mut self,
        key: &AddressKey,
        origin: RouterId,
        seq: u64,
        conn: ConnId,
        hops: u32,
    ) -> bool {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| AddressEntry::new(key.clone(), BindKind::Local));
        let support = entry.remote.entry(origin).or_default();
        let is_new = support.via.is_empty();
        support.seq = support.seq.max(seq);
        support.via.insert(conn, hops);
        is_new
    }

    /// 删除 origin 对 key 的全部支撑，返回此前是否存在。
    pub fn remove_remote(&mut self, key: &AddressKey, origin: RouterId) -> bool {
        let removed = self
            .entries
            .get_mut(key)
            .is_some_and(|e| e.remote.remove(&origin).is_some());
        self.collect(key);
        removed
    }

    /// 只删除经由 `conn` 的那一份支撑。
    pub fn remove_remote_via(&mut self, key: &AddressKey, origin: RouterId, conn: ConnId) -> ViaRemoval {
        let Some(entry) = self.entries.get_mut(key) else {
            return ViaRemoval::NotPresent;
        };
        let Some(support) = entry.remote.get_mut(&origin) else {
            return ViaRemoval::NotPresent;
        };
        if support.via.remove(&conn).is_none() {
            return ViaRemoval::NotPresent;
        }
        let result = if support.via.is_empty() {
            entry.remote.remove(&origin);
            ViaRemoval::Emptied
        } else {
            ViaRemoval::StillSupported
        };
        self.collect(key);
        result
    }

    /// 删除某个 origin 的全部条目，返回受影响的地址键。
    pub fn purge_origin(&mut self, origin: RouterId) -> Vec<AddressKey> {
        let keys: Vec<AddressKey> = self
            .entries
            .values()
            .filter(|e| e.remote.contains_key(&origin))
            .map(|e| e.key.clone())
            .collect();
        for key in &keys {
            self.remove_remote(key, origin);
        }
        keys
    }

    /// 当前出现在远端条目中的所有 origin
    pub fn origins(&self) -> BTreeSet<RouterId> {
        self.entries
            .values()
            .flat_map(|e| e.remote.keys().copied())
            .collect()
    }

    fn collect(&mut self, key: &AddressKey) {
        if self.entries.get(key).is_some_and(AddressEntry::is_dead) {
            self.entries.remove(key);
        }
    }
}
