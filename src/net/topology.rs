//! 拓扑传播
//!
//! 在 inter-router 连接（边）之间交换地址可达性：
//! - 建边时发送全量快照，对端按最小跳数合并；
//! - 新知识转发到除来源边以外的所有边，已知知识只记录额外支撑，从不回送来源边；
//! - origin 为自己的通告带递增序号，过期消息直接丢弃，这也保证了环路中的传播有界；
//! - 断边时，只经由该边支撑的条目立即删除，并向其余边发送 withdraw。
//!
//! 传播器本身不发送任何东西，只返回 `(连接, 控制消息)` 列表，由路由器交给网络层发送。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, trace};

use super::address::AddressKey;
use super::error::TopologyError;
use super::frame::{Advert, ControlMessage};
use super::id::{ConnId, RouterId};
use super::registry::{AddressRegistry, ViaRemoval};

/// 待发送的控制消息
pub type Outbound = (ConnId, ControlMessage);

/// 一条 inter-router 边以及经由它学到的 (地址, origin)
#[derive(Debug, Clone)]
pub struct TopologyEdge {
    pub local: RouterId,
    pub remote: RouterId,
    pub conn: ConnId,
    pub reachable: BTreeSet<(AddressKey, RouterId)>,
}

#[derive(Debug)]
pub struct TopologyPropagator {
    local: RouterId,
    seq: u64,
    edges: BTreeMap<ConnId, TopologyEdge>,
    /// 本路由器当前有效通告的序号
    local_seq: HashMap<AddressKey, u64>,
    /// origin 发起的撤销：序号不大于它的通告都已过期
    retracted: HashMap<(AddressKey, RouterId), u64>,
}

impl TopologyPropagator {
    pub fn new(local: RouterId) -> Self {
        Self {
            local,
            seq: 0,
            edges: BTreeMap::new(),
            local_seq: HashMap::new(),
            retracted: HashMap::new(),
        }
    }

    pub fn edges(&self) -> impl Iterator<Item = &TopologyEdge> {
        self.edges.values()
    }

    pub fn edge(&self, conn: ConnId) -> Option<&TopologyEdge> {
        self.edges.get(&conn)
    }

    pub fn has_edge(&self, conn: ConnId) -> bool {
        self.edges.contains_key(&conn)
    }

    /// 当前保留的撤销墓碑数
    pub fn tombstones(&self) -> usize {
        self.retracted.len()
    }

    /// 新边建立：记录边并向对端发送全量快照。
    pub fn edge_up(&mut self, conn: ConnId, remote: RouterId, registry: &AddressRegistry) -> Vec<Outbound> {
        self.edges.insert(
            conn,
            TopologyEdge {
                local: self.local,
                remote,
                conn,
                reachable: BTreeSet::new(),
            },
        );

        let mut adverts: Vec<Advert> = registry
            .local_keys()
            .map(|key| Advert {
                key: key.clone(),
                origin: self.local,
                seq: self.local_seq.get(key).copied().unwrap_or(0),
                hops: 0,
            })
            .collect();
        adverts.extend(
            registry
                .remote_entries()
                .into_iter()
                .filter(|(_, origin, _, _)| *origin != remote)
                .map(|(key, origin, seq, hops)| Advert {
                    key,
                    origin,
                    seq,
                    hops,
                }),
        );
        debug!(conn = %conn, remote = %remote, adverts = adverts.len(), "🔗 边建立，发送快照");
        vec![(conn, ControlMessage::Snapshot(adverts))]
    }

    /// 边断开：只由该边支撑的条目立即删除并向其余边 withdraw。
    pub fn edge_down(&mut self, conn: ConnId, registry: &mut AddressRegistry) -> Vec<Outbound> {
        let Some(edge) = self.edges.remove(&conn) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (key, origin) in edge.reachable {
            if registry.remove_remote_via(&key, origin, conn) == ViaRemoval::Emptied {
                trace!(key = %key, origin = %origin, "唯一支撑边断开，删除条目");
                self.broadcast(
                    Some(conn),
                    ControlMessage::Withdraw {
                        key: key.clone(),
                        origin,
                    },
                    &mut out,
                );
            }
        }
        debug!(conn = %conn, remote = %edge.remote, withdrawals = out.len(), "✂️ 边断开");
        out
    }

    /// 为本地地址分配新的通告序号，不发送任何东西。
    pub fn assign_local_seq(&mut self, key: &AddressKey) -> u64 {
        self.seq += 1;
        self.local_seq.insert(key.clone(), self.seq);
        self.seq
    }

    /// 本路由器成为地址的目的地：向所有边通告。
    pub fn local_added(&mut self, key: &AddressKey) -> Vec<Outbound> {
        let seq = self.assign_local_seq(key);
        let mut out = Vec::new();
        self.broadcast(
            None,
            ControlMessage::Add(Advert {
                key: key.clone(),
                origin: self.local,
                seq,
                hops: 0,
            }),
            &mut out,
        );
        out
    }

    /// 本路由器不再是地址的目的地：向所有边撤销。
    pub fn local_removed(&mut self, key: &AddressKey) -> Vec<Outbound> {
        self.seq += 1;
        self.local_seq.remove(key);
        let mut out = Vec::new();
        self.broadcast(
            None,
            ControlMessage::Retract {
                key: key.clone(),
                origin: self.local,
                seq: self.seq,
            },
            &mut out,
        );
        out
    }

    /// 处理来自 `conn` 的控制消息。
    pub fn on_control(
        &mut self,
        conn: ConnId,
        msg: ControlMessage,
        registry: &mut AddressRegistry,
    ) -> Result<Vec<Outbound>, TopologyError> {
        let mut out = Vec::new();
        match msg {
            ControlMessage::Snapshot(adverts) => {
                for advert in adverts {
                    self.learn(conn, advert, registry, &mut out);
                }
            }
            ControlMessage::Add(advert) => self.learn(conn, advert, registry, &mut out),
            ControlMessage::Retract { key, origin, seq } => {
                self.retract(conn, key, origin, seq, registry, &mut out)?
            }
            ControlMessage::Withdraw { key, origin } => {
                self.withdraw(conn, key, origin, registry, &mut out)
            }
        }
        Ok(out)
    }

    /// 清除 origin 已不可达（按路由服务判断）的条目，返回受影响的地址键。
    pub fn purge_unreachable(
        &mut self,
        reachable: impl Fn(RouterId) -> bool,
        registry: &mut AddressRegistry,
    ) -> Vec<AddressKey> {
        let mut purged = Vec::new();
        for origin in registry.origins() {
            if reachable(origin) {
                continue;
            }
            let keys = registry.purge_origin(origin);
            for edge in self.edges.values_mut() {
                edge.reachable.retain(|(_, o)| *o != origin);
            }
            debug!(origin = %origin, keys = keys.len(), "origin 不可达，清除条目");
            purged.extend(keys);
        }
        self.retracted.retain(|(_, origin), _| reachable(*origin));
        purged
    }

    fn learn(&mut self, conn: ConnId, advert: Advert, registry: &mut AddressRegistry, out: &mut Vec<Outbound>) {
        let Advert {
            key,
            origin,
            seq,
            hops,
        } = advert;
        if origin == self.local {
            return;
        }
        if self
            .retracted
            .get(&(key.clone(), origin))
            .is_some_and(|t| seq <= *t)
        {
            trace!(key = %key, origin = %origin, seq, "通告已被撤销，忽略");
            return;
        }
        let known = registry.remote_support(&key, origin).map(|s| s.seq);
        if known.is_some_and(|k| seq < k) {
            trace!(key = %key, origin = %origin, seq, "过期通告，忽略");
            return;
        }
        let fresh = known.is_none_or(|k| seq > k);
        // 更新的通告取代墓碑：之后的旧通告由已知序号拦下
        self.retracted.remove(&(key.clone(), origin));
        let hops = hops.saturating_add(1);
        registry.add_remote(&key, origin, seq, conn, hops);
        if let Some(edge) = self.edges.get_mut(&conn) {
            edge.reachable.insert((key.clone(), origin));
        }
        if fresh {
            trace!(key = %key, origin = %origin, seq, hops, "新知识，转发");
            self.broadcast(
                Some(conn),
                ControlMessage::Add(Advert {
                    key,
                    origin,
                    seq,
                    hops,
                }),
                out,
            );
        }
    }

    fn retract(
        &mut self,
        conn: ConnId,
        key: AddressKey,
        origin: RouterId,
        seq: u64,
        registry: &mut AddressRegistry,
        out: &mut Vec<Outbound>,
    ) -> Result<(), TopologyError> {
        if origin == self.local {
            return Ok(());
        }
        let tomb = self.retracted.get(&(key.clone(), origin)).copied();
        let known = registry.remote_support(&key, origin).map(|s| s.seq);
        if known.is_none() && tomb.is_none() {
            return Err(TopologyError::Inconsistency { key, origin });
        }
        if tomb.is_some_and(|t| seq <= t) || known.is_some_and(|k| seq < k) {
            trace!(key = %key, origin = %origin, seq, "重复撤销，忽略");
            return Ok(());
        }

        self.retracted.insert((key.clone(), origin), seq);
        registry.remove_remote(&key, origin);
        for edge in self.edges.values_mut() {
            edge.reachable.remove(&(key.clone(), origin));
        }
        self.broadcast(Some(conn), ControlMessage::Retract { key, origin, seq }, out);
        Ok(())
    }

    fn withdraw(
        &mut self,
        conn: ConnId,
        key: AddressKey,
        origin: RouterId,
        registry: &mut AddressRegistry,
        out: &mut Vec<Outbound>,
    ) {
        if let Some(edge) = self.edges.get_mut(&conn) {
            edge.reachable.remove(&(key.clone(), origin));
        }
        if registry.remove_remote_via(&key, origin, conn) == ViaRemoval::Emptied {
            self.broadcast(Some(conn), ControlMessage::Withdraw { key, origin }, out);
            return;
        }
        // 对端已失去该条目，而我们仍经由别的边可达：把它重新告诉对端
        if let Some(support) = registry.remote_support(&key, origin) {
            let advert = Advert {
                key,
                origin,
                seq: support.seq,
                hops: support.hops().unwrap_or(0),
            };
            out.push((conn, ControlMessage::Add(advert)));
        }
    }

    fn broadcast(&self, except: Option<ConnId>, msg: ControlMessage, out: &mut Vec<Outbound>) {
        for conn in self.edges.keys().copied().filter(|c| Some(*c) != except) {
            out.push((conn, msg.clone()));
        }
    }
}
