//! 最短路径下一跳
//!
//! 为每个 (from, dst) 路由器对预计算所有等价最短路径的下一跳集合（按跳数）。
//! 引擎只消费 `next_hop`：在等价候选中取 id 最小者，保证结果可复现。

use std::collections::{HashMap, VecDeque};

use super::id::RouterId;

#[derive(Debug, Clone)]
pub struct RoutingTable {
    dirty: bool,
    /// (from, dst) -> 多个等价最短路径下一跳（升序）
    next_hops: HashMap<(RouterId, RouterId), Vec<RouterId>>,
    /// (from, dst) -> 跳数
    distance: HashMap<(RouterId, RouterId), u32>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            dirty: true,
            next_hops: HashMap::new(),
            distance: HashMap::new(),
        }
    }
}

impl RoutingTable {
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 确保路由表基于当前拓扑是最新的。
    ///
    /// `adj[from]` 为 `from` 经由已建立的 inter-router 连接直接相邻的路由器。
    pub fn ensure_built(&mut self, adj: &[Vec<RouterId>]) {
        if !self.dirty {
            return;
        }

        let n = adj.len();
        self.next_hops.clear();
        self.distance.clear();

        // inter-router 连接是双向的，反向图即原图。
        // 对每个 dst 做 BFS 得到 dist[*]，再为每个 from 选出 dist[next] = dist[from] - 1 的邻居。
        let mut dist: Vec<u32> = vec![u32::MAX; n];
        let mut q: VecDeque<RouterId> = VecDeque::new();

        for dst_idx in 0..n {
            dist.fill(u32::MAX);
            q.clear();

            let dst = RouterId(dst_idx);
            dist[dst_idx] = 0;
            q.push_back(dst);

            while let Some(v) = q.pop_front() {
                let dv = dist[v.0];
                for &nbr in &adj[v.0] {
                    if dist[nbr.0] == u32::MAX {
                        dist[nbr.0] = dv.saturating_add(1);
                        q.push_back(nbr);
                    }
                }
            }

            for from_idx in 0..n {
                let from = RouterId(from_idx);
                let df = dist[from_idx];
                if from == dst || df == u32::MAX {
                    continue;
                }
                let mut cands: Vec<RouterId> = adj[from_idx]
                    .iter()
                    .copied()
                    .filter(|nh| dist[nh.0] == df - 1)
                    .collect();
                cands.sort();
                cands.dedup();
                if !cands.is_empty() {
                    self.next_hops.insert((from, dst), cands);
                    self.distance.insert((from, dst), df);
                }
            }
        }

        self.dirty = false;
    }

    /// (from, dst) 的等价下一跳候选集合
    pub fn next_hops(&self, from: RouterId, dst: RouterId) -> Option<&[RouterId]> {
        self.next_hops.get(&(from, dst)).map(|v| v.as_slice())
    }

    /// 确定性的单一下一跳
    pub fn next_hop(&self, from: RouterId, dst: RouterId) -> Option<RouterId> {
        self.next_hops(from, dst).and_then(|c| c.first().copied())
    }

    pub fn distance(&self, from: RouterId, dst: RouterId) -> Option<u32> {
        if from == dst {
            return Some(0);
        }
        self.distance.get(&(from, dst)).copied()
    }

    pub fn is_reachable(&self, from: RouterId, dst: RouterId) -> bool {
        self.distance(from, dst).is_some()
    }
}
