//! 扇出选择
//!
//! 只用于消息路由地址：一条投递到达且有多个出口时，按 fixedAddress 配置的分发策略
//! 选择出口。选择在每次投递时计算一次。
//!
//! 平局规则：候选按 (跳数, 稳定键) 排序，本地链路的稳定键是创建顺序（LinkId），
//! 远端出口的稳定键是 origin 的 RouterId。`closest` 取排序后的第一个；
//! `spread` 忽略跳数差异，在全部候选上按同一顺序轮转。

use std::collections::HashMap;

use serde::Serialize;

use super::address::{AddressKey, normalize};
use super::error::ConfigError;
use super::id::{LinkId, RouterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// single/closest
    Closest,
    /// single/spread
    Spread,
    /// multiple
    Multicast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fanout {
    Single,
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Closest,
    Spread,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedAddress {
    pub prefix: String,
    pub distribution: Distribution,
}

/// fixedAddress 前缀表（按字符串前缀做最长匹配）
#[derive(Debug, Default, Clone)]
pub struct FanoutTable {
    fixed: Vec<FixedAddress>,
}

impl FanoutTable {
    pub fn register(&mut self, prefix: &str, fanout: Fanout, bias: Option<Bias>) -> Result<(), ConfigError> {
        if self.fixed.iter().any(|f| f.prefix == prefix) {
            return Err(ConfigError::DuplicateFixedAddress(prefix.to_string()));
        }
        let distribution = match (fanout, bias) {
            (Fanout::Multiple, _) => Distribution::Multicast,
            (Fanout::Single, Some(Bias::Spread)) => Distribution::Spread,
            (Fanout::Single, _) => Distribution::Closest,
        };
        let at = self
            .fixed
            .iter()
            .position(|f| f.prefix.len() < prefix.len())
            .unwrap_or(self.fixed.len());
        self.fixed.insert(
            at,
            FixedAddress {
                prefix: prefix.to_string(),
                distribution,
            },
        );
        Ok(())
    }

    /// 地址的分发策略；没有匹配的 fixedAddress 时为 single/closest。
    pub fn distribution(&self, address: &str) -> Distribution {
        let address = normalize(address);
        self.fixed
            .iter()
            .find(|f| address.starts_with(&f.prefix))
            .map_or(Distribution::Closest, |f| f.distribution)
    }

    pub fn entries(&self) -> &[FixedAddress] {
        &self.fixed
    }
}

/// 出口：本地出向链路或远端 origin 路由器
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Egress {
    Local(LinkId),
    Remote(RouterId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub hops: u32,
    pub egress: Egress,
}

#[derive(Debug, Default)]
pub struct FanoutSelector {
    cursors: HashMap<AddressKey, usize>,
}

impl FanoutSelector {
    pub fn select(&mut self, key: &AddressKey, dist: Distribution, mut candidates: Vec<Candidate>) -> Vec<Egress> {
        if candidates.is_empty() {
            return Vec::new();
        }
        candidates.sort_by_key(|c| (c.hops, c.egress));
        match dist {
            Distribution::Multicast => candidates.into_iter().map(|c| c.egress).collect(),
            Distribution::Closest => vec![candidates[0].egress],
            Distribution::Spread => {
                let cursor = self.cursors.entry(key.clone()).or_insert(0);
                let pick = candidates[*cursor % candidates.len()].egress;
                *cursor = cursor.wrapping_add(1);
                vec![pick]
            }
        }
    }

    /// 只保留 `live` 认可的地址的游标
    pub fn retain(&mut self, live: impl Fn(&AddressKey) -> bool) {
        self.cursors.retain(|key, _| live(key));
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }
}
