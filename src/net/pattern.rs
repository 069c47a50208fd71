//! 链路路由前缀表
//!
//! 配置加载时注册、运行期只读。匹配规则是“方向兼容的最长前缀”，
//! 等长前缀的歧义在注册时就被拒绝，因此匹配阶段不存在平局。

use serde::Serialize;

use super::address::{normalize, normalize_prefix, prefix_matches};
use super::error::ConfigError;
use super::link::LinkDirection;

/// 前缀适用的链路方向（从路由器视角）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDirection {
    /// 路由器接收投递的链路（对端是 sender）
    In,
    /// 路由器发送投递的链路（对端是 receiver）
    Out,
    Both,
}

impl PatternDirection {
    pub fn admits(self, dir: LinkDirection) -> bool {
        matches!(
            (self, dir),
            (PatternDirection::Both, _)
                | (PatternDirection::In, LinkDirection::Incoming)
                | (PatternDirection::Out, LinkDirection::Outgoing)
        )
    }

    fn overlaps(self, other: PatternDirection) -> bool {
        self == other || self == PatternDirection::Both || other == PatternDirection::Both
    }
}

/// 一条链路路由配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRoutePattern {
    /// 已规范化（去掉末尾分隔符）的前缀
    pub prefix: String,
    pub direction: PatternDirection,
    /// 终结该前缀的连接器；为空时沿 inter-router 网络转发给声明了连接器的路由器
    pub connector: Option<String>,
}

impl LinkRoutePattern {
    pub fn new(prefix: &str, direction: PatternDirection, connector: Option<&str>) -> Self {
        Self {
            prefix: normalize_prefix(prefix).to_string(),
            direction,
            connector: connector.map(str::to_string),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PatternTable {
    /// 按前缀长度降序保存，查找时第一个命中即最长前缀
    patterns: Vec<LinkRoutePattern>,
}

impl PatternTable {
    /// 注册一条前缀。与已有前缀相同且方向重叠时视为重复配置。
    pub fn register(&mut self, pattern: LinkRoutePattern) -> Result<(), ConfigError> {
        if pattern.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self
            .patterns
            .iter()
            .any(|p| p.prefix == pattern.prefix && p.direction.overlaps(pattern.direction))
        {
            return Err(ConfigError::DuplicatePattern {
                prefix: pattern.prefix,
                dir: pattern.direction,
            });
        }

        let at = self
            .patterns
            .iter()
            .position(|p| p.prefix.len() < pattern.prefix.len())
            .unwrap_or(self.patterns.len());
        self.patterns.insert(at, pattern);
        Ok(())
    }

    /// 最长前缀匹配，只考虑与链路方向兼容的前缀。
    pub fn lookup(&self, address: &str, dir: LinkDirection) -> Option<&LinkRoutePattern> {
        let address = normalize(address);
        self.patterns
            .iter()
            .find(|p| p.direction.admits(dir) && prefix_matches(&p.prefix, address))
    }

    pub fn patterns(&self) -> &[LinkRoutePattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 本路由器以自己的连接器终结的前缀（需要向其它路由器通告归属）
    pub fn owned_prefixes(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .filter(|p| p.connector.is_some())
            .map(|p| p.prefix.as_str())
    }
}
