//! 地址规范化与地址键
//!
//! 路由器内部的地址表以“类别标记 + 地址文本”作为键，例如 `M0org.apache.dev`。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 地址类别，决定地址键的前缀标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    /// 按消息路由的移动地址（phase 0）
    Mobile,
    /// 在本跳被代理的链路路由地址
    LinkRouted,
    /// 某路由器拥有的链路路由前缀（其连接器终结该前缀）
    LinkRouteOwner,
}

impl AddressClass {
    pub fn marker(self) -> &'static str {
        match self {
            AddressClass::Mobile => "M0",
            AddressClass::LinkRouted => "D",
            AddressClass::LinkRouteOwner => "C",
        }
    }
}

/// 带类别标记的规范化地址键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressKey(String);

impl AddressKey {
    /// 由类别与原始地址构造；地址会先规范化。
    pub fn new(class: AddressClass, address: &str) -> Self {
        let addr = match class {
            AddressClass::LinkRouteOwner => normalize_prefix(address),
            _ => normalize(address),
        };
        AddressKey(format!("{}{}", class.marker(), addr))
    }

    pub fn mobile(address: &str) -> Self {
        Self::new(AddressClass::Mobile, address)
    }

    pub fn link_routed(address: &str) -> Self {
        Self::new(AddressClass::LinkRouted, address)
    }

    pub fn owner(prefix: &str) -> Self {
        Self::new(AddressClass::LinkRouteOwner, prefix)
    }

    /// 解析管理接口传入的键文本（例如 `M0org.apache`）。
    pub fn parse(raw: &str) -> Option<Self> {
        let known = [
            AddressClass::Mobile,
            AddressClass::LinkRouted,
            AddressClass::LinkRouteOwner,
        ];
        known
            .iter()
            .any(|c| raw.len() > c.marker().len() && raw.starts_with(c.marker()))
            .then(|| AddressKey(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn class(&self) -> AddressClass {
        if self.0.starts_with(AddressClass::Mobile.marker()) {
            AddressClass::Mobile
        } else if self.0.starts_with(AddressClass::LinkRouted.marker()) {
            AddressClass::LinkRouted
        } else {
            AddressClass::LinkRouteOwner
        }
    }

    /// 去掉类别标记后的地址文本
    pub fn address(&self) -> &str {
        &self.0[self.class().marker().len()..]
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 去掉 `amqp://host` 或 `amqp:` 前缀，返回地址本体。
pub fn normalize(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix("amqp://") {
        // host 之后的路径保留前导 '/'，与 fixedAddress 前缀（如 `/closest/`）保持一致
        return match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => "",
        };
    }
    address.strip_prefix("amqp:").unwrap_or(address)
}

/// 规范化链路路由前缀：末尾的一个 `.` 或 `/` 分隔符与不写等价。
pub fn normalize_prefix(prefix: &str) -> &str {
    let p = normalize(prefix);
    p.strip_suffix('.')
        .or_else(|| p.strip_suffix('/'))
        .unwrap_or(p)
}

/// 按段匹配：`prefix` 等于地址，或地址以 `prefix` 加分隔符开头。
///
/// `prefix` 必须已经过 [`normalize_prefix`]。
pub fn prefix_matches(prefix: &str, address: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    match address.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') || rest.starts_with('/'),
        None => false,
    }
}
