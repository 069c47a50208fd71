//! 三路由器链 A - B - C
//!
//! - A 扮演 broker：B 通过 on-demand 连接器 `broker` 连到 A；
//! - B 拥有前缀 `org.apache`（终结于 `broker`），经 inter-router 连接连到 C；
//! - C 配置了不带连接器的 `org.apache.`，链路沿 inter-router 网络转给 B。
//!
//! 每台路由器还带有 `/closest/`、`/spread/`、`/multicast/` 和 `/` 四个 fixedAddress。

use crate::net::{
    Bias, ClientId, ConfigError, ConnId, ConnectionRole, Fanout, LinkRoutePattern, NetWorld, PatternDirection,
    RouterConfig, RouterId, RouterSettings,
};

#[derive(Debug, Clone, Default)]
pub struct ChainOpts {
    pub settings: RouterSettings,
}

#[derive(Debug, Clone, Copy)]
pub struct Chain {
    pub a: RouterId,
    pub b: RouterId,
    pub c: RouterId,
    /// B 到 A 的 broker 连接
    pub broker_conn: ConnId,
    /// B 到 C 的 inter-router 连接
    pub inter_router_conn: ConnId,
    /// 连在 A 上的应用（broker 一侧）
    pub app: ClientId,
    pub client_b: ClientId,
    pub client_c: ClientId,
}

fn fixed_addresses() -> Vec<(String, Fanout, Option<Bias>)> {
    vec![
        ("/closest/".to_string(), Fanout::Single, Some(Bias::Closest)),
        ("/spread/".to_string(), Fanout::Single, Some(Bias::Spread)),
        ("/multicast/".to_string(), Fanout::Multiple, None),
        ("/".to_string(), Fanout::Multiple, None),
    ]
}

/// 构建链式拓扑。连接在 `world.net.start` 之后才可用。
pub fn build_chain(world: &mut NetWorld, opts: &ChainOpts) -> Result<Chain, ConfigError> {
    let net = &mut world.net;
    let a = net.add_router(
        "A",
        RouterConfig {
            settings: opts.settings,
            fixed_addresses: fixed_addresses(),
            ..RouterConfig::default()
        },
    )?;
    let b = net.add_router(
        "B",
        RouterConfig {
            settings: opts.settings,
            connectors: vec!["broker".to_string()],
            link_route_patterns: vec![LinkRoutePattern::new(
                "org.apache",
                PatternDirection::Both,
                Some("broker"),
            )],
            fixed_addresses: fixed_addresses(),
        },
    )?;
    let c = net.add_router(
        "C",
        RouterConfig {
            settings: opts.settings,
            link_route_patterns: vec![LinkRoutePattern::new("org.apache.", PatternDirection::Both, None)],
            fixed_addresses: fixed_addresses(),
            ..RouterConfig::default()
        },
    )?;

    let broker_conn = net.add_connector(b, Some("broker"), ConnectionRole::Normal, a)?;
    let inter_router_conn = net.add_connector(b, None, ConnectionRole::InterRouter, c)?;

    let app = net.add_client("app", a)?;
    let client_b = net.add_client("client-b", b)?;
    let client_c = net.add_client("client-c", c)?;

    Ok(Chain {
        a,
        b,
        c,
        broker_conn,
        inter_router_conn,
        app,
        client_b,
        client_c,
    })
}
