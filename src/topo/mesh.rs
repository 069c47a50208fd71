//! 按场景文件构建拓扑并执行步骤

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::net::{
    Bias, ClientId, ConfigError, ConnId, ConnectionRole, Fanout, LinkRoutePattern, NetWorld, PatternDirection, Role,
    RouterConfig, RouterId, RouterSettings,
};
use crate::sim::{
    BiasSpec, ConnectorRole, FanoutSpec, PatternDirSpec, RoleSpec, RouterSettingsSpec, RouterSpec, ScenarioSpec,
    SimTime, Simulator, StepSpec,
};

/// 当前支持的场景文件版本
pub const SCHEMA_VERSION: u32 = 1;

/// 接收方未指定 prefetch 时保持的信用
pub const DEFAULT_PREFETCH: u32 = 10;

/// 名称到标识符的映射
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub routers: BTreeMap<String, RouterId>,
    pub clients: BTreeMap<String, ClientId>,
}

impl Mesh {
    pub fn router(&self, name: &str) -> Result<RouterId, ConfigError> {
        self.routers
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownRouter(name.to_string()))
    }

    pub fn client(&self, name: &str) -> Result<ClientId, ConfigError> {
        self.clients
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownClient(name.to_string()))
    }
}

fn apply_settings(base: RouterSettings, spec: Option<&RouterSettingsSpec>) -> RouterSettings {
    let Some(spec) = spec else {
        return base;
    };
    RouterSettings {
        max_in_flight: spec.max_in_flight.unwrap_or(base.max_in_flight),
        link_capacity: spec.link_capacity.unwrap_or(base.link_capacity),
        link_latency: spec.link_latency_us.map_or(base.link_latency, SimTime::from_micros),
    }
}

/// 把一台路由器的场景配置转换为引擎配置
pub fn router_config(spec: &RouterSpec, defaults: Option<&RouterSettingsSpec>) -> RouterConfig {
    let settings = apply_settings(apply_settings(RouterSettings::default(), defaults), spec.settings.as_ref());
    let link_route_patterns = spec
        .link_route_patterns
        .iter()
        .map(|p| {
            let dir = match p.dir {
                PatternDirSpec::In => PatternDirection::In,
                PatternDirSpec::Out => PatternDirection::Out,
                PatternDirSpec::Both => PatternDirection::Both,
            };
            LinkRoutePattern::new(&p.prefix, dir, p.connector.as_deref())
        })
        .collect();
    let fixed_addresses = spec
        .fixed_addresses
        .iter()
        .map(|f| {
            let fanout = match f.fanout {
                FanoutSpec::Single => Fanout::Single,
                FanoutSpec::Multiple => Fanout::Multiple,
            };
            let bias = f.bias.map(|b| match b {
                BiasSpec::Closest => Bias::Closest,
                BiasSpec::Spread => Bias::Spread,
            });
            (f.prefix.clone(), fanout, bias)
        })
        .collect();
    RouterConfig {
        settings,
        connectors: spec.connectors.iter().filter_map(|c| c.name.clone()).collect(),
        link_route_patterns,
        fixed_addresses,
    }
}

/// 创建场景中的路由器、连接器与客户端。连接在 `world.net.start` 之后才可用。
pub fn build_mesh(world: &mut NetWorld, spec: &ScenarioSpec) -> Result<Mesh, ConfigError> {
    if spec.schema_version != SCHEMA_VERSION {
        return Err(ConfigError::UnsupportedSchema(spec.schema_version));
    }
    let net = &mut world.net;
    let mut mesh = Mesh::default();
    for r in &spec.routers {
        let id = net.add_router(r.name.clone(), router_config(r, spec.defaults.as_ref()))?;
        mesh.routers.insert(r.name.clone(), id);
    }
    for r in &spec.routers {
        let from = mesh.router(&r.name)?;
        for c in &r.connectors {
            let to = mesh.router(&c.peer)?;
            let role = match c.role {
                ConnectorRole::InterRouter => ConnectionRole::InterRouter,
                ConnectorRole::OnDemand => ConnectionRole::Normal,
            };
            net.add_connector(from, c.name.as_deref(), role, to)?;
        }
    }
    for c in &spec.clients {
        let router = mesh.router(&c.router)?;
        let id = net.add_client(c.name.clone(), router)?;
        mesh.clients.insert(c.name.clone(), id);
    }
    info!(
        routers = mesh.routers.len(),
        clients = mesh.clients.len(),
        connections = net.connections().len(),
        "🏗️ 拓扑构建完成"
    );
    Ok(mesh)
}

/// 执行一个场景步骤（只调度事件，不推进时间）
pub fn apply_step(world: &mut NetWorld, sim: &mut Simulator, mesh: &Mesh, step: &StepSpec) -> Result<(), ConfigError> {
    debug!(?step, "执行步骤");
    match step {
        StepSpec::Attach {
            client,
            link,
            role,
            address,
            prefetch,
        } => {
            let id = mesh.client(client)?;
            let (role, prefetch) = match role {
                RoleSpec::Sender => (Role::Sender, 0),
                RoleSpec::Receiver => (Role::Receiver, prefetch.unwrap_or(DEFAULT_PREFETCH)),
            };
            world.net.with_client(id, |c, net| c.attach(link, role, address, prefetch, sim, net));
        }
        StepSpec::Send {
            client,
            link,
            body,
            unsettled,
        } => {
            let id = mesh.client(client)?;
            let message = world.net.make_message(body.clone());
            world.net.with_client(id, |c, net| c.send(link, message, !unsettled, sim, net));
        }
        StepSpec::Detach { client, link } => {
            let id = mesh.client(client)?;
            world.net.with_client(id, |c, net| c.detach(link, sim, net));
        }
        StepSpec::Disconnect { router, peer } => {
            let conn = connection_between(world, mesh, router, peer)?;
            world.net.disconnect(conn, sim);
        }
        StepSpec::Reconnect { router, peer } => {
            let conn = connection_between(world, mesh, router, peer)?;
            world.net.open(conn, sim);
        }
    }
    Ok(())
}

fn connection_between(world: &NetWorld, mesh: &Mesh, router: &str, peer: &str) -> Result<ConnId, ConfigError> {
    let a = mesh.router(router)?;
    let b = mesh.router(peer)?;
    world.net.conn_between(a, b).ok_or_else(|| ConfigError::NoConnection {
        router: router.to_string(),
        peer: peer.to_string(),
    })
}

/// 推进仿真直到安静（或到达 `until`）
pub fn settle(world: &mut NetWorld, sim: &mut Simulator, until: Option<SimTime>) {
    match until {
        Some(t) => sim.run_until(t, world),
        None => sim.run(world),
    }
}

/// 构建场景，打开所有连接，并依次执行每个步骤，每步之后都运行到安静。
pub fn run_scenario(spec: &ScenarioSpec, until: Option<SimTime>) -> Result<(NetWorld, Simulator, Mesh), ConfigError> {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let mesh = build_mesh(&mut world, spec)?;
    world.net.start(&mut sim);
    settle(&mut world, &mut sim, until);
    for step in &spec.steps {
        apply_step(&mut world, &mut sim, &mesh, step)?;
        settle(&mut world, &mut sim, until);
    }
    Ok((world, sim, mesh))
}
