//! 链路路由场景仿真
//!
//! 读取 scenario.json，构建路由器网络、依次执行步骤，最后把每台路由器的地址表、
//! 链路表以及客户端收到的消息以 JSON 打印到 stdout。

use clap::Parser;
use linkroute_rs::net::{AddressRecord, ClientLink, LinkRecord, Node, ProxyRecord, Stats};
use linkroute_rs::sim::{ScenarioSpec, SimTime};
use linkroute_rs::topo::mesh::run_scenario;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "link-route-sim", about = "Run scenario.json on a simulated router network")]
struct Args {
    /// Path to scenario.json
    #[arg(long)]
    scenario: PathBuf,

    /// Stop each step at this time (ms); defaults to running until quiescent
    #[arg(long)]
    until_ms: Option<u64>,
}

#[derive(Serialize)]
struct RouterReport {
    name: String,
    addresses: Vec<AddressRecord>,
    links: Vec<LinkRecord>,
    proxies: Vec<ProxyRecord>,
}

#[derive(Serialize)]
struct ClientReport {
    name: String,
    links: Vec<ClientLink>,
}

#[derive(Serialize)]
struct Report {
    now_ns: u64,
    events: u64,
    routers: Vec<RouterReport>,
    clients: Vec<ClientReport>,
    stats: Stats,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let raw = fs::read_to_string(&args.scenario).expect("read scenario.json");
    let scenario: ScenarioSpec = serde_json::from_str(&raw).expect("parse scenario.json");

    let until = args.until_ms.map(SimTime::from_millis);
    let (world, sim, mesh) = match run_scenario(&scenario, until) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid scenario: {e}");
            return ExitCode::from(2);
        }
    };

    let routers = mesh
        .routers
        .values()
        .filter_map(|id| world.net.router(*id))
        .map(|r| RouterReport {
            name: r.name().to_string(),
            addresses: r.address_records(),
            links: r.link_records(),
            proxies: r.proxy_records(),
        })
        .collect();
    let clients = mesh
        .clients
        .iter()
        .filter_map(|(name, id)| {
            world.net.client(*id).map(|c| ClientReport {
                name: name.clone(),
                links: c.links().cloned().collect(),
            })
        })
        .collect();
    let report = Report {
        now_ns: sim.now().0,
        events: sim.executed(),
        routers,
        clients,
        stats: world.net.stats.clone(),
    };
    println!("{}", serde_json::to_string_pretty(&report).expect("serialize report"));
    ExitCode::SUCCESS
}
