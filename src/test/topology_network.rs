use crate::net::{
    AddressKey, ClientId, ConnId, ConnectionRole, ControlMessage, Endpoint, Frame, NetWorld, Reachability, Role,
    RouterConfig, RouterId,
};
use crate::sim::Simulator;

use super::harness::{attach, client_link, detach, send};

/// 足以让任何一次拓扑交换收敛的事件数上限
const EVENT_LIMIT: u64 = 10_000;

struct Triangle {
    routers: [RouterId; 3],
    clients: [ClientId; 3],
    /// P-Q、Q-R、R-P
    edges: [ConnId; 3],
}

fn triangle() -> (NetWorld, Simulator, Triangle) {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let net = &mut world.net;
    let p = net.add_router("P", RouterConfig::default()).expect("P");
    let q = net.add_router("Q", RouterConfig::default()).expect("Q");
    let r = net.add_router("R", RouterConfig::default()).expect("R");
    let pq = net.add_connector(p, None, ConnectionRole::InterRouter, q).expect("P-Q");
    let qr = net.add_connector(q, None, ConnectionRole::InterRouter, r).expect("Q-R");
    let rp = net.add_connector(r, None, ConnectionRole::InterRouter, p).expect("R-P");
    let clients = [
        net.add_client("on-p", p).expect("on-p"),
        net.add_client("on-q", q).expect("on-q"),
        net.add_client("on-r", r).expect("on-r"),
    ];
    world.net.start(&mut sim);
    let executed = sim.run_bounded(EVENT_LIMIT, &mut world);
    assert!(executed < EVENT_LIMIT);
    (
        world,
        sim,
        Triangle {
            routers: [p, q, r],
            clients,
            edges: [pq, qr, rp],
        },
    )
}

fn attach_bounded(world: &mut NetWorld, sim: &mut Simulator, client: ClientId, address: &str) {
    world
        .net
        .with_client(client, |c, net| c.attach("rx", Role::Receiver, address, 10, sim, net))
        .expect("client exists");
    let executed = sim.run_bounded(EVENT_LIMIT, world);
    assert!(executed < EVENT_LIMIT, "propagation did not settle");
    assert_eq!(sim.pending(), 0);
}

fn origins(world: &NetWorld, router: RouterId, key: &str) -> Option<Vec<(usize, u32)>> {
    world
        .net
        .router(router)
        .and_then(|r| r.read_address(key))
        .map(|rec| rec.remote_origins)
}

#[test]
fn propagation_in_a_cycle_settles() {
    let (mut world, mut sim, t) = triangle();
    let names = ["a-p", "a-q", "a-r"];
    for (client, name) in t.clients.iter().zip(names) {
        attach_bounded(&mut world, &mut sim, *client, name);
    }

    for (i, name) in names.iter().enumerate() {
        let key = format!("M0{name}");
        let owner = t.routers[i];
        for &other in t.routers.iter().filter(|r| **r != owner) {
            assert_eq!(origins(&world, other, &key), Some(vec![(owner.0, 1)]), "{key} on {other}");
        }
        let local = world.net.router(owner).and_then(|r| r.read_address(&key)).expect("local entry");
        assert_eq!(local.reachability, Reachability::Local);
    }
    assert_eq!(world.net.stats.topology_inconsistencies, 0);
}

#[test]
fn retraction_is_not_resurrected_by_the_cycle() {
    let (mut world, mut sim, t) = triangle();
    attach_bounded(&mut world, &mut sim, t.clients[0], "a-p");
    detach(&mut world, &mut sim, t.clients[0], "rx");

    for &r in &t.routers {
        assert_eq!(origins(&world, r, "M0a-p"), None);
    }
    assert_eq!(world.net.stats.topology_inconsistencies, 0);

    attach(&mut world, &mut sim, t.clients[0], "again", Role::Receiver, "a-p", 10);
    assert_eq!(origins(&world, t.routers[1], "M0a-p"), Some(vec![(t.routers[0].0, 1)]));
}

#[test]
fn losing_an_edge_falls_back_to_the_longer_path() {
    let (mut world, mut sim, t) = triangle();
    let [p, q, r] = t.routers;
    attach_bounded(&mut world, &mut sim, t.clients[0], "a-p");

    world.net.disconnect(t.edges[0], &mut sim);
    sim.run(&mut world);
    assert_eq!(origins(&world, q, "M0a-p"), Some(vec![(p.0, 2)]));

    attach(&mut world, &mut sim, t.clients[1], "tx", Role::Sender, "a-p", 0);
    send(&mut world, &mut sim, t.clients[1], "tx", "detour", true);
    assert_eq!(client_link(&world, t.clients[0], "rx").bodies(), vec!["detour"]);
    let via = world.net.router(r).and_then(|x| x.read_address("M0a-p")).expect("entry on R");
    assert_eq!(via.deliveries_transit, 1);
}

#[test]
fn restored_edge_resynchronises() {
    let (mut world, mut sim, t) = triangle();
    let [p, q, _] = t.routers;
    attach_bounded(&mut world, &mut sim, t.clients[0], "a-p");
    world.net.disconnect(t.edges[0], &mut sim);
    sim.run(&mut world);

    world.net.open(t.edges[0], &mut sim);
    let executed = sim.run_bounded(EVENT_LIMIT, &mut world);
    assert!(executed < EVENT_LIMIT);
    assert_eq!(origins(&world, q, "M0a-p"), Some(vec![(p.0, 1)]));
}

#[test]
fn isolated_router_leaves_no_ghost_routes() {
    let (mut world, mut sim, t) = triangle();
    let [p, q, r] = t.routers;
    attach_bounded(&mut world, &mut sim, t.clients[2], "a-r");

    world.net.disconnect(t.edges[1], &mut sim);
    world.net.disconnect(t.edges[2], &mut sim);
    sim.run(&mut world);

    assert_eq!(origins(&world, p, "M0a-r"), None);
    assert_eq!(origins(&world, q, "M0a-r"), None);
    let local = world.net.router(r).and_then(|x| x.read_address("M0a-r")).expect("entry on R");
    assert_eq!(local.reachability, Reachability::Local);
}

#[test]
fn retraction_of_an_unknown_entry_is_counted() {
    let (mut world, mut sim, t) = triangle();
    let [p, q, _] = t.routers;
    let retract = ControlMessage::Retract {
        key: AddressKey::mobile("never"),
        origin: p,
        seq: 7,
    };
    world
        .net
        .send(Endpoint::Router(p), t.edges[0], Frame::Control(retract), &mut sim);
    sim.run(&mut world);

    assert_eq!(world.net.stats.topology_inconsistencies, 1);
    assert_eq!(origins(&world, q, "M0never"), None);
}

#[test]
fn control_from_a_client_connection_is_ignored() {
    let (mut world, mut sim, t) = triangle();
    let client = t.clients[1];
    let conn = world.net.client(client).expect("on-q").conn();
    let retract = ControlMessage::Retract {
        key: AddressKey::mobile("never"),
        origin: t.routers[0],
        seq: 1,
    };
    world
        .net
        .send(Endpoint::Client(client), conn, Frame::Control(retract), &mut sim);
    sim.run(&mut world);
    assert_eq!(world.net.stats.topology_inconsistencies, 0);
}
