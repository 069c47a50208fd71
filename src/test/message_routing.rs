use crate::net::{
    Bias, ClientId, ConnectionRole, Endpoint, Fanout, Flow, FlowState, Frame, NetWorld, Outcome, Role, RouterConfig,
    RouterId,
};
use crate::sim::Simulator;

use super::harness::{attach, client_link, detach, send};

struct Line {
    x: RouterId,
    y: RouterId,
    z: RouterId,
    /// X 上的发送方
    tx: ClientId,
    /// X 上的接收方
    near: ClientId,
    /// Z 上的接收方
    far: ClientId,
    /// Y 上的客户端
    mid: ClientId,
}

fn config() -> RouterConfig {
    RouterConfig {
        fixed_addresses: vec![
            ("/closest/".to_string(), Fanout::Single, Some(Bias::Closest)),
            ("/spread/".to_string(), Fanout::Single, Some(Bias::Spread)),
            ("/multicast/".to_string(), Fanout::Multiple, None),
        ],
        ..RouterConfig::default()
    }
}

/// X - Y - Z，全部为 inter-router 连接
fn line() -> (NetWorld, Simulator, Line) {
    let mut world = NetWorld::default();
    let mut sim = Simulator::default();
    let net = &mut world.net;
    let x = net.add_router("X", config()).expect("router X");
    let y = net.add_router("Y", config()).expect("router Y");
    let z = net.add_router("Z", config()).expect("router Z");
    net.add_connector(x, None, ConnectionRole::InterRouter, y).expect("X-Y");
    net.add_connector(y, None, ConnectionRole::InterRouter, z).expect("Y-Z");
    let tx = net.add_client("tx", x).expect("tx");
    let near = net.add_client("near", x).expect("near");
    let far = net.add_client("far", z).expect("far");
    let mid = net.add_client("mid", y).expect("mid");
    world.net.start(&mut sim);
    sim.run(&mut world);
    (
        world,
        sim,
        Line {
            x,
            y,
            z,
            tx,
            near,
            far,
            mid,
        },
    )
}

#[test]
fn remote_receiver_is_reached_hop_by_hop() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "q", 0);
    assert_eq!(client_link(&world, l.tx, "out").credit, 250);

    send(&mut world, &mut sim, l.tx, "out", "m1", true);
    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["m1"]);

    let x = world.net.router(l.x).expect("X").read_address("M0q").expect("q on X");
    assert_eq!(x.deliveries_ingress, 1);
    assert_eq!(x.deliveries_egress, 0);
    let y = world.net.router(l.y).expect("Y").read_address("M0q").expect("q on Y");
    assert_eq!(y.deliveries_transit, 1);
    let z = world.net.router(l.z).expect("Z").read_address("M0q").expect("q on Z");
    assert_eq!(z.deliveries_egress, 1);
    assert_eq!(z.deliveries_ingress, 0);
}

#[test]
fn unsettled_delivery_is_accepted_once_forwarded() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "q", 0);
    send(&mut world, &mut sim, l.tx, "out", "m1", false);

    assert_eq!(client_link(&world, l.tx, "out").outcomes, vec![(0, Outcome::Accepted)]);
    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["m1"]);
}

#[test]
fn closest_prefers_the_local_receiver() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "/closest/q", 10);
    attach(&mut world, &mut sim, l.near, "rx", Role::Receiver, "/closest/q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "/closest/q", 0);
    for body in ["a", "b", "c"] {
        send(&mut world, &mut sim, l.tx, "out", body, true);
    }

    assert_eq!(client_link(&world, l.near, "rx").bodies(), vec!["a", "b", "c"]);
    assert!(client_link(&world, l.far, "rx").received.is_empty());
}

#[test]
fn closest_falls_back_to_the_remote_receiver() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "/closest/q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "/closest/q", 0);
    send(&mut world, &mut sim, l.tx, "out", "a", true);
    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["a"]);
}

#[test]
fn spread_rotates_over_receivers_in_creation_order() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.near, "r1", Role::Receiver, "/spread/q", 10);
    attach(&mut world, &mut sim, l.near, "r2", Role::Receiver, "/spread/q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "/spread/q", 0);
    for body in ["m0", "m1", "m2", "m3"] {
        send(&mut world, &mut sim, l.tx, "out", body, true);
    }

    assert_eq!(client_link(&world, l.near, "r1").bodies(), vec!["m0", "m2"]);
    assert_eq!(client_link(&world, l.near, "r2").bodies(), vec!["m1", "m3"]);
}

#[test]
fn multicast_reaches_every_receiver() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "/multicast/q", 10);
    attach(&mut world, &mut sim, l.near, "rx", Role::Receiver, "/multicast/q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "/multicast/q", 0);
    send(&mut world, &mut sim, l.tx, "out", "all", true);

    assert_eq!(client_link(&world, l.near, "rx").bodies(), vec!["all"]);
    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["all"]);
    let x = world.net.router(l.x).expect("X").read_address("M0/multicast/q").expect("entry on X");
    assert_eq!((x.deliveries_ingress, x.deliveries_egress), (1, 1));
}

#[test]
fn delivery_without_receiver_is_dropped_or_released() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "nobody", 0);
    send(&mut world, &mut sim, l.tx, "out", "lost", true);
    send(&mut world, &mut sim, l.tx, "out", "back", false);

    assert_eq!(world.net.stats.deliveries_dropped, 1);
    assert_eq!(world.net.stats.deliveries_released, 1);
    assert_eq!(client_link(&world, l.tx, "out").outcomes, vec![(1, Outcome::Released)]);
}

#[test]
fn messages_wait_on_the_egress_link_until_credit_arrives() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "q", 0);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "q", 0);
    for body in ["a", "b", "c"] {
        send(&mut world, &mut sim, l.tx, "out", body, true);
    }
    assert!(client_link(&world, l.far, "rx").received.is_empty());
    let z = world.net.router(l.z).expect("Z");
    let parked = z.links().iter().find(|k| k.name == "rx").expect("egress link on Z");
    assert_eq!(parked.pending.len(), 3);

    let conn = world.net.client(l.far).expect("far").conn();
    let flow = Flow {
        link: "rx".to_string(),
        state: FlowState {
            delivery_count: 0,
            credit: 5,
        },
    };
    world.net.send(Endpoint::Client(l.far), conn, Frame::Flow(flow), &mut sim);
    sim.run(&mut world);

    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["a", "b", "c"]);
    let z = world.net.router(l.z).expect("Z");
    let drained = z.links().iter().find(|k| k.name == "rx").expect("egress link on Z");
    assert!(drained.pending.is_empty());
    assert_eq!(drained.credit, 2);
}

#[test]
fn detached_receiver_is_forgotten_across_the_network() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "q", 10);
    assert!(world.net.router(l.x).expect("X").read_address("M0q").is_some());

    detach(&mut world, &mut sim, l.far, "rx");
    for id in [l.x, l.y, l.z] {
        assert!(world.net.router(id).expect("router").read_address("M0q").is_none());
    }
}

fn remote_origins(world: &NetWorld, router: RouterId, key: &str) -> Vec<(usize, u32)> {
    world
        .net
        .router(router)
        .and_then(|r| r.read_address(key))
        .map(|rec| rec.remote_origins)
        .unwrap_or_default()
}

#[test]
fn sender_on_a_transit_router_does_not_attract_deliveries() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.mid, "tx", Role::Sender, "/closest/q", 0);
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "/closest/q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "/closest/q", 0);
    assert_eq!(remote_origins(&world, l.x, "M0/closest/q"), vec![(l.z.0, 2)]);

    send(&mut world, &mut sim, l.tx, "out", "m1", false);
    assert_eq!(client_link(&world, l.tx, "out").outcomes, vec![(0, Outcome::Accepted)]);
    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["m1"]);
    assert_eq!(world.net.stats.deliveries_dropped, 0);
}

#[test]
fn multicast_skips_routers_with_only_senders() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.mid, "tx", Role::Sender, "/multicast/q", 0);
    attach(&mut world, &mut sim, l.far, "rx", Role::Receiver, "/multicast/q", 10);
    attach(&mut world, &mut sim, l.near, "rx", Role::Receiver, "/multicast/q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "/multicast/q", 0);
    send(&mut world, &mut sim, l.tx, "out", "all", true);

    assert_eq!(client_link(&world, l.near, "rx").bodies(), vec!["all"]);
    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["all"]);
    assert_eq!(world.net.stats.deliveries_dropped, 0);

    // Y 上的发送方也能到达两端的接收方
    send(&mut world, &mut sim, l.mid, "tx", "from-y", true);
    assert_eq!(client_link(&world, l.near, "rx").bodies(), vec!["all", "from-y"]);
    assert_eq!(client_link(&world, l.far, "rx").bodies(), vec!["all", "from-y"]);
    assert_eq!(world.net.stats.deliveries_dropped, 0);
}

#[test]
fn receiver_joining_a_sender_is_advertised_and_retracted() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.mid, "tx", Role::Sender, "q", 0);
    assert!(remote_origins(&world, l.x, "M0q").is_empty());

    attach(&mut world, &mut sim, l.mid, "rx", Role::Receiver, "q", 10);
    assert_eq!(remote_origins(&world, l.x, "M0q"), vec![(l.y.0, 1)]);
    assert_eq!(remote_origins(&world, l.z, "M0q"), vec![(l.y.0, 1)]);

    detach(&mut world, &mut sim, l.mid, "rx");
    assert!(world.net.router(l.x).expect("X").read_address("M0q").is_none());
    assert!(world.net.router(l.z).expect("Z").read_address("M0q").is_none());
    let y = world.net.router(l.y).expect("Y").read_address("M0q").expect("sender keeps q on Y");
    assert_eq!(y.ref_count, 1);
    assert_eq!(world.net.stats.topology_inconsistencies, 0);
}

#[test]
fn spread_cursor_is_dropped_with_the_address() {
    let (mut world, mut sim, l) = line();
    attach(&mut world, &mut sim, l.near, "r1", Role::Receiver, "/spread/q", 10);
    attach(&mut world, &mut sim, l.near, "r2", Role::Receiver, "/spread/q", 10);
    attach(&mut world, &mut sim, l.tx, "out", Role::Sender, "/spread/q", 0);
    send(&mut world, &mut sim, l.tx, "out", "m0", true);
    assert_eq!(world.net.router(l.x).expect("X").selector.cursor_count(), 1);

    for (client, link) in [(l.near, "r1"), (l.near, "r2"), (l.tx, "out")] {
        detach(&mut world, &mut sim, client, link);
    }
    let x = world.net.router(l.x).expect("X");
    assert!(x.read_address("M0/spread/q").is_none());
    assert_eq!(x.selector.cursor_count(), 0);
}
