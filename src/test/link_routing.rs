use crate::net::{Attach, Endpoint, ErrorCondition, Frame, LinkDirection, Reachability, Role};
use crate::topo::chain::ChainOpts;

use super::harness::{attach, client_link, detach, send, started_chain};

#[test]
fn owner_prefix_is_advertised_to_routers_without_a_connector() {
    let (world, _sim, chain) = started_chain(&ChainOpts::default());
    let c = world.net.router(chain.c).expect("router C");
    let owner = c.read_address("Corg.apache").expect("owner entry on C");
    assert_eq!(owner.reachability, Reachability::Remote { hops: 1 });
    assert_eq!(owner.remote_origins, vec![(chain.b.0, 1)]);

    let b = world.net.router(chain.b).expect("router B");
    assert_eq!(
        b.read_address("Corg.apache").expect("owner entry on B").reachability,
        Reachability::Local
    );
}

#[test]
fn partial_prefix_match_from_the_far_router_reaches_the_broker() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache.dev", 10);
    attach(&mut world, &mut sim, chain.client_c, "tx", Role::Sender, "org.apache.dev", 0);
    assert_eq!(client_link(&world, chain.client_c, "tx").credit, 250);

    send(&mut world, &mut sim, chain.client_c, "tx", "hello", true);
    assert_eq!(client_link(&world, chain.app, "rx").bodies(), vec!["hello"]);

    let a = world.net.router(chain.a).expect("router A");
    let rec = a.read_address("M0org.apache.dev").expect("address on A");
    assert_eq!(rec.deliveries_ingress, 1);
    assert_eq!(rec.deliveries_egress, 1);

    let b = world.net.router(chain.b).expect("router B");
    let d = b.read_address("Dorg.apache.dev").expect("link-routed entry on B");
    assert_eq!(d.reachability, Reachability::LinkRouted);
    assert_eq!(d.ref_count, 1);
    assert_eq!(d.deliveries_ingress, 1);

    let out = b.find_link_record("B.lr.0").expect("outbound half on B");
    assert!(out.proxied);
    assert_eq!(out.direction, LinkDirection::Outgoing);
    assert_eq!(out.address, "org.apache.dev");
    assert_eq!(out.peer_connector.as_deref(), Some("broker"));

    let c = world.net.router(chain.c).expect("router C");
    assert!(c.read_address("Dorg.apache.dev").is_some());
    assert!(c.read_address("M0org.apache.dev").is_none());
}

#[test]
fn full_prefix_match_from_the_owning_router() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache", 10);
    attach(&mut world, &mut sim, chain.client_b, "tx", Role::Sender, "org.apache", 0);
    send(&mut world, &mut sim, chain.client_b, "tx", "m1", true);

    assert_eq!(client_link(&world, chain.app, "rx").bodies(), vec!["m1"]);
    let a = world.net.router(chain.a).expect("router A");
    let rec = a.read_address("M0org.apache").expect("address on A");
    assert_eq!((rec.deliveries_ingress, rec.deliveries_egress), (1, 1));
}

#[test]
fn full_prefix_match_from_the_far_router() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache", 10);
    attach(&mut world, &mut sim, chain.client_c, "tx", Role::Sender, "amqp:org.apache", 0);
    send(&mut world, &mut sim, chain.client_c, "tx", "m1", true);
    send(&mut world, &mut sim, chain.client_c, "tx", "m2", true);

    assert_eq!(client_link(&world, chain.app, "rx").bodies(), vec!["m1", "m2"]);
}

#[test]
fn receiver_behind_link_route_gets_broker_messages() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.client_c, "rx", Role::Receiver, "org.apache.dev", 10);
    attach(&mut world, &mut sim, chain.app, "tx", Role::Sender, "org.apache.dev", 0);
    send(&mut world, &mut sim, chain.app, "tx", "from-broker", true);

    assert_eq!(client_link(&world, chain.client_c, "rx").bodies(), vec!["from-broker"]);
    let b = world.net.router(chain.b).expect("router B");
    let out = b.find_link_record("B.lr.0").expect("outbound half on B");
    assert_eq!(out.direction, LinkDirection::Incoming);
}

#[test]
fn unmatched_address_stays_message_routed() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.client_c, "rx", Role::Receiver, "org.apachex", 10);
    let c = world.net.router(chain.c).expect("router C");
    assert_eq!(
        c.read_address("M0org.apachex").expect("mobile entry").reachability,
        Reachability::Local
    );
    assert!(c.proxies().next().is_none());
}

#[test]
fn detach_tears_down_every_hop() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache.dev", 10);
    attach(&mut world, &mut sim, chain.client_c, "tx", Role::Sender, "org.apache.dev", 0);
    detach(&mut world, &mut sim, chain.client_c, "tx");

    for id in [chain.b, chain.c] {
        let r = world.net.router(id).expect("router");
        assert!(r.read_address("Dorg.apache.dev").is_none());
        assert!(r.proxies().next().is_none());
        assert!(r.link_records().iter().all(|l| !l.proxied));
    }
    let a = world.net.router(chain.a).expect("router A");
    assert_eq!(a.read_address("M0org.apache.dev").expect("address on A").ref_count, 1);
    assert!(a.find_link_record("B.lr.0").is_none());
}

#[test]
fn attach_is_refused_when_the_broker_connection_is_down() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    world.net.disconnect(chain.broker_conn, &mut sim);
    sim.run(&mut world);

    attach(&mut world, &mut sim, chain.client_b, "tx", Role::Sender, "org.apache.dev", 0);
    let link = client_link(&world, chain.client_b, "tx");
    assert!(link.detached);
    assert_eq!(link.error, Some(ErrorCondition::NoRouteAvailable));

    attach(&mut world, &mut sim, chain.client_c, "rx", Role::Receiver, "org.apache.dev", 10);
    let link = client_link(&world, chain.client_c, "rx");
    assert!(link.detached);
    assert_eq!(link.error, Some(ErrorCondition::NoRouteAvailable));

    assert_eq!(world.net.stats.attaches_refused, 2);
    let c = world.net.router(chain.c).expect("router C");
    assert!(c.proxies().next().is_none());
}

#[test]
fn attach_succeeds_again_after_reconnect() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    world.net.disconnect(chain.broker_conn, &mut sim);
    sim.run(&mut world);
    world.net.open(chain.broker_conn, &mut sim);
    sim.run(&mut world);

    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache.dev", 10);
    attach(&mut world, &mut sim, chain.client_b, "tx", Role::Sender, "org.apache.dev", 0);
    send(&mut world, &mut sim, chain.client_b, "tx", "back", true);
    assert_eq!(client_link(&world, chain.app, "rx").bodies(), vec!["back"]);
}

#[test]
fn losing_the_broker_connection_detaches_the_client_with_forwarding_failure() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache.dev", 10);
    attach(&mut world, &mut sim, chain.client_c, "tx", Role::Sender, "org.apache.dev", 0);

    world.net.disconnect(chain.broker_conn, &mut sim);
    sim.run(&mut world);

    let link = client_link(&world, chain.client_c, "tx");
    assert!(link.detached);
    assert_eq!(link.error, Some(ErrorCondition::ForwardingFailure));
    for id in [chain.b, chain.c] {
        let r = world.net.router(id).expect("router");
        assert!(r.read_address("Dorg.apache.dev").is_none());
    }
    let a = world.net.router(chain.a).expect("router A");
    assert_eq!(a.read_address("M0org.apache.dev").expect("address on A").ref_count, 1);
}

#[test]
fn proxy_never_targets_the_arrival_connection() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    // B 经 inter-router 连接向 C 发起 attach：C 的前缀归属 B，下一跳正是来时的连接
    let attach_frame = Frame::Attach(Attach {
        name: "loop".to_string(),
        role: Role::Sender,
        address: "org.apache.dev".to_string(),
    });
    world
        .net
        .send(Endpoint::Router(chain.b), chain.inter_router_conn, attach_frame, &mut sim);
    sim.run(&mut world);

    assert_eq!(world.net.stats.attaches_refused, 1);
    let c = world.net.router(chain.c).expect("router C");
    assert!(c.proxies().next().is_none());
    assert!(c.read_address("Dorg.apache.dev").is_none());
}

#[test]
fn repeated_attach_and_detach_leaves_no_residue() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache.dev", 10);
    for round in 0..3 {
        let name = format!("tx{round}");
        attach(&mut world, &mut sim, chain.client_c, &name, Role::Sender, "org.apache.dev", 0);
        send(&mut world, &mut sim, chain.client_c, &name, "m", true);
        detach(&mut world, &mut sim, chain.client_c, &name);
    }
    assert_eq!(client_link(&world, chain.app, "rx").received.len(), 3);
    for id in [chain.b, chain.c] {
        let r = world.net.router(id).expect("router");
        assert!(r.proxies().next().is_none());
        assert!(r.read_address("Dorg.apache.dev").is_none());
    }
    let c = world.net.router(chain.c).expect("router C");
    assert_eq!(c.links().len(), 0);
}

#[test]
fn next_hop_proxy_target_serializes_with_the_owner() {
    let (mut world, mut sim, chain) = started_chain(&ChainOpts::default());
    attach(&mut world, &mut sim, chain.app, "rx", Role::Receiver, "org.apache.dev", 10);
    attach(&mut world, &mut sim, chain.client_c, "tx", Role::Sender, "org.apache.dev", 0);

    let c = world.net.router(chain.c).expect("router C");
    let proxies = serde_json::to_value(c.proxy_records()).expect("serialize proxies");
    assert_eq!(proxies[0]["target"]["kind"].as_str(), Some("next_hop"));
    assert_eq!(proxies[0]["target"]["owner"].as_u64(), Some(chain.b.0 as u64));
    assert_eq!(proxies[0]["outbound"].as_str(), Some("C.lr.0"));
}
