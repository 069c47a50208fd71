use crate::net::{AddressKey, Bias, Candidate, ConfigError, Distribution, Egress, Fanout, FanoutSelector, FanoutTable, LinkId, RouterId};

fn candidates() -> Vec<Candidate> {
    vec![
        Candidate {
            hops: 2,
            egress: Egress::Remote(RouterId(4)),
        },
        Candidate {
            hops: 0,
            egress: Egress::Local(LinkId(9)),
        },
        Candidate {
            hops: 1,
            egress: Egress::Remote(RouterId(3)),
        },
        Candidate {
            hops: 0,
            egress: Egress::Local(LinkId(2)),
        },
    ]
}

#[test]
fn fixed_address_longest_prefix_sets_distribution() {
    let mut t = FanoutTable::default();
    t.register("/", Fanout::Multiple, None).expect("register");
    t.register("/closest/", Fanout::Single, Some(Bias::Closest)).expect("register");
    t.register("/spread/", Fanout::Single, Some(Bias::Spread)).expect("register");

    assert_eq!(t.distribution("/closest/q"), Distribution::Closest);
    assert_eq!(t.distribution("amqp://host/spread/q"), Distribution::Spread);
    assert_eq!(t.distribution("/other"), Distribution::Multicast);
    assert_eq!(t.distribution("org.apache"), Distribution::Closest);
}

#[test]
fn duplicate_fixed_address_is_rejected() {
    let mut t = FanoutTable::default();
    t.register("/q/", Fanout::Multiple, None).expect("register");
    assert_eq!(
        t.register("/q/", Fanout::Single, None),
        Err(ConfigError::DuplicateFixedAddress("/q/".to_string()))
    );
}

#[test]
fn closest_prefers_fewest_hops_then_creation_order() {
    let mut sel = FanoutSelector::default();
    let key = AddressKey::mobile("/closest/q");
    let picked = sel.select(&key, Distribution::Closest, candidates());
    assert_eq!(picked, vec![Egress::Local(LinkId(2))]);
}

#[test]
fn spread_rotates_over_all_candidates() {
    let mut sel = FanoutSelector::default();
    let key = AddressKey::mobile("/spread/q");
    let picks: Vec<Egress> = (0..5)
        .flat_map(|_| sel.select(&key, Distribution::Spread, candidates()))
        .collect();
    assert_eq!(
        picks,
        vec![
            Egress::Local(LinkId(2)),
            Egress::Local(LinkId(9)),
            Egress::Remote(RouterId(3)),
            Egress::Remote(RouterId(4)),
            Egress::Local(LinkId(2)),
        ]
    );
}

#[test]
fn multicast_selects_every_candidate() {
    let mut sel = FanoutSelector::default();
    let key = AddressKey::mobile("/multicast/q");
    let picked = sel.select(&key, Distribution::Multicast, candidates());
    assert_eq!(picked.len(), 4);
}

#[test]
fn no_candidates_selects_nothing() {
    let mut sel = FanoutSelector::default();
    let key = AddressKey::mobile("q");
    assert!(sel.select(&key, Distribution::Spread, Vec::new()).is_empty());
}
