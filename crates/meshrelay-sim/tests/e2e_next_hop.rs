use meshrelay_core::{NodeNum, RoutingError};
use meshrelay_node::{DedupScope, RouterConfig, RouterEvent};
use meshrelay_sim::{Scenario, SimMesh};

const A: NodeNum = NodeNum(100);
const B: NodeNum = NodeNum(200);
const C: NodeNum = NodeNum(300);

fn line(config: RouterConfig, b_to_c_one_way: bool) -> SimMesh {
    let mut mesh = SimMesh::new(config, 21).expect("valid config");
    for node in [A, B, C] {
        mesh.add_node(node, None).expect("node added");
    }
    mesh.link(A, B, 0).expect("link added");
    if b_to_c_one_way {
        mesh.link_one_way(B, C, 0).expect("link added");
    } else {
        mesh.link(B, C, 0).expect("link added");
    }
    mesh
}

fn events_for(mesh: &SimMesh, node: NodeNum, id: u32) -> Vec<RouterEvent> {
    mesh.node(node)
        .expect("node exists")
        .events
        .iter()
        .filter(|e| match e {
            RouterEvent::Delivered { id: got } | RouterEvent::Failed { id: got, .. } => *got == id,
            RouterEvent::Received(_) => false,
        })
        .cloned()
        .collect()
}

#[test]
fn e2e_next_hop_learned_after_two_way_exchange() {
    let mut mesh = line(RouterConfig::default(), false);
    assert_eq!(mesh.node(A).expect("node exists").learned_next_hop(C), None);

    let id = mesh.send_message(A, Some(C), true, "hello").expect("sender exists");
    mesh.run_until(5_000);

    assert_eq!(events_for(&mesh, A, id), vec![RouterEvent::Delivered { id }]);
    assert_eq!(
        mesh.node(A).expect("node exists").learned_next_hop(C),
        Some(B.last_byte())
    );
    // The relay only forwards; it never learns from traffic addressed elsewhere.
    assert_eq!(mesh.node(B).expect("node exists").learned_next_hop(C), None);
    assert_eq!(mesh.node(C).expect("node exists").received().count(), 1);
    assert_eq!(mesh.node(A).expect("node exists").router.pending_count(), 0);
}

#[test]
fn e2e_second_message_uses_learned_next_hop() {
    let mut mesh = line(RouterConfig::default(), false);
    mesh.send_message(A, Some(C), true, "first").expect("sender exists");
    mesh.run_until(5_000);

    let id = mesh.send_message(A, Some(C), true, "second").expect("sender exists");
    mesh.run_until(10_000);

    let first_copy = mesh
        .air_log()
        .iter()
        .find(|r| r.sender == A.0 && r.packet.id == id)
        .expect("second message transmitted");
    assert_eq!(first_copy.packet.next_hop, B.last_byte());
    assert_eq!(events_for(&mesh, A, id), vec![RouterEvent::Delivered { id }]);
    let b_stats = mesh.node(B).expect("node exists").router.stats();
    assert_eq!(b_stats.retransmissions, 0);
}

#[test]
fn e2e_one_way_delivery_does_not_learn() {
    let mut mesh = line(RouterConfig::default(), true);
    let id = mesh.send_message(A, Some(C), true, "hello").expect("sender exists");
    mesh.run_until(5_000);

    assert!(mesh.node(C).expect("node exists").received().count() >= 1);
    assert_eq!(mesh.node(A).expect("node exists").learned_next_hop(C), None);
    assert_eq!(
        events_for(&mesh, A, id),
        vec![RouterEvent::Failed {
            id,
            reason: RoutingError::MaxRetransmit
        }]
    );
}

#[test]
fn e2e_reliable_exhaustion_counts_retransmissions() {
    let mut mesh = SimMesh::new(RouterConfig::default(), 2).expect("valid config");
    mesh.add_node(A, None).expect("node added");
    mesh.add_node(C, None).expect("node added");

    let id = mesh.send_message(A, Some(C), true, "nobody home").expect("sender exists");
    mesh.run_until(5_000);

    let own_copies = mesh
        .air_log()
        .iter()
        .filter(|r| r.sender == A.0 && r.packet.id == id)
        .count();
    // Initial send plus two retransmissions.
    assert_eq!(own_copies, 3);
    let a = mesh.node(A).expect("node exists");
    assert_eq!(a.router.stats().retransmissions, 2);
    assert_eq!(a.router.stats().failed, 1);
    assert_eq!(a.router.pending_count(), 0);

    let report = mesh.report();
    assert_eq!(report.messages[0].acked, Some(false));
    assert_eq!(report.messages[0].failure, Some(RoutingError::MaxRetransmit));
}

#[test]
fn e2e_all_packets_dedup_suppresses_repeat_deliveries() {
    let config = RouterConfig {
        dedup_scope: DedupScope::AllPackets,
        ..RouterConfig::default()
    };
    let mut mesh = line(config, true);
    mesh.send_message(A, Some(C), true, "hello").expect("sender exists");
    mesh.run_until(5_000);

    assert_eq!(mesh.node(C).expect("node exists").received().count(), 1);
    let b_stats = mesh.node(B).expect("node exists").router.stats();
    assert_eq!(b_stats.rx_duplicates, 2);
    assert_eq!(b_stats.relayed, 1);
}

#[test]
fn e2e_line_scenario_is_deterministic() {
    let scenario = Scenario::from_toml_str(include_str!("../scenarios/line.toml"))
        .expect("scenario parses");
    let first = meshrelay_sim::run_scenario(&scenario, None).expect("scenario runs");
    let second = meshrelay_sim::run_scenario(&scenario, None).expect("scenario runs");

    let first = serde_json::to_string(&first).expect("report serialises");
    let second = serde_json::to_string(&second).expect("report serialises");
    assert_eq!(first, second);
}
