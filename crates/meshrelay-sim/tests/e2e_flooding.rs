use meshrelay_core::{MeshPacket, NodeNum};
use meshrelay_node::{DeviceRole, RouterConfig};
use meshrelay_sim::air::encode_frame;
use meshrelay_sim::{Scenario, SimMesh};

const A: NodeNum = NodeNum(100);
const B: NodeNum = NodeNum(200);
const C: NodeNum = NodeNum(300);

fn triangle(config: RouterConfig) -> SimMesh {
    let mut mesh = SimMesh::new(config, 11).expect("valid config");
    for node in [A, B, C] {
        mesh.add_node(node, None).expect("node added");
    }
    mesh.link(A, B, 0).expect("link added");
    mesh.link(B, C, 0).expect("link added");
    mesh.link(A, C, 0).expect("link added");
    mesh
}

fn copies_on_air(mesh: &SimMesh, from: NodeNum, id: u32) -> usize {
    mesh.air_log()
        .iter()
        .filter(|r| r.packet.from == from && r.packet.id == id)
        .count()
}

#[test]
fn e2e_rebroadcast_once_and_suppress_echo() {
    let mut mesh = triangle(RouterConfig::default());
    let packet = MeshPacket::new(A, NodeNum::BROADCAST, 5, 3);
    mesh.send_packet(A, packet)
        .expect("sender exists")
        .expect("radio accepts packet");
    mesh.run_until(2_000);

    let relayed: Vec<_> = mesh
        .air_log()
        .iter()
        .filter(|r| r.sender == B.0)
        .map(|r| (r.packet.from, r.packet.id, r.packet.hop_limit))
        .collect();
    assert_eq!(relayed, vec![(A, 5, 2)]);

    let b = mesh.node(B).expect("node exists");
    assert_eq!(b.router.stats().relayed, 1);
    assert_eq!(b.router.stats().rx_duplicates, 1);
    assert_eq!(b.received().count(), 1);

    // Original plus one rebroadcast from each neighbour.
    assert_eq!(copies_on_air(&mesh, A, 5), 3);
    assert_eq!(mesh.node(A).expect("node exists").received().count(), 0);
    assert!(mesh.is_idle());
}

#[test]
fn e2e_echo_after_expire_window_is_rebroadcast_again() {
    let config = RouterConfig {
        flood_expire_ms: 1_000,
        ..RouterConfig::default()
    };
    let mut mesh = triangle(config);
    mesh.send_packet(A, MeshPacket::new(A, NodeNum::BROADCAST, 5, 3))
        .expect("sender exists")
        .expect("radio accepts packet");
    mesh.run_until(2_000);
    assert_eq!(mesh.node(B).expect("node exists").router.stats().relayed, 1);

    let mut echo = MeshPacket::new(A, NodeNum::BROADCAST, 5, 2);
    echo.relay_node = C.last_byte();
    mesh.inject_frame(C, encode_frame(&echo).expect("frame encodes"));
    mesh.step();

    assert_eq!(mesh.node(B).expect("node exists").router.stats().relayed, 2);
}

#[test]
fn e2e_mute_node_hears_but_never_relays() {
    let mut mesh = SimMesh::new(RouterConfig::default(), 3).expect("valid config");
    mesh.add_node(A, None).expect("node added");
    mesh.add_node(B, Some(DeviceRole::ClientMute)).expect("node added");
    mesh.add_node(C, None).expect("node added");
    mesh.link(A, B, 0).expect("link added");
    mesh.link(B, C, 0).expect("link added");

    mesh.send_message(A, None, false, "quiet").expect("sender exists");
    mesh.run_until(2_000);

    assert_eq!(mesh.node(B).expect("node exists").received().count(), 1);
    assert_eq!(mesh.node(C).expect("node exists").received().count(), 0);
    assert!(mesh.air_log().iter().all(|r| r.sender != B.0));
}

#[test]
fn e2e_hop_limit_bounds_flood_reach() {
    let nodes: Vec<NodeNum> = (1..=6).map(|n| NodeNum(n * 100)).collect();
    let mut mesh = SimMesh::new(RouterConfig::default(), 5).expect("valid config");
    for node in &nodes {
        mesh.add_node(*node, None).expect("node added");
    }
    for pair in nodes.windows(2) {
        mesh.link(pair[0], pair[1], 0).expect("link added");
    }

    mesh.send_packet(nodes[0], MeshPacket::new(nodes[0], NodeNum::BROADCAST, 9, 2))
        .expect("sender exists")
        .expect("radio accepts packet");
    mesh.run_until(3_000);

    let heard: Vec<usize> = nodes
        .iter()
        .map(|n| mesh.node(*n).expect("node exists").received().count())
        .collect();
    // Two hops of budget: three nodes beyond the origin hear it.
    assert_eq!(heard, vec![0, 1, 1, 1, 0, 0]);
}

#[test]
fn e2e_triangle_scenario_file_runs() {
    let scenario = Scenario::from_toml_str(include_str!("../scenarios/triangle.toml"))
        .expect("scenario parses");
    let report = meshrelay_sim::run_scenario(&scenario, None).expect("scenario runs");

    assert_eq!(report.messages.len(), 1);
    assert_eq!(report.messages[0].delivered_to, vec![200, 300]);
    let mute = report.nodes.iter().find(|n| n.num == 300).expect("node reported");
    assert_eq!(mute.stats.relayed, 0);
}
