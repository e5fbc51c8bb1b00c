// Unwrap is allowed while testing
#![allow(clippy::unwrap_used)]

use trustwalk::{
	gossip::{EdgeDelta, GossipMessage},
	model::{AffinityEdge, ItemId, NodeId, TrustEdge},
	network::TrustNetwork,
	ranking::DecayStrategy,
	RankingConfig,
};

const HONEST_PEERS: usize = 5;
const SYBILS: usize = 10;

fn config(beta_decay: f64, decay_strategy: DecayStrategy) -> RankingConfig {
	RankingConfig {
		repetitions: 3000,
		max_walk_length: 50,
		reset_probability: 0.05,
		exploration_probability: 0.3,
		beta_decay,
		decay_strategy,
		seed: Some(2024),
		..RankingConfig::default()
	}
}

/// The attack as it reaches the root through gossip: a peer the root trusts
/// strongly spawns sybils that all endorse the same item.
fn attack() -> GossipMessage {
	let mut deltas = Vec::new();
	for s in 0..SYBILS {
		let sybil = NodeId::new(format!("sybil{}", s));
		deltas.push(EdgeDelta::Trust {
			source: "mallory".into(),
			target: sybil.clone(),
			trust: 1.0,
			timestamp: 10,
		});
		deltas.push(EdgeDelta::Affinity {
			node: sybil,
			item: "spam".into(),
			affinity: 1.0,
			timestamp: 10,
		});
	}
	GossipMessage { deltas }
}

fn build(config: RankingConfig) -> TrustNetwork {
	let root = NodeId::new("root");
	let mut network = TrustNetwork::new(root.clone(), config).unwrap();
	for h in 0..HONEST_PEERS {
		let peer = NodeId::new(format!("honest{}", h));
		network.add_node_to_node_edge(&root, &peer, TrustEdge::new(1.0, 1)).unwrap();
		network.add_node_to_item_edge(&peer, &"good".into(), AffinityEdge::new(1.0, 1)).unwrap();
	}
	network.add_node_to_node_edge(&root, &"mallory".into(), TrustEdge::new(10.0, 1)).unwrap();

	let bytes = attack().to_bytes().unwrap();
	let report = network.apply_deltas(GossipMessage::from_bytes(&bytes).unwrap().deltas);
	assert_eq!(report.applied, 2 * SYBILS);
	assert_eq!(report.stale + report.rejected, 0);

	network.calculate_rankings();
	network
}

fn item_score(network: &TrustNetwork, id: &str) -> f64 {
	network.affinity_graph().item(&ItemId::new(id)).unwrap().ranking_score()
}

#[test]
fn sybil_item_wins_without_decay() {
	let network = build(config(0.0, DecayStrategy::PerItemScan));
	assert!(item_score(&network, "spam") > item_score(&network, "good"));
	let total: f64 = network.top_items(10).iter().map(|(_, score)| score).sum();
	assert!((total - 1.0).abs() < 1e-3);
}

#[test]
fn decay_demotes_sybil_item() {
	for strategy in [DecayStrategy::PerItemScan, DecayStrategy::VisitTable] {
		let plain = build(config(0.0, strategy));
		let decayed = build(config(0.9, strategy));

		let plain_spam = item_score(&plain, "spam");
		let decayed_spam = item_score(&decayed, "spam");
		assert!(decayed_spam < plain_spam);
		assert!(decayed_spam < item_score(&decayed, "good"));
		assert_eq!(decayed.top_items(1)[0].0, ItemId::new("good"));

		let total: f64 = decayed.top_items(10).iter().map(|(_, score)| score).sum();
		assert!((total - 1.0).abs() < 1e-3);
	}
}

#[test]
fn trust_attenuates_towards_sybils() {
	let network = build(config(0.0, DecayStrategy::PerItemScan));
	let score = |id: &str| {
		network.trust_graph().node(&NodeId::new(id)).unwrap().personalized_page_rank()
	};

	assert_eq!(score("root"), 0.0);
	assert!(score("mallory") > 0.0);
	for h in 0..HONEST_PEERS {
		assert!(score(&format!("honest{}", h)) > 0.0);
	}
	// Sybils only receive what flows through mallory.
	for s in 0..SYBILS {
		assert!(score(&format!("sybil{}", s)) <= score("mallory"));
	}
}
