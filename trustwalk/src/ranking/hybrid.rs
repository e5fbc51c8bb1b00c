//! # Hybrid PageRank/SALSA Module.
//!
//! Walks both graphs from the root. At a peer the walk usually follows a trust
//! edge, and with the exploration probability (or when the peer trusts nobody)
//! steps to an item the peer endorses. At an item it steps back to one of the
//! item's endorsers. Edge choices are weighted by trust or affinity, and a walk
//! never immediately returns along the edge it arrived by. Items are scored by
//! their share of all item visits, optionally penalized by MeritRank decay.

use super::{decay::beta_decays, pick_weighted, RandomWalk, WalkStep, WalkStore};
use crate::{
	graph::{AffinityGraph, TrustGraph},
	model::{ItemId, NodeId, NodeOrItem},
	RankingConfig,
};
use log::debug;
use rand::{rngs::StdRng, Rng};
use std::collections::HashMap;

struct HybridStep<'a> {
	trust: &'a TrustGraph,
	affinity: &'a AffinityGraph,
	reset_probability: f64,
	exploration_probability: f64,
}

impl HybridStep<'_> {
	fn from_node(&self, node: &NodeId, previous: Option<&NodeOrItem>, rng: &mut StdRng) -> Option<NodeOrItem> {
		let trusted: Vec<(NodeOrItem, f64)> = self
			.trust
			.out_edges(node)
			.map(|(target, edge)| (NodeOrItem::Node(target.clone()), edge.trust))
			.collect();
		let endorsed: Vec<(NodeOrItem, f64)> = self
			.affinity
			.items_of(node)
			.map(|(item, edge)| (NodeOrItem::Item(item.clone()), edge.affinity))
			.filter(|(vertex, _)| Some(vertex) != previous)
			.collect();

		if rng.gen::<f64>() < self.exploration_probability {
			pick_weighted(&endorsed, rng).or_else(|| pick_weighted(&trusted, rng))
		} else {
			pick_weighted(&trusted, rng).or_else(|| pick_weighted(&endorsed, rng))
		}
	}

	fn from_item(&self, item: &ItemId, previous: Option<&NodeOrItem>, rng: &mut StdRng) -> Option<NodeOrItem> {
		let endorsers: Vec<(NodeOrItem, f64)> = self
			.affinity
			.endorsers_of(item)
			.map(|(node, edge)| (NodeOrItem::Node(node.clone()), edge.affinity))
			.filter(|(vertex, _)| Some(vertex) != previous)
			.collect();
		pick_weighted(&endorsers, rng)
	}
}

impl WalkStep<NodeOrItem> for HybridStep<'_> {
	fn next(&self, walk: &[NodeOrItem], rng: &mut StdRng) -> Option<NodeOrItem> {
		let current = walk.last()?;
		if rng.gen::<f64>() < self.reset_probability {
			return None;
		}
		let previous = walk.len().checked_sub(2).and_then(|i| walk.get(i));
		match current {
			NodeOrItem::Node(node) => self.from_node(node, previous, rng),
			NodeOrItem::Item(item) => self.from_item(item, previous, rng),
		}
	}
}

/// Incrementally maintained item ranking over the trust and affinity graphs.
#[derive(Clone, Debug)]
pub struct IncrementalHybridPersonalizedPageRankSalsa {
	config: RankingConfig,
	root: NodeOrItem,
	walks: WalkStore<NodeOrItem>,
}

impl IncrementalHybridPersonalizedPageRankSalsa {
	/// Creates the engine and simulates its initial walks.
	pub fn new(
		config: RankingConfig, root: NodeId, trust: &TrustGraph, affinity: &AffinityGraph,
	) -> Self {
		let root = NodeOrItem::Node(root);
		// Decorrelate from the trust-only engine sharing the same base seed.
		let seed = config.seed.map(|seed| seed.rotate_left(32));
		let walks = WalkStore::new(root.clone(), config.max_walk_length, seed);
		let mut engine = Self { config, root, walks };
		engine.initiate_random_walks(trust, affinity);
		engine
	}

	fn step<'a>(&self, trust: &'a TrustGraph, affinity: &'a AffinityGraph) -> HybridStep<'a> {
		HybridStep {
			trust,
			affinity,
			reset_probability: self.config.reset_probability,
			exploration_probability: self.config.exploration_probability,
		}
	}

	/// Discards all walks and simulates fresh ones.
	pub fn initiate_random_walks(&mut self, trust: &TrustGraph, affinity: &AffinityGraph) {
		let step = self.step(trust, affinity);
		self.walks.simulate_all(&step, self.config.repetitions);
		debug!("Simulated {} hybrid walks from {}", self.walks.walks().len(), self.root);
	}

	/// Re-simulates the walks passing through any of `changed`. Returns the
	/// number of walks re-simulated.
	pub fn modify_nodes_or_items(
		&mut self, changed: &[NodeOrItem], trust: &TrustGraph, affinity: &AffinityGraph,
	) -> usize {
		let step = self.step(trust, affinity);
		let count = self.walks.resimulate_through(&step, changed);
		debug!("Re-simulated {} hybrid walks for {} changed vertices", count, changed.len());
		count
	}

	/// Item scores summing to 1 over all visited items, after decay.
	pub fn scores(&self) -> HashMap<ItemId, f64> {
		let counts: Vec<(&ItemId, usize)> = self
			.walks
			.visit_counts()
			.into_iter()
			.filter_map(|(vertex, n)| vertex.as_item().map(|item| (item, n)))
			.collect();
		let total: usize = counts.iter().map(|(_, n)| n).sum();
		if total == 0 {
			return HashMap::new();
		}

		let decays = if self.config.decay_enabled() {
			beta_decays(
				self.config.decay_strategy,
				self.walks.walks(),
				&self.root,
				self.config.beta_decay_threshold,
			)
		} else {
			HashMap::new()
		};

		let mut scores: HashMap<ItemId, f64> = counts
			.into_iter()
			.map(|(item, n)| {
				let mut score = n as f64 / total as f64;
				if decays.get(item).copied().unwrap_or(false) {
					debug!("Decaying score of {}", item);
					score *= 1.0 - self.config.beta_decay;
				}
				(item.clone(), score)
			})
			.collect();

		let sum: f64 = scores.values().sum();
		if sum > 0.0 {
			for score in scores.values_mut() {
				*score /= sum;
			}
		}
		scores
	}

	/// Writes each item's score to the graph. Unvisited items score 0.
	pub fn calculate_rankings(&self, affinity: &mut AffinityGraph) {
		let scores = self.scores();
		affinity.reset_ranking_scores();
		for (item, score) in scores {
			if let Some(item) = affinity.item_mut(&item) {
				item.set_ranking_score(score);
			}
		}
	}

	/// The recorded walks.
	pub fn walks(&self) -> &[RandomWalk<NodeOrItem>] {
		self.walks.walks()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		model::{AffinityEdge, Item, Node, TrustEdge},
		ranking::DecayStrategy,
	};

	fn config() -> RankingConfig {
		RankingConfig {
			repetitions: 2000,
			max_walk_length: 30,
			reset_probability: 0.1,
			exploration_probability: 0.3,
			seed: Some(5),
			..RankingConfig::default()
		}
	}

	struct Fixture {
		trust: TrustGraph,
		affinity: AffinityGraph,
	}

	impl Fixture {
		fn new() -> Self {
			Self { trust: TrustGraph::new(), affinity: AffinityGraph::new() }
		}

		fn trust(&mut self, source: &str, target: &str, trust: f64) {
			self.trust.add_node(Node::new(source));
			self.trust.add_node(Node::new(target));
			self.trust.add_edge(&source.into(), &target.into(), TrustEdge::new(trust, 1)).unwrap();
		}

		fn like(&mut self, node: &str, item: &str, affinity: f64) {
			self.affinity.add_node(Node::new(node));
			self.affinity.add_item(Item::new(item));
			self.affinity.add_affinity(&node.into(), &item.into(), AffinityEdge::new(affinity, 1)).unwrap();
		}

		fn score(&self, item: &str) -> f64 {
			self.affinity.item(&item.into()).unwrap().ranking_score()
		}
	}

	#[test]
	fn test_item_scores_sum_to_one() {
		let mut f = Fixture::new();
		f.trust("root", "a", 1.0);
		f.trust("root", "b", 1.0);
		f.like("root", "x", 1.0);
		f.like("a", "x", 0.5);
		f.like("a", "y", 1.0);
		f.like("b", "z", 1.0);

		let engine = IncrementalHybridPersonalizedPageRankSalsa::new(config(), "root".into(), &f.trust, &f.affinity);
		engine.calculate_rankings(&mut f.affinity);

		let sum: f64 = f.affinity.items().iter().map(Item::ranking_score).sum();
		assert!((sum - 1.0).abs() < 1e-3);
		assert!(f.score("x") > 0.0 && f.score("y") > 0.0 && f.score("z") > 0.0);
		assert!(engine.walks().iter().all(|walk| walk[0] == NodeOrItem::Node("root".into())));
	}

	#[test]
	fn test_walks_alternate_without_backtracking() {
		let mut f = Fixture::new();
		f.like("root", "x", 1.0);
		f.like("a", "x", 1.0);
		f.like("a", "y", 1.0);

		let engine = IncrementalHybridPersonalizedPageRankSalsa::new(config(), "root".into(), &f.trust, &f.affinity);
		for walk in engine.walks() {
			for pair in walk.windows(3) {
				assert_ne!(pair[0], pair[2]);
			}
			for pair in walk.windows(2) {
				assert_ne!(pair[0].is_item(), pair[1].is_item());
			}
		}
	}

	#[test]
	fn test_modify_rewalks_through_item() {
		let mut f = Fixture::new();
		f.like("root", "x", 1.0);
		f.like("a", "x", 1.0);

		let mut engine = IncrementalHybridPersonalizedPageRankSalsa::new(config(), "root".into(), &f.trust, &f.affinity);
		engine.calculate_rankings(&mut f.affinity);
		assert_eq!(f.score("x"), 1.0);

		f.like("a", "y", 1.0);
		let x = NodeOrItem::Item("x".into());
		let rewalked = engine.modify_nodes_or_items(&[x, NodeOrItem::Item("y".into())], &f.trust, &f.affinity);
		assert!(rewalked > 0);
		engine.calculate_rankings(&mut f.affinity);
		assert!(f.score("y") > 0.0);
		assert!(f.score("x") > f.score("y"));
	}

	#[test]
	fn test_decay_lowers_funneled_item() {
		let mut f = Fixture::new();
		// Root trusts a hub and two honest peers equally.
		f.trust("root", "hub", 1.0);
		f.trust("root", "h1", 1.0);
		f.trust("root", "h2", 1.0);
		// The hub alone pushes "sybil"; the honest peers share "honest".
		f.like("hub", "sybil", 1.0);
		f.like("h1", "honest", 1.0);
		f.like("h2", "honest", 1.0);

		let plain = RankingConfig { exploration_probability: 1.0, ..config() };
		let decayed = RankingConfig { beta_decay: 0.9, decay_strategy: DecayStrategy::VisitTable, ..plain.clone() };

		let engine = IncrementalHybridPersonalizedPageRankSalsa::new(plain, "root".into(), &f.trust, &f.affinity);
		engine.calculate_rankings(&mut f.affinity);
		let plain_ratio = f.score("sybil") / f.score("honest");

		let engine = IncrementalHybridPersonalizedPageRankSalsa::new(decayed, "root".into(), &f.trust, &f.affinity);
		engine.calculate_rankings(&mut f.affinity);
		let decayed_ratio = f.score("sybil") / f.score("honest");

		assert!(decayed_ratio < plain_ratio);
		assert!(f.score("sybil") < f.score("honest"));
		let sum: f64 = f.affinity.items().iter().map(Item::ranking_score).sum();
		assert!((sum - 1.0).abs() < 1e-3);
	}
}
