//! # Personalized PageRank Module.
//!
//! Walks the trust graph from the root. Each step ends the walk with the reset
//! probability, and otherwise follows an outgoing trust edge with probability
//! proportional to its trust. A node's score is its share of all non-root
//! visits.

use super::{pick_weighted, RandomWalk, WalkStep, WalkStore};
use crate::{graph::TrustGraph, model::NodeId, RankingConfig};
use log::debug;
use rand::{rngs::StdRng, Rng};
use std::collections::HashMap;

struct TrustStep<'a> {
	graph: &'a TrustGraph,
	reset_probability: f64,
}

impl WalkStep<NodeId> for TrustStep<'_> {
	fn next(&self, walk: &[NodeId], rng: &mut StdRng) -> Option<NodeId> {
		let current = walk.last()?;
		if rng.gen::<f64>() < self.reset_probability {
			return None;
		}
		let candidates: Vec<(&NodeId, f64)> =
			self.graph.out_edges(current).map(|(target, edge)| (target, edge.trust)).collect();
		pick_weighted(&candidates, rng).cloned()
	}
}

/// Incrementally maintained personalized PageRank over the trust graph.
#[derive(Clone, Debug)]
pub struct IncrementalPersonalizedPageRank {
	config: RankingConfig,
	root: NodeId,
	walks: WalkStore<NodeId>,
}

impl IncrementalPersonalizedPageRank {
	/// Creates the engine and simulates its initial walks.
	pub fn new(config: RankingConfig, root: NodeId, graph: &TrustGraph) -> Self {
		let walks = WalkStore::new(root.clone(), config.max_walk_length, config.seed);
		let mut engine = Self { config, root, walks };
		engine.initiate_random_walks(graph);
		engine
	}

	/// Discards all walks and simulates fresh ones.
	pub fn initiate_random_walks(&mut self, graph: &TrustGraph) {
		let step = TrustStep { graph, reset_probability: self.config.reset_probability };
		self.walks.simulate_all(&step, self.config.repetitions);
		debug!("Simulated {} trust walks from {}", self.walks.walks().len(), self.root);
	}

	/// Re-simulates the walks passing through any of `changed_sources` after
	/// their outgoing edges changed. Returns the number of walks re-simulated.
	pub fn modify_edges(&mut self, changed_sources: &[NodeId], graph: &TrustGraph) -> usize {
		let step = TrustStep { graph, reset_probability: self.config.reset_probability };
		let count = self.walks.resimulate_through(&step, changed_sources);
		debug!("Re-simulated {} trust walks for {} changed sources", count, changed_sources.len());
		count
	}

	/// Share of non-root visits per visited node.
	pub fn scores(&self) -> HashMap<NodeId, f64> {
		let counts = self.walks.visit_counts();
		let total: usize =
			counts.iter().filter(|(node, _)| ***node != self.root).map(|(_, n)| *n).sum();
		if total == 0 {
			return HashMap::new();
		}
		counts
			.into_iter()
			.filter(|(node, _)| **node != self.root)
			.map(|(node, n)| (node.clone(), n as f64 / total as f64))
			.collect()
	}

	/// Writes each node's score to the graph. Unvisited nodes and the root score 0.
	pub fn calculate_rankings(&self, graph: &mut TrustGraph) {
		let scores = self.scores();
		graph.reset_scores();
		for (node, score) in scores {
			if let Some(node) = graph.node_mut(&node) {
				node.set_personalized_page_rank(score);
			}
		}
	}

	/// The recorded walks.
	pub fn walks(&self) -> &[RandomWalk<NodeId>] {
		self.walks.walks()
	}

	/// The root every walk starts at.
	pub fn root(&self) -> &NodeId {
		&self.root
	}
}
