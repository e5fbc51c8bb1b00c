//! # Network Module.
//!
//! The [`TrustNetwork`] owns both graphs for one root identity and keeps the
//! two ranking engines in step with every mutation. Mutations are serialized
//! through `&mut self`; share a network between tasks behind a mutex.

use crate::{
	error::TrustError,
	gossip::EdgeDelta,
	graph::{ensure_newer, AffinityGraph, TrustGraph},
	model::{now_millis, AffinityEdge, Item, ItemId, Node, NodeId, NodeOrItem, TrustEdge},
	ranking::{IncrementalHybridPersonalizedPageRankSalsa, IncrementalPersonalizedPageRank},
	serialization::SerializedSubNetworks,
	RankingConfig,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeSet};

/// Outcome of applying a batch of deltas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
	/// Deltas that changed a graph.
	pub applied: usize,
	/// Deltas no newer than the stored edge.
	pub stale: usize,
	/// Deltas rejected for any other reason.
	pub rejected: usize,
}

/// Vertices whose outgoing transitions changed in a mutation.
#[derive(Default)]
struct Changes {
	trust_sources: BTreeSet<NodeId>,
	hybrid: BTreeSet<NodeOrItem>,
}

impl Changes {
	fn is_empty(&self) -> bool {
		self.trust_sources.is_empty() && self.hybrid.is_empty()
	}
}

/// Both graphs of one peer plus the engines ranking them.
#[derive(Clone, Debug)]
pub struct TrustNetwork {
	root: NodeId,
	config: RankingConfig,
	trust_graph: TrustGraph,
	affinity_graph: AffinityGraph,
	page_rank: IncrementalPersonalizedPageRank,
	hybrid: IncrementalHybridPersonalizedPageRankSalsa,
}

impl TrustNetwork {
	/// Creates a network holding only the root.
	pub fn new(root: NodeId, config: RankingConfig) -> Result<Self, TrustError> {
		Self::from_graphs(root, TrustGraph::new(), AffinityGraph::new(), config)
	}

	/// Creates a network over existing graphs, inserting the root if missing.
	pub fn from_graphs(
		root: NodeId, mut trust_graph: TrustGraph, mut affinity_graph: AffinityGraph,
		config: RankingConfig,
	) -> Result<Self, TrustError> {
		config.validate()?;
		trust_graph.add_node(Node::new(root.clone()));
		affinity_graph.add_node(Node::new(root.clone()));

		let page_rank = IncrementalPersonalizedPageRank::new(config.clone(), root.clone(), &trust_graph);
		let hybrid = IncrementalHybridPersonalizedPageRankSalsa::new(
			config.clone(),
			root.clone(),
			&trust_graph,
			&affinity_graph,
		);
		info!(
			"Loaded network for {} with {} trust and {} affinity edges",
			root,
			trust_graph.edge_count(),
			affinity_graph.edge_count()
		);
		Ok(Self { root, config, trust_graph, affinity_graph, page_rank, hybrid })
	}

	/// Restores a network from its serialized graphs.
	pub fn from_serialized(
		root: NodeId, serialized: &SerializedSubNetworks, config: RankingConfig,
	) -> Result<Self, TrustError> {
		let (trust_graph, affinity_graph) = serialized.graphs()?;
		Self::from_graphs(root, trust_graph, affinity_graph, config)
	}

	/// Serializes both graphs.
	pub fn serialize(&self) -> Result<SerializedSubNetworks, TrustError> {
		SerializedSubNetworks::new(&self.trust_graph, &self.affinity_graph)
	}

	/// The identity rankings are personalized for.
	pub fn root(&self) -> &NodeId {
		&self.root
	}

	/// The walk parameters.
	pub fn config(&self) -> &RankingConfig {
		&self.config
	}

	/// The trust graph.
	pub fn trust_graph(&self) -> &TrustGraph {
		&self.trust_graph
	}

	/// The affinity graph.
	pub fn affinity_graph(&self) -> &AffinityGraph {
		&self.affinity_graph
	}

	/// Trust graph edges in upsert order.
	pub fn node_to_node_edges(&self) -> Vec<(NodeId, NodeId, TrustEdge)> {
		self.trust_graph.edges()
	}

	/// Affinity graph edges in upsert order.
	pub fn node_to_item_edges(&self) -> Vec<(NodeId, ItemId, AffinityEdge)> {
		self.affinity_graph.edges()
	}

	/// Adds a peer to both graphs. Returns false if it was known to both.
	pub fn add_node(&mut self, id: NodeId) -> bool {
		let in_trust = self.trust_graph.add_node(Node::new(id.clone()));
		let in_affinity = self.affinity_graph.add_node(Node::new(id));
		in_trust || in_affinity
	}

	/// Adds an item. Returns false if it was already known.
	pub fn add_item(&mut self, id: ItemId) -> bool {
		self.affinity_graph.add_item(Item::new(id))
	}

	/// Upserts the affinity of `node` towards `item`, creating both vertices
	/// if needed. When the root's own affinity changes, its trust towards the
	/// item's other endorsers moves by their affinity times the change.
	pub fn add_node_to_item_edge(
		&mut self, node: &NodeId, item: &ItemId, edge: AffinityEdge,
	) -> Result<(), TrustError> {
		let mut changes = Changes::default();
		self.upsert_affinity(node, item, edge, &mut changes)?;
		self.refresh(&changes);
		Ok(())
	}

	/// Upserts the trust of `source` towards `target`, creating both vertices
	/// if needed.
	pub fn add_node_to_node_edge(
		&mut self, source: &NodeId, target: &NodeId, edge: TrustEdge,
	) -> Result<(), TrustError> {
		let mut changes = Changes::default();
		self.upsert_trust(source, target, edge, &mut changes)?;
		self.refresh(&changes);
		Ok(())
	}

	/// Adds `delta` to the root's trust towards `node` with a fresh timestamp.
	pub fn update_node_trust(&mut self, node: &NodeId, delta: f64) -> Result<(), TrustError> {
		let edge = self.raised_trust(node, delta)?;
		let mut changes = Changes::default();
		self.commit_trust(node, edge, &mut changes);
		self.refresh(&changes);
		Ok(())
	}

	/// Retracts the affinity edge between `node` and `item`.
	pub fn remove_node_to_item_edge(&mut self, node: &NodeId, item: &ItemId) -> Option<AffinityEdge> {
		let removed = self.affinity_graph.remove_edge(node, item)?;
		let mut changes = Changes::default();
		changes.hybrid.insert(NodeOrItem::Node(node.clone()));
		changes.hybrid.insert(NodeOrItem::Item(item.clone()));
		self.refresh(&changes);
		Some(removed)
	}

	/// Upserts every delta, then re-simulates the affected walks once.
	pub fn apply_deltas(&mut self, deltas: impl IntoIterator<Item = EdgeDelta>) -> BatchReport {
		let mut report = BatchReport::default();
		let mut changes = Changes::default();
		for delta in deltas {
			let res = match &delta {
				EdgeDelta::Trust { source, target, trust, timestamp } => {
					self.upsert_trust(source, target, TrustEdge::new(*trust, *timestamp), &mut changes)
				},
				EdgeDelta::Affinity { node, item, affinity, timestamp } => {
					self.upsert_affinity(node, item, AffinityEdge::new(*affinity, *timestamp), &mut changes)
				},
			};
			match res {
				Ok(()) => report.applied += 1,
				Err(e) if e.is_stale() => report.stale += 1,
				Err(e) => {
					debug!("Rejected {:?}: {}", delta, e);
					report.rejected += 1;
				},
			}
		}
		self.refresh(&changes);
		report
	}

	/// Writes personalized PageRank scores to the nodes of both graphs and
	/// ranking scores to the items.
	pub fn calculate_rankings(&mut self) {
		self.page_rank.calculate_rankings(&mut self.trust_graph);
		for node in self.trust_graph.nodes() {
			if let Some(copy) = self.affinity_graph.node_mut(node.id()) {
				copy.set_personalized_page_rank(node.personalized_page_rank());
			}
		}
		self.hybrid.calculate_rankings(&mut self.affinity_graph);
		debug!("Ranked {} items for {}", self.affinity_graph.items().len(), self.root);
	}

	/// The `n` best ranked items, best first.
	pub fn top_items(&self, n: usize) -> Vec<(ItemId, f64)> {
		let mut items: Vec<(ItemId, f64)> = self
			.affinity_graph
			.items()
			.iter()
			.map(|item| (item.id().clone(), item.ranking_score()))
			.collect();
		items.sort_by(|a, b| descending(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
		items.truncate(n);
		items
	}

	/// Every peer's personalized PageRank score, best first.
	pub fn node_scores(&self) -> Vec<(NodeId, f64)> {
		let mut nodes: Vec<(NodeId, f64)> = self
			.trust_graph
			.nodes()
			.iter()
			.map(|node| (node.id().clone(), node.personalized_page_rank()))
			.collect();
		nodes.sort_by(|a, b| descending(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
		nodes
	}

	fn upsert_trust(
		&mut self, source: &NodeId, target: &NodeId, edge: TrustEdge, changes: &mut Changes,
	) -> Result<(), TrustError> {
		if source == target {
			return Err(TrustError::InvalidEdgeType(format!("trust self-loop on {}", source)));
		}
		ensure_newer(self.trust_graph.edge(source, target), &edge, source, target)?;

		self.trust_graph.add_node(Node::new(source.clone()));
		self.trust_graph.add_node(Node::new(target.clone()));
		self.trust_graph.add_edge(source, target, edge)?;

		// Hybrid walks may reach the source through an item even if it is new to the trust graph.
		changes.trust_sources.insert(source.clone());
		changes.hybrid.insert(NodeOrItem::Node(source.clone()));
		Ok(())
	}

	fn upsert_affinity(
		&mut self, node: &NodeId, item: &ItemId, edge: AffinityEdge, changes: &mut Changes,
	) -> Result<(), TrustError> {
		let previous = self.affinity_graph.edge(node, item).copied();
		ensure_newer(previous.as_ref(), &edge, node, item)?;

		// Propagated trust is settled before anything is written.
		let delta = edge.affinity - previous.map_or(0.0, |e| e.affinity);
		let propagated =
			if node == &self.root && delta != 0.0 { self.propagation(item, delta) } else { Vec::new() };

		self.affinity_graph.add_node(Node::new(node.clone()));
		self.affinity_graph.add_item(Item::new(item.clone()));
		self.affinity_graph.add_affinity(node, item, edge)?;
		changes.hybrid.insert(NodeOrItem::Node(node.clone()));
		changes.hybrid.insert(NodeOrItem::Item(item.clone()));

		for (endorser, trust) in propagated {
			self.commit_trust(&endorser, trust, changes);
		}
		Ok(())
	}

	/// The root's new trust towards every other endorser of `item`, raised by
	/// their affinity to it times `delta`. Edges that cannot be overwritten
	/// are left out.
	fn propagation(&self, item: &ItemId, delta: f64) -> Vec<(NodeId, TrustEdge)> {
		self.affinity_graph
			.endorsers_of(item)
			.filter(|(node, _)| **node != self.root)
			.filter_map(|(node, edge)| match self.raised_trust(node, edge.affinity * delta) {
				Ok(trust) => Some((node.clone(), trust)),
				Err(e) => {
					debug!("Skipping trust propagation to {}: {}", node, e);
					None
				},
			})
			.collect()
	}

	/// The root's trust edge towards `node` raised by `delta`, with a timestamp
	/// newer than the stored one.
	fn raised_trust(&self, node: &NodeId, delta: f64) -> Result<TrustEdge, TrustError> {
		if node == &self.root {
			return Err(TrustError::InvalidEdgeType(format!("trust self-loop on {}", node)));
		}
		let existing = self.trust_graph.edge(&self.root, node).copied();
		let trust = existing.map_or(0.0, |e| e.trust) + delta;
		let timestamp = existing.map_or(0, |e| e.timestamp.saturating_add(1)).max(now_millis());
		let edge = TrustEdge::new(trust, timestamp);
		ensure_newer(existing.as_ref(), &edge, &self.root, node)?;
		Ok(edge)
	}

	/// Writes a trust edge produced by [`Self::raised_trust`].
	fn commit_trust(&mut self, node: &NodeId, edge: TrustEdge, changes: &mut Changes) {
		self.trust_graph.add_node(Node::new(node.clone()));
		if let Err(e) = self.trust_graph.add_edge(&self.root, node, edge) {
			warn!("Trust of {} towards {} left unchanged: {}", self.root, node, e);
			return;
		}
		debug!("Trust of {} towards {} is now {}", self.root, node, edge.trust);
		changes.trust_sources.insert(self.root.clone());
		changes.hybrid.insert(NodeOrItem::Node(self.root.clone()));
	}

	fn refresh(&mut self, changes: &Changes) {
		if changes.is_empty() {
			return;
		}
		let trust_sources: Vec<NodeId> = changes.trust_sources.iter().cloned().collect();
		let hybrid: Vec<NodeOrItem> = changes.hybrid.iter().cloned().collect();
		let trust_walks = if trust_sources.is_empty() {
			0
		} else {
			self.page_rank.modify_edges(&trust_sources, &self.trust_graph)
		};
		let hybrid_walks =
			self.hybrid.modify_nodes_or_items(&hybrid, &self.trust_graph, &self.affinity_graph);
		debug!("Re-simulated {} trust and {} hybrid walks", trust_walks, hybrid_walks);
	}
}

fn descending(a: f64, b: f64) -> Ordering {
	b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> RankingConfig {
		RankingConfig {
			repetitions: 1000,
			max_walk_length: 30,
			reset_probability: 0.05,
			exploration_probability: 0.2,
			seed: Some(17),
			..RankingConfig::default()
		}
	}

	fn network() -> TrustNetwork {
		TrustNetwork::new("root".into(), config()).unwrap()
	}

	#[test]
	fn test_new_network_holds_root() {
		let network = network();
		assert!(network.trust_graph().contains_node(&"root".into()));
		assert!(network.affinity_graph().contains_node(&"root".into()));
		assert!(TrustNetwork::new("root".into(), RankingConfig { repetitions: 0, ..config() }).is_err());
	}

	#[test]
	fn test_affinity_upsert_creates_vertices() {
		let mut network = network();
		network.add_node_to_item_edge(&"peer".into(), &"song".into(), AffinityEdge::new(0.4, 10)).unwrap();
		assert!(network.affinity_graph().contains_node(&"peer".into()));
		assert!(network.affinity_graph().contains_item(&"song".into()));
		assert_eq!(network.node_to_item_edges().len(), 1);
	}

	#[test]
	fn test_stale_affinity_is_noop() {
		let mut network = network();
		network.add_node_to_item_edge(&"peer".into(), &"song".into(), AffinityEdge::new(0.4, 10)).unwrap();
		let before = network.node_to_item_edges();

		let res = network.add_node_to_item_edge(&"peer".into(), &"song".into(), AffinityEdge::new(0.9, 10));
		assert!(res.unwrap_err().is_stale());
		assert_eq!(network.node_to_item_edges(), before);
	}

	#[test]
	fn test_root_affinity_propagates_trust() {
		let mut network = network();
		network.add_node_to_item_edge(&"a".into(), &"song".into(), AffinityEdge::new(0.5, 1)).unwrap();
		network.add_node_to_item_edge(&"b".into(), &"song".into(), AffinityEdge::new(0.25, 1)).unwrap();
		assert_eq!(network.node_to_node_edges().len(), 0);

		network.add_node_to_item_edge(&"root".into(), &"song".into(), AffinityEdge::new(1.0, 2)).unwrap();
		let trust = |peer: &str| network.trust_graph().edge(&"root".into(), &peer.into()).map(|e| e.trust);
		assert_eq!(trust("a"), Some(0.5));
		assert_eq!(trust("b"), Some(0.25));

		// A later increase adds the scaled difference on top.
		network.add_node_to_item_edge(&"root".into(), &"song".into(), AffinityEdge::new(3.0, 3)).unwrap();
		let trust = |peer: &str| network.trust_graph().edge(&"root".into(), &peer.into()).map(|e| e.trust);
		assert_eq!(trust("a"), Some(1.5));
		assert_eq!(trust("b"), Some(0.75));
	}

	#[test]
	fn test_pinned_trust_does_not_block_root_affinity() {
		let mut network = network();
		let report = network.apply_deltas(vec![
			EdgeDelta::Trust { source: "root".into(), target: "a".into(), trust: 1.0, timestamp: u64::MAX },
			EdgeDelta::Affinity { node: "a".into(), item: "song".into(), affinity: 1.0, timestamp: 1 },
		]);
		assert_eq!(report.applied, 2);

		network.add_node_to_item_edge(&"root".into(), &"song".into(), AffinityEdge::new(1.0, 5)).unwrap();
		assert_eq!(
			network.affinity_graph().edge(&"root".into(), &"song".into()),
			Some(&AffinityEdge::new(1.0, 5))
		);
		let pinned = network.trust_graph().edge(&"root".into(), &"a".into()).copied();
		assert_eq!(pinned, Some(TrustEdge::new(1.0, u64::MAX)));

		// A direct raise is rejected without touching the graph.
		let res = network.update_node_trust(&"a".into(), 1.0);
		assert!(res.unwrap_err().is_stale());
		assert_eq!(network.trust_graph().edge(&"root".into(), &"a".into()).copied(), pinned);
	}

	#[test]
	fn test_stale_upserts_leave_scores_unchanged() {
		let mut network = network();
		network.add_node_to_node_edge(&"root".into(), &"a".into(), TrustEdge::new(1.0, 10)).unwrap();
		network.add_node_to_node_edge(&"a".into(), &"b".into(), TrustEdge::new(1.0, 10)).unwrap();
		network.add_node_to_item_edge(&"a".into(), &"song".into(), AffinityEdge::new(1.0, 10)).unwrap();
		network.add_node_to_item_edge(&"b".into(), &"tune".into(), AffinityEdge::new(1.0, 10)).unwrap();
		network.calculate_rankings();
		let nodes = network.node_scores();
		let items = network.top_items(10);
		let trust_edges = network.node_to_node_edges();
		let affinity_edges = network.node_to_item_edges();

		let res = network.add_node_to_node_edge(&"root".into(), &"a".into(), TrustEdge::new(9.0, 10));
		assert!(res.unwrap_err().is_stale());
		let res = network.add_node_to_item_edge(&"b".into(), &"tune".into(), AffinityEdge::new(9.0, 3));
		assert!(res.unwrap_err().is_stale());
		network.calculate_rankings();

		assert_eq!(network.node_to_node_edges(), trust_edges);
		assert_eq!(network.node_to_item_edges(), affinity_edges);
		assert_eq!(network.node_scores(), nodes);
		assert_eq!(network.top_items(10), items);
	}

	#[test]
	fn test_withdrawn_affinity_can_zero_trust() {
		let mut network = network();
		network.add_node_to_node_edge(&"root".into(), &"b".into(), TrustEdge::new(1.0, 1)).unwrap();
		network.add_node_to_item_edge(&"a".into(), &"song".into(), AffinityEdge::new(1.0, 1)).unwrap();
		network.add_node_to_item_edge(&"root".into(), &"song".into(), AffinityEdge::new(1.0, 2)).unwrap();
		network.add_node_to_item_edge(&"root".into(), &"song".into(), AffinityEdge::new(0.0, 3)).unwrap();

		// The edge is kept at zero trust, so walks no longer follow it.
		let edge = network.trust_graph().edge(&"root".into(), &"a".into()).copied().unwrap();
		assert_eq!(edge.trust, 0.0);
		network.calculate_rankings();
		let score = |id: &str| network.trust_graph().node(&id.into()).unwrap().personalized_page_rank();
		assert_eq!(score("a"), 0.0);
		assert!(score("b") > 0.0);
	}

	#[test]
	fn test_non_root_affinity_does_not_propagate() {
		let mut network = network();
		network.add_node_to_item_edge(&"root".into(), &"song".into(), AffinityEdge::new(1.0, 1)).unwrap();
		network.add_node_to_item_edge(&"a".into(), &"song".into(), AffinityEdge::new(0.5, 2)).unwrap();
		assert!(network.trust_graph().edge(&"root".into(), &"a".into()).is_none());
	}

	#[test]
	fn test_trust_self_loop_leaves_no_vertex() {
		let mut network = network();
		let res = network.add_node_to_node_edge(&"x".into(), &"x".into(), TrustEdge::new(1.0, 1));
		assert!(matches!(res, Err(TrustError::InvalidEdgeType(_))));
		assert!(!network.trust_graph().contains_node(&"x".into()));
	}

	#[test]
	fn test_rankings_follow_trust() {
		let mut network = network();
		network.add_node_to_node_edge(&"root".into(), &"friend".into(), TrustEdge::new(1.0, 1)).unwrap();
		network.add_node_to_node_edge(&"friend".into(), &"fof".into(), TrustEdge::new(1.0, 1)).unwrap();
		network.add_node_to_item_edge(&"friend".into(), &"hit".into(), AffinityEdge::new(1.0, 1)).unwrap();
		network.add_node_to_item_edge(&"fof".into(), &"deep".into(), AffinityEdge::new(1.0, 1)).unwrap();
		network.calculate_rankings();

		let scores = network.node_scores();
		assert_eq!(scores.iter().find(|(id, _)| id.as_str() == "root").map(|s| s.1), Some(0.0));
		assert!(scores[0].1 > 0.0);

		let top = network.top_items(5);
		assert_eq!(top.len(), 2);
		assert!(top.iter().all(|(_, score)| *score > 0.0));
		assert!(top[0].1 >= top[1].1);
		assert!((top.iter().map(|(_, s)| s).sum::<f64>() - 1.0).abs() < 1e-3);

		let friend = network.affinity_graph().node(&"friend".into()).unwrap();
		assert!(friend.personalized_page_rank() > 0.0);
	}

	#[test]
	fn test_apply_deltas_counts_outcomes() {
		let mut network = network();
		let deltas = vec![
			EdgeDelta::Trust { source: "root".into(), target: "a".into(), trust: 1.0, timestamp: 5 },
			EdgeDelta::Affinity { node: "a".into(), item: "song".into(), affinity: 0.8, timestamp: 5 },
			EdgeDelta::Trust { source: "root".into(), target: "a".into(), trust: 2.0, timestamp: 5 },
			EdgeDelta::Trust { source: "b".into(), target: "b".into(), trust: 2.0, timestamp: 5 },
		];
		let report = network.apply_deltas(deltas);
		assert_eq!(report, BatchReport { applied: 2, stale: 1, rejected: 1 });
		assert_eq!(network.trust_graph().edge(&"root".into(), &"a".into()).unwrap().trust, 1.0);
	}

	#[test]
	fn test_remove_edge_and_serialize() {
		let mut network = network();
		network.add_node_to_item_edge(&"a".into(), &"song".into(), AffinityEdge::new(0.8, 5)).unwrap();
		network.add_node_to_node_edge(&"root".into(), &"a".into(), TrustEdge::new(1.0, 5)).unwrap();

		let serialized = network.serialize().unwrap();
		let restored = TrustNetwork::from_serialized("root".into(), &serialized, config()).unwrap();
		assert_eq!(restored.node_to_node_edges(), network.node_to_node_edges());
		assert_eq!(restored.node_to_item_edges(), network.node_to_item_edges());

		assert!(network.remove_node_to_item_edge(&"a".into(), &"song".into()).is_some());
		assert!(network.remove_node_to_item_edge(&"a".into(), &"song".into()).is_none());
		network.calculate_rankings();
		assert!(network.top_items(3).iter().all(|(_, score)| *score == 0.0));
	}
}
