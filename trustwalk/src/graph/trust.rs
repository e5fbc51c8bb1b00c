//! # Trust Graph Module.
//!
//! A directed, weighted graph over peers. Each edge carries the trust the
//! source extends to the target and the time of its last update.

use super::{ensure_newer, Slot};
use crate::{
	error::TrustError,
	model::{Node, NodeId, TrustEdge},
};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Directed trust graph between peers.
#[derive(Clone, Debug, Default)]
pub struct TrustGraph {
	/// Vertices in insertion order.
	nodes: Vec<Node>,
	index: HashMap<NodeId, usize>,
	out_edges: HashMap<NodeId, BTreeMap<NodeId, Slot<TrustEdge>>>,
	/// Edge endpoints keyed by upsert sequence number.
	order: BTreeMap<u64, (NodeId, NodeId)>,
	next_seq: u64,
}

impl TrustGraph {
	/// Creates an empty trust graph.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a node. Returns false if a node with the same identifier exists.
	pub fn add_node(&mut self, node: Node) -> bool {
		if self.index.contains_key(node.id()) {
			return false;
		}
		self.index.insert(node.id().clone(), self.nodes.len());
		self.nodes.push(node);
		true
	}

	/// Checks whether the node is a vertex of the graph.
	pub fn contains_node(&self, id: &NodeId) -> bool {
		self.index.contains_key(id)
	}

	/// Returns the node with the given identifier.
	pub fn node(&self, id: &NodeId) -> Option<&Node> {
		self.index.get(id).map(|&i| &self.nodes[i])
	}

	pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
		let i = *self.index.get(id)?;
		self.nodes.get_mut(i)
	}

	/// All nodes in insertion order.
	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	/// Number of nodes.
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	/// Number of edges.
	pub fn edge_count(&self) -> usize {
		self.order.len()
	}

	/// Returns the edge from `source` to `target`, if any.
	pub fn edge(&self, source: &NodeId, target: &NodeId) -> Option<&TrustEdge> {
		self.out_edges.get(source)?.get(target).map(|slot| &slot.edge)
	}

	/// Upserts the edge from `source` to `target`.
	///
	/// Both endpoints must already be vertices, self-loops are rejected, and an
	/// existing edge is only replaced by a strictly newer one.
	pub fn add_edge(
		&mut self, source: &NodeId, target: &NodeId, edge: TrustEdge,
	) -> Result<(), TrustError> {
		if source == target {
			return Err(TrustError::InvalidEdgeType(format!(
				"trust self-loop on {}",
				source
			)));
		}
		if !self.contains_node(source) {
			return Err(TrustError::MissingVertex(format!(
				"source {} of trust edge",
				source
			)));
		}
		if !self.contains_node(target) {
			return Err(TrustError::MissingVertex(format!(
				"target {} of trust edge",
				target
			)));
		}
		ensure_newer(self.edge(source, target), &edge, source, target)?;

		let seq = self.next_seq;
		self.next_seq += 1;
		let previous =
			self.out_edges.entry(source.clone()).or_default().insert(target.clone(), Slot { edge, seq });
		if let Some(previous) = previous {
			debug!("Overwriting trust edge from {} to {}", source, target);
			self.order.remove(&previous.seq);
		}
		self.order.insert(seq, (source.clone(), target.clone()));

		Ok(())
	}

	/// Detaches the edge from `source` to `target` and returns it.
	pub fn remove_edge(&mut self, source: &NodeId, target: &NodeId) -> Option<TrustEdge> {
		let targets = self.out_edges.get_mut(source)?;
		let slot = targets.remove(target)?;
		if targets.is_empty() {
			self.out_edges.remove(source);
		}
		self.order.remove(&slot.seq);
		Some(slot.edge)
	}

	/// Outgoing edges of `source`, ordered by target identifier.
	pub fn out_edges<'a>(
		&'a self, source: &NodeId,
	) -> impl Iterator<Item = (&'a NodeId, &'a TrustEdge)> + Clone + 'a {
		self.out_edges
			.get(source)
			.into_iter()
			.flat_map(|targets| targets.iter().map(|(target, slot)| (target, &slot.edge)))
	}

	/// Number of outgoing edges of `source`.
	pub fn out_degree(&self, source: &NodeId) -> usize {
		self.out_edges.get(source).map_or(0, BTreeMap::len)
	}

	/// Snapshot of all edges, in the order they were last upserted.
	pub fn edges(&self) -> Vec<(NodeId, NodeId, TrustEdge)> {
		self.order
			.values()
			.filter_map(|(source, target)| {
				self.edge(source, target).map(|edge| (source.clone(), target.clone(), *edge))
			})
			.collect()
	}

	pub(crate) fn reset_scores(&mut self) {
		for node in self.nodes.iter_mut() {
			node.set_personalized_page_rank(0.0);
		}
	}
}
