//! # Affinity Graph Module.
//!
//! An undirected, weighted bipartite graph between peers and items. Every
//! edge joins exactly one node and one item; the typed
//! [`AffinityGraph::add_affinity`] makes that structural, while
//! [`AffinityGraph::add_edge`] accepts untyped handles and rejects same-kind
//! pairs.

use super::{ensure_newer, Slot};
use crate::{
	error::TrustError,
	model::{AffinityEdge, Item, ItemId, Node, NodeId, NodeOrItem},
};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Bipartite affinity graph between peers and items.
#[derive(Clone, Debug, Default)]
pub struct AffinityGraph {
	nodes: Vec<Node>,
	node_index: HashMap<NodeId, usize>,
	items: Vec<Item>,
	item_index: HashMap<ItemId, usize>,
	/// Vertices of both kinds in insertion order.
	vertices: Vec<NodeOrItem>,
	node_edges: HashMap<NodeId, BTreeMap<ItemId, Slot<AffinityEdge>>>,
	/// Mirror of `node_edges` keyed by item.
	item_edges: HashMap<ItemId, BTreeMap<NodeId, AffinityEdge>>,
	order: BTreeMap<u64, (NodeId, ItemId)>,
	next_seq: u64,
}

impl AffinityGraph {
	/// Creates an empty affinity graph.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a node. Returns false if it is already present.
	pub fn add_node(&mut self, node: Node) -> bool {
		if self.node_index.contains_key(node.id()) {
			return false;
		}
		self.node_index.insert(node.id().clone(), self.nodes.len());
		self.vertices.push(NodeOrItem::Node(node.id().clone()));
		self.nodes.push(node);
		true
	}

	/// Inserts an item. Returns false if it is already present.
	pub fn add_item(&mut self, item: Item) -> bool {
		if self.item_index.contains_key(item.id()) {
			return false;
		}
		self.item_index.insert(item.id().clone(), self.items.len());
		self.vertices.push(NodeOrItem::Item(item.id().clone()));
		self.items.push(item);
		true
	}

	/// Inserts a vertex of either kind with default scores.
	pub fn add_vertex(&mut self, vertex: NodeOrItem) -> bool {
		match vertex {
			NodeOrItem::Node(id) => self.add_node(Node::new(id)),
			NodeOrItem::Item(id) => self.add_item(Item::new(id)),
		}
	}

	/// Checks whether the node is a vertex of the graph.
	pub fn contains_node(&self, id: &NodeId) -> bool {
		self.node_index.contains_key(id)
	}

	/// Checks whether the item is a vertex of the graph.
	pub fn contains_item(&self, id: &ItemId) -> bool {
		self.item_index.contains_key(id)
	}

	/// Checks whether the vertex is present.
	pub fn contains_vertex(&self, vertex: &NodeOrItem) -> bool {
		match vertex {
			NodeOrItem::Node(id) => self.contains_node(id),
			NodeOrItem::Item(id) => self.contains_item(id),
		}
	}

	/// Returns the node with the given identifier.
	pub fn node(&self, id: &NodeId) -> Option<&Node> {
		self.node_index.get(id).map(|&i| &self.nodes[i])
	}

	pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
		let i = *self.node_index.get(id)?;
		self.nodes.get_mut(i)
	}

	/// Returns the item with the given identifier.
	pub fn item(&self, id: &ItemId) -> Option<&Item> {
		self.item_index.get(id).map(|&i| &self.items[i])
	}

	pub(crate) fn item_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
		let i = *self.item_index.get(id)?;
		self.items.get_mut(i)
	}

	/// All nodes in insertion order.
	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	/// All items in insertion order.
	pub fn items(&self) -> &[Item] {
		&self.items
	}

	/// All vertices of both kinds in insertion order.
	pub fn vertices(&self) -> &[NodeOrItem] {
		&self.vertices
	}

	/// Number of edges.
	pub fn edge_count(&self) -> usize {
		self.order.len()
	}

	/// Returns the edge between `node` and `item`, if any.
	pub fn edge(&self, node: &NodeId, item: &ItemId) -> Option<&AffinityEdge> {
		self.node_edges.get(node)?.get(item).map(|slot| &slot.edge)
	}

	/// Upserts the affinity of `node` towards `item`.
	pub fn add_affinity(
		&mut self, node: &NodeId, item: &ItemId, edge: AffinityEdge,
	) -> Result<(), TrustError> {
		if !self.contains_node(node) {
			return Err(TrustError::MissingVertex(format!(
				"node {} of affinity edge",
				node
			)));
		}
		if !self.contains_item(item) {
			return Err(TrustError::MissingVertex(format!(
				"item {} of affinity edge",
				item
			)));
		}
		ensure_newer(self.edge(node, item), &edge, node, item)?;

		let seq = self.next_seq;
		self.next_seq += 1;
		let previous =
			self.node_edges.entry(node.clone()).or_default().insert(item.clone(), Slot { edge, seq });
		if let Some(previous) = previous {
			debug!("Overwriting affinity edge between {} and {}", node, item);
			self.order.remove(&previous.seq);
		}
		self.item_edges.entry(item.clone()).or_default().insert(node.clone(), edge);
		self.order.insert(seq, (node.clone(), item.clone()));

		Ok(())
	}

	/// Upserts an edge between two untyped vertices, in either order.
	///
	/// Fails with `InvalidEdgeType` without touching the graph when both
	/// endpoints are of the same kind.
	pub fn add_edge(
		&mut self, source: &NodeOrItem, target: &NodeOrItem, edge: AffinityEdge,
	) -> Result<(), TrustError> {
		match (source, target) {
			(NodeOrItem::Node(node), NodeOrItem::Item(item))
			| (NodeOrItem::Item(item), NodeOrItem::Node(node)) => self.add_affinity(node, item, edge),
			_ => Err(TrustError::InvalidEdgeType(format!(
				"affinity edge between {} and {} must join a node and an item",
				source, target
			))),
		}
	}

	/// Detaches the edge between `node` and `item` and returns it.
	pub fn remove_edge(&mut self, node: &NodeId, item: &ItemId) -> Option<AffinityEdge> {
		let items = self.node_edges.get_mut(node)?;
		let slot = items.remove(item)?;
		if items.is_empty() {
			self.node_edges.remove(node);
		}
		if let Some(endorsers) = self.item_edges.get_mut(item) {
			endorsers.remove(node);
			if endorsers.is_empty() {
				self.item_edges.remove(item);
			}
		}
		self.order.remove(&slot.seq);
		Some(slot.edge)
	}

	/// Items `node` has an affinity towards, ordered by item identifier.
	pub fn items_of<'a>(
		&'a self, node: &NodeId,
	) -> impl Iterator<Item = (&'a ItemId, &'a AffinityEdge)> + Clone + 'a {
		self.node_edges
			.get(node)
			.into_iter()
			.flat_map(|items| items.iter().map(|(item, slot)| (item, &slot.edge)))
	}

	/// Nodes with an affinity towards `item`, ordered by node identifier.
	pub fn endorsers_of<'a>(
		&'a self, item: &ItemId,
	) -> impl Iterator<Item = (&'a NodeId, &'a AffinityEdge)> + Clone + 'a {
		self.item_edges.get(item).into_iter().flat_map(|nodes| nodes.iter())
	}

	/// Snapshot of all edges, in the order they were last upserted.
	pub fn edges(&self) -> Vec<(NodeId, ItemId, AffinityEdge)> {
		self.order
			.values()
			.filter_map(|(node, item)| {
				self.edge(node, item).map(|edge| (node.clone(), item.clone(), *edge))
			})
			.collect()
	}

	pub(crate) fn reset_ranking_scores(&mut self) {
		for item in self.items.iter_mut() {
			item.set_ranking_score(0.0);
		}
	}
}
