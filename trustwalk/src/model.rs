//! # Model Module.
//!
//! Vertex and edge types shared by the trust graph and the affinity graph.
//! Vertices are identified by cheap, reference-counted identifiers so that
//! recorded random walks can hold them without copying strings.

use serde::{Deserialize, Serialize};
use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	sync::Arc,
	time::{SystemTime, UNIX_EPOCH},
};

macro_rules! identifier {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Arc<str>);

		impl $name {
			/// Creates a new identifier.
			pub fn new(id: impl AsRef<str>) -> Self {
				Self(Arc::from(id.as_ref()))
			}

			/// Returns the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self::new(id)
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(Arc::from(id))
			}
		}

		impl Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
				write!(f, "{}", self.0)
			}
		}
	};
}

identifier!(
	/// Stable address of a peer.
	NodeId
);

identifier!(
	/// Stable content identifier of a recommendable item.
	ItemId
);

/// A peer vertex.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
	id: NodeId,
	personalized_page_rank: f64,
}

impl Node {
	/// Creates a node with a zero personalized PageRank score.
	pub fn new(id: impl Into<NodeId>) -> Self {
		Self { id: id.into(), personalized_page_rank: 0.0 }
	}

	/// Creates a node carrying a previously computed personalized PageRank score.
	pub fn with_personalized_page_rank(id: impl Into<NodeId>, score: f64) -> Self {
		Self { id: id.into(), personalized_page_rank: score }
	}

	/// Returns the node identifier.
	pub fn id(&self) -> &NodeId {
		&self.id
	}

	/// Returns the last personalized PageRank score written by a ranking run.
	pub fn personalized_page_rank(&self) -> f64 {
		self.personalized_page_rank
	}

	pub(crate) fn set_personalized_page_rank(&mut self, score: f64) {
		self.personalized_page_rank = score;
	}
}

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for Node {}

/// A recommendable item vertex.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
	id: ItemId,
	ranking_score: f64,
}

impl Item {
	/// Creates an item with a zero ranking score.
	pub fn new(id: impl Into<ItemId>) -> Self {
		Self { id: id.into(), ranking_score: 0.0 }
	}

	/// Returns the item identifier.
	pub fn id(&self) -> &ItemId {
		&self.id
	}

	/// Returns the last ranking score written by a ranking run.
	pub fn ranking_score(&self) -> f64 {
		self.ranking_score
	}

	pub(crate) fn set_ranking_score(&mut self, score: f64) {
		self.ranking_score = score;
	}
}

impl PartialEq for Item {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for Item {}

/// A handle to a vertex of either kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeOrItem {
	/// A peer.
	Node(NodeId),
	/// A recommendable item.
	Item(ItemId),
}

impl NodeOrItem {
	/// Returns true if the handle points to a peer.
	pub fn is_node(&self) -> bool {
		matches!(self, NodeOrItem::Node(_))
	}

	/// Returns true if the handle points to an item.
	pub fn is_item(&self) -> bool {
		matches!(self, NodeOrItem::Item(_))
	}

	/// Returns the node identifier, if this is a node.
	pub fn as_node(&self) -> Option<&NodeId> {
		match self {
			NodeOrItem::Node(id) => Some(id),
			NodeOrItem::Item(_) => None,
		}
	}

	/// Returns the item identifier, if this is an item.
	pub fn as_item(&self) -> Option<&ItemId> {
		match self {
			NodeOrItem::Item(id) => Some(id),
			NodeOrItem::Node(_) => None,
		}
	}
}

impl From<NodeId> for NodeOrItem {
	fn from(id: NodeId) -> Self {
		NodeOrItem::Node(id)
	}
}

impl From<ItemId> for NodeOrItem {
	fn from(id: ItemId) -> Self {
		NodeOrItem::Item(id)
	}
}

impl Display for NodeOrItem {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			NodeOrItem::Node(id) => write!(f, "node:{}", id),
			NodeOrItem::Item(id) => write!(f, "item:{}", id),
		}
	}
}

/// Common view over timestamped, weighted edges.
pub trait TimestampedEdge {
	/// Weight of the edge.
	fn weight(&self) -> f64;
	/// Last update time in milliseconds.
	fn timestamp(&self) -> u64;
}

/// Directed trust from one peer towards another.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrustEdge {
	/// Trust weight.
	pub trust: f64,
	/// Update time in milliseconds since the unix epoch.
	pub timestamp: u64,
}

impl TrustEdge {
	/// Creates a trust edge with an explicit timestamp.
	pub fn new(trust: f64, timestamp: u64) -> Self {
		Self { trust, timestamp }
	}

	/// Creates a trust edge stamped with the current time.
	pub fn now(trust: f64) -> Self {
		Self { trust, timestamp: now_millis() }
	}
}

impl TimestampedEdge for TrustEdge {
	fn weight(&self) -> f64 {
		self.trust
	}

	fn timestamp(&self) -> u64 {
		self.timestamp
	}
}

/// Endorsement of an item by a peer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffinityEdge {
	/// Affinity weight.
	pub affinity: f64,
	/// Update time in milliseconds since the unix epoch.
	pub timestamp: u64,
}

impl AffinityEdge {
	/// Creates an affinity edge with an explicit timestamp.
	pub fn new(affinity: f64, timestamp: u64) -> Self {
		Self { affinity, timestamp }
	}

	/// Creates an affinity edge stamped with the current time.
	pub fn now(affinity: f64) -> Self {
		Self { affinity, timestamp: now_millis() }
	}
}

impl TimestampedEdge for AffinityEdge {
	fn weight(&self) -> f64 {
		self.affinity
	}

	fn timestamp(&self) -> u64 {
		self.timestamp
	}
}

/// Milliseconds since the unix epoch, or 0 if the clock is before it.
pub fn now_millis() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn test_node_equality_ignores_score() {
		let a = Node::new("peer");
		let b = Node::with_personalized_page_rank("peer", 0.3);
		assert_eq!(a, b);
		assert_eq!(b.personalized_page_rank(), 0.3);
	}

	#[test]
	fn test_node_or_item_kinds_are_distinct() {
		let node = NodeOrItem::from(NodeId::new("x"));
		let item = NodeOrItem::from(ItemId::new("x"));
		assert_ne!(node, item);
		assert!(node.is_node());
		assert!(item.is_item());
		assert_eq!(item.as_item().map(ItemId::as_str), Some("x"));

		let set: HashSet<NodeOrItem> = vec![node.clone(), item, node].into_iter().collect();
		assert_eq!(set.len(), 2);
	}

	#[test]
	fn test_identifier_serde_is_transparent() {
		let id = NodeId::new("abc");
		assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
		let back: NodeId = serde_json::from_str("\"abc\"").unwrap();
		assert_eq!(back, id);
	}
}
