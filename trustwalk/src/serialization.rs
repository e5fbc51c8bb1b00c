//! # Serialization Module.
//!
//! A line-oriented, human-auditable text encoding for both graphs:
//!
//! ```text
//! c <comment>
//! p nodeToSong <numVertices> <numEdges>
//! n <index> <nodeIdentifier> <personalizedPageRankScore>
//! s <index> <itemIdentifier>
//! e <sourceIndex> <targetIndex> <weight> <timestampMillis>
//! ```
//!
//! The trust graph uses a `p nodeToNode` header and has no `s` lines. Indices
//! are 1-based in vertex insertion order, and edges are listed in upsert order,
//! so encoding a decoded graph reproduces the same text. Parsing builds a fresh
//! graph and either returns all of it or an error.

use crate::{
	error::TrustError,
	graph::{AffinityGraph, TrustGraph},
	model::{AffinityEdge, Item, Node, NodeOrItem, TrustEdge},
};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::{
	collections::HashMap,
	fmt::{self, Write as FmtWrite},
	io::{Read, Write},
	str::SplitWhitespace,
};

const HEADER: &str = "c\nc SOURCE: trustwalk compact graph export\nc\n";
const NODE_TO_ITEM: &str = "nodeToSong";
const NODE_TO_NODE: &str = "nodeToNode";

/// Graphs with a compact text encoding.
pub trait CompactSerialize: Sized {
	/// Encodes the graph as compact text.
	fn to_compact(&self) -> Result<String, TrustError>;

	/// Decodes a graph from compact text.
	fn from_compact(text: &str) -> Result<Self, TrustError>;

	/// Encodes the graph as gzip-compressed compact text.
	fn to_compressed(&self) -> Result<Vec<u8>, TrustError> {
		let text = self.to_compact()?;
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(text.as_bytes()).map_err(TrustError::IOError)?;
		encoder.finish().map_err(TrustError::IOError)
	}

	/// Decodes a graph from gzip-compressed compact text.
	fn from_compressed(bytes: &[u8]) -> Result<Self, TrustError> {
		let mut text = String::new();
		GzDecoder::new(bytes)
			.read_to_string(&mut text)
			.map_err(|e| TrustError::MalformedInput(format!("gzip: {}", e)))?;
		Self::from_compact(&text)
	}
}

/// Both graphs of a trust network in compact text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSubNetworks {
	/// The trust graph.
	pub node_to_node: String,
	/// The affinity graph.
	pub node_to_item: String,
}

impl SerializedSubNetworks {
	/// Encodes both graphs.
	pub fn new(trust: &TrustGraph, affinity: &AffinityGraph) -> Result<Self, TrustError> {
		Ok(Self { node_to_node: trust.to_compact()?, node_to_item: affinity.to_compact()? })
	}

	/// Decodes both graphs.
	pub fn graphs(&self) -> Result<(TrustGraph, AffinityGraph), TrustError> {
		Ok((TrustGraph::from_compact(&self.node_to_node)?, AffinityGraph::from_compact(&self.node_to_item)?))
	}

	/// Encodes the pair as JSON.
	pub fn to_json(&self) -> Result<String, TrustError> {
		serde_json::to_string(self).map_err(|e| TrustError::SerializationError(e.to_string()))
	}

	/// Decodes the pair from JSON.
	pub fn from_json(json: &str) -> Result<Self, TrustError> {
		serde_json::from_str(json).map_err(|e| TrustError::MalformedInput(e.to_string()))
	}
}

fn check_identifier(id: &str) -> Result<&str, TrustError> {
	if id.is_empty() || id.chars().any(char::is_whitespace) {
		return Err(TrustError::SerializationError(format!(
			"identifier {:?} cannot be written in the compact format",
			id
		)));
	}
	Ok(id)
}

fn write_error(e: fmt::Error) -> TrustError {
	TrustError::SerializationError(e.to_string())
}

impl CompactSerialize for AffinityGraph {
	fn to_compact(&self) -> Result<String, TrustError> {
		let edges = self.edges();
		let mut out = String::from(HEADER);
		let mut index = HashMap::new();
		writeln!(out, "p {} {} {}", NODE_TO_ITEM, self.vertices().len(), edges.len()).map_err(write_error)?;
		for (i, vertex) in self.vertices().iter().enumerate() {
			index.insert(vertex, i + 1);
			match vertex {
				NodeOrItem::Node(id) => {
					let score = self.node(id).map_or(0.0, Node::personalized_page_rank);
					writeln!(out, "n {} {} {:?}", i + 1, check_identifier(id.as_str())?, score).map_err(write_error)?;
				},
				NodeOrItem::Item(id) => {
					writeln!(out, "s {} {}", i + 1, check_identifier(id.as_str())?).map_err(write_error)?;
				},
			}
		}
		for (node, item, edge) in &edges {
			let source = index.get(&NodeOrItem::Node(node.clone())).copied().unwrap_or(0);
			let target = index.get(&NodeOrItem::Item(item.clone())).copied().unwrap_or(0);
			writeln!(out, "e {} {} {:?} {}", source, target, edge.affinity, edge.timestamp).map_err(write_error)?;
		}
		Ok(out)
	}

	fn from_compact(text: &str) -> Result<Self, TrustError> {
		let mut parser = Parser::new(NODE_TO_ITEM);
		let mut graph = AffinityGraph::new();
		for (number, line) in text.lines().enumerate() {
			let mut tokens = line.split_whitespace();
			match tokens.next() {
				None | Some("c") => continue,
				Some("p") => parser.problem(&mut tokens, number)?,
				Some("n") => {
					let id = parser.vertex(&mut tokens, number)?;
					let score = parser.float(&mut tokens, number)?;
					if !graph.add_node(Node::with_personalized_page_rank(id, score)) {
						return Err(parser.error(number, "duplicate node"));
					}
					parser.declare(NodeOrItem::Node(id.into()), number)?;
				},
				Some("s") => {
					let id = parser.vertex(&mut tokens, number)?;
					if !graph.add_item(Item::new(id)) {
						return Err(parser.error(number, "duplicate item"));
					}
					parser.declare(NodeOrItem::Item(id.into()), number)?;
				},
				Some("e") => {
					let (source, target) = parser.endpoints(&mut tokens, number)?;
					let affinity = parser.float(&mut tokens, number)?;
					let timestamp = parser.timestamp(&mut tokens, number)?;
					graph
						.add_edge(&source, &target, AffinityEdge::new(affinity, timestamp))
						.map_err(|e| parser.error(number, &e.to_string()))?;
					parser.edges += 1;
				},
				Some(other) => return Err(parser.error(number, &format!("unknown line type {}", other))),
			}
			parser.finish_line(&mut tokens, number)?;
		}
		parser.check_counts()?;
		Ok(graph)
	}
}

impl CompactSerialize for TrustGraph {
	fn to_compact(&self) -> Result<String, TrustError> {
		let edges = self.edges();
		let mut out = String::from(HEADER);
		let mut index = HashMap::new();
		writeln!(out, "p {} {} {}", NODE_TO_NODE, self.node_count(), edges.len()).map_err(write_error)?;
		for (i, node) in self.nodes().iter().enumerate() {
			index.insert(node.id(), i + 1);
			let id = check_identifier(node.id().as_str())?;
			writeln!(out, "n {} {} {:?}", i + 1, id, node.personalized_page_rank()).map_err(write_error)?;
		}
		for (source, target, edge) in &edges {
			let source = index.get(source).copied().unwrap_or(0);
			let target = index.get(target).copied().unwrap_or(0);
			writeln!(out, "e {} {} {:?} {}", source, target, edge.trust, edge.timestamp).map_err(write_error)?;
		}
		Ok(out)
	}

	fn from_compact(text: &str) -> Result<Self, TrustError> {
		let mut parser = Parser::new(NODE_TO_NODE);
		let mut graph = TrustGraph::new();
		for (number, line) in text.lines().enumerate() {
			let mut tokens = line.split_whitespace();
			match tokens.next() {
				None | Some("c") => continue,
				Some("p") => parser.problem(&mut tokens, number)?,
				Some("n") => {
					let id = parser.vertex(&mut tokens, number)?;
					let score = parser.float(&mut tokens, number)?;
					if !graph.add_node(Node::with_personalized_page_rank(id, score)) {
						return Err(parser.error(number, "duplicate node"));
					}
					parser.declare(NodeOrItem::Node(id.into()), number)?;
				},
				Some("e") => {
					let (source, target) = parser.endpoints(&mut tokens, number)?;
					let (Some(source), Some(target)) = (source.as_node(), target.as_node()) else {
						return Err(parser.error(number, "trust edges join two nodes"));
					};
					let trust = parser.float(&mut tokens, number)?;
					let timestamp = parser.timestamp(&mut tokens, number)?;
					graph
						.add_edge(source, target, TrustEdge::new(trust, timestamp))
						.map_err(|e| parser.error(number, &e.to_string()))?;
					parser.edges += 1;
				},
				Some(other) => return Err(parser.error(number, &format!("unknown line type {}", other))),
			}
			parser.finish_line(&mut tokens, number)?;
		}
		parser.check_counts()?;
		Ok(graph)
	}
}

/// Bookkeeping shared by both decoders.
struct Parser {
	kind: &'static str,
	declared: Option<(usize, usize)>,
	vertices: Vec<NodeOrItem>,
	edges: usize,
}

impl Parser {
	fn new(kind: &'static str) -> Self {
		Self { kind, declared: None, vertices: Vec::new(), edges: 0 }
	}

	fn error(&self, number: usize, reason: &str) -> TrustError {
		TrustError::MalformedInput(format!("{} line {}: {}", self.kind, number + 1, reason))
	}

	fn token<'a>(&self, tokens: &mut SplitWhitespace<'a>, number: usize) -> Result<&'a str, TrustError> {
		tokens.next().ok_or_else(|| self.error(number, "missing field"))
	}

	fn count(&self, tokens: &mut SplitWhitespace<'_>, number: usize) -> Result<usize, TrustError> {
		let token = self.token(tokens, number)?;
		token.parse().map_err(|_| self.error(number, &format!("invalid count {}", token)))
	}

	fn float(&self, tokens: &mut SplitWhitespace<'_>, number: usize) -> Result<f64, TrustError> {
		let token = self.token(tokens, number)?;
		token.parse().map_err(|_| self.error(number, &format!("invalid weight {}", token)))
	}

	fn timestamp(&self, tokens: &mut SplitWhitespace<'_>, number: usize) -> Result<u64, TrustError> {
		let token = self.token(tokens, number)?;
		token.parse().map_err(|_| self.error(number, &format!("invalid timestamp {}", token)))
	}

	fn problem(&mut self, tokens: &mut SplitWhitespace<'_>, number: usize) -> Result<(), TrustError> {
		if self.declared.is_some() {
			return Err(self.error(number, "duplicate problem line"));
		}
		let kind = self.token(tokens, number)?;
		if kind != self.kind {
			return Err(self.error(number, &format!("expected {} graph, found {}", self.kind, kind)));
		}
		let vertices = self.count(tokens, number)?;
		let edges = self.count(tokens, number)?;
		self.declared = Some((vertices, edges));
		Ok(())
	}

	/// Reads the index and identifier of a vertex line.
	fn vertex<'a>(&self, tokens: &mut SplitWhitespace<'a>, number: usize) -> Result<&'a str, TrustError> {
		if self.declared.is_none() {
			return Err(self.error(number, "vertex before problem line"));
		}
		let index = self.count(tokens, number)?;
		if index != self.vertices.len() + 1 {
			return Err(self.error(number, &format!("expected index {}, found {}", self.vertices.len() + 1, index)));
		}
		self.token(tokens, number)
	}

	fn declare(&mut self, vertex: NodeOrItem, number: usize) -> Result<(), TrustError> {
		if let Some((vertices, _)) = self.declared {
			if self.vertices.len() >= vertices {
				return Err(self.error(number, "more vertices than declared"));
			}
		}
		self.vertices.push(vertex);
		Ok(())
	}

	fn endpoints(
		&self, tokens: &mut SplitWhitespace<'_>, number: usize,
	) -> Result<(NodeOrItem, NodeOrItem), TrustError> {
		if self.declared.is_none() {
			return Err(self.error(number, "edge before problem line"));
		}
		let source = self.endpoint(tokens, number)?;
		let target = self.endpoint(tokens, number)?;
		Ok((source, target))
	}

	fn endpoint(&self, tokens: &mut SplitWhitespace<'_>, number: usize) -> Result<NodeOrItem, TrustError> {
		let index = self.count(tokens, number)?;
		index
			.checked_sub(1)
			.and_then(|i| self.vertices.get(i))
			.cloned()
			.ok_or_else(|| self.error(number, &format!("undeclared vertex {}", index)))
	}

	fn finish_line(&self, tokens: &mut SplitWhitespace<'_>, number: usize) -> Result<(), TrustError> {
		match tokens.next() {
			Some(extra) => Err(self.error(number, &format!("unexpected field {}", extra))),
			None => Ok(()),
		}
	}

	fn check_counts(&self) -> Result<(), TrustError> {
		let (vertices, edges) =
			self.declared.ok_or_else(|| TrustError::MalformedInput(format!("{}: missing problem line", self.kind)))?;
		if vertices != self.vertices.len() || edges != self.edges {
			return Err(TrustError::MalformedInput(format!(
				"{}: declared {} vertices and {} edges, found {} and {}",
				self.kind,
				vertices,
				edges,
				self.vertices.len(),
				self.edges
			)));
		}
		Ok(())
	}
}
