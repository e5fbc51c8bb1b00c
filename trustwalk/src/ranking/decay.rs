//! # MeritRank Decay Module.
//!
//! Decides which items have their walk traffic funneled through a single
//! other vertex. For every item, each walk reaching it contributes one visit
//! to every distinct vertex seen before the item's first occurrence in that
//! walk. If the most frequent such vertex, the root excluded, accounts for
//! more than the threshold share of the walks reaching the item, the item is
//! decayed.
//!
//! Two strategies compute the same answer: [`beta_decays_per_item`] rescans
//! the walks once per item and keeps a single counter table alive, while
//! [`beta_decays_visit_table`] makes one pass and keeps a table per item.

use super::RandomWalk;
use crate::model::{ItemId, NodeOrItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// How dominating vertices are counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayStrategy {
	/// Rescan all walks for each item.
	#[default]
	PerItemScan,
	/// Build an item to vertex visit table in a single pass.
	VisitTable,
}

/// Runs the selected strategy.
pub fn beta_decays(
	strategy: DecayStrategy, walks: &[RandomWalk<NodeOrItem>], root: &NodeOrItem, threshold: f64,
) -> HashMap<ItemId, bool> {
	match strategy {
		DecayStrategy::PerItemScan => beta_decays_per_item(walks, root, threshold),
		DecayStrategy::VisitTable => beta_decays_visit_table(walks, root, threshold),
	}
}

fn exceeds(max_visits: usize, total_visits: usize, threshold: f64) -> bool {
	total_visits > 0 && max_visits as f64 / total_visits as f64 > threshold
}

/// Memory-light strategy.
pub fn beta_decays_per_item(
	walks: &[RandomWalk<NodeOrItem>], root: &NodeOrItem, threshold: f64,
) -> HashMap<ItemId, bool> {
	let items: BTreeSet<&ItemId> = walks.iter().flatten().filter_map(NodeOrItem::as_item).collect();

	let mut decays = HashMap::new();
	let mut through: HashMap<&NodeOrItem, usize> = HashMap::new();
	for item in items {
		through.clear();
		let mut total_visits = 0;
		for walk in walks {
			let Some(first) = walk.iter().position(|v| v.as_item() == Some(item)) else {
				continue;
			};
			total_visits += 1;
			let mut seen = HashSet::new();
			for vertex in &walk[..first] {
				if vertex != root && seen.insert(vertex) {
					*through.entry(vertex).or_insert(0) += 1;
				}
			}
		}
		let max_visits = through.values().copied().max().unwrap_or(0);
		decays.insert(item.clone(), exceeds(max_visits, total_visits, threshold));
	}
	decays
}

/// Time-light strategy.
pub fn beta_decays_visit_table(
	walks: &[RandomWalk<NodeOrItem>], root: &NodeOrItem, threshold: f64,
) -> HashMap<ItemId, bool> {
	let mut total_visits: HashMap<&ItemId, usize> = HashMap::new();
	let mut table: HashMap<&ItemId, HashMap<&NodeOrItem, usize>> = HashMap::new();

	for walk in walks {
		let mut seen: Vec<&NodeOrItem> = Vec::new();
		let mut seen_set: HashSet<&NodeOrItem> = HashSet::new();
		for vertex in walk {
			if let Some(item) = vertex.as_item() {
				if !seen_set.contains(vertex) {
					*total_visits.entry(item).or_insert(0) += 1;
					let row = table.entry(item).or_default();
					for before in &seen {
						*row.entry(*before).or_insert(0) += 1;
					}
				}
			}
			if seen_set.insert(vertex) {
				seen.push(vertex);
			}
		}
	}

	total_visits
		.into_iter()
		.map(|(item, total)| {
			let max_visits = table
				.get(item)
				.and_then(|row| {
					row.iter().filter(|(vertex, _)| **vertex != root).map(|(_, n)| *n).max()
				})
				.unwrap_or(0);
			(item.clone(), exceeds(max_visits, total, threshold))
		})
		.collect()
}
