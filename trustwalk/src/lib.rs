//! # Trust Walk
//!
//! A library for personalized, sybil-resistant recommendations in a
//! peer-to-peer network.
//!
//! ## Main characteristics:
//!
//! **Personalized** - every peer keeps its own view of the network and ranks
//! peers and items by random walks anchored at itself. There is no global
//! ranking and no consensus.
//!
//! **Incremental** - the walks behind a ranking are recorded, so an edge update
//! only re-simulates the walks that passed through the vertices it touched.
//!
//! **Sybil-resistant** - items whose walk traffic is funneled through a single
//! other vertex are penalized by MeritRank decay.
//!
//! ## Implementation
//!
//! A [`network::TrustNetwork`] owns a directed trust graph between peers and a
//! bipartite affinity graph between peers and items. Edge updates are
//! timestamped and applied last-writer-wins, whether they come from local
//! interactions or from gossip (see [`gossip`]). Graphs can be written to and
//! read from a compact line-oriented text format (see [`serialization`]).

// Rustc
#![warn(trivial_casts)]
#![deny(
	absolute_paths_not_starting_with_crate, deprecated, future_incompatible, missing_docs,
	nonstandard_style, unreachable_code, unreachable_patterns
)]
#![forbid(unsafe_code)]
// Clippy
#![allow(clippy::tabs_in_doc_comments, clippy::needless_range_loop, clippy::new_without_default)]
#![deny(
	// Complexity
 	clippy::unnecessary_cast,
	clippy::needless_question_mark,
	clippy::clone_on_copy,
	// Pedantic
 	clippy::cast_lossless,
 	clippy::cast_possible_wrap,
	// Perf
	clippy::redundant_clone,
	// Restriction
 	clippy::panic,
	// Style
 	clippy::let_and_return,
 	clippy::needless_borrow
)]

pub mod error;
pub mod gossip;
pub mod graph;
pub mod model;
pub mod network;
pub mod ranking;
pub mod serialization;
pub mod storage;

use error::TrustError;
use model::NodeId;
use ranking::DecayStrategy;
use serde::{Deserialize, Serialize};

/// Default maximum number of vertices in a single walk.
pub const MAX_WALK_LENGTH: usize = 1000;
/// Default number of walks simulated from the root.
pub const REPETITIONS: usize = 10000;
/// Default probability of ending a walk at each step.
pub const RESET_PROBABILITY: f64 = 0.01;
/// Default probability of stepping from a peer to an item instead of a trusted peer.
pub const EXPLORATION_PROBABILITY: f64 = 0.05;
/// Default share of an item's walks a single other vertex may account for.
pub const BETA_DECAY_THRESHOLD: f64 = 0.8;

/// Random walk parameters shared by both ranking engines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
	/// Maximum number of vertices in a walk, root included.
	pub max_walk_length: usize,
	/// Number of walks simulated from the root.
	pub repetitions: usize,
	/// Probability of ending a walk at each step.
	pub reset_probability: f64,
	/// Probability of stepping from a peer to an item instead of a trusted peer.
	pub exploration_probability: f64,
	/// Share of an item's walks a single other vertex may account for before decay applies.
	pub beta_decay_threshold: f64,
	/// Fraction of the score removed from a decayed item. Zero disables decay.
	pub beta_decay: f64,
	/// How dominating vertices are counted.
	pub decay_strategy: DecayStrategy,
	/// Base seed for reproducible walks.
	pub seed: Option<u64>,
}

impl Default for RankingConfig {
	fn default() -> Self {
		Self {
			max_walk_length: MAX_WALK_LENGTH,
			repetitions: REPETITIONS,
			reset_probability: RESET_PROBABILITY,
			exploration_probability: EXPLORATION_PROBABILITY,
			beta_decay_threshold: BETA_DECAY_THRESHOLD,
			beta_decay: 0.0,
			decay_strategy: DecayStrategy::default(),
			seed: None,
		}
	}
}

impl RankingConfig {
	/// Checks that the parameters describe a valid walk.
	pub fn validate(&self) -> Result<(), TrustError> {
		if self.max_walk_length == 0 {
			return Err(TrustError::ConfigurationError(
				"max_walk_length must be positive".to_string(),
			));
		}
		if self.repetitions == 0 {
			return Err(TrustError::ConfigurationError(
				"repetitions must be positive".to_string(),
			));
		}
		let probabilities = [
			("reset_probability", self.reset_probability),
			("exploration_probability", self.exploration_probability),
			("beta_decay_threshold", self.beta_decay_threshold),
			("beta_decay", self.beta_decay),
		];
		for (name, value) in probabilities {
			if !(0.0..=1.0).contains(&value) {
				return Err(TrustError::ConfigurationError(format!(
					"{} must be within [0, 1], got {}",
					name, value
				)));
			}
		}
		Ok(())
	}

	/// Returns true if MeritRank decay is applied to item scores.
	pub fn decay_enabled(&self) -> bool {
		self.beta_decay > 0.0
	}
}

/// Outbound gossip parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
	/// Maximum number of edges of each graph sent to a peer per round.
	pub edges_per_round: usize,
	/// Time between gossip rounds in milliseconds.
	pub interval_ms: u64,
}

impl Default for GossipConfig {
	fn default() -> Self {
		Self { edges_per_round: 10, interval_ms: 5000 }
	}
}

/// Everything a peer needs to run a recommender.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
	/// Identity the rankings are personalized for.
	pub root: NodeId,
	/// Random walk parameters.
	#[serde(default)]
	pub ranking: RankingConfig,
	/// Gossip parameters.
	#[serde(default)]
	pub gossip: GossipConfig,
}

impl RecommenderConfig {
	/// Creates a configuration with default parameters for `root`.
	pub fn new(root: NodeId) -> Self {
		Self { root, ranking: RankingConfig::default(), gossip: GossipConfig::default() }
	}

	/// Validates every section of the configuration.
	pub fn validate(&self) -> Result<(), TrustError> {
		if self.root.as_str().is_empty() {
			return Err(TrustError::ConfigurationError("root must not be empty".to_string()));
		}
		if self.gossip.interval_ms == 0 {
			return Err(TrustError::ConfigurationError(
				"gossip interval_ms must be positive".to_string(),
			));
		}
		self.ranking.validate()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_ranking_config_is_valid() {
		let config = RankingConfig::default();
		assert!(config.validate().is_ok());
		assert!(!config.decay_enabled());
		assert_eq!(config.max_walk_length, 1000);
		assert_eq!(config.repetitions, 10000);
	}

	#[test]
	fn test_validate_rejects_bad_parameters() {
		let config = RankingConfig { repetitions: 0, ..RankingConfig::default() };
		assert!(matches!(config.validate(), Err(TrustError::ConfigurationError(_))));

		let config = RankingConfig { reset_probability: 1.5, ..RankingConfig::default() };
		assert!(matches!(config.validate(), Err(TrustError::ConfigurationError(_))));

		let config = RankingConfig { beta_decay: -0.1, ..RankingConfig::default() };
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_recommender_config_json_defaults() {
		let config: RecommenderConfig = serde_json::from_str(r#"{ "root": "alice" }"#).unwrap();
		assert_eq!(config.root, NodeId::new("alice"));
		assert_eq!(config.ranking, RankingConfig::default());
		assert_eq!(config.gossip.edges_per_round, 10);

		let partial = r#"{ "root": "bob", "ranking": { "repetitions": 50, "decay_strategy": "visit_table" } }"#;
		let config: RecommenderConfig = serde_json::from_str(partial).unwrap();
		assert_eq!(config.ranking.repetitions, 50);
		assert_eq!(config.ranking.decay_strategy, DecayStrategy::VisitTable);
		assert_eq!(config.ranking.max_walk_length, 1000);
		assert!(config.validate().is_ok());
	}
}
