//! # CLI Module.
//!
//! This module contains all CLI related data handling and conversions.

use crate::fs::{
	load_gossip, load_network, load_root, save_config, save_gossip, save_network, save_scores,
};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use trustwalk::{
	error::TrustError,
	gossip::{EdgeGossiper, GossipMessage, GossipPrioritizer},
	model::{AffinityEdge, ItemId, NodeId, TrustEdge},
	network::TrustNetwork,
	ranking::DecayStrategy,
	storage::ScoreRecord,
	RecommenderConfig,
};

/// Number of ranked items printed by `rank`.
const TOP_ITEMS: usize = 10;
/// Distinct items liked across a simulated population.
const SIMULATED_ITEMS: usize = 3;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
	#[command(subcommand)]
	pub mode: Mode,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Mode {
	/// Apply a gossip message file as one batch. Requires 'ApplyData'.
	Apply(ApplyData),
	/// Sample outbound deltas into a gossip message file. Requires 'GossipData'.
	Gossip(GossipData),
	/// Write an empty network containing only the root.
	Init,
	/// Record the root's affinity towards an item. Requires 'InteractData'.
	Interact(InteractData),
	/// Compute the rankings and save the scores.
	Rank,
	/// Display the current configuration.
	Show,
	/// Run in-process gossiping peers. Requires 'SimulateData'.
	Simulate(SimulateData),
	/// Record trust between two peers. Requires 'TrustData'.
	Trust(TrustData),
	/// Update the configuration. Requires 'UpdateData'.
	Update(UpdateData),
}

/// Apply subcommand input.
#[derive(Args, Debug)]
pub struct ApplyData {
	/// Path of the gossip message file.
	#[clap(long = "file")]
	file: Option<String>,
}

/// Gossip subcommand input.
#[derive(Args, Debug)]
pub struct GossipData {
	/// Maximum number of edges sampled from each graph.
	#[clap(long = "count")]
	count: Option<String>,
}

/// Interact subcommand input.
#[derive(Args, Debug)]
pub struct InteractData {
	/// Item identifier.
	#[clap(long = "item")]
	item: Option<String>,
	/// Affinity towards the item.
	#[clap(long = "affinity")]
	affinity: Option<String>,
}

/// Simulate subcommand input.
#[derive(Args, Debug)]
pub struct SimulateData {
	/// Number of peers.
	#[clap(long = "peers")]
	peers: Option<String>,
	/// Number of gossip rounds.
	#[clap(long = "rounds")]
	rounds: Option<String>,
}

/// Trust subcommand input.
#[derive(Args, Debug)]
pub struct TrustData {
	/// Trusting peer.
	#[clap(long = "from")]
	from: Option<String>,
	/// Trusted peer.
	#[clap(long = "to")]
	to: Option<String>,
	/// Trust value.
	#[clap(long = "trust")]
	trust: Option<String>,
}

/// Configuration update subcommand input.
#[derive(Args, Debug)]
pub struct UpdateData {
	/// Root peer identifier.
	#[clap(long = "root")]
	root: Option<String>,
	/// Number of walks simulated from the root.
	#[clap(long = "repetitions")]
	repetitions: Option<String>,
	/// Maximum walk length.
	#[clap(long = "max-walk-length")]
	max_walk_length: Option<String>,
	/// Reset probability (0-1).
	#[clap(long = "reset")]
	reset: Option<String>,
	/// Exploration probability (0-1).
	#[clap(long = "exploration")]
	exploration: Option<String>,
	/// Fraction of a decayed item's score to remove (0-1).
	#[clap(long = "beta-decay")]
	beta_decay: Option<String>,
	/// Dominance threshold triggering decay (0-1).
	#[clap(long = "beta-threshold")]
	beta_threshold: Option<String>,
	/// Decay strategy (per_item_scan, visit_table).
	#[clap(long = "decay-strategy")]
	decay_strategy: Option<String>,
	/// Walk seed.
	#[clap(long = "seed")]
	seed: Option<String>,
	/// Edges of each graph gossiped per round.
	#[clap(long = "edges-per-round")]
	edges_per_round: Option<String>,
}

/// Parses a required argument.
fn parse_arg<T>(value: Option<&String>, name: &str) -> Result<T, TrustError>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	value
		.ok_or_else(|| TrustError::ConfigurationError(format!("Missing {}.", name)))?
		.parse::<T>()
		.map_err(|e| TrustError::ParsingError(format!("{}: {}", name, e)))
}

/// Parses an optional argument.
fn parse_opt<T>(value: Option<String>, name: &str) -> Result<Option<T>, TrustError>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	value.as_ref().map(|value| parse_arg(Some(value), name)).transpose()
}

fn required(value: Option<String>, name: &str) -> Result<String, TrustError> {
	value.ok_or_else(|| TrustError::ConfigurationError(format!("Missing {}.", name)))
}

/// Handles the `init` command.
pub fn handle_init(config: &RecommenderConfig) -> Result<(), TrustError> {
	let network = TrustNetwork::new(load_root(config), config.ranking.clone())?;
	let filepath = save_network(&network)?;
	info!("Network for \"{}\" saved at \"{}\".", network.root(), filepath.display());
	Ok(())
}

/// Handles the `interact` command.
pub fn handle_interact(config: &RecommenderConfig, data: InteractData) -> Result<(), TrustError> {
	let item = ItemId::new(required(data.item, "item")?);
	let affinity: f64 = parse_arg(data.affinity.as_ref(), "affinity")?;

	let mut network = load_network(config)?;
	let root = network.root().clone();
	network.add_node_to_item_edge(&root, &item, AffinityEdge::now(affinity))?;
	save_network(&network)?;

	info!("{} -> {} affinity set to {}.", root, item, affinity);
	Ok(())
}

/// Handles the `trust` command.
pub fn handle_trust(config: &RecommenderConfig, data: TrustData) -> Result<(), TrustError> {
	let from = NodeId::new(required(data.from, "from")?);
	let to = NodeId::new(required(data.to, "to")?);
	let trust: f64 = parse_arg(data.trust.as_ref(), "trust")?;

	let mut network = load_network(config)?;
	network.add_node_to_node_edge(&from, &to, TrustEdge::now(trust))?;
	save_network(&network)?;

	info!("{} -> {} trust set to {}.", from, to, trust);
	Ok(())
}

/// Handles the `rank` command.
pub fn handle_rank(config: &RecommenderConfig) -> Result<(), TrustError> {
	let mut network = load_network(config)?;
	network.calculate_rankings();
	save_network(&network)?;

	let filepath = save_scores(ScoreRecord::from_network(&network))?;
	info!("Scores saved at \"{}\".", filepath.display());

	for (rank, (item, score)) in network.top_items(TOP_ITEMS).iter().enumerate() {
		println!("{:>3}. {} {:.6}", rank + 1, item, score);
	}
	Ok(())
}

/// Handles the `gossip` command.
pub fn handle_gossip(config: &RecommenderConfig, data: GossipData) -> Result<(), TrustError> {
	let count = parse_opt(data.count, "count")?.unwrap_or(config.gossip.edges_per_round);

	let network = load_network(config)?;
	let mut rng = config.ranking.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
	let message = GossipPrioritizer::new(network.trust_graph(), network.affinity_graph())
		.sample(count, &mut rng);

	let filepath = save_gossip(message.to_bytes()?)?;
	info!("{} deltas saved at \"{}\".", message.deltas.len(), filepath.display());
	Ok(())
}

/// Handles the `apply` command.
pub fn handle_apply(config: &RecommenderConfig, data: ApplyData) -> Result<(), TrustError> {
	let filepath = PathBuf::from(required(data.file, "file")?);
	let message = GossipMessage::from_bytes(&load_gossip(filepath)?)?;

	let mut network = load_network(config)?;
	let report = network.apply_deltas(message.deltas);
	save_network(&network)?;

	info!(
		"Applied {} deltas, {} stale, {} rejected.",
		report.applied, report.stale, report.rejected
	);
	Ok(())
}

/// Handles the `simulate` command.
///
/// Every peer trusts its successor on a ring and likes one item. Peers are
/// fully connected and exchange one gossip round at a time.
pub async fn handle_simulate(
	config: &RecommenderConfig, data: SimulateData,
) -> Result<(), TrustError> {
	let peers: usize = parse_arg(data.peers.as_ref(), "peers")?;
	let rounds: usize = parse_arg(data.rounds.as_ref(), "rounds")?;
	if peers < 2 {
		return Err(TrustError::ConfigurationError(
			"At least two peers are required.".to_string(),
		));
	}

	let ids: Vec<NodeId> = (0..peers).map(|i| NodeId::new(format!("peer{}", i))).collect();
	let mut gossipers = Vec::with_capacity(peers);
	let mut inboxes = Vec::with_capacity(peers);
	let mut outboxes = Vec::with_capacity(peers);
	for (i, id) in ids.iter().enumerate() {
		let mut network = TrustNetwork::new(id.clone(), config.ranking.clone())?;
		network.add_node_to_node_edge(id, &ids[(i + 1) % peers], TrustEdge::now(1.0))?;
		let item = ItemId::new(format!("item{}", i % SIMULATED_ITEMS));
		network.add_node_to_item_edge(id, &item, AffinityEdge::now(1.0))?;

		let seed = config.ranking.seed.map(|seed| seed.wrapping_add(i as u64));
		let network = Arc::new(Mutex::new(network));
		gossipers.push(EdgeGossiper::new(network, config.gossip.clone(), id.clone(), seed));

		let (sender, receiver) = mpsc::channel(peers);
		outboxes.push(sender);
		inboxes.push(receiver);
	}
	for (i, gossiper) in gossipers.iter_mut().enumerate() {
		for (j, outbox) in outboxes.iter().enumerate() {
			if i != j {
				gossiper.add_peer(ids[j].clone(), outbox.clone());
			}
		}
	}

	for round in 0..rounds {
		for gossiper in gossipers.iter_mut() {
			gossiper.gossip_round().await?;
		}
		for (gossiper, inbox) in gossipers.iter().zip(inboxes.iter_mut()) {
			while let Ok(envelope) = inbox.try_recv() {
				if let Err(e) = gossiper.handle_incoming(envelope).await {
					warn!("Dropping gossip message: {}", e);
				}
			}
		}
		info!("Round {} done.", round + 1);
	}

	for (id, gossiper) in ids.iter().zip(gossipers.iter()) {
		let network = gossiper.network();
		let network = network.lock().await;
		println!(
			"{}: {} trust edges, {} affinity edges",
			id,
			network.trust_graph().edge_count(),
			network.affinity_graph().edge_count()
		);
	}
	Ok(())
}

/// Handles the CLI project configuration update.
pub fn handle_update(config: &mut RecommenderConfig, data: UpdateData) -> Result<(), TrustError> {
	if let Some(root) = data.root {
		config.root = NodeId::new(root);
	}

	if let Some(repetitions) = parse_opt(data.repetitions, "repetitions")? {
		config.ranking.repetitions = repetitions;
	}

	if let Some(max_walk_length) = parse_opt(data.max_walk_length, "max-walk-length")? {
		config.ranking.max_walk_length = max_walk_length;
	}

	if let Some(reset) = parse_opt(data.reset, "reset")? {
		config.ranking.reset_probability = reset;
	}

	if let Some(exploration) = parse_opt(data.exploration, "exploration")? {
		config.ranking.exploration_probability = exploration;
	}

	if let Some(beta_decay) = parse_opt(data.beta_decay, "beta-decay")? {
		config.ranking.beta_decay = beta_decay;
	}

	if let Some(beta_threshold) = parse_opt(data.beta_threshold, "beta-threshold")? {
		config.ranking.beta_decay_threshold = beta_threshold;
	}

	if let Some(strategy) = data.decay_strategy {
		config.ranking.decay_strategy = match strategy.as_str() {
			"per_item_scan" => DecayStrategy::PerItemScan,
			"visit_table" => DecayStrategy::VisitTable,
			_ => return Err(TrustError::ParsingError("Invalid decay strategy.".to_string())),
		};
	}

	if let Some(seed) = parse_opt(data.seed, "seed")? {
		config.ranking.seed = Some(seed);
	}

	if let Some(edges_per_round) = parse_opt(data.edges_per_round, "edges-per-round")? {
		config.gossip.edges_per_round = edges_per_round;
	}

	config.validate()?;
	save_config(config)
}
