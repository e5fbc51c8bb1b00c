//! # Gossip Module.
//!
//! Edge deltas exchanged between peers, the recency-weighted selection of
//! which deltas to send, and an async gossiper that drives rounds over tokio
//! channels. Peer addressing and delivery belong to whoever owns the channels.

use crate::{
	error::TrustError,
	graph::{AffinityGraph, TrustGraph},
	model::{ItemId, NodeId},
	network::{BatchReport, TrustNetwork},
	GossipConfig,
};
use log::{debug, info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{
	select,
	sync::{mpsc, Mutex},
	task, time,
};

/// A single edge update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeDelta {
	/// An edge of the trust graph.
	Trust {
		/// Peer extending the trust.
		source: NodeId,
		/// Peer receiving the trust.
		target: NodeId,
		/// Trust weight.
		trust: f64,
		/// Update time in milliseconds.
		timestamp: u64,
	},
	/// An edge of the affinity graph.
	Affinity {
		/// Endorsing peer.
		node: NodeId,
		/// Endorsed item.
		item: ItemId,
		/// Affinity weight.
		affinity: f64,
		/// Update time in milliseconds.
		timestamp: u64,
	},
}

impl EdgeDelta {
	/// Update time of the edge.
	pub fn timestamp(&self) -> u64 {
		match self {
			EdgeDelta::Trust { timestamp, .. } | EdgeDelta::Affinity { timestamp, .. } => *timestamp,
		}
	}
}

/// A batch of deltas sent to one peer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
	/// The deltas.
	pub deltas: Vec<EdgeDelta>,
}

impl GossipMessage {
	/// Encodes the message.
	pub fn to_bytes(&self) -> Result<Vec<u8>, TrustError> {
		serde_json::to_vec(self).map_err(|e| TrustError::SerializationError(e.to_string()))
	}

	/// Decodes a message. Nothing is returned from a corrupt payload.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrustError> {
		serde_json::from_slice(bytes).map_err(|e| TrustError::MalformedInput(e.to_string()))
	}
}

/// Sampling weights favoring recently updated edges.
///
/// Each edge gets `timestamp - oldest`, normalized to sum to 1, so the oldest
/// edge never gets picked while any newer one is left. When every edge has the
/// same timestamp the weights are uniform.
pub fn recency_weights(timestamps: &[u64]) -> Vec<f64> {
	let Some(oldest) = timestamps.iter().copied().min() else {
		return Vec::new();
	};
	let deltas: Vec<f64> = timestamps.iter().map(|ts| (ts - oldest) as f64).collect();
	let total: f64 = deltas.iter().sum();
	if total == 0.0 {
		let uniform = 1.0 / timestamps.len() as f64;
		return vec![uniform; timestamps.len()];
	}
	deltas.into_iter().map(|delta| delta / total).collect()
}

/// The edges of one graph, oldest first, with their sampling weights.
#[derive(Clone, Debug, Default)]
pub struct WeightedDeltas {
	/// Edges sorted by ascending timestamp.
	pub deltas: Vec<EdgeDelta>,
	/// Weight of the edge at the same position.
	pub weights: Vec<f64>,
}

impl WeightedDeltas {
	fn new(mut deltas: Vec<EdgeDelta>) -> Self {
		deltas.sort_by_key(EdgeDelta::timestamp);
		let timestamps: Vec<u64> = deltas.iter().map(EdgeDelta::timestamp).collect();
		let weights = recency_weights(&timestamps);
		Self { deltas, weights }
	}

	/// Picks up to `count` distinct deltas by weight.
	pub fn sample<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<EdgeDelta> {
		let indices: Vec<usize> = (0..self.deltas.len()).collect();
		match indices.choose_multiple_weighted(rng, count, |&i| self.weights[i]) {
			Ok(picked) => picked.map(|&i| self.deltas[i].clone()).collect(),
			Err(e) => {
				warn!("Falling back to uniform gossip sampling: {}", e);
				self.deltas.choose_multiple(rng, count).cloned().collect()
			},
		}
	}
}

/// Snapshot of both graphs' edges ready for weighted sampling.
#[derive(Clone, Debug, Default)]
pub struct GossipPrioritizer {
	trust: WeightedDeltas,
	affinity: WeightedDeltas,
}

impl GossipPrioritizer {
	/// Snapshots the edges of both graphs.
	pub fn new(trust: &TrustGraph, affinity: &AffinityGraph) -> Self {
		let trust_deltas = trust
			.edges()
			.into_iter()
			.map(|(source, target, edge)| EdgeDelta::Trust {
				source,
				target,
				trust: edge.trust,
				timestamp: edge.timestamp,
			})
			.collect();
		let affinity_deltas = affinity
			.edges()
			.into_iter()
			.map(|(node, item, edge)| EdgeDelta::Affinity {
				node,
				item,
				affinity: edge.affinity,
				timestamp: edge.timestamp,
			})
			.collect();
		Self { trust: WeightedDeltas::new(trust_deltas), affinity: WeightedDeltas::new(affinity_deltas) }
	}

	/// Trust graph edges with their weights.
	pub fn trust_deltas(&self) -> &WeightedDeltas {
		&self.trust
	}

	/// Affinity graph edges with their weights.
	pub fn affinity_deltas(&self) -> &WeightedDeltas {
		&self.affinity
	}

	/// Picks up to `count` edges of each graph.
	pub fn sample<R: Rng>(&self, count: usize, rng: &mut R) -> GossipMessage {
		let mut deltas = self.trust.sample(count, rng);
		deltas.extend(self.affinity.sample(count, rng));
		GossipMessage { deltas }
	}
}

/// Bytes from one peer to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipEnvelope {
	/// The sending peer.
	pub peer: NodeId,
	/// An encoded [`GossipMessage`].
	pub payload: Vec<u8>,
}

/// Periodically sends sampled deltas to known peers and applies the deltas
/// it receives.
pub struct EdgeGossiper {
	network: Arc<Mutex<TrustNetwork>>,
	config: GossipConfig,
	local: NodeId,
	peers: Vec<(NodeId, mpsc::Sender<GossipEnvelope>)>,
	rng: StdRng,
}

impl EdgeGossiper {
	/// Creates a gossiper sending as `local`.
	pub fn new(
		network: Arc<Mutex<TrustNetwork>>, config: GossipConfig, local: NodeId, seed: Option<u64>,
	) -> Self {
		let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
		Self { network, config, local, peers: Vec::new(), rng }
	}

	/// Adds a peer reachable through `outbox`.
	pub fn add_peer(&mut self, peer: NodeId, outbox: mpsc::Sender<GossipEnvelope>) {
		self.peers.push((peer, outbox));
	}

	/// Shared handle to the network.
	pub fn network(&self) -> Arc<Mutex<TrustNetwork>> {
		self.network.clone()
	}

	/// Sends one sampled message to every peer. Returns the number of peers reached.
	///
	/// Fails with [`TrustError::ChannelError`] once every peer's channel is closed.
	pub async fn gossip_round(&mut self) -> Result<usize, TrustError> {
		let prioritizer = {
			let network = self.network.lock().await;
			GossipPrioritizer::new(network.trust_graph(), network.affinity_graph())
		};

		let mut reached = 0;
		let mut closed = 0;
		for (peer, outbox) in &self.peers {
			let message = prioritizer.sample(self.config.edges_per_round, &mut self.rng);
			if message.deltas.is_empty() {
				continue;
			}
			let envelope = GossipEnvelope { peer: self.local.clone(), payload: message.to_bytes()? };
			match outbox.send(envelope).await {
				Ok(()) => {
					debug!("Sent {} deltas to {}", message.deltas.len(), peer);
					reached += 1;
				},
				Err(e) => {
					warn!("Failed to gossip to {}: {}", peer, e);
					closed += 1;
				},
			}
		}
		if closed > 0 && closed == self.peers.len() {
			return Err(TrustError::ChannelError(format!(
				"all {} peers of {} disconnected",
				closed, self.local
			)));
		}
		Ok(reached)
	}

	/// Decodes and applies an inbound message as one batch on the blocking pool.
	pub async fn handle_incoming(&self, envelope: GossipEnvelope) -> Result<BatchReport, TrustError> {
		let message = GossipMessage::from_bytes(&envelope.payload)?;
		// Re-simulating walks is CPU-bound, so it runs off the async workers.
		let network = self.network.clone();
		let report =
			task::spawn_blocking(move || network.blocking_lock().apply_deltas(message.deltas))
				.await
				.map_err(|e| TrustError::ChannelError(format!("gossip batch task failed: {}", e)))?;
		info!(
			"Applied gossip from {}: {} applied, {} stale, {} rejected",
			envelope.peer, report.applied, report.stale, report.rejected
		);
		Ok(report)
	}

	/// Runs gossip rounds on the configured interval and applies inbound
	/// envelopes until `inbox` closes.
	pub async fn run(mut self, mut inbox: mpsc::Receiver<GossipEnvelope>) -> Result<(), TrustError> {
		let mut interval = time::interval(Duration::from_millis(self.config.interval_ms));
		loop {
			select! {
				_ = interval.tick() => {
					self.gossip_round().await?;
				}
				envelope = inbox.recv() => match envelope {
					Some(envelope) => {
						if let Err(e) = self.handle_incoming(envelope).await {
							warn!("Dropping gossip message: {}", e);
						}
					},
					None => {
						info!("Gossip inbox of {} closed", self.local);
						return Ok(());
					},
				},
			}
		}
	}
}
