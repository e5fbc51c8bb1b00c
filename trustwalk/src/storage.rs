//! # Storage Module.
//!
//! This module contains generic storage traits and implementations used to
//! persist configuration, networks, scores and gossip messages.

use crate::{error::TrustError, network::TrustNetwork};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{from_reader, to_string_pretty};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

/// The main trait to be implemented by different storage types.
pub trait Storage<T> {
	/// The error type.
	type Err;

	/// Loads data from storage.
	fn load(&self) -> Result<T, Self::Err>;
	/// Saves data to storage.
	fn save(&mut self, data: T) -> Result<(), Self::Err>;
}

/// The `CSVFileStorage` struct provides a mechanism for persisting
/// and retrieving structured data to and from CSV files.
///
/// # Examples
///
/// ```no_run
/// use std::path::PathBuf;
/// use trustwalk::storage::{CSVFileStorage, ScoreKind, ScoreRecord, Storage};
///
/// let filepath = PathBuf::from("/path/to/your/scores.csv");
/// let mut storage = CSVFileStorage::<ScoreRecord>::new(filepath);
///
/// let data = vec![ScoreRecord::new(ScoreKind::Item, "some-song".into(), 0.25)];
///
/// // Save the scores to the CSV file.
/// storage.save(data.clone()).unwrap();
///
/// // Load the scores from the CSV file.
/// let loaded_data = storage.load().unwrap();
/// assert_eq!(data, loaded_data);
/// ```
pub struct CSVFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> CSVFileStorage<T> {
	/// Creates a new CSVFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl<T: Serialize + DeserializeOwned + Clone> Storage<Vec<T>> for CSVFileStorage<T> {
	type Err = TrustError;

	fn load(&self) -> Result<Vec<T>, TrustError> {
		let file = File::open(&self.filepath).map_err(TrustError::IOError)?;
		let mut reader = ReaderBuilder::new().from_reader(BufReader::new(file));

		reader
			.deserialize()
			.map(|result| result.map_err(|e| TrustError::FileIOError(e.to_string())))
			.collect()
	}

	fn save(&mut self, data: Vec<T>) -> Result<(), TrustError> {
		let mut writer = WriterBuilder::new()
			.from_path(&self.filepath)
			.map_err(|e| TrustError::FileIOError(e.to_string()))?;

		// Loop over content and write each item
		for record in &data {
			writer.serialize(record).map_err(|e| TrustError::FileIOError(e.to_string()))?;
		}

		// Flush buffer
		writer.flush().map_err(|e| TrustError::FileIOError(e.to_string()))?;

		Ok(())
	}
}

/// The `JSONFileStorage` struct provides a mechanism for persisting
/// and retrieving structured data to and from JSON files.
pub struct JSONFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> JSONFileStorage<T> {
	/// Creates a new JSONFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl<T: Serialize + DeserializeOwned + Clone> Storage<T> for JSONFileStorage<T> {
	type Err = TrustError;

	fn load(&self) -> Result<T, Self::Err> {
		let file = File::open(&self.filepath).map_err(TrustError::IOError)?;
		let reader = BufReader::new(file);
		from_reader(reader).map_err(|e| TrustError::ParsingError(e.to_string()))
	}

	fn save(&mut self, data: T) -> Result<(), Self::Err> {
		let json_str = to_string_pretty(&data).map_err(|e| TrustError::ParsingError(e.to_string()))?;

		let mut file = File::create(&self.filepath).map_err(TrustError::IOError)?;
		file.write_all(json_str.as_bytes()).map_err(TrustError::IOError)
	}
}

/// The `BinFileStorage` struct provides a mechanism for persisting
/// and retrieving data to and from bin files.
pub struct BinFileStorage {
	filepath: PathBuf,
}

impl BinFileStorage {
	/// Creates a new BinFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl Storage<Vec<u8>> for BinFileStorage {
	type Err = TrustError;

	fn load(&self) -> Result<Vec<u8>, Self::Err> {
		let mut file = File::open(&self.filepath).map_err(TrustError::IOError)?;
		let mut data = Vec::new();
		file.read_to_end(&mut data).map_err(TrustError::IOError)?;
		Ok(data)
	}

	fn save(&mut self, data: Vec<u8>) -> Result<(), Self::Err> {
		let mut file = File::create(&self.filepath).map_err(TrustError::IOError)?;
		file.write_all(&data).map_err(TrustError::IOError)
	}
}

/// Kind of vertex a score belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
	/// A peer's personalized PageRank.
	Node,
	/// An item's ranking score.
	Item,
}

/// Score record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
	/// Kind of the scored vertex.
	kind: ScoreKind,
	/// Identifier of the scored vertex.
	id: String,
	/// The score.
	score: f64,
}

impl ScoreRecord {
	/// Creates a new score record.
	pub fn new(kind: ScoreKind, id: String, score: f64) -> Self {
		Self { kind, id, score }
	}

	/// Collects node scores followed by item scores, each best first.
	pub fn from_network(network: &TrustNetwork) -> Vec<Self> {
		let nodes = network
			.node_scores()
			.into_iter()
			.map(|(id, score)| Self::new(ScoreKind::Node, id.to_string(), score));
		let items = network
			.top_items(usize::MAX)
			.into_iter()
			.map(|(id, score)| Self::new(ScoreKind::Item, id.to_string(), score));
		nodes.chain(items).collect()
	}

	/// Returns the kind of the scored vertex.
	pub fn kind(&self) -> ScoreKind {
		self.kind
	}

	/// Returns the identifier of the scored vertex.
	pub fn id(&self) -> &String {
		&self.id
	}

	/// Returns the score.
	pub fn score(&self) -> f64 {
		self.score
	}
}

#[cfg(test)]
mod tests {
	use crate::storage::*;
	use crate::{
		gossip::{EdgeDelta, GossipMessage},
		model::{AffinityEdge, NodeId, TrustEdge},
		RankingConfig, RecommenderConfig,
	};
	use std::{env::current_dir, fs};

	#[test]
	fn test_csv_file_storage() {
		let config = RankingConfig { repetitions: 100, seed: Some(1), ..RankingConfig::default() };
		let mut network = TrustNetwork::new("root".into(), config).unwrap();
		network.add_node_to_node_edge(&"root".into(), &"peer".into(), TrustEdge::new(1.0, 1)).unwrap();
		network.add_node_to_item_edge(&"peer".into(), &"song".into(), AffinityEdge::new(1.0, 1)).unwrap();
		network.calculate_rankings();

		// Create the CSV file
		let filepath = current_dir().unwrap().join("test_scores.csv");
		let mut csv_storage = CSVFileStorage::<ScoreRecord>::new(filepath.clone());
		let content = ScoreRecord::from_network(&network);
		assert_eq!(content.len(), 3);
		assert_eq!(content[0].kind(), ScoreKind::Node);
		assert_eq!(content[2].kind(), ScoreKind::Item);

		assert!(csv_storage.save(content.clone()).is_ok());

		// Read the CSV file
		let records: Vec<ScoreRecord> = csv_storage.load().unwrap();
		assert_eq!(records, content);

		// Clean up
		fs::remove_file(filepath).unwrap();
	}

	#[test]
	fn test_json_file_storage() {
		// Create the JSON file
		let filepath = current_dir().unwrap().join("test_config.json");
		let mut json_storage = JSONFileStorage::<RecommenderConfig>::new(filepath.clone());

		let content = RecommenderConfig::new(NodeId::new("alice"));

		// Save the content to the JSON file
		assert!(json_storage.save(content.clone()).is_ok());

		// Load the JSON file
		let loaded = json_storage.load().unwrap();
		assert_eq!(loaded, content);

		// Clean up
		fs::remove_file(filepath).unwrap();
	}

	#[test]
	fn test_bin_file_storage() {
		let filepath = current_dir().unwrap().join("test_gossip.bin");
		let mut bin_storage = BinFileStorage::new(filepath.clone());

		let message = GossipMessage {
			deltas: vec![EdgeDelta::Affinity {
				node: "peer".into(),
				item: "song".into(),
				affinity: 0.5,
				timestamp: 3,
			}],
		};
		assert!(bin_storage.save(message.to_bytes().unwrap()).is_ok());

		let loaded = GossipMessage::from_bytes(&bin_storage.load().unwrap()).unwrap();
		assert_eq!(loaded, message);

		// Clean up
		fs::remove_file(filepath).unwrap();
	}
}
