//! # Filesystem Actions Module.
//!
//! This module provides functionalities for filesystem actions.

use dotenv::{dotenv, var};
use log::warn;
use std::{env::current_dir, path::PathBuf};
use trustwalk::{
	error::TrustError,
	model::NodeId,
	network::TrustNetwork,
	serialization::SerializedSubNetworks,
	storage::{BinFileStorage, CSVFileStorage, JSONFileStorage, ScoreRecord, Storage},
	RecommenderConfig,
};

/// Recommender configuration file name.
pub const CONFIG_FILENAME: &str = "config";
/// Serialized network file name.
pub const NETWORK_FILENAME: &str = "network";
/// Ranking output file name.
pub const SCORES_FILENAME: &str = "scores";
/// Outbound gossip message file name.
pub const GOSSIP_FILENAME: &str = "gossip";

/// Enum representing the possible file extensions.
pub enum FileType {
	/// CSV file.
	Csv,
	/// JSON file.
	Json,
	/// Binary file.
	Bin,
}

impl FileType {
	/// Converts the enum variant into its corresponding file extension.
	fn as_str(&self) -> &'static str {
		match self {
			FileType::Csv => "csv",
			FileType::Json => "json",
			FileType::Bin => "bin",
		}
	}
}

/// Loads the root identity from the environment, falling back to the configuration.
pub fn load_root(config: &RecommenderConfig) -> NodeId {
	dotenv().ok();
	var("ROOT_PEER").map(NodeId::from).unwrap_or_else(|_| {
		warn!("ROOT_PEER environment variable is not set. Using \"{}\" from config.", config.root);
		config.root.clone()
	})
}

/// Retrieves the path to the `assets` directory.
pub fn get_assets_path() -> Result<PathBuf, TrustError> {
	current_dir().map_err(TrustError::IOError).map(|current_dir| {
		// Workaround for the tests running in the `trustwalk-cli` directory.
		#[cfg(test)]
		{
			current_dir.join("assets")
		}

		#[cfg(not(test))]
		{
			current_dir.join("trustwalk-cli/assets")
		}
	})
}

/// Helper function to get the path of a file in the `assets` directory.
pub fn get_file_path(file_name: &str, file_type: FileType) -> Result<PathBuf, TrustError> {
	let assets_path = get_assets_path()?;
	Ok(assets_path.join(format!("{}.{}", file_name, file_type.as_str())))
}

/// Loads the configuration file.
pub fn load_config() -> Result<RecommenderConfig, TrustError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	JSONFileStorage::<RecommenderConfig>::new(filepath).load()
}

/// Saves the configuration file.
pub fn save_config(config: &RecommenderConfig) -> Result<(), TrustError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	JSONFileStorage::<RecommenderConfig>::new(filepath).save(config.clone())
}

/// Loads the network saved by a previous command.
pub fn load_network(config: &RecommenderConfig) -> Result<TrustNetwork, TrustError> {
	let filepath = get_file_path(NETWORK_FILENAME, FileType::Json)?;
	let serialized = JSONFileStorage::<SerializedSubNetworks>::new(filepath).load()?;
	TrustNetwork::from_serialized(load_root(config), &serialized, config.ranking.clone())
}

/// Saves the network.
pub fn save_network(network: &TrustNetwork) -> Result<PathBuf, TrustError> {
	let filepath = get_file_path(NETWORK_FILENAME, FileType::Json)?;
	let mut storage = JSONFileStorage::<SerializedSubNetworks>::new(filepath);
	storage.save(network.serialize()?)?;
	Ok(storage.filepath().clone())
}

/// Saves the score records.
pub fn save_scores(records: Vec<ScoreRecord>) -> Result<PathBuf, TrustError> {
	let filepath = get_file_path(SCORES_FILENAME, FileType::Csv)?;
	let mut storage = CSVFileStorage::<ScoreRecord>::new(filepath);
	storage.save(records)?;
	Ok(storage.filepath().clone())
}

/// Saves an encoded gossip message.
pub fn save_gossip(payload: Vec<u8>) -> Result<PathBuf, TrustError> {
	let filepath = get_file_path(GOSSIP_FILENAME, FileType::Bin)?;
	let mut storage = BinFileStorage::new(filepath);
	storage.save(payload)?;
	Ok(storage.filepath().clone())
}

/// Loads an encoded gossip message from any path.
pub fn load_gossip(filepath: PathBuf) -> Result<Vec<u8>, TrustError> {
	BinFileStorage::new(filepath).load()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_file_paths() {
		let path = get_file_path(SCORES_FILENAME, FileType::Csv).unwrap();
		assert!(path.ends_with("assets/scores.csv"));
		let path = get_file_path(GOSSIP_FILENAME, FileType::Bin).unwrap();
		assert!(path.ends_with("assets/gossip.bin"));
	}

	#[test]
	fn test_bundled_config_is_valid() {
		let config = load_config().unwrap();
		assert!(config.validate().is_ok());
	}
}
