//! # Error Module.
//!
//! This module features the `TrustError` enum for error handling throughout the project.

use thiserror::Error;

/// The crate-wide error variants.
#[derive(Debug, Error)]
pub enum TrustError {
	/// An upsert whose timestamp is not newer than the stored edge
	#[error("StaleUpdate: {0}")]
	StaleUpdate(String),

	/// An affinity edge between two vertices of the same kind, or a trust self-loop
	#[error("InvalidEdgeType: {0}")]
	InvalidEdgeType(String),

	/// An edge endpoint that is not a vertex of the graph
	#[error("MissingVertex: {0}")]
	MissingVertex(String),

	/// Corrupt or version-mismatched compact encoding or gossip message
	#[error("MalformedInput: {0}")]
	MalformedInput(String),

	/// A graph that cannot be written in the compact grammar
	#[error("SerializationError: {0}")]
	SerializationError(String),

	/// Configuration error
	#[error("ConfigurationError: {0}")]
	ConfigurationError(String),

	/// Gossip channel error
	#[error("ChannelError: {0}")]
	ChannelError(String),

	/// File read/write error
	#[error("FileIOError: {0}")]
	FileIOError(String),

	/// Input/output error
	#[error("IOError: {0}")]
	IOError(std::io::Error),

	/// Parsing error
	#[error("ParsingError: {0}")]
	ParsingError(String),
}

impl TrustError {
	/// Returns true for the rejections that gossip races produce routinely:
	/// stale updates, invalid edge kinds and missing endpoints.
	pub fn is_recoverable(&self) -> bool {
		matches!(
			self,
			TrustError::StaleUpdate(_)
				| TrustError::InvalidEdgeType(_)
				| TrustError::MissingVertex(_)
		)
	}

	/// Returns true if the error is a stale upsert.
	pub fn is_stale(&self) -> bool {
		matches!(self, TrustError::StaleUpdate(_))
	}
}

#[cfg(test)]
mod tests {
	use super::TrustError;

	#[test]
	fn test_recoverable_variants() {
		assert!(TrustError::StaleUpdate("a".to_string()).is_recoverable());
		assert!(TrustError::InvalidEdgeType("a".to_string()).is_recoverable());
		assert!(TrustError::MissingVertex("a".to_string()).is_recoverable());
		assert!(!TrustError::MalformedInput("a".to_string()).is_recoverable());
		assert!(!TrustError::ChannelError("a".to_string()).is_recoverable());
	}

	#[test]
	fn test_display_prefix() {
		let err = TrustError::MalformedInput("line 3".to_string());
		assert_eq!(err.to_string(), "MalformedInput: line 3");
	}
}
