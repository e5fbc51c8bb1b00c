//! # Graph Module.
//!
//! The two graphs a peer keeps about the network: the directed trust graph
//! between peers, and the bipartite affinity graph between peers and items.
//! Both apply upserts under the last-writer-wins rule.

pub mod affinity;
pub mod trust;

pub use affinity::AffinityGraph;
pub use trust::TrustGraph;

use crate::{error::TrustError, model::TimestampedEdge};
use std::fmt::Display;

/// An edge together with the sequence number of its last upsert.
#[derive(Clone, Debug)]
pub(crate) struct Slot<E> {
	pub(crate) edge: E,
	pub(crate) seq: u64,
}

/// Rejects `candidate` unless it is strictly newer than `existing`.
pub(crate) fn ensure_newer<E: TimestampedEdge>(
	existing: Option<&E>, candidate: &E, source: impl Display, target: impl Display,
) -> Result<(), TrustError> {
	match existing {
		Some(stored) if stored.timestamp() >= candidate.timestamp() => {
			Err(TrustError::StaleUpdate(format!(
				"edge {} -> {} stored at {} is not older than {}",
				source,
				target,
				stored.timestamp(),
				candidate.timestamp()
			)))
		},
		_ => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	use super::ensure_newer;
	use crate::model::TrustEdge;

	#[test]
	fn test_ensure_newer() {
		let stored = TrustEdge::new(1.0, 10);
		assert!(ensure_newer(None, &stored, "a", "b").is_ok());
		assert!(ensure_newer(Some(&stored), &TrustEdge::new(2.0, 11), "a", "b").is_ok());

		let equal = ensure_newer(Some(&stored), &TrustEdge::new(2.0, 10), "a", "b");
		assert!(equal.unwrap_err().is_stale());
		let older = ensure_newer(Some(&stored), &TrustEdge::new(2.0, 9), "a", "b");
		assert!(older.unwrap_err().is_stale());
	}
}
