//! # Ranking Module.
//!
//! Monte-Carlo personalized ranking. Both engines simulate a fixed number of
//! random walks from the root and score vertices by visit frequency. The walks
//! are kept after simulation, indexed by the vertices they pass through, so a
//! graph mutation only re-simulates the walks that could have changed.

pub mod decay;
pub mod hybrid;
pub mod pagerank;

pub use decay::DecayStrategy;
pub use hybrid::IncrementalHybridPersonalizedPageRankSalsa;
pub use pagerank::IncrementalPersonalizedPageRank;

use log::warn;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::{
	collections::{hash_map::DefaultHasher, BTreeSet, HashMap, HashSet},
	hash::{Hash, Hasher},
};

/// A recorded walk. The first vertex is always the root.
pub type RandomWalk<V> = Vec<V>;

/// One transition of a walk over some graph.
pub(crate) trait WalkStep<V>: Sync {
	/// Picks the vertex following `walk`, or `None` to end it.
	fn next(&self, walk: &[V], rng: &mut StdRng) -> Option<V>;
}

/// Continues `walk` until the step ends it or it holds `max_len` vertices.
pub(crate) fn extend_walk<V, S: WalkStep<V>>(
	step: &S, walk: &mut RandomWalk<V>, max_len: usize, rng: &mut StdRng,
) {
	if walk.len() >= max_len {
		warn!(
			"Random walk requested for a walk already holding {} of at most {} vertices",
			walk.len(),
			max_len
		);
		return;
	}
	while walk.len() < max_len {
		match step.next(walk, rng) {
			Some(vertex) => walk.push(vertex),
			None => break,
		}
	}
}

/// Picks one candidate with probability proportional to its weight.
/// Candidates with non-positive or non-finite weights are never picked.
pub(crate) fn pick_weighted<T: Clone>(candidates: &[(T, f64)], rng: &mut StdRng) -> Option<T> {
	let usable: Vec<&(T, f64)> =
		candidates.iter().filter(|(_, w)| w.is_finite() && *w > 0.0).collect();
	usable.choose_weighted(rng, |(_, w)| *w).ok().map(|(c, _)| c.clone())
}

/// Deterministic RNG for one walk of one simulation generation.
fn walk_rng(seed: u64, generation: u64, index: usize) -> StdRng {
	let mut hasher = DefaultHasher::new();
	generation.hash(&mut hasher);
	index.hash(&mut hasher);
	StdRng::seed_from_u64(hasher.finish() ^ seed)
}

/// Recorded walks plus a reverse index from vertex to the walks visiting it.
#[derive(Clone, Debug)]
pub(crate) struct WalkStore<V> {
	root: V,
	walks: Vec<RandomWalk<V>>,
	through: HashMap<V, BTreeSet<usize>>,
	max_walk_length: usize,
	seed: u64,
	generation: u64,
}

impl<V: Clone + Eq + Hash + Send + Sync> WalkStore<V> {
	pub(crate) fn new(root: V, max_walk_length: usize, seed: Option<u64>) -> Self {
		Self {
			root,
			walks: Vec::new(),
			through: HashMap::new(),
			max_walk_length,
			seed: seed.unwrap_or_else(rand::random),
			generation: 0,
		}
	}

	pub(crate) fn walks(&self) -> &[RandomWalk<V>] {
		&self.walks
	}

	/// Replaces every walk with `repetitions` fresh walks from the root.
	pub(crate) fn simulate_all<S: WalkStep<V>>(&mut self, step: &S, repetitions: usize) {
		self.generation += 1;
		let (root, max_len, seed, generation) =
			(&self.root, self.max_walk_length, self.seed, self.generation);
		let walks: Vec<RandomWalk<V>> = (0..repetitions)
			.into_par_iter()
			.map(|i| {
				let mut rng = walk_rng(seed, generation, i);
				let mut walk = vec![root.clone()];
				extend_walk(step, &mut walk, max_len, &mut rng);
				walk
			})
			.collect();

		self.walks = walks;
		self.through.clear();
		for (i, walk) in self.walks.iter().enumerate() {
			for vertex in walk {
				self.through.entry(vertex.clone()).or_default().insert(i);
			}
		}
	}

	/// Re-simulates the walks visiting any of `changed`, keeping each walk up to
	/// and including its first changed vertex. Returns the number of walks
	/// re-simulated.
	pub(crate) fn resimulate_through<S: WalkStep<V>>(&mut self, step: &S, changed: &[V]) -> usize {
		let changed: HashSet<&V> = changed.iter().collect();
		let affected: BTreeSet<usize> = changed
			.iter()
			.filter_map(|vertex| self.through.get(*vertex))
			.flat_map(|walks| walks.iter().copied())
			.collect();
		if affected.is_empty() {
			return 0;
		}

		self.generation += 1;
		let (max_len, seed, generation) = (self.max_walk_length, self.seed, self.generation);
		let prefixes: Vec<(usize, RandomWalk<V>)> = affected
			.iter()
			.filter_map(|&i| {
				let walk = self.walks.get(i)?;
				let cut = walk.iter().position(|vertex| changed.contains(vertex))?;
				// A full prefix has nothing left to re-simulate.
				(cut + 1 < max_len).then(|| (i, walk[..=cut].to_vec()))
			})
			.collect();

		let rewalked: Vec<(usize, RandomWalk<V>)> = prefixes
			.into_par_iter()
			.map(|(i, mut walk)| {
				let mut rng = walk_rng(seed, generation, i);
				extend_walk(step, &mut walk, max_len, &mut rng);
				(i, walk)
			})
			.collect();

		let count = rewalked.len();
		for (i, walk) in rewalked {
			self.replace(i, walk);
		}
		count
	}

	fn replace(&mut self, i: usize, walk: RandomWalk<V>) {
		let old = std::mem::replace(&mut self.walks[i], walk);
		for vertex in &old {
			if let Some(walks) = self.through.get_mut(vertex) {
				walks.remove(&i);
				if walks.is_empty() {
					self.through.remove(vertex);
				}
			}
		}
		for vertex in &self.walks[i] {
			self.through.entry(vertex.clone()).or_default().insert(i);
		}
	}

	/// Number of times each vertex occurs across all walks.
	pub(crate) fn visit_counts(&self) -> HashMap<&V, usize> {
		let mut counts = HashMap::new();
		for vertex in self.walks.iter().flatten() {
			*counts.entry(vertex).or_insert(0) += 1;
		}
		counts
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::Rng;

	/// Counts upwards, ending with probability one half.
	struct Counter;

	impl WalkStep<u32> for Counter {
		fn next(&self, walk: &[u32], rng: &mut StdRng) -> Option<u32> {
			let last = walk.last()?;
			rng.gen_bool(0.5).then(|| last + 1)
		}
	}

	#[test]
	fn test_pick_weighted_ignores_non_positive() {
		let mut rng = StdRng::seed_from_u64(7);
		let candidates = vec![("zero", 0.0), ("negative", -1.0), ("nan", f64::NAN), ("one", 1.0)];
		for _ in 0..20 {
			assert_eq!(pick_weighted(&candidates, &mut rng), Some("one"));
		}
		assert_eq!(pick_weighted::<&str>(&[("zero", 0.0)], &mut rng), None);
		assert_eq!(pick_weighted::<&str>(&[], &mut rng), None);
	}

	#[test]
	fn test_extend_walk_respects_max_length() {
		let mut rng = StdRng::seed_from_u64(1);
		let mut walk = vec![0, 1, 2];
		extend_walk(&Counter, &mut walk, 3, &mut rng);
		assert_eq!(walk, vec![0, 1, 2]);

		for _ in 0..50 {
			let mut walk = vec![0];
			extend_walk(&Counter, &mut walk, 4, &mut rng);
			assert!(!walk.is_empty() && walk.len() <= 4);
		}
	}

	#[test]
	fn test_seeded_simulation_is_reproducible() {
		let mut a = WalkStore::new(0u32, 10, Some(42));
		let mut b = WalkStore::new(0u32, 10, Some(42));
		a.simulate_all(&Counter, 100);
		b.simulate_all(&Counter, 100);
		assert_eq!(a.walks(), b.walks());
		assert_eq!(a.walks().len(), 100);
		assert!(a.walks().iter().all(|walk| walk[0] == 0));
	}

	#[test]
	fn test_resimulate_only_touches_affected_walks() {
		let mut store = WalkStore::new(0u32, 10, Some(3));
		store.simulate_all(&Counter, 200);
		let before = store.walks().to_vec();
		let visiting: Vec<usize> = (0..before.len()).filter(|&i| before[i].contains(&2)).collect();

		let count = store.resimulate_through(&Counter, &[2]);
		assert_eq!(count, visiting.len());
		for (i, walk) in store.walks().iter().enumerate() {
			if visiting.contains(&i) {
				assert_eq!(walk[..3], before[i][..3]);
			} else {
				assert_eq!(walk, &before[i]);
			}
		}

		// The reverse index follows the replaced walks.
		let counts = store.visit_counts();
		let total: usize = counts.values().sum();
		assert_eq!(total, store.walks().iter().map(Vec::len).sum::<usize>());
		assert_eq!(store.resimulate_through(&Counter, &[99]), 0);
	}
}
