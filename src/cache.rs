//! # Permutation Cache
//!
//! Seed to shuffled id order, kept for a fixed TTL (10 minutes by default).
//!
//! ## Lifecycle
//! - Absent until the first request with a seed misses
//! - Fresh while `now - created_at < ttl`
//! - Stale once the age reaches the TTL, never served again
//! - Removed by the next sweep, or replaced by the next miss
//!
//! ## Sweeping
//! Eviction is best effort and piggybacks on request traffic: every randomized
//! listing request sweeps first. A periodic task can be enabled on top.
//!
//! ## Concurrency
//! Two requests missing on the same new seed both compute and insert, last
//! write wins. Both orders come from the same seed and id list snapshot, so
//! the only cost is redundant work.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Debug)]
pub struct Permutation {
    pub ids: Arc<[String]>,
    pub created_at: Instant,
}

impl Permutation {
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

/// Storage for seed permutations, swappable for a shared external cache.
pub trait PermutationCache: Send + Sync {
    fn get(&self, seed: &str, now: Instant) -> Option<Permutation>;

    fn put(&self, seed: String, ids: Arc<[String]>, created_at: Instant);

    /// Returns the number of evicted entries.
    fn evict_expired(&self, now: Instant) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MemoryCache {
    ttl: Duration,
    entries: DashMap<String, Permutation>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl PermutationCache for MemoryCache {
    fn get(&self, seed: &str, now: Instant) -> Option<Permutation> {
        let entry = self.entries.get(seed)?;

        entry.is_fresh(now, self.ttl).then(|| entry.value().clone())
    }

    fn put(&self, seed: String, ids: Arc<[String]>, created_at: Instant) {
        self.entries.insert(seed, Permutation { ids, created_at });
    }

    fn evict_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();

        self.entries.retain(|_, entry| entry.is_fresh(now, self.ttl));

        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
