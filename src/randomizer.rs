//! # Seeded Listing Randomizer
//!
//! Sits between the listing route and the store.
//!
//! - Client asks for `random=true`, optionally with a seed from an earlier page
//! - No usable seed: generate one, the response hands it back for later pages
//! - Seed cached: serve its permutation as is
//! - Seed not cached: fetch every id, shuffle with the seed, cache with `now`
//!
//! Items added after a permutation was built only show up once it expires.
use std::{future::Future, sync::Arc, time::Instant};

use tracing::debug;

use crate::{
    cache::{Permutation, PermutationCache},
    error::AppError,
    shuffle::seeded_shuffle,
};

const SEED_BYTES: usize = 16;
const MAX_SEED_LEN: usize = 128;

pub trait SeedSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Hex encoded bytes from the thread RNG.
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn generate(&self) -> String {
        hex::encode(rand::random::<[u8; SEED_BYTES]>())
    }
}

#[derive(Clone)]
pub struct Randomizer {
    cache: Arc<dyn PermutationCache>,
    seeds: Arc<dyn SeedSource>,
}

impl Randomizer {
    pub fn new(cache: Arc<dyn PermutationCache>, seeds: Arc<dyn SeedSource>) -> Self {
        Self { cache, seeds }
    }

    pub fn cache(&self) -> &dyn PermutationCache {
        self.cache.as_ref()
    }

    /// Missing or malformed seeds are replaced, never rejected.
    pub fn resolve_seed(&self, seed: Option<&str>) -> String {
        match seed.map(str::trim) {
            Some(seed) if is_well_formed(seed) => seed.to_string(),
            _ => self.seeds.generate(),
        }
    }

    pub fn sweep(&self, now: Instant) -> usize {
        let evicted = self.cache.evict_expired(now);

        if evicted > 0 {
            debug!("Evicted {evicted} expired seeds");
        }

        evicted
    }

    /// Cached permutation for `seed`, built from `all_ids` on a miss.
    pub async fn permutation<F, Fut>(&self, seed: &str, all_ids: F) -> Result<Permutation, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, AppError>>,
    {
        if let Some(permutation) = self.cache.get(seed, Instant::now()) {
            debug!(seed, "Permutation cache hit");

            return Ok(permutation);
        }

        let ids = all_ids().await?;
        debug!(seed, ids = ids.len(), "Permutation cache miss");

        let permutation = Permutation {
            ids: seeded_shuffle(&ids, seed).into(),
            created_at: Instant::now(),
        };
        self.cache.put(
            seed.to_string(),
            permutation.ids.clone(),
            permutation.created_at,
        );

        Ok(permutation)
    }
}

fn is_well_formed(seed: &str) -> bool {
    !seed.is_empty()
        && seed.len() <= MAX_SEED_LEN
        && seed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::{DEFAULT_TTL, MemoryCache};

    struct FixedSeed;

    impl SeedSource for FixedSeed {
        fn generate(&self) -> String {
            "fixed".to_string()
        }
    }

    fn randomizer() -> Randomizer {
        Randomizer::new(Arc::new(MemoryCache::default()), Arc::new(FixedSeed))
    }

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn generated_seeds_are_hex() {
        let seed = OsSeedSource.generate();

        assert_eq!(seed.len(), SEED_BYTES * 2);
        assert!(seed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(seed, OsSeedSource.generate());
    }

    #[test]
    fn usable_seed_kept() {
        assert_eq!(randomizer().resolve_seed(Some(" abc ")), "abc");
        assert_eq!(randomizer().resolve_seed(Some("a1-b2_c3")), "a1-b2_c3");
    }

    #[test]
    fn unusable_seed_replaced() {
        let randomizer = randomizer();
        let long = "a".repeat(MAX_SEED_LEN + 1);

        for seed in [None, Some(""), Some("   "), Some("a b"), Some("ü"), Some(long.as_str())] {
            assert_eq!(randomizer.resolve_seed(seed), "fixed");
        }
    }

    #[tokio::test]
    async fn miss_builds_then_hit_reuses() {
        let randomizer = randomizer();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let supplier = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(ids(10))
        };

        let first = randomizer.permutation("abc", supplier).await.unwrap();
        let second = randomizer.permutation("abc", supplier).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(first.ids, second.ids);
        assert_eq!(&*first.ids, seeded_shuffle(&ids(10), "abc").as_slice());
    }

    #[tokio::test]
    async fn snapshot_ignores_later_inserts() {
        let randomizer = randomizer();

        let first = randomizer.permutation("abc", || async { Ok::<_, AppError>(ids(5)) }).await.unwrap();
        let second = randomizer.permutation("abc", || async { Ok::<_, AppError>(ids(6)) }).await.unwrap();

        assert_eq!(second.ids.len(), 5);
        assert_eq!(first.ids, second.ids);
    }

    #[tokio::test]
    async fn supplier_failure_caches_nothing() {
        let randomizer = randomizer();

        let result = randomizer
            .permutation("abc", || async { Err::<Vec<String>, _>(AppError::MalformedPayload) })
            .await;

        assert!(result.is_err());
        assert!(randomizer.cache().is_empty());
    }

    #[tokio::test]
    async fn sweep_evicts_after_ttl() {
        let randomizer = randomizer();
        randomizer.permutation("abc", || async { Ok::<_, AppError>(ids(3)) }).await.unwrap();

        assert_eq!(randomizer.sweep(Instant::now()), 0);
        assert_eq!(randomizer.sweep(Instant::now() + DEFAULT_TTL), 1);
        assert!(randomizer.cache().is_empty());
    }
}
