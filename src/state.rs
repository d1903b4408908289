use std::sync::Arc;

use tracing::info;

use super::{
    cache::MemoryCache,
    config::Config,
    database::{ListingStore, MemoryStore, RedisStore, UserStore, init_redis},
    error::AppError,
    randomizer::{OsSeedSource, Randomizer},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn ListingStore>,
    pub users: Arc<dyn UserStore>,
    pub randomizer: Randomizer,
}

impl State {
    pub async fn new() -> Result<Arc<Self>, AppError> {
        let config = Config::load()?;

        match config.redis_url.clone() {
            Some(redis_url) => {
                let store = Arc::new(RedisStore::new(init_redis(&redis_url).await?));
                Ok(Self::with_store(config, store))
            }
            None => {
                info!("REDIS_URL not set, using in-memory store");
                Ok(Self::with_store(config, Arc::new(MemoryStore::new())))
            }
        }
    }

    /// One backend serving both cars and accounts.
    pub fn with_store<S>(config: Config, store: Arc<S>) -> Arc<Self>
    where
        S: ListingStore + UserStore + 'static,
    {
        let randomizer = Randomizer::new(
            Arc::new(MemoryCache::new(config.seed_ttl)),
            Arc::new(OsSeedSource),
        );

        Self::with_parts(config, store.clone(), store, randomizer)
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn ListingStore>,
        users: Arc<dyn UserStore>,
        randomizer: Randomizer,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            users,
            randomizer,
        })
    }
}
