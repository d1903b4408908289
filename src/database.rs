//! # Listing Store
//!
//! Where car records live. The listing only needs a handful of queries:
//! - every id, in natural (insertion) order, once per permutation miss
//! - a batched lookup by id set, order unspecified, once per page
//! - a count, and a skip/limit page for the natural order
//! - single insert/remove/lookup for the admin flow
//!
//! ## Memory
//! Default when no Redis URL is configured. Lost on restart.
//!
//! ## Redis
//! - List `cars:ids`: ids in insertion order, natural listing order
//! - Hash `cars`: id to JSON encoded record
//! - Insert and remove touch both keys in one atomic pipeline
//! - Batched lookups are a single `HMGET`, missing fields come back nil
//! - Hash `users`: lowercased email to JSON encoded user, `HSETNX` keeps emails unique
//! - Hash `subscribers`: email to JSON encoded subscriber, overwritten on resubscribe
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Car,
    users::{Subscriber, User},
};

pub const CARS_KEY: &str = "cars";
pub const CAR_IDS_KEY: &str = "cars:ids";
pub const USERS_KEY: &str = "users";
pub const SUBSCRIBERS_KEY: &str = "subscribers";

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn list_ids(&self) -> Result<Vec<String>, AppError>;

    /// Ids that no longer resolve are left out.
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Car>, AppError>;

    async fn count(&self) -> Result<u64, AppError>;

    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Vec<Car>, AppError>;

    async fn fetch_one(&self, id: &str) -> Result<Option<Car>, AppError>;

    /// Assigns a fresh id and returns the stored record.
    async fn insert(&self, car: Car) -> Result<Car, AppError>;

    async fn remove(&self, id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user_exists(&self, email: &str) -> Result<bool, AppError>;

    async fn find_user(&self, email: &str) -> Result<Option<User>, AppError>;

    /// False when the email is already taken, nothing is written then.
    async fn create_user(&self, user: User) -> Result<bool, AppError>;

    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<(), AppError>;

    async fn find_subscriber(&self, email: &str) -> Result<Option<Subscriber>, AppError>;
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Default)]
struct Records {
    order: Vec<String>,
    cars: HashMap<String, Car>,
}

#[derive(Default)]
struct Accounts {
    users: HashMap<String, User>,
    subscribers: HashMap<String, Subscriber>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
    accounts: RwLock<Accounts>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn list_ids(&self) -> Result<Vec<String>, AppError> {
        Ok(self.records.read().await.order.clone())
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Car>, AppError> {
        let records = self.records.read().await;

        Ok(ids
            .iter()
            .filter_map(|id| records.cars.get(id).cloned())
            .collect())
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.records.read().await.order.len() as u64)
    }

    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Vec<Car>, AppError> {
        let records = self.records.read().await;

        Ok(records
            .order
            .iter()
            .skip(skip)
            .take(limit)
            .filter_map(|id| records.cars.get(id).cloned())
            .collect())
    }

    async fn fetch_one(&self, id: &str) -> Result<Option<Car>, AppError> {
        Ok(self.records.read().await.cars.get(id).cloned())
    }

    async fn insert(&self, mut car: Car) -> Result<Car, AppError> {
        car.id = new_id();

        let mut records = self.records.write().await;
        records.order.push(car.id.clone());
        records.cars.insert(car.id.clone(), car.clone());

        Ok(car)
    }

    async fn remove(&self, id: &str) -> Result<bool, AppError> {
        let mut records = self.records.write().await;

        if records.cars.remove(id).is_none() {
            return Ok(false);
        }
        records.order.retain(|existing| existing != id);

        Ok(true)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_exists(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.accounts.read().await.users.contains_key(email))
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.accounts.read().await.users.get(email).cloned())
    }

    async fn create_user(&self, user: User) -> Result<bool, AppError> {
        let mut accounts = self.accounts.write().await;

        if accounts.users.contains_key(&user.email) {
            return Ok(false);
        }
        accounts.users.insert(user.email.clone(), user);

        Ok(true)
    }

    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<(), AppError> {
        self.accounts
            .write()
            .await
            .subscribers
            .insert(subscriber.email.clone(), subscriber);

        Ok(())
    }

    async fn find_subscriber(&self, email: &str) -> Result<Option<Subscriber>, AppError> {
        Ok(self.accounts.read().await.subscribers.get(email).cloned())
    }
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, AppError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis");

    Ok(connection_manager)
}

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str, field: &str) -> Result<Option<T>, AppError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.hget(key, field).await?;

        value
            .map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Car>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut connection = self.connection.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(CARS_KEY)
            .arg(ids)
            .query_async(&mut connection)
            .await?;

        values
            .into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .collect()
    }
}

#[async_trait]
impl ListingStore for RedisStore {
    async fn list_ids(&self) -> Result<Vec<String>, AppError> {
        let mut connection = self.connection.clone();

        Ok(connection.lrange(CAR_IDS_KEY, 0, -1).await?)
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Car>, AppError> {
        self.get_many(ids).await
    }

    async fn count(&self) -> Result<u64, AppError> {
        let mut connection = self.connection.clone();

        Ok(connection.llen(CAR_IDS_KEY).await?)
    }

    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Vec<Car>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut connection = self.connection.clone();
        let stop = skip.saturating_add(limit - 1);
        let ids: Vec<String> = connection
            .lrange(CAR_IDS_KEY, skip as isize, stop.min(isize::MAX as usize) as isize)
            .await?;

        let mut by_id: HashMap<String, Car> = self
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|car| (car.id.clone(), car))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn fetch_one(&self, id: &str) -> Result<Option<Car>, AppError> {
        self.get_json(CARS_KEY, id).await
    }

    async fn insert(&self, mut car: Car) -> Result<Car, AppError> {
        car.id = new_id();
        let json = serde_json::to_string(&car)?;

        let mut connection = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(CARS_KEY, &car.id, json)
            .ignore()
            .rpush(CAR_IDS_KEY, &car.id)
            .ignore()
            .query_async(&mut connection)
            .await?;

        Ok(car)
    }

    async fn remove(&self, id: &str) -> Result<bool, AppError> {
        let mut connection = self.connection.clone();
        let (removed, _): (u64, u64) = redis::pipe()
            .atomic()
            .hdel(CARS_KEY, id)
            .lrem(CAR_IDS_KEY, 0, id)
            .query_async(&mut connection)
            .await?;

        Ok(removed > 0)
    }
}

#[async_trait]
impl UserStore for RedisStore {
    async fn user_exists(&self, email: &str) -> Result<bool, AppError> {
        let mut connection = self.connection.clone();

        Ok(connection.hexists(USERS_KEY, email).await?)
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, AppError> {
        self.get_json(USERS_KEY, email).await
    }

    async fn create_user(&self, user: User) -> Result<bool, AppError> {
        let json = serde_json::to_string(&user)?;

        let mut connection = self.connection.clone();

        Ok(connection.hset_nx(USERS_KEY, &user.email, json).await?)
    }

    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<(), AppError> {
        let json = serde_json::to_string(&subscriber)?;

        let mut connection = self.connection.clone();
        let _: () = connection.hset(SUBSCRIBERS_KEY, &subscriber.email, json).await?;

        Ok(())
    }

    async fn find_subscriber(&self, email: &str) -> Result<Option<Subscriber>, AppError> {
        self.get_json(SUBSCRIBERS_KEY, email).await
    }
}
