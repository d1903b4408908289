use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::AppError;

pub struct Config {
    pub port: u16,
    pub redis_url: Option<String>,
    pub default_limit: u64,
    pub max_limit: u64,
    pub seed_ttl: Duration,
    pub sweep_interval: Option<Duration>,
    pub admin_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let default_limit: u64 = try_load("DEFAULT_LIMIT", "100")?;
        let max_limit: u64 = try_load("MAX_LIMIT", "500")?;

        if default_limit == 0 || max_limit < default_limit {
            return Err(AppError::Config(format!(
                "DEFAULT_LIMIT {default_limit} must be within 1..={max_limit}"
            )));
        }

        let sweep_secs: u64 = try_load("SWEEP_INTERVAL_SECS", "0")?;

        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            redis_url: var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            default_limit,
            max_limit,
            seed_ttl: Duration::from_secs(try_load("SEED_TTL_SECS", "600")?),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            admin_token: read_secret("ADMIN_TOKEN"),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            redis_url: None,
            default_limit: 100,
            max_limit: 500,
            seed_ttl: Duration::from_secs(600),
            sweep_interval: None,
            admin_token: None,
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, AppError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {key} value: {e}")))
}

/// Docker secret first, then the plain environment variable.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .or_else(|_| env::var(secret_name))
        .ok()
        .filter(|secret| !secret.is_empty())
}
