use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::sync::{feed::RetryPolicy, visibility::RevealPolicy};

/// The application's configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Reconnection policy of live room change feeds.
    pub feed_retry: RetryPolicy,
    /// Task and reward writes allowed per user per minute.
    pub mutation_rate_limit_per_minute: u32,
    /// When a reward's receiver may read it.
    pub reward_reveal: RevealPolicy,
    /// Apply the bundled schema at startup.
    pub run_migrations: bool,
}

/// Reads `key`, falling back to `default`, and parses it.
fn var_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid {}: `{}`", key, raw))
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let feed_retry = RetryPolicy {
            max_retries: var_or("FEED_MAX_RETRIES", "5")?,
            base_delay: Duration::from_millis(var_or("FEED_BACKOFF_BASE_MS", "250")?),
            max_delay: Duration::from_millis(var_or("FEED_BACKOFF_MAX_MS", "8000")?),
            connect_timeout: Duration::from_millis(var_or("FEED_CONNECT_TIMEOUT_MS", "10000")?),
        };
        if feed_retry.base_delay > feed_retry.max_delay {
            anyhow::bail!("FEED_BACKOFF_BASE_MS must not exceed FEED_BACKOFF_MAX_MS");
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: var_or("BIND_ADDR", "127.0.0.1:3000")?,
            cors_origins,
            feed_retry,
            mutation_rate_limit_per_minute: var_or("MUTATION_RATE_LIMIT_PER_MINUTE", "120")?,
            reward_reveal: var_or("REWARD_REVEAL", "always")?,
            run_migrations: var_or("RUN_MIGRATIONS", "true")?,
        })
    }
}
