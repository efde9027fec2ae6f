use std::sync::Arc;

use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::error::Result;
use crate::sync::feed::{ChangeFeedClient, RedisFeedTransport};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager (auth lookups, rate limits, publishing).
    pub redis: ConnectionManager,
    /// The Redis client, for pub/sub connections of partnership feeds.
    pub pubsub: redis::Client,
    /// Change feed client for live rooms; opens its own pub/sub connections.
    pub feed: ChangeFeedClient,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client.clone()).await?;
        tracing::info!("✅ Redis Connection Manager initialized");

        let feed = ChangeFeedClient::new(
            Arc::new(RedisFeedTransport::new(redis_client.clone())),
            config.feed_retry,
        );
        tracing::info!(
            max_retries = config.feed_retry.max_retries,
            "✅ Change feed client initialized"
        );

        Ok(AppState {
            db,
            redis,
            pubsub: redis_client,
            feed,
            config: config.clone(),
        })
    }
}
