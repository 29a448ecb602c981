//! Engine configuration
//!
//! Thresholds are tunable, not load-bearing correctness parameters.
//! Defaults match the production client; env overrides follow the same
//! pattern as the rest of the Resonate services.

use std::time::Duration;

/// Ledger schema identifiers the engine reads from and writes to
#[derive(Debug, Clone)]
pub struct SchemaConfig {
    /// Post records (feed source)
    pub posts: String,
    /// Interaction events (likes, reposts, saves, comments)
    pub interactions: String,
    /// Notification records (inbox)
    pub notifications: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            posts: "resonate.posts.v1".to_string(),
            interactions: "resonate.interactions.v1".to_string(),
            notifications: "resonate.notifications.v1".to_string(),
        }
    }
}

/// Configuration for the reconciliation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL for the materialized feed snapshot (default: 5 minutes)
    pub feed_ttl: Duration,
    /// Polling interval when push subscriptions are unavailable (default: 10s)
    pub refresh_interval: Duration,
    /// How long to wait for a push subscription before falling back (default: 3s)
    pub subscribe_timeout: Duration,
    /// Queue length that triggers a batch flush (default: 50)
    pub batch_size: usize,
    /// Max age of the oldest unflushed item before a flush (default: 100ms)
    pub batch_delay: Duration,
    /// Initial feed window length (default: 20)
    pub page_size: usize,
    /// Post-count drift beyond which a restored window is rescaled (default: 0.2)
    pub window_drift_threshold: f64,
    /// Publisher identity whose records are queried
    pub publisher: String,
    /// Schema identifiers
    pub schemas: SchemaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_ttl: Duration::from_secs(5 * 60),
            refresh_interval: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(3),
            batch_size: 50,
            batch_delay: Duration::from_millis(100),
            page_size: 20,
            window_drift_threshold: 0.2,
            publisher: String::new(),
            schemas: SchemaConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RESONATE_FEED_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.feed_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("RESONATE_REFRESH_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.refresh_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("RESONATE_BATCH_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.batch_size = size.max(1);
            }
        }

        if let Ok(val) = std::env::var("RESONATE_BATCH_DELAY_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.batch_delay = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("RESONATE_PUBLISHER") {
            config.publisher = val;
        }

        config
    }

    /// Set the publisher identity whose records are queried
    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }
}
