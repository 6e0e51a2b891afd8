use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::feed::FeedSettings;
use crate::velocity::VelocityConfig;

/// Service configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "fraudgate")]
#[command(about = "Transaction fraud detection and maker-checker credit actions")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "FRAUDGATE_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Path to policy YAML file
    #[arg(long, default_value = "policy.yaml", env = "FRAUDGATE_POLICY_PATH")]
    pub policy_path: PathBuf,

    /// Policy reload check interval in seconds (0 disables the watcher)
    #[arg(long, default_value = "30", env = "FRAUDGATE_POLICY_RELOAD_SECS")]
    pub policy_reload_secs: u64,

    /// Postgres connection URL; in-memory stores are used when unset
    #[arg(long, env = "FRAUDGATE_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, default_value = "1", env = "FRAUDGATE_DB_MIN_CONNECTIONS")]
    pub db_min_connections: u32,

    #[arg(long, default_value = "10", env = "FRAUDGATE_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// Velocity window in seconds
    #[arg(long, default_value = "60", env = "FRAUDGATE_VELOCITY_WINDOW_SECS")]
    pub velocity_window_secs: u64,

    /// Transactions per window that trigger a velocity alert
    #[arg(long, default_value = "5", env = "FRAUDGATE_VELOCITY_MAX_COUNT")]
    pub velocity_max_count: i64,

    /// Summed amount per window (cents) that triggers a velocity alert
    #[arg(long, default_value = "100000", env = "FRAUDGATE_VELOCITY_MAX_AMOUNT_CENTS")]
    pub velocity_max_amount_cents: i64,

    /// Expired counter sweep interval in seconds (0 disables the sweeper)
    #[arg(long, default_value = "60", env = "FRAUDGATE_COUNTER_SWEEP_SECS")]
    pub counter_sweep_secs: u64,

    /// Deadline for processing one event, in milliseconds
    #[arg(long, default_value = "2000", env = "FRAUDGATE_EVENT_DEADLINE_MS")]
    pub event_deadline_ms: u64,

    /// In-process feed capacity
    #[arg(long, default_value = "1024", env = "FRAUDGATE_FEED_CAPACITY")]
    pub feed_capacity: usize,

    /// Deliveries per event before it is dead-lettered
    #[arg(long, default_value = "5", env = "FRAUDGATE_FEED_MAX_ATTEMPTS")]
    pub feed_max_attempts: u32,

    /// Base redelivery backoff in milliseconds
    #[arg(long, default_value = "200", env = "FRAUDGATE_FEED_RETRY_BACKOFF_MS")]
    pub feed_retry_backoff_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, default_value = "false", env = "FRAUDGATE_LOG_JSON")]
    pub log_json: bool,

    /// Install the Prometheus recorder and serve /metrics
    #[arg(long, default_value = "true", env = "FRAUDGATE_METRICS_ENABLED")]
    pub metrics_enabled: bool,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "FRAUDGATE_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30", env = "FRAUDGATE_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Get policy reload interval as Duration.
    pub fn policy_reload_interval(&self) -> Duration {
        Duration::from_secs(self.policy_reload_secs)
    }

    /// Get shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn counter_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.counter_sweep_secs)
    }

    pub fn event_deadline(&self) -> Duration {
        Duration::from_millis(self.event_deadline_ms)
    }

    pub fn velocity(&self) -> VelocityConfig {
        VelocityConfig {
            window: Duration::from_secs(self.velocity_window_secs),
            max_tx_count: self.velocity_max_count,
            max_total_amount_cents: self.velocity_max_amount_cents,
        }
    }

    pub fn feed(&self) -> FeedSettings {
        FeedSettings {
            capacity: self.feed_capacity,
            max_attempts: self.feed_max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.feed_retry_backoff_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            policy_path: PathBuf::from("policy.yaml"),
            policy_reload_secs: 30,
            database_url: None,
            db_min_connections: 1,
            db_max_connections: 10,
            velocity_window_secs: 60,
            velocity_max_count: 5,
            velocity_max_amount_cents: 100_000,
            counter_sweep_secs: 60,
            event_deadline_ms: 2000,
            feed_capacity: 1024,
            feed_max_attempts: 5,
            feed_retry_backoff_ms: 200,
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: true,
            graceful_shutdown: true,
            shutdown_timeout_secs: 30,
        }
    }
}
