//! Store configuration.
//!
//! [`StoreConfig`] can be built programmatically, deserialized, or read from
//! the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `VELLUM_STORE_MAX_CONNECTIONS` | 10 | Connection pool capacity |
//! | `VELLUM_STORE_BUSY_TIMEOUT` | 5s | SQLite busy timeout (humantime) |
//! | `VELLUM_STORE_CONNECTION_TIMEOUT` | 30s | Pool checkout timeout (humantime) |
//! | `VELLUM_STORE_WAL` | true | Enable WAL journal mode |
//! | `VELLUM_STORE_PAGE_SIZE` | 50 | Default search page size |
//! | `VELLUM_STORE_MAX_PAGE_SIZE` | 500 | Search page size cap |
//! | `VELLUM_STORE_MAX_CHAIN_DEPTH` | 3 | Chained-search depth cap |

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Pool checkout timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Enable WAL mode for better read/write concurrency (file-backed only).
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Default page size for searches that do not specify a limit.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Upper bound on the page size a query may request.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Maximum number of reference hops a chained predicate may traverse.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    500
}

fn default_max_chain_depth() -> usize {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_chain_depth: default_max_chain_depth(),
        }
    }
}

impl StoreConfig {
    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u32>("VELLUM_STORE_MAX_CONNECTIONS") {
            config.max_connections = v.max(1);
        }
        if let Some(v) = env_duration("VELLUM_STORE_CONNECTION_TIMEOUT") {
            config.connection_timeout_ms = v.as_millis() as u64;
        }
        if let Some(v) = env_duration("VELLUM_STORE_BUSY_TIMEOUT") {
            config.busy_timeout_ms = v.as_millis() as u64;
        }
        if let Some(v) = env_parse::<bool>("VELLUM_STORE_WAL") {
            config.enable_wal = v;
        }
        if let Some(v) = env_parse::<u32>("VELLUM_STORE_PAGE_SIZE") {
            config.default_page_size = v.max(1);
        }
        if let Some(v) = env_parse::<u32>("VELLUM_STORE_MAX_PAGE_SIZE") {
            config.max_page_size = v.max(1);
        }
        if let Some(v) = env_parse::<usize>("VELLUM_STORE_MAX_CHAIN_DEPTH") {
            config.max_chain_depth = v.max(1);
        }

        config
    }

    /// Returns the pool checkout timeout as a [`Duration`].
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Returns the busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Clamps a requested page size to the configured bounds, substituting
    /// the default when none was requested.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_duration(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    humantime::parse_duration(&raw).ok()
}
