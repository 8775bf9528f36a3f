//! SQLite backend.
//!
//! A complete implementation of all storage traits over one embedded SQLite
//! database, supporting in-memory mode (tests, ephemeral tooling) and
//! file-backed mode. Document writes, history appends, and index
//! regeneration share one IMMEDIATE transaction, which is what gives the
//! store its index/document consistency guarantee.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vellum_store::backends::sqlite::SqliteStore;
//! use vellum_store::index::{ParameterRule, RuleRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(
//!     RuleRegistry::builder()
//!         .rule("Order", ParameterRule::token("status", "status")?)
//!         .build(),
//! );
//! let store = SqliteStore::in_memory(registry)?;
//! # Ok(())
//! # }
//! ```

mod chain;
mod schema;
mod search;
mod storage;

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use crate::config::StoreConfig;
use crate::error::{BackendError, StoreError, StoreResult};
use crate::index::{ParameterExtractor, RuleRegistry};

/// SQLite-backed document store.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    config: StoreConfig,
    registry: Arc<RuleRegistry>,
    extractor: ParameterExtractor,
    is_memory: bool,
}

impl Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("registered_rules", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Creates an in-memory store. Each call gets its own database.
    pub fn in_memory(registry: Arc<RuleRegistry>) -> StoreResult<Self> {
        // Every pooled connection must see the same database, so a plain
        // `:memory:` path (one private database per connection) cannot work
        // here; a named shared-cache URI can.
        let uri = format!(
            "file:vellum-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        );
        Self::build(&uri, true, registry, StoreConfig::default())
    }

    /// Opens or creates a file-backed store with default configuration.
    pub fn open<P: AsRef<Path>>(path: P, registry: Arc<RuleRegistry>) -> StoreResult<Self> {
        Self::open_with_config(path, registry, StoreConfig::default())
    }

    /// Opens or creates a file-backed store with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        registry: Arc<RuleRegistry>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_string_lossy().into_owned();
        Self::build(&path, false, registry, config)
    }

    fn build(
        path: &str,
        is_memory: bool,
        registry: Arc<RuleRegistry>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let busy_timeout = config.busy_timeout();
        let enable_wal = config.enable_wal && !is_memory;

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        if is_memory {
            flags |= OpenFlags::SQLITE_OPEN_URI;
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(flags)
            .with_init(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                if enable_wal {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                }
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(1))
            .connection_timeout(config.connection_timeout())
            .build(manager)
            .map_err(|e| {
                StoreError::Backend(BackendError::ConnectionFailed {
                    message: e.to_string(),
                })
            })?;

        let store = Self {
            pool,
            config,
            extractor: ParameterExtractor::new(registry.clone()),
            registry,
            is_memory,
        };

        let conn = store.connection()?;
        schema::initialize(&conn)?;

        Ok(store)
    }

    /// Returns whether this store is in-memory.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the rule registry this store indexes under.
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn connection(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            StoreError::Backend(BackendError::ConnectionFailed {
                message: e.to_string(),
            })
        })
    }
}
