//! Vellum Record Store
//!
//! This crate stores semi-structured clinical records — arbitrary nested
//! JSON documents identified by a type and an id — and answers structured
//! queries against arbitrary fields of those documents without a fixed
//! relational schema per field.
//!
//! # Features
//!
//! - **Versioned documents**: every write is a new version; soft deletes
//!   keep full history; optimistic concurrency via expected versions
//! - **Write-time indexing**: a declarative per-type rule table derives
//!   typed index rows and reference edges in the same transaction as the
//!   document write, so the index can never drift from the body
//! - **Rich search**: string/number/date/token/reference predicates,
//!   missing-value tests, chained and reverse-chained reference traversal,
//!   composite same-occurrence matching, includes, sorting, paging
//! - **Schema evolution without migrations**: unmapped types and absent
//!   paths extract to zero rows instead of failing
//!
//! # Architecture
//!
//! - [`types`] - Documents and the query model
//! - [`reference`] - Canonical reference normalization
//! - [`index`] - Rule registry, path expressions, and the extractor
//! - [`core`] - Storage traits ([`DocumentStorage`], [`HistoryProvider`],
//!   [`SearchProvider`])
//! - [`backends`] - The SQLite backend
//! - [`bulk`] - Bounded-concurrency bulk import
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use vellum_store::backends::sqlite::SqliteStore;
//! use vellum_store::index::{ParameterRule, RuleRegistry};
//! use vellum_store::{DocumentStorage, Predicate, Query, SearchProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Describe what gets indexed, per document type.
//! let registry = Arc::new(
//!     RuleRegistry::builder()
//!         .rule("Order", ParameterRule::token("status", "status")?)
//!         .rule("Order", ParameterRule::date("placed", "placedAt")?)
//!         .build(),
//! );
//!
//! let store = SqliteStore::in_memory(registry)?;
//!
//! // Write a document; its index rows are derived in the same transaction.
//! let doc = store
//!     .write("Order", "o-17", json!({"status": "active", "placedAt": "2024-03"}), None)
//!     .await?;
//! assert_eq!(doc.version(), 1);
//!
//! // Query it back through the index.
//! let results = store
//!     .search(&Query::new("Order").with(Predicate::eq("status", "active")))
//!     .await?;
//! assert_eq!(results.total, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod bulk;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod reference;
pub mod types;

// Re-export commonly used types at crate root
pub use config::StoreConfig;
pub use core::{
    DocumentStorage, HistoryEntry, HistoryProvider, Operation, SearchProvider, SearchSet,
};
pub use error::{StoreError, StoreResult};
pub use reference::CanonicalRef;
pub use types::{Document, Modifier, ParamKind, Predicate, Query, ReverseChain, Sort};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
