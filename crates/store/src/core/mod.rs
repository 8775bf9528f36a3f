//! Storage traits and abstractions.
//!
//! The traits here are the store's whole external contract: document CRUD
//! with optimistic concurrency ([`DocumentStorage`]), the history ledger
//! ([`HistoryProvider`]), and search ([`SearchProvider`]). Backends
//! implement all three.

mod history;
mod search;
mod storage;

pub use history::{HistoryEntry, HistoryProvider, Operation};
pub use search::{SearchProvider, SearchSet};
pub use storage::DocumentStorage;
