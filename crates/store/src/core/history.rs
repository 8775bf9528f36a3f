//! The history ledger.
//!
//! Every version ever written gets one [`HistoryEntry`], created
//! synchronously with the write and never mutated afterwards. The ledger
//! serves read-at-version and audit; it is also what makes soft deletion
//! non-destructive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;
use crate::types::Document;

/// The operation a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// First version of a key.
    Create,
    /// Successor version with a new body.
    Update,
    /// Tombstone version.
    Delete,
}

impl Operation {
    /// Returns the storage encoding of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Parses the storage encoding.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Operation::Create),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// One version of one document, as recorded in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The owning document's type.
    pub doc_type: String,

    /// The owning document's id.
    pub id: String,

    /// The version this entry snapshots.
    pub version: i64,

    /// What kind of write produced this version.
    pub operation: Operation,

    /// The body as written (JSON `null` for tombstones).
    pub body: Value,

    /// When the version was written.
    pub written_at: DateTime<Utc>,
}

/// Version-aware read operations over the ledger.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Reads a document as it was at a specific version.
    ///
    /// Returns the document even if the key was subsequently deleted, as
    /// long as that version exists. Tombstone versions are returned with
    /// their deleted flag set.
    async fn read_at_version(
        &self,
        doc_type: &str,
        id: &str,
        version: i64,
    ) -> StoreResult<Option<Document>>;

    /// Returns every version of a document, ordered by version ascending.
    ///
    /// An empty vector means the key was never written.
    async fn history(&self, doc_type: &str, id: &str) -> StoreResult<Vec<HistoryEntry>>;

    /// Returns the current version number without reading the body, or
    /// `None` if the key was never written. Tombstoned keys still report
    /// their tombstone version.
    async fn current_version(&self, doc_type: &str, id: &str) -> StoreResult<Option<i64>>;
}
