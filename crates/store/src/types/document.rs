//! Stored document types.
//!
//! This module defines the [`Document`] type, which wraps a JSON record body
//! with persistence metadata: identity, version, timestamps, and deletion
//! state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned, typed, identified JSON record.
///
/// `Document` wraps an arbitrary nested JSON body along with the metadata the
/// store maintains for it:
///
/// - **Identity**: document type and id, unique together
/// - **Versioning**: a positive integer, starting at 1, incremented on every
///   successful write and used for optimistic concurrency
/// - **Timestamps**: last update time
/// - **Deletion**: soft-delete flag; a document is never physically removed
///
/// # Examples
///
/// ```
/// use vellum_store::types::Document;
/// use serde_json::json;
///
/// let doc = Document::new("Order", "o-17", json!({"status": "active"}));
/// assert_eq!(doc.doc_type(), "Order");
/// assert_eq!(doc.id(), "o-17");
/// assert_eq!(doc.version(), 1);
/// assert!(!doc.is_deleted());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// The document's type (schema family).
    doc_type: String,

    /// The document's id, unique within its type.
    id: String,

    /// The version, strictly increasing per `(type, id)`.
    version: i64,

    /// When this version was written.
    updated_at: DateTime<Utc>,

    /// Whether this version is a tombstone.
    deleted: bool,

    /// The record body.
    body: Value,
}

impl Document {
    /// Creates version 1 of a document with the given key and body.
    pub fn new(doc_type: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        Self {
            doc_type: doc_type.into(),
            id: id.into(),
            version: 1,
            updated_at: Utc::now(),
            deleted: false,
            body,
        }
    }

    /// Reconstructs a document from storage columns.
    pub fn from_storage(
        doc_type: impl Into<String>,
        id: impl Into<String>,
        version: i64,
        updated_at: DateTime<Utc>,
        deleted: bool,
        body: Value,
    ) -> Self {
        Self {
            doc_type: doc_type.into(),
            id: id.into(),
            version,
            updated_at,
            deleted,
            body,
        }
    }

    /// Returns the document type.
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Returns the document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns when this version was written.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns `true` if this version is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns the body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Consumes self and returns the body.
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Returns the composite key path, e.g. `Order/o-17`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.doc_type, self.id)
    }

    /// Creates the successor version of this document with a new body.
    pub fn next_version(self, body: Value) -> Self {
        Self {
            version: self.version + 1,
            updated_at: Utc::now(),
            deleted: false,
            body,
            ..self
        }
    }

    /// Creates the tombstone successor of this document.
    ///
    /// The body is replaced with JSON `null`; the prior body remains readable
    /// through the history ledger.
    pub fn tombstone(self) -> Self {
        Self {
            version: self.version + 1,
            updated_at: Utc::now(),
            deleted: true,
            body: Value::Null,
            ..self
        }
    }
}
