//! Core document storage trait.
//!
//! [`DocumentStorage`] defines the fundamental write/read/delete operations.
//! Every successful write regenerates the document's index rows and
//! reference edges as part of the same atomic unit — there is no way to
//! store a document whose index lags or leads its body.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::types::Document;

/// Core storage operations for documents.
///
/// # Versioning
///
/// Every mutating operation produces a new version. Versions are positive
/// integers, strictly increasing per `(type, id)` with no gaps. A
/// caller-supplied `expected_version` turns the write into a
/// compare-and-swap: when it does not match the current version, the write
/// fails with a version conflict and nothing is stored. Concurrent writers
/// racing on the same expected version get exactly one success.
///
/// # Soft deletes
///
/// Deletion writes a tombstone version. The document stops appearing in
/// reads and searches, but every prior version stays readable through the
/// history ledger.
///
/// # Example
///
/// ```ignore
/// async fn example<S: DocumentStorage>(store: &S) -> StoreResult<()> {
///     let body = serde_json::json!({"status": "active"});
///     let doc = store.write("Order", "o-17", body, None).await?;
///     assert_eq!(doc.version(), 1);
///
///     let read = store.read("Order", "o-17").await?;
///     assert!(read.is_some());
///
///     store.soft_delete("Order", "o-17", doc.version()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Writes a document, creating version 1 if absent or the successor
    /// version otherwise.
    ///
    /// # Errors
    ///
    /// * `StoreError::Concurrency` — `expected_version` did not match
    /// * `StoreError::Validation` — the body is not a JSON object
    /// * `StoreError::Extraction` — a rule failed on this body; nothing
    ///   was stored
    async fn write(
        &self,
        doc_type: &str,
        id: &str,
        body: Value,
        expected_version: Option<i64>,
    ) -> StoreResult<Document>;

    /// Writes a document under a freshly generated id.
    async fn create(&self, doc_type: &str, body: Value) -> StoreResult<Document>;

    /// Reads the current version of a document.
    ///
    /// Returns `None` when the document does not exist or its current
    /// version is a tombstone.
    async fn read(&self, doc_type: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Soft-deletes a document, writing a tombstone version.
    ///
    /// Subject to the same optimistic-concurrency check as `write`; the
    /// tombstone's index regeneration (to zero rows) happens in the same
    /// atomic unit.
    ///
    /// # Errors
    ///
    /// * `StoreError::Document(NotFound)` — no live document at that key
    /// * `StoreError::Concurrency` — `expected_version` did not match
    async fn soft_delete(
        &self,
        doc_type: &str,
        id: &str,
        expected_version: i64,
    ) -> StoreResult<Document>;

    /// Checks whether a live document exists at the key.
    async fn exists(&self, doc_type: &str, id: &str) -> StoreResult<bool> {
        Ok(self.read(doc_type, id).await?.is_some())
    }

    /// Counts live documents, optionally restricted to one type.
    async fn count(&self, doc_type: Option<&str>) -> StoreResult<u64>;
}
