//! Bounded-concurrency bulk import.
//!
//! Bulk loading is the dominant throughput scenario, so documents fan out
//! over per-document write pipelines guarded by a semaphore: one slow
//! extraction never stalls the rest, and there is no global serialization
//! point. Every document still goes through the normal atomic write path —
//! bulk import has no separate consistency rules.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::DocumentStorage;
use crate::error::StoreResult;
use crate::types::Document;

/// One document to import.
#[derive(Debug, Clone)]
pub struct ImportItem {
    /// Target document type.
    pub doc_type: String,
    /// Target document id.
    pub id: String,
    /// The body to write.
    pub body: serde_json::Value,
}

impl ImportItem {
    /// Creates an import item.
    pub fn new(
        doc_type: impl Into<String>,
        id: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            doc_type: doc_type.into(),
            id: id.into(),
            body,
        }
    }
}

/// The per-document result of an import.
#[derive(Debug)]
pub struct ImportOutcome {
    /// The document type submitted.
    pub doc_type: String,
    /// The document id submitted.
    pub id: String,
    /// The written document, or why the write was rejected.
    pub result: StoreResult<Document>,
}

/// Summary of a bulk import run.
#[derive(Debug)]
pub struct ImportReport {
    /// Per-document outcomes, in submission order.
    pub outcomes: Vec<ImportOutcome>,
}

impl ImportReport {
    /// Counts successful writes.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Counts rejected writes.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Imports many documents with at most `concurrency` writes in flight.
///
/// Failures are per-document: a rejected write (malformed body, extraction
/// failure) lands in its outcome and the rest of the batch proceeds.
pub async fn import<S>(store: Arc<S>, items: Vec<ImportItem>, concurrency: usize) -> ImportReport
where
    S: DocumentStorage + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    let total = items.len();
    for (index, item) in items.into_iter().enumerate() {
        let store = store.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore open");
            let result = store
                .write(&item.doc_type, &item.id, item.body, None)
                .await;
            (
                index,
                ImportOutcome {
                    doc_type: item.doc_type,
                    id: item.id,
                    result,
                },
            )
        });
    }

    let mut slots: Vec<Option<ImportOutcome>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined.expect("import task panicked");
        slots[index] = Some(outcome);
    }

    let report = ImportReport {
        outcomes: slots
            .into_iter()
            .map(|slot| slot.expect("every slot filled"))
            .collect(),
    };

    tracing::debug!(
        total,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "bulk import finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sqlite::SqliteStore;
    use crate::index::{ParameterRule, RuleRegistry};
    use serde_json::json;

    #[tokio::test]
    async fn test_import_mixes_successes_and_failures() {
        let registry = Arc::new(
            RuleRegistry::builder()
                .rule("Order", ParameterRule::number("total", "total").unwrap())
                .build(),
        );
        let store = Arc::new(SqliteStore::in_memory(registry).unwrap());

        let items = vec![
            ImportItem::new("Order", "o-1", json!({"total": 10})),
            // A total the number rule cannot convert rejects only this item.
            ImportItem::new("Order", "o-2", json!({"total": "many"})),
            ImportItem::new("Order", "o-3", json!({"total": 30})),
        ];

        let report = import(store.clone(), items, 2).await;
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[1].id, "o-2");
        assert!(report.outcomes[1].result.is_err());

        assert!(store.read("Order", "o-1").await.unwrap().is_some());
        assert!(store.read("Order", "o-2").await.unwrap().is_none());
        assert!(store.read("Order", "o-3").await.unwrap().is_some());
    }
}
