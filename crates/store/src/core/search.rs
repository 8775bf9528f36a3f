//! Search execution trait and result set.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{Document, Query};

/// One page of search results.
///
/// Documents are deduplicated and stably ordered; `total` counts every match
/// before the page was cut, so callers can paginate. Included documents are
/// the resolved targets of the query's include directives, deduplicated and
/// excluded when they are already in the page.
#[derive(Debug, Clone, Default)]
pub struct SearchSet {
    /// The matching documents for this page.
    pub documents: Vec<Document>,

    /// Documents attached by include directives.
    pub included: Vec<Document>,

    /// The total number of matches across all pages.
    pub total: u64,
}

impl SearchSet {
    /// Returns `true` if no documents matched at all.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Query planning and execution over the index tables.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Executes a query and hydrates the matching documents.
    ///
    /// # Errors
    ///
    /// * `StoreError::Search` — the query names an unregistered parameter,
    ///   an invalid modifier/kind combination, or a value the parameter's
    ///   kind cannot interpret
    async fn search(&self, query: &Query) -> StoreResult<SearchSet>;
}
