//! Error types for the document store.
//!
//! All fallible operations return [`StoreResult`]. The top-level [`StoreError`]
//! groups errors by category: document state, concurrency, validation,
//! extraction, search, and backend faults.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Document state errors (missing documents or versions).
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Concurrency and versioning errors.
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Structural validation errors.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Index extraction errors.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Search planning and execution errors.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Backend-specific errors.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to document state.
///
/// These are expected, recoverable conditions: the caller decides whether a
/// missing document is an error at all. They are never retried internally.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// No current document at that key.
    #[error("document not found: {doc_type}/{id}")]
    NotFound { doc_type: String, id: String },

    /// The requested version was never written for that key.
    #[error("version not found: {doc_type}/{id} v{version}")]
    VersionNotFound {
        doc_type: String,
        id: String,
        version: i64,
    },

    /// A document with the given key already exists (create-only paths).
    #[error("document already exists: {doc_type}/{id}")]
    AlreadyExists { doc_type: String, id: String },
}

/// Errors related to optimistic concurrency control.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The caller-supplied expected version did not match the current version.
    ///
    /// Exactly one of two racing writers sees this; the caller re-reads and
    /// retries if it still wants the write.
    #[error("version conflict on {doc_type}/{id}: expected {expected}, found {actual}")]
    VersionConflict {
        doc_type: String,
        id: String,
        expected: i64,
        actual: i64,
    },
}

/// Errors related to structural well-formedness of a document.
///
/// This is not schema validation: any JSON object is a valid body. Scalars,
/// arrays, and empty keys are not.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The body fails structural well-formedness.
    #[error("malformed document: {message}")]
    MalformedDocument { message: String },

    /// A document key component is empty or contains reserved characters.
    #[error("invalid document key: {message}")]
    InvalidKey { message: String },
}

/// Errors raised while deriving index rows from a document.
///
/// Fatal to the individual write (the whole atomic unit rolls back), never
/// fatal to the process, and never retried internally.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// A rule produced a value the converter could not represent.
    #[error("extraction failed for {doc_type}/{id}, rule '{rule}': {message}")]
    RuleFailed {
        doc_type: String,
        id: String,
        rule: String,
        message: String,
    },
}

/// Errors related to search planning.
///
/// These are caller errors, reported with enough detail to fix the request.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The parameter is not registered for the queried type.
    #[error("unknown search parameter '{parameter}' for type '{doc_type}'")]
    UnknownParameter { doc_type: String, parameter: String },

    /// The modifier is not valid for the parameter's kind.
    #[error("modifier '{modifier}' not valid for parameter '{parameter}'")]
    InvalidModifier { parameter: String, modifier: String },

    /// A query value could not be interpreted for the parameter's kind.
    #[error("invalid value for parameter '{parameter}': {message}")]
    InvalidValue { parameter: String, message: String },

    /// A chained parameter traverses a reference with no single declared target.
    #[error("ambiguous chain through '{parameter}': declare a single target type")]
    AmbiguousChain { parameter: String },

    /// The chain is longer than the configured maximum.
    #[error("chain through '{parameter}' exceeds maximum depth {max}")]
    ChainTooDeep { parameter: String, max: usize },
}

/// Errors originating from the storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend could not be established.
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The connection pool is exhausted.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Serialization or deserialization of a stored body failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Internal backend fault.
    #[error("internal backend error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Returns `true` if this error is an expected, recoverable condition
    /// (missing document or version conflict) rather than a fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::Document(_) | StoreError::Concurrency(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(BackendError::Serialization {
            message: err.to_string(),
        })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(BackendError::Internal {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(_err: r2d2::Error) -> Self {
        StoreError::Backend(BackendError::PoolExhausted)
    }
}
