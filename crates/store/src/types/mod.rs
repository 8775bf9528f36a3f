//! Core types for stored documents and search queries.

mod document;
mod query;

pub use document::Document;
pub use query::{
    Comparator, Include, Modifier, ParamKind, Predicate, Query, QueryValue, ReverseChain, Sort,
    SortDirection,
};
