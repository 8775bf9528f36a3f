//! Index derivation: rule registry, path expressions, value conversion, and
//! the parameter extractor.
//!
//! Everything here is pure derived-state machinery. The rows and edges the
//! extractor produces are owned by the storage backend and can be rebuilt
//! from document bodies at any time with no loss of information.

mod extractor;
mod path;
mod rules;
mod value;

pub use extractor::{Extraction, IndexRow, ParameterExtractor, ReferenceEdge, RuleFailure};
pub use path::{PathExpr, PathHit, PathParseError, Step};
pub use rules::{CompositeComponent, ParameterRule, RuleRegistry, RuleRegistryBuilder};
pub use value::{IndexValue, date_range, format_ts, parse_ts};
