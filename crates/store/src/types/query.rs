//! Search query types.
//!
//! A query is a flat list of [`Predicate`]s ANDed together; the values inside
//! one predicate are ORed. The outward-facing router (out of scope here)
//! translates its wire syntax into this structure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kinds of values a search parameter can index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// A plain string, like a name or label.
    String,
    /// A number.
    Number,
    /// A date, datetime, or coarse-precision date.
    Date,
    /// A coded value with an optional coding-system qualifier.
    Token,
    /// A pointer to another document.
    Reference,
    /// Two sub-parameters satisfied by the same repeated-field occurrence.
    Composite,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Date => "date",
            ParamKind::Token => "token",
            ParamKind::Reference => "reference",
            ParamKind::Composite => "composite",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ParamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(ParamKind::String),
            "number" => Ok(ParamKind::Number),
            "date" => Ok(ParamKind::Date),
            "token" => Ok(ParamKind::Token),
            "reference" => Ok(ParamKind::Reference),
            "composite" => Ok(ParamKind::Composite),
            _ => Err(format!("unknown parameter kind: {}", s)),
        }
    }
}

/// Modifiers that alter how a predicate matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    /// Case-sensitive exact match (string parameters). Without a modifier,
    /// string matching is case-insensitive equality.
    Exact,
    /// Case-insensitive substring match (string parameters).
    Contains,
    /// Presence test: the value is `true` or `false`, and the predicate
    /// matches on the presence or absence of any index row for the
    /// parameter, independent of value.
    Missing,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Modifier::Exact => "exact",
            Modifier::Contains => "contains",
            Modifier::Missing => "missing",
        };
        write!(f, "{}", s)
    }
}

impl Modifier {
    /// Parses a modifier string, returning `None` for unknown modifiers.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(Modifier::Exact),
            "contains" => Some(Modifier::Contains),
            "missing" => Some(Modifier::Missing),
            _ => None,
        }
    }

    /// Returns `true` if this modifier is valid for the given kind.
    pub fn is_valid_for(&self, kind: ParamKind) -> bool {
        match self {
            Modifier::Exact | Modifier::Contains => kind == ParamKind::String,
            Modifier::Missing => true,
        }
    }
}

/// Comparison operators for number and date values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// Equal (default). For coarse-precision dates this is interval overlap.
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Eq => "eq",
            Comparator::Ne => "ne",
            Comparator::Gt => "gt",
            Comparator::Lt => "lt",
            Comparator::Ge => "ge",
            Comparator::Le => "le",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eq" => Ok(Comparator::Eq),
            "ne" => Ok(Comparator::Ne),
            "gt" => Ok(Comparator::Gt),
            "lt" => Ok(Comparator::Lt),
            "ge" => Ok(Comparator::Ge),
            "le" => Ok(Comparator::Le),
            _ => Err(format!("unknown comparator: {}", s)),
        }
    }
}

impl Comparator {
    /// Returns `true` if this comparator is valid for the given kind.
    /// Everything except plain equality only makes sense for numbers and
    /// dates.
    pub fn is_valid_for(&self, kind: ParamKind) -> bool {
        match self {
            Comparator::Eq => true,
            _ => matches!(kind, ParamKind::Number | ParamKind::Date),
        }
    }
}

/// A single search value with its comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryValue {
    /// The comparison operator.
    pub comparator: Comparator,

    /// The raw value, interpreted per the parameter's kind.
    pub value: String,
}

impl QueryValue {
    /// Creates a value with an explicit comparator.
    pub fn new(comparator: Comparator, value: impl Into<String>) -> Self {
        Self {
            comparator,
            value: value.into(),
        }
    }

    /// Creates a value with the default (eq) comparator.
    pub fn eq(value: impl Into<String>) -> Self {
        Self::new(Comparator::Eq, value)
    }

    /// Parses a value string, extracting a two-letter comparator prefix if
    /// one is present (`gt10` → `Gt`, `10`).
    pub fn parse(s: &str) -> Self {
        if s.len() > 2 && s.is_char_boundary(2) {
            if let Ok(cmp) = s[..2].parse::<Comparator>() {
                return Self::new(cmp, &s[2..]);
            }
        }
        Self::eq(s)
    }
}

/// One predicate of a query: a parameter, an optional modifier, and one or
/// more ORed values.
///
/// A `parameter` containing dots (`child.status`) is a chained predicate:
/// every segment but the last names a reference parameter to traverse, and
/// the final segment is evaluated against the referenced document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    /// The parameter name, possibly dotted for chains.
    pub parameter: String,

    /// Modifier, if any.
    pub modifier: Option<Modifier>,

    /// The search values. Multiple values are ORed; a document matching any
    /// of them through any of its index rows matches once.
    pub values: Vec<QueryValue>,
}

impl Predicate {
    /// Creates a predicate with a single eq value.
    pub fn eq(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            modifier: None,
            values: vec![QueryValue::eq(value)],
        }
    }

    /// Creates a predicate from raw value strings, extracting comparator
    /// prefixes.
    pub fn parse(parameter: impl Into<String>, values: &[&str]) -> Self {
        Self {
            parameter: parameter.into(),
            modifier: None,
            values: values.iter().map(|v| QueryValue::parse(v)).collect(),
        }
    }

    /// Sets the modifier.
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = Some(modifier);
        self
    }

    /// Returns the chain segments when this predicate is chained.
    pub fn chain_segments(&self) -> Option<Vec<&str>> {
        if self.parameter.contains('.') {
            Some(self.parameter.split('.').collect())
        } else {
            None
        }
    }
}

/// A reverse-chained predicate: match documents pointed at by some document
/// of `source_type` whose own `parameter` matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseChain {
    /// The type of the pointing document.
    pub source_type: String,

    /// The reference parameter on the pointing document that must carry the
    /// pointer. When `None`, any pointer field qualifies.
    pub reference_param: Option<String>,

    /// The parameter on the pointing document to filter by.
    pub parameter: String,

    /// The filter values (ORed).
    pub values: Vec<QueryValue>,
}

impl ReverseChain {
    /// Creates a reverse chain filtering on an eq value.
    pub fn eq(
        source_type: impl Into<String>,
        reference_param: impl Into<String>,
        parameter: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            reference_param: Some(reference_param.into()),
            parameter: parameter.into(),
            values: vec![QueryValue::eq(value)],
        }
    }
}

/// An include directive: resolve a named reference parameter of each result
/// and attach the target documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Include {
    /// The reference parameter to follow.
    pub parameter: String,

    /// Optional filter on the target type.
    pub target_type: Option<String>,
}

impl Include {
    /// Creates an include for the given reference parameter.
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            target_type: None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// A sort directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sort {
    /// The parameter to sort by. `_id` and `_lastUpdated` are always
    /// available; any indexed parameter of the queried type also works.
    pub parameter: String,
    /// The direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Parses a sort value; a `-` prefix means descending.
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(rest) => Self {
                parameter: rest.to_string(),
                direction: SortDirection::Descending,
            },
            None => Self {
                parameter: s.to_string(),
                direction: SortDirection::Ascending,
            },
        }
    }
}

/// A complete search query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// The document type being searched.
    pub doc_type: String,

    /// Predicates, ANDed together.
    pub predicates: Vec<Predicate>,

    /// Reverse-chained predicates, ANDed with the rest.
    pub reverse_chains: Vec<ReverseChain>,

    /// Include directives.
    pub includes: Vec<Include>,

    /// Sort directives. Empty means the declared default: last-updated
    /// descending, id ascending.
    pub sort: Vec<Sort>,

    /// Page size limit.
    pub limit: Option<u32>,

    /// Page offset.
    pub offset: Option<u32>,
}

impl Query {
    /// Creates a query for the given document type.
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            ..Default::default()
        }
    }

    /// Adds a predicate.
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds a reverse-chained predicate.
    pub fn with_reverse_chain(mut self, chain: ReverseChain) -> Self {
        self.reverse_chains.push(chain);
        self
    }

    /// Adds an include directive.
    pub fn with_include(mut self, include: Include) -> Self {
        self.includes.push(include);
        self
    }

    /// Adds a sort directive.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the page offset.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ParamKind::String,
            ParamKind::Number,
            ParamKind::Date,
            ParamKind::Token,
            ParamKind::Reference,
            ParamKind::Composite,
        ] {
            assert_eq!(kind.to_string().parse::<ParamKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_modifier_validity() {
        assert!(Modifier::Contains.is_valid_for(ParamKind::String));
        assert!(!Modifier::Contains.is_valid_for(ParamKind::Token));
        assert!(Modifier::Missing.is_valid_for(ParamKind::Reference));
        assert!(Modifier::Missing.is_valid_for(ParamKind::Date));
    }

    #[test]
    fn test_comparator_validity() {
        assert!(Comparator::Gt.is_valid_for(ParamKind::Number));
        assert!(Comparator::Gt.is_valid_for(ParamKind::Date));
        assert!(!Comparator::Gt.is_valid_for(ParamKind::String));
        assert!(Comparator::Ne.is_valid_for(ParamKind::Date));
        assert!(!Comparator::Ne.is_valid_for(ParamKind::Token));
    }

    #[test]
    fn test_query_value_parse() {
        let v = QueryValue::parse("gt10");
        assert_eq!(v.comparator, Comparator::Gt);
        assert_eq!(v.value, "10");

        let v = QueryValue::parse("2020-03-01");
        assert_eq!(v.comparator, Comparator::Eq);
        assert_eq!(v.value, "2020-03-01");

        // A two-letter value is never mistaken for a bare comparator.
        let v = QueryValue::parse("ge");
        assert_eq!(v.comparator, Comparator::Eq);
        assert_eq!(v.value, "ge");
    }

    #[test]
    fn test_chain_segments() {
        let plain = Predicate::eq("status", "active");
        assert!(plain.chain_segments().is_none());

        let chained = Predicate::eq("child.status", "active");
        assert_eq!(chained.chain_segments().unwrap(), vec!["child", "status"]);
    }

    #[test]
    fn test_sort_parse() {
        let s = Sort::parse("-_lastUpdated");
        assert_eq!(s.parameter, "_lastUpdated");
        assert_eq!(s.direction, SortDirection::Descending);

        let s = Sort::parse("status");
        assert_eq!(s.direction, SortDirection::Ascending);
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new("Order")
            .with(Predicate::eq("status", "active"))
            .with_sort(Sort::parse("-_lastUpdated"))
            .with_limit(20);
        assert_eq!(query.doc_type, "Order");
        assert_eq!(query.predicates.len(), 1);
        assert_eq!(query.limit, Some(20));
    }
}
