//! Interpreted field-path expressions.
//!
//! Extraction rules locate values with a small path language instead of
//! per-type code, so new document types are data, not new code paths. A path
//! is a dot-separated sequence of steps:
//!
//! - `status` — descend into a field
//! - `items[]` — descend into a field, then visit each array element
//! - `(amount|amountRange.low)` — first of a set of alternative sub-paths
//!   that yields a value (documents encode "one of" unions this way)
//!
//! `items[].code` visits the `code` field of every element of `items`.
//! Evaluation is total: an absent field, a non-object where an object was
//! expected, or an empty array all yield zero hits, never an error. That is
//! what lets document schemas evolve without migrations.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Descend into a named field.
    Field(String),
    /// Visit each element of an array.
    Each,
    /// Continue with the first alternative sub-path that yields any value.
    FirstOf(Vec<PathExpr>),
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathExpr {
    steps: Vec<Step>,
}

/// A value located by a path evaluation.
#[derive(Debug, Clone)]
pub struct PathHit<'a> {
    /// The located value.
    pub value: &'a Value,
    /// The element index of the first explicit array step on the way here,
    /// if any. Hits sharing an occurrence came from the same repeated-field
    /// element.
    pub occurrence: Option<i64>,
}

/// Error parsing a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParseError {
    /// The offending expression.
    pub expression: String,
    /// What was wrong with it.
    pub message: String,
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path '{}': {}", self.expression, self.message)
    }
}

impl std::error::Error for PathParseError {}

impl PathExpr {
    /// Parses a path expression.
    pub fn parse(expression: &str) -> Result<Self, PathParseError> {
        let err = |message: &str| PathParseError {
            expression: expression.to_string(),
            message: message.to_string(),
        };

        if expression.is_empty() {
            return Err(err("empty expression"));
        }

        let mut steps = Vec::new();
        for segment in split_outside_parens(expression, '.').ok_or_else(|| err("unbalanced parentheses"))? {
            if segment.is_empty() {
                return Err(err("empty segment"));
            }

            let (name, each) = match segment.strip_suffix("[]") {
                Some(base) => (base, true),
                None => (segment, false),
            };

            if let Some(inner) = name.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
                let alternatives = split_outside_parens(inner, '|')
                    .ok_or_else(|| err("unbalanced parentheses"))?;
                if alternatives.len() < 2 {
                    return Err(err("alternatives need at least two sub-paths"));
                }
                let parsed: Result<Vec<PathExpr>, PathParseError> =
                    alternatives.iter().map(|alt| PathExpr::parse(alt)).collect();
                steps.push(Step::FirstOf(parsed?));
            } else {
                if !is_field_name(name) {
                    return Err(err("field names are alphanumeric, '-' or '_'"));
                }
                steps.push(Step::Field(name.to_string()));
            }

            if each {
                steps.push(Step::Each);
            }
        }

        Ok(Self { steps })
    }

    /// Returns the steps of this path.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns `true` if this path contains an explicit array step.
    pub fn is_repeating(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, Step::Each))
    }

    /// Evaluates the path against a value, yielding every hit.
    pub fn eval<'a>(&self, root: &'a Value) -> Vec<PathHit<'a>> {
        let mut hits = Vec::new();
        walk(root, &self.steps, None, &mut hits);
        hits
    }
}

fn walk<'a>(
    value: &'a Value,
    steps: &[Step],
    occurrence: Option<i64>,
    hits: &mut Vec<PathHit<'a>>,
) {
    let Some((step, rest)) = steps.split_first() else {
        if !value.is_null() {
            hits.push(PathHit { value, occurrence });
        }
        return;
    };

    match step {
        Step::Field(name) => match value {
            Value::Object(obj) => {
                if let Some(child) = obj.get(name) {
                    walk(child, rest, occurrence, hits);
                }
            }
            // Arrays are traversed implicitly; only an explicit `[]` step
            // assigns occurrences.
            Value::Array(items) => {
                for item in items {
                    walk(item, steps, occurrence, hits);
                }
            }
            _ => {}
        },
        Step::Each => {
            if let Value::Array(items) = value {
                for (i, item) in items.iter().enumerate() {
                    let occ = occurrence.or(Some(i as i64));
                    walk(item, rest, occ, hits);
                }
            }
        }
        Step::FirstOf(alternatives) => match value {
            Value::Object(_) => {
                for alternative in alternatives {
                    let mut combined = alternative.steps.clone();
                    combined.extend_from_slice(rest);
                    let mut attempt = Vec::new();
                    walk(value, &combined, occurrence, &mut attempt);
                    if !attempt.is_empty() {
                        hits.extend(attempt);
                        break;
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, steps, occurrence, hits);
                }
            }
            _ => {}
        },
    }
}

/// Splits on `separator` at parenthesis depth zero. Returns `None` when the
/// parentheses are unbalanced.
fn split_outside_parens(expr: &str, separator: char) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            c if c == separator && depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&expr[start..]);
    Some(parts)
}

fn is_field_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.steps {
            match step {
                Step::Field(name) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                    first = false;
                }
                Step::Each => write!(f, "[]")?,
                Step::FirstOf(alternatives) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    let rendered: Vec<String> =
                        alternatives.iter().map(|a| a.to_string()).collect();
                    write!(f, "({})", rendered.join("|"))?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for PathExpr {
    type Error = PathParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PathExpr::parse(&s)
    }
}

impl From<PathExpr> for String {
    fn from(path: PathExpr) -> String {
        path.to_string()
    }
}
