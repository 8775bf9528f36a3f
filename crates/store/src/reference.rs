//! Canonical document references.
//!
//! Documents point at each other in three encodings: a local `Type/id`
//! composite, an absolute locator whose path ends in `Type/id`, and an opaque
//! token with no declared type. [`CanonicalRef::normalize`] folds all three
//! into one tagged form that every downstream component matches on; nothing
//! else in the crate re-parses reference strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The single normalized representation of a pointer between documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "lowercase")]
pub enum CanonicalRef {
    /// A pointer whose target type is statically known.
    Typed {
        /// The target document's type.
        doc_type: String,
        /// The target document's id.
        id: String,
    },
    /// An opaque pointer: only the target id is known.
    ///
    /// Callers must tolerate this variant and fall back to id-only matching.
    Untyped {
        /// The target document's id.
        id: String,
    },
}

impl CanonicalRef {
    /// Creates a typed reference.
    pub fn typed(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        CanonicalRef::Typed {
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }

    /// Creates an untyped reference.
    pub fn untyped(id: impl Into<String>) -> Self {
        CanonicalRef::Untyped { id: id.into() }
    }

    /// Normalizes a raw reference string into its canonical form.
    ///
    /// Pure for the composite and absolute-locator cases. Opaque tokens come
    /// out [`Untyped`](CanonicalRef::Untyped); resolving their type (if ever)
    /// is the indexing layer's concern, not this function's.
    ///
    /// Recognized encodings:
    /// - `Order/o-17` — local composite key
    /// - `https://records.example.org/base/Order/o-17` — absolute locator
    /// - `urn:uuid:8d0f...` / `tok-9912` — opaque token
    pub fn normalize(raw: &str) -> CanonicalRef {
        let raw = raw.trim();

        // urn:uuid:..., urn:oid:... — the token is the final colon segment.
        if let Some(rest) = raw.strip_prefix("urn:") {
            let id = rest.rsplit(':').next().unwrap_or(rest);
            return CanonicalRef::untyped(id);
        }

        // Absolute locator: keep only the path, then fall through to the
        // composite logic on its trailing segments.
        let path = match raw.split_once("://") {
            Some((_, rest)) => match rest.split_once('/') {
                Some((_, path)) => path,
                None => return CanonicalRef::untyped(rest),
            },
            None => raw,
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => CanonicalRef::untyped(raw),
            [single] => CanonicalRef::untyped(*single),
            [.., doc_type, id] if is_type_segment(doc_type) => {
                CanonicalRef::typed(*doc_type, *id)
            }
            [.., id] => CanonicalRef::untyped(*id),
        }
    }

    /// Returns the target type, if known.
    pub fn doc_type(&self) -> Option<&str> {
        match self {
            CanonicalRef::Typed { doc_type, .. } => Some(doc_type),
            CanonicalRef::Untyped { .. } => None,
        }
    }

    /// Returns the target id.
    pub fn id(&self) -> &str {
        match self {
            CanonicalRef::Typed { id, .. } => id,
            CanonicalRef::Untyped { id } => id,
        }
    }

    /// Attaches a type to an untyped reference. Typed references are returned
    /// unchanged.
    pub fn with_type(self, doc_type: impl Into<String>) -> Self {
        match self {
            CanonicalRef::Untyped { id } => CanonicalRef::Typed {
                doc_type: doc_type.into(),
                id,
            },
            typed => typed,
        }
    }

    /// Equality under the conservative superset rule: an untyped reference on
    /// either side matches any type carrying the same id.
    ///
    /// This can produce false positives across unrelated types sharing an id;
    /// it never produces a false negative. The trade-off is deliberate.
    pub fn matches(&self, other: &CanonicalRef) -> bool {
        if self.id() != other.id() {
            return false;
        }
        match (self.doc_type(), other.doc_type()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for CanonicalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalRef::Typed { doc_type, id } => write!(f, "{}/{}", doc_type, id),
            CanonicalRef::Untyped { id } => write!(f, "{}", id),
        }
    }
}

/// A path segment counts as a type name when it starts with an ASCII
/// uppercase letter and is otherwise alphanumeric.
fn is_type_segment(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}
