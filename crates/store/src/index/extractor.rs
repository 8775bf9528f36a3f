//! Parameter extraction.
//!
//! [`ParameterExtractor::extract`] walks a document body under the rule
//! registry and produces the complete derived state for that document: typed
//! [`IndexRow`]s plus normalized [`ReferenceEdge`]s. Extraction is pure and
//! deterministic — running it twice on the same `(type, body)` yields the
//! same rows in the same order — which is what lets the store regenerate a
//! document's index from scratch on every write.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reference::CanonicalRef;
use crate::types::ParamKind;

use super::rules::{ParameterRule, RuleRegistry};
use super::value::IndexValue;

/// A single typed, queryable value derived from a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// The parameter name the value indexes under.
    pub parameter: String,

    /// The row's kind.
    pub kind: ParamKind,

    /// The value itself.
    pub value: IndexValue,

    /// Shared occurrence key for rows produced by the same repeated-field
    /// element. Composite predicates require co-location on this key.
    pub occurrence: Option<i64>,
}

/// A recorded outbound pointer from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEdge {
    /// The normalized target.
    pub target: CanonicalRef,

    /// The body path the pointer was found at, in rule-path syntax
    /// (`items[].source`).
    pub field_path: String,
}

/// The complete derived state for one document version.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Typed index rows.
    pub rows: Vec<IndexRow>,
    /// Outbound reference edges.
    pub edges: Vec<ReferenceEdge>,
}

/// A rule that could not convert what its path located.
///
/// The store turns this into a write rejection; the extractor itself has no
/// notion of document identity.
#[derive(Debug, Clone)]
pub struct RuleFailure {
    /// The failing rule (or composite component) name.
    pub rule: String,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule '{}': {}", self.rule, self.message)
    }
}

impl std::error::Error for RuleFailure {}

/// Derives index rows and reference edges from document bodies.
#[derive(Debug, Clone)]
pub struct ParameterExtractor {
    registry: Arc<RuleRegistry>,
}

impl ParameterExtractor {
    /// Creates an extractor over the given rule registry.
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the rule registry.
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Extracts the complete derived state for a document body.
    ///
    /// Total over inputs: an unmapped type yields zero rows, an absent path
    /// yields zero rows for that rule. Only a rule whose path located a value
    /// its kind cannot represent fails — and that failure is fatal to the
    /// write, by design.
    ///
    /// Pointer-shaped fields produce edges whether or not any rule declares
    /// them.
    pub fn extract(&self, doc_type: &str, body: &Value) -> Result<Extraction, RuleFailure> {
        let mut extraction = Extraction::default();

        for rule in self.registry.rules_for(doc_type) {
            match rule.kind {
                ParamKind::Composite => self.extract_composite(rule, body, &mut extraction)?,
                _ => self.extract_plain(rule, body, &mut extraction)?,
            }
        }

        scan_pointers(body, String::new(), &mut extraction.edges);

        Ok(extraction)
    }

    fn extract_plain(
        &self,
        rule: &ParameterRule,
        body: &Value,
        extraction: &mut Extraction,
    ) -> Result<(), RuleFailure> {
        for hit in rule.path.eval(body) {
            let values = IndexValue::convert(hit.value, rule.kind).map_err(|message| {
                RuleFailure {
                    rule: rule.name.clone(),
                    message,
                }
            })?;
            for value in values {
                if let IndexValue::Reference(target) = &value {
                    push_edge(&mut extraction.edges, target.clone(), rule.path.to_string());
                }
                extraction.rows.push(IndexRow {
                    parameter: rule.name.clone(),
                    kind: rule.kind,
                    value,
                    occurrence: hit.occurrence,
                });
            }
        }
        Ok(())
    }

    fn extract_composite(
        &self,
        rule: &ParameterRule,
        body: &Value,
        extraction: &mut Extraction,
    ) -> Result<(), RuleFailure> {
        for (index, hit) in rule.path.eval(body).iter().enumerate() {
            let occurrence = hit.occurrence.unwrap_or(index as i64);
            for component in &rule.components {
                for inner in component.path.eval(hit.value) {
                    let values =
                        IndexValue::convert(inner.value, component.kind).map_err(|message| {
                            RuleFailure {
                                rule: component.name.clone(),
                                message,
                            }
                        })?;
                    for value in values {
                        extraction.rows.push(IndexRow {
                            parameter: component.name.clone(),
                            kind: component.kind,
                            value,
                            occurrence: Some(occurrence),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Walks the whole body for the pointer convention: any object carrying a
/// string-valued `reference` field is an outbound edge. Matched objects are
/// not descended further.
fn scan_pointers(value: &Value, path: String, edges: &mut Vec<ReferenceEdge>) {
    match value {
        Value::Object(obj) => {
            if let Some(raw) = obj.get("reference").and_then(|v| v.as_str()) {
                if !raw.trim().is_empty() {
                    push_edge(edges, CanonicalRef::normalize(raw), path);
                }
                return;
            }
            for (key, child) in obj {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                scan_pointers(child, child_path, edges);
            }
        }
        Value::Array(items) => {
            let item_path = format!("{}[]", path);
            for item in items {
                scan_pointers(item, item_path.clone(), edges);
            }
        }
        _ => {}
    }
}

fn push_edge(edges: &mut Vec<ReferenceEdge>, target: CanonicalRef, field_path: String) {
    let edge = ReferenceEdge { target, field_path };
    if !edges.contains(&edge) {
        edges.push(edge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::CompositeComponent;
    use serde_json::json;

    fn extractor() -> ParameterExtractor {
        let registry = RuleRegistry::builder()
            .rule("Order", ParameterRule::token("status", "status").unwrap())
            .rule("Order", ParameterRule::date("placed", "placedAt").unwrap())
            .rule(
                "Order",
                ParameterRule::number("total", "(total|totalRange.low)").unwrap(),
            )
            .rule(
                "Order",
                ParameterRule::reference("subject", "subject").unwrap().with_target("Patient"),
            )
            .rule(
                "Order",
                ParameterRule::composite(
                    "item",
                    "items[]",
                    vec![
                        CompositeComponent::new("item-code", ParamKind::Token, "code").unwrap(),
                        CompositeComponent::new("item-value", ParamKind::Number, "value").unwrap(),
                    ],
                )
                .unwrap(),
            )
            .build();
        ParameterExtractor::new(Arc::new(registry))
    }

    #[test]
    fn test_unmapped_type_yields_no_rows() {
        let ex = extractor();
        let extraction = ex.extract("Mystery", &json!({"status": "new"})).unwrap();
        assert!(extraction.rows.is_empty());
    }

    #[test]
    fn test_absent_path_yields_no_rows() {
        let ex = extractor();
        let extraction = ex.extract("Order", &json!({"unrelated": 1})).unwrap();
        assert!(extraction.rows.is_empty());
    }

    #[test]
    fn test_plain_rules() {
        let ex = extractor();
        let extraction = ex
            .extract(
                "Order",
                &json!({"status": "active", "placedAt": "2021-07", "total": 42.5}),
            )
            .unwrap();

        let status: Vec<_> = extraction
            .rows
            .iter()
            .filter(|r| r.parameter == "status")
            .collect();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].kind, ParamKind::Token);

        let total: Vec<_> = extraction
            .rows
            .iter()
            .filter(|r| r.parameter == "total")
            .collect();
        assert_eq!(total[0].value, IndexValue::Number(42.5));
    }

    #[test]
    fn test_first_of_union() {
        let ex = extractor();
        let extraction = ex
            .extract("Order", &json!({"totalRange": {"low": 10, "high": 20}}))
            .unwrap();
        let total: Vec<_> = extraction
            .rows
            .iter()
            .filter(|r| r.parameter == "total")
            .collect();
        assert_eq!(total.len(), 1);
        assert_eq!(total[0].value, IndexValue::Number(10.0));
    }

    #[test]
    fn test_composite_rows_share_occurrence() {
        let ex = extractor();
        let extraction = ex
            .extract(
                "Order",
                &json!({"items": [
                    {"code": "a", "value": 5},
                    {"code": "b", "value": 15}
                ]}),
            )
            .unwrap();

        let codes: Vec<_> = extraction
            .rows
            .iter()
            .filter(|r| r.parameter == "item-code")
            .collect();
        let values: Vec<_> = extraction
            .rows
            .iter()
            .filter(|r| r.parameter == "item-value")
            .collect();
        assert_eq!(codes.len(), 2);
        assert_eq!(values.len(), 2);
        assert_eq!(codes[0].occurrence, Some(0));
        assert_eq!(values[0].occurrence, Some(0));
        assert_eq!(codes[1].occurrence, Some(1));
        assert_eq!(values[1].occurrence, Some(1));
    }

    #[test]
    fn test_reference_rule_produces_row_and_edge() {
        let ex = extractor();
        let extraction = ex
            .extract("Order", &json!({"subject": {"reference": "Patient/p-1"}}))
            .unwrap();

        let refs: Vec<_> = extraction
            .rows
            .iter()
            .filter(|r| r.parameter == "subject")
            .collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0].value,
            IndexValue::Reference(CanonicalRef::typed("Patient", "p-1"))
        );

        assert_eq!(extraction.edges.len(), 1);
        assert_eq!(extraction.edges[0].target, CanonicalRef::typed("Patient", "p-1"));
        assert_eq!(extraction.edges[0].field_path, "subject");
    }

    #[test]
    fn test_undeclared_pointer_still_makes_an_edge() {
        let ex = extractor();
        let extraction = ex
            .extract(
                "Order",
                &json!({"annotations": [{"author": {"reference": "urn:uuid:tok-7"}}]}),
            )
            .unwrap();
        assert!(extraction.rows.is_empty());
        assert_eq!(extraction.edges.len(), 1);
        assert_eq!(extraction.edges[0].target, CanonicalRef::untyped("tok-7"));
        assert_eq!(extraction.edges[0].field_path, "annotations[].author");
    }

    #[test]
    fn test_rule_failure_names_the_rule() {
        let ex = extractor();
        let err = ex
            .extract("Order", &json!({"placedAt": "not a date"}))
            .unwrap_err();
        assert_eq!(err.rule, "placed");
        assert!(err.message.contains("not a date"));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let ex = extractor();
        let body = json!({
            "status": "active",
            "placedAt": "2021-07-04",
            "subject": {"reference": "Patient/p-1"},
            "items": [{"code": "a", "value": 1}, {"code": "b", "value": 2}]
        });
        let first = ex.extract("Order", &body).unwrap();
        let second = ex.extract("Order", &body).unwrap();
        assert_eq!(first.rows, second.rows);
        assert_eq!(first.edges, second.edges);
    }
}
