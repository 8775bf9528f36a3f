//! The extraction rule registry.
//!
//! A [`RuleRegistry`] is the complete, immutable-at-runtime description of
//! what gets indexed: for each document type, a list of [`ParameterRule`]s
//! naming a searchable parameter, its kind, and the path expression that
//! locates its values. The registry is built once and passed into the store
//! at construction; adding a document type means adding entries, never
//! touching shared state.
//!
//! An unmapped type has zero rules and extracts to zero rows. That is
//! intentional: documents of unknown types are stored and versioned
//! normally, they are just not searchable until rules exist.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::ParamKind;

use super::path::{PathExpr, PathParseError};

/// One extraction rule: a named, typed, path-addressed searchable parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRule {
    /// The parameter name used in queries.
    pub name: String,

    /// The kind of index rows this rule produces.
    pub kind: ParamKind,

    /// Where in the body the values live.
    pub path: PathExpr,

    /// Declared target types, for reference rules. Chained searches need
    /// exactly one to resolve the hop statically.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,

    /// Component definitions, for composite rules. The rule's `path` names
    /// the repeating root; component paths are relative to each element.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<CompositeComponent>,
}

/// One component of a composite rule.
///
/// Component rows are indexed under the component's own `name`, tagged with
/// the occurrence of the root element they came from, so they are both
/// individually searchable and co-locatable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeComponent {
    /// The parameter name the component's rows index under.
    pub name: String,

    /// The component's kind.
    pub kind: ParamKind,

    /// Path relative to the composite root element.
    pub path: PathExpr,
}

impl CompositeComponent {
    /// Creates a component.
    pub fn new(
        name: impl Into<String>,
        kind: ParamKind,
        path: &str,
    ) -> Result<Self, PathParseError> {
        Ok(Self {
            name: name.into(),
            kind,
            path: PathExpr::parse(path)?,
        })
    }
}

impl ParameterRule {
    fn new(name: impl Into<String>, kind: ParamKind, path: &str) -> Result<Self, PathParseError> {
        Ok(Self {
            name: name.into(),
            kind,
            path: PathExpr::parse(path)?,
            targets: Vec::new(),
            components: Vec::new(),
        })
    }

    /// Creates a string rule.
    pub fn string(name: impl Into<String>, path: &str) -> Result<Self, PathParseError> {
        Self::new(name, ParamKind::String, path)
    }

    /// Creates a number rule.
    pub fn number(name: impl Into<String>, path: &str) -> Result<Self, PathParseError> {
        Self::new(name, ParamKind::Number, path)
    }

    /// Creates a date rule.
    pub fn date(name: impl Into<String>, path: &str) -> Result<Self, PathParseError> {
        Self::new(name, ParamKind::Date, path)
    }

    /// Creates a token rule.
    pub fn token(name: impl Into<String>, path: &str) -> Result<Self, PathParseError> {
        Self::new(name, ParamKind::Token, path)
    }

    /// Creates a reference rule.
    pub fn reference(name: impl Into<String>, path: &str) -> Result<Self, PathParseError> {
        Self::new(name, ParamKind::Reference, path)
    }

    /// Creates a composite rule over a repeating root path.
    pub fn composite(
        name: impl Into<String>,
        root_path: &str,
        components: Vec<CompositeComponent>,
    ) -> Result<Self, PathParseError> {
        let mut rule = Self::new(name, ParamKind::Composite, root_path)?;
        rule.components = components;
        Ok(rule)
    }

    /// Declares a target type for a reference rule.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }
}

/// The immutable per-type rule table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleRegistry {
    by_type: HashMap<String, Vec<ParameterRule>>,
}

impl RuleRegistry {
    /// Creates an empty registry. Every type extracts to zero rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts building a registry.
    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder::default()
    }

    /// Returns the rules for a document type; empty for unmapped types.
    pub fn rules_for(&self, doc_type: &str) -> &[ParameterRule] {
        self.by_type.get(doc_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Looks up a rule by type and parameter name. Composite component names
    /// resolve to a synthesized view of the component.
    pub fn rule(&self, doc_type: &str, name: &str) -> Option<&ParameterRule> {
        self.rules_for(doc_type).iter().find(|r| r.name == name)
    }

    /// Looks up the kind a parameter indexes under, resolving composite
    /// component names to their component kinds.
    pub fn kind_of(&self, doc_type: &str, name: &str) -> Option<ParamKind> {
        if let Some(rule) = self.rule(doc_type, name) {
            return Some(rule.kind);
        }
        self.rules_for(doc_type)
            .iter()
            .flat_map(|r| r.components.iter())
            .find(|c| c.name == name)
            .map(|c| c.kind)
    }

    /// Returns the registered document types.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    /// Returns the total number of rules across all types.
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    /// Returns `true` if no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Builder for [`RuleRegistry`].
#[derive(Debug, Default)]
pub struct RuleRegistryBuilder {
    by_type: HashMap<String, Vec<ParameterRule>>,
}

impl RuleRegistryBuilder {
    /// Adds a rule for a document type. A rule with the same name for the
    /// same type replaces the earlier one.
    pub fn rule(mut self, doc_type: impl Into<String>, rule: ParameterRule) -> Self {
        let rules = self.by_type.entry(doc_type.into()).or_default();
        rules.retain(|r| r.name != rule.name);
        rules.push(rule);
        self
    }

    /// Finishes building.
    pub fn build(self) -> RuleRegistry {
        RuleRegistry {
            by_type: self.by_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> RuleRegistry {
        RuleRegistry::builder()
            .rule("Order", ParameterRule::token("status", "status").unwrap())
            .rule("Order", ParameterRule::date("placed", "placedAt").unwrap())
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
            .build()
    }

    #[test]
    fn test_unmapped_type_has_no_rules() {
        let registry = sample_registry();
        assert!(registry.rules_for("Mystery").is_empty());
        assert!(registry.rule("Mystery", "status").is_none());
    }

    #[test]
    fn test_lookup() {
        let registry = sample_registry();
        assert_eq!(registry.rules_for("Order").len(), 3);
        assert_eq!(
            registry.rule("Order", "status").unwrap().kind,
            ParamKind::Token
        );
    }

    #[test]
    fn test_kind_of_resolves_components() {
        let registry = sample_registry();
        assert_eq!(registry.kind_of("Order", "item"), Some(ParamKind::Composite));
        assert_eq!(registry.kind_of("Order", "item-code"), Some(ParamKind::Token));
        assert_eq!(
            registry.kind_of("Order", "item-value"),
            Some(ParamKind::Number)
        );
        assert_eq!(registry.kind_of("Order", "absent"), None);
    }

    #[test]
    fn test_same_name_replaces() {
        let registry = RuleRegistry::builder()
            .rule("Order", ParameterRule::string("status", "status").unwrap())
            .rule("Order", ParameterRule::token("status", "state").unwrap())
            .build();
        assert_eq!(registry.rules_for("Order").len(), 1);
        assert_eq!(
            registry.rule("Order", "status").unwrap().kind,
            ParamKind::Token
        );
    }

    #[test]
    fn test_registry_serde_round_trip() {
        let registry = sample_registry();
        let encoded = serde_json::to_string(&registry).unwrap();
        let decoded: RuleRegistry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.len(), registry.len());
        assert_eq!(
            decoded.rule("Order", "item").unwrap().components.len(),
            2
        );
    }
}
