//! Shared test harness: the rule registry fixture and store constructors.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use vellum_store::DocumentStorage;
use vellum_store::backends::sqlite::SqliteStore;
use vellum_store::index::{CompositeComponent, ParameterRule, RuleRegistry};
use vellum_store::types::ParamKind;

/// The registry used across the integration tests.
///
/// - `Order`: token status, date placed, number total (simple-or-range
///   union), reference subject → Patient, composite item over `items[]`
/// - `Patient`: string name, token identifier, date birthDate
/// - `Parent` / `Child`: the reference-traversal pair; `Child.parent` points
///   at `Parent`, sometimes through an opaque token
pub fn test_registry() -> Arc<RuleRegistry> {
    Arc::new(
        RuleRegistry::builder()
            .rule("Order", ParameterRule::token("status", "status").unwrap())
            .rule("Order", ParameterRule::date("placed", "placedAt").unwrap())
            .rule(
                "Order",
                ParameterRule::number("total", "(total|totalRange.low)").unwrap(),
            )
            .rule(
                "Order",
                ParameterRule::reference("subject", "subject")
                    .unwrap()
                    .with_target("Patient"),
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
            .rule("Patient", ParameterRule::string("name", "name").unwrap())
            .rule(
                "Patient",
                ParameterRule::token("identifier", "identifier").unwrap(),
            )
            .rule(
                "Patient",
                ParameterRule::date("birthDate", "birthDate").unwrap(),
            )
            .rule(
                "Parent",
                ParameterRule::token("identifier", "identifier").unwrap(),
            )
            .rule("Parent", ParameterRule::string("label", "label").unwrap())
            .rule(
                "Child",
                ParameterRule::reference("parent", "parent")
                    .unwrap()
                    .with_target("Parent"),
            )
            .rule("Child", ParameterRule::token("status", "status").unwrap())
            .build(),
    )
}

/// Creates an in-memory store over the test registry.
pub fn create_store() -> SqliteStore {
    SqliteStore::in_memory(test_registry()).expect("failed to create in-memory store")
}

/// Seeds a few patients for search tests.
pub async fn seed_patients(store: &SqliteStore) {
    let patients = [
        ("p-1", json!({"name": "Okafor", "identifier": {"system": "mrn", "value": "111"}, "birthDate": "1980-04-12"})),
        ("p-2", json!({"name": "okafor", "identifier": "222", "birthDate": "1990-09"})),
        ("p-3", json!({"name": "Lindqvist", "identifier": "333"})),
    ];
    for (id, body) in patients {
        store
            .write("Patient", id, body, None)
            .await
            .expect("failed to seed patient");
    }
}
