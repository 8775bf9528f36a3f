//! Search integration tests: every predicate kind, modifiers, traversal,
//! composites, includes, sorting, and paging.

mod common;

use serde_json::json;

use common::{create_store, seed_patients};
use vellum_store::backends::sqlite::SqliteStore;
use vellum_store::error::{SearchError, StoreError};
use vellum_store::types::{Include, Modifier, Predicate, Query, ReverseChain, Sort};
use vellum_store::{DocumentStorage, SearchProvider};

async fn seed_orders(store: &SqliteStore) {
    let orders = [
        ("o-1", json!({"status": "active", "placedAt": "2020-03-15", "total": 25,
                        "subject": {"reference": "Patient/p-1"}})),
        ("o-2", json!({"status": "active", "placedAt": "2021-07-01", "totalRange": {"low": 5, "high": 8},
                        "subject": {"reference": "Patient/p-2"}})),
        ("o-3", json!({"status": "done", "placedAt": "2020-11-30", "total": 100})),
    ];
    for (id, body) in orders {
        store.write("Order", id, body, None).await.unwrap();
    }
}

fn ids(set: &vellum_store::SearchSet) -> Vec<&str> {
    set.documents.iter().map(|d| d.id()).collect()
}

// ============================================================================
// Token predicates
// ============================================================================

#[tokio::test]
async fn test_token_code_match() {
    let store = create_store();
    seed_orders(&store).await;

    let set = store
        .search(&Query::new("Order").with(Predicate::eq("status", "active")))
        .await
        .unwrap();
    assert_eq!(set.total, 2);
    assert!(ids(&set).contains(&"o-1"));
    assert!(ids(&set).contains(&"o-2"));
}

#[tokio::test]
async fn test_token_system_scoped_match() {
    let store = create_store();
    seed_patients(&store).await;

    // p-1 carries identifier (mrn, 111); p-2 carries a bare "222".
    let scoped = store
        .search(&Query::new("Patient").with(Predicate::eq("identifier", "mrn|111")))
        .await
        .unwrap();
    assert_eq!(ids(&scoped), vec!["p-1"]);

    let wrong_system = store
        .search(&Query::new("Patient").with(Predicate::eq("identifier", "other|111")))
        .await
        .unwrap();
    assert_eq!(wrong_system.total, 0);

    // Code-only matches regardless of system.
    let code_only = store
        .search(&Query::new("Patient").with(Predicate::eq("identifier", "111")))
        .await
        .unwrap();
    assert_eq!(code_only.total, 1);

    // "|code" demands a system-less token.
    let no_system = store
        .search(&Query::new("Patient").with(Predicate::eq("identifier", "|222")))
        .await
        .unwrap();
    assert_eq!(ids(&no_system), vec!["p-2"]);
    let no_system_miss = store
        .search(&Query::new("Patient").with(Predicate::eq("identifier", "|111")))
        .await
        .unwrap();
    assert_eq!(no_system_miss.total, 0);
}

// ============================================================================
// String predicates
// ============================================================================

#[tokio::test]
async fn test_string_default_is_case_insensitive_equality() {
    let store = create_store();
    seed_patients(&store).await;

    let set = store
        .search(&Query::new("Patient").with(Predicate::eq("name", "OKAFOR")))
        .await
        .unwrap();
    assert_eq!(set.total, 2);
}

#[tokio::test]
async fn test_string_exact_modifier() {
    let store = create_store();
    seed_patients(&store).await;

    let set = store
        .search(
            &Query::new("Patient")
                .with(Predicate::eq("name", "Okafor").with_modifier(Modifier::Exact)),
        )
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["p-1"]);
}

#[tokio::test]
async fn test_string_contains_modifier() {
    let store = create_store();
    seed_patients(&store).await;

    let set = store
        .search(
            &Query::new("Patient")
                .with(Predicate::eq("name", "kafo").with_modifier(Modifier::Contains)),
        )
        .await
        .unwrap();
    assert_eq!(set.total, 2);

    let set = store
        .search(
            &Query::new("Patient")
                .with(Predicate::eq("name", "ndqvi").with_modifier(Modifier::Contains)),
        )
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["p-3"]);
}

// ============================================================================
// Number predicates
// ============================================================================

#[tokio::test]
async fn test_number_comparators() {
    let store = create_store();
    seed_orders(&store).await;

    // o-2's total comes from the range union (low = 5).
    let gt = store
        .search(&Query::new("Order").with(Predicate::parse("total", &["gt20"])))
        .await
        .unwrap();
    assert_eq!(gt.total, 2);
    assert!(ids(&gt).contains(&"o-1"));
    assert!(ids(&gt).contains(&"o-3"));

    let le = store
        .search(&Query::new("Order").with(Predicate::parse("total", &["le5"])))
        .await
        .unwrap();
    assert_eq!(ids(&le), vec!["o-2"]);

    let eq = store
        .search(&Query::new("Order").with(Predicate::parse("total", &["100"])))
        .await
        .unwrap();
    assert_eq!(ids(&eq), vec!["o-3"]);
}

// ============================================================================
// Date predicates
// ============================================================================

#[tokio::test]
async fn test_date_coarse_precision_matches_covered_interval() {
    let store = create_store();
    seed_orders(&store).await;

    // A bare year matches everything inside it.
    let y2020 = store
        .search(&Query::new("Order").with(Predicate::parse("placed", &["2020"])))
        .await
        .unwrap();
    assert_eq!(y2020.total, 2);

    let march = store
        .search(&Query::new("Order").with(Predicate::parse("placed", &["2020-03"])))
        .await
        .unwrap();
    assert_eq!(ids(&march), vec!["o-1"]);

    let exact_day = store
        .search(&Query::new("Order").with(Predicate::parse("placed", &["2020-03-15"])))
        .await
        .unwrap();
    assert_eq!(ids(&exact_day), vec!["o-1"]);
}

#[tokio::test]
async fn test_date_comparators() {
    let store = create_store();
    seed_orders(&store).await;

    let after_2020 = store
        .search(&Query::new("Order").with(Predicate::parse("placed", &["gt2020"])))
        .await
        .unwrap();
    assert_eq!(ids(&after_2020), vec!["o-2"]);

    let not_march = store
        .search(&Query::new("Order").with(Predicate::parse("placed", &["ne2020-03"])))
        .await
        .unwrap();
    assert_eq!(not_march.total, 2);

    let until_2020 = store
        .search(&Query::new("Order").with(Predicate::parse("placed", &["le2020"])))
        .await
        .unwrap();
    assert_eq!(until_2020.total, 2);
}

// ============================================================================
// OR values and set semantics
// ============================================================================

#[tokio::test]
async fn test_or_values_never_duplicate_a_document() {
    let store = create_store();
    store
        .write(
            "Order",
            "o-multi",
            json!({"items": [{"code": "a", "value": 1}, {"code": "b", "value": 2}]}),
            None,
        )
        .await
        .unwrap();

    // Both OR'd values match through different rows of the same document.
    let set = store
        .search(&Query::new("Order").with(Predicate::parse("item-code", &["a", "b"])))
        .await
        .unwrap();
    assert_eq!(set.total, 1);
    assert_eq!(ids(&set), vec!["o-multi"]);
}

// ============================================================================
// Missing modifier
// ============================================================================

#[tokio::test]
async fn test_missing_modifier() {
    let store = create_store();
    seed_orders(&store).await;

    // o-3 has no subject.
    let missing = store
        .search(
            &Query::new("Order")
                .with(Predicate::eq("subject", "true").with_modifier(Modifier::Missing)),
        )
        .await
        .unwrap();
    assert_eq!(ids(&missing), vec!["o-3"]);

    let present = store
        .search(
            &Query::new("Order")
                .with(Predicate::eq("subject", "false").with_modifier(Modifier::Missing)),
        )
        .await
        .unwrap();
    assert_eq!(present.total, 2);
}

#[tokio::test]
async fn test_missing_is_independent_of_other_predicates() {
    let store = create_store();
    store.write("Order", "o-1", json!({"status": "active"}), None).await.unwrap();

    // Zero rows for "placed" means missing=true matches...
    let missing = store
        .search(
            &Query::new("Order")
                .with(Predicate::eq("placed", "true").with_modifier(Modifier::Missing)),
        )
        .await
        .unwrap();
    assert_eq!(missing.total, 1);

    // ...and any value predicate on it cannot.
    let value = store
        .search(&Query::new("Order").with(Predicate::parse("placed", &["2020"])))
        .await
        .unwrap();
    assert_eq!(value.total, 0);
}

// ============================================================================
// Reference predicates
// ============================================================================

#[tokio::test]
async fn test_reference_typed_match() {
    let store = create_store();
    seed_orders(&store).await;

    let set = store
        .search(&Query::new("Order").with(Predicate::eq("subject", "Patient/p-1")))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["o-1"]);

    // Id-only queries match any stored reference with that id.
    let id_only = store
        .search(&Query::new("Order").with(Predicate::eq("subject", "p-1")))
        .await
        .unwrap();
    assert_eq!(ids(&id_only), vec!["o-1"]);
}

#[tokio::test]
async fn test_untyped_stored_reference_matches_any_queried_type() {
    let store = create_store();
    // "abc123" resolves to nothing, so the stored reference stays untyped.
    store
        .write("Order", "o-1", json!({"subject": {"reference": "abc123"}}), None)
        .await
        .unwrap();

    for query_value in ["Patient/abc123", "Practitioner/abc123", "abc123"] {
        let set = store
            .search(&Query::new("Order").with(Predicate::eq("subject", query_value)))
            .await
            .unwrap();
        assert_eq!(set.total, 1, "query '{query_value}' must match the untyped reference");
    }

    let other_id = store
        .search(&Query::new("Order").with(Predicate::eq("subject", "Patient/other")))
        .await
        .unwrap();
    assert_eq!(other_id.total, 0);
}

// ============================================================================
// Chained search
// ============================================================================

#[tokio::test]
async fn test_chained_predicate_through_reference() {
    let store = create_store();
    seed_patients(&store).await;
    seed_orders(&store).await;

    let set = store
        .search(&Query::new("Order").with(Predicate::eq("subject.name", "Okafor")))
        .await
        .unwrap();
    // p-1 and p-2 both answer to "Okafor" case-insensitively.
    assert_eq!(set.total, 2);

    let set = store
        .search(&Query::new("Order").with(Predicate::eq("subject.identifier", "mrn|111")))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["o-1"]);
}

#[tokio::test]
async fn test_chained_predicate_unknown_terminal() {
    let store = create_store();
    let err = store
        .search(&Query::new("Order").with(Predicate::eq("subject.shoe-size", "44")))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::Search(SearchError::UnknownParameter { .. })),
        "got {err}"
    );
}

// ============================================================================
// Reverse-chained search (scenario: parent found through pointing child)
// ============================================================================

#[tokio::test]
async fn test_reverse_chain_follows_opaque_token_and_tracks_rewrites() {
    let store = create_store();

    // The parent's id doubles as its secondary identifier; the child points
    // at it with a bare opaque token.
    store
        .write("Parent", "tok-777", json!({"identifier": "tok-777", "label": "P"}), None)
        .await
        .unwrap();
    store
        .write(
            "Child",
            "c-1",
            json!({"parent": {"reference": "tok-777"}, "status": "active"}),
            None,
        )
        .await
        .unwrap();

    let query = Query::new("Parent")
        .with_reverse_chain(ReverseChain::eq("Child", "parent", "status", "active"));

    let set = store.search(&query).await.unwrap();
    assert_eq!(ids(&set), vec!["tok-777"]);

    // Rewriting the child flips its status; the parent stops matching.
    store
        .write(
            "Child",
            "c-1",
            json!({"parent": {"reference": "tok-777"}, "status": "inactive"}),
            Some(1),
        )
        .await
        .unwrap();

    let set = store.search(&query).await.unwrap();
    assert_eq!(set.total, 0);
}

#[tokio::test]
async fn test_reverse_chain_without_named_reference_param() {
    let store = create_store();
    store
        .write("Parent", "pa-1", json!({"identifier": "pa-1"}), None)
        .await
        .unwrap();
    // The pointer lives at an undeclared field; only the edge scan sees it.
    store
        .write(
            "Child",
            "c-1",
            json!({"annotations": {"origin": {"reference": "Parent/pa-1"}}, "status": "active"}),
            None,
        )
        .await
        .unwrap();

    let query = Query::new("Parent").with_reverse_chain(ReverseChain {
        source_type: "Child".to_string(),
        reference_param: None,
        parameter: "status".to_string(),
        values: vec![vellum_store::types::QueryValue::eq("active")],
    });
    let set = store.search(&query).await.unwrap();
    assert_eq!(ids(&set), vec!["pa-1"]);
}

// ============================================================================
// Composite parameters (same-occurrence co-location)
// ============================================================================

#[tokio::test]
async fn test_composite_requires_same_entry() {
    let store = create_store();

    // One entry satisfies both components.
    store
        .write(
            "Order",
            "o-together",
            json!({"items": [{"code": "x", "value": 25}, {"code": "y", "value": 1}]}),
            None,
        )
        .await
        .unwrap();

    // Both components satisfied, but by different entries.
    store
        .write(
            "Order",
            "o-split",
            json!({"items": [{"code": "x", "value": 5}, {"code": "y", "value": 25}]}),
            None,
        )
        .await
        .unwrap();

    let set = store
        .search(&Query::new("Order").with(Predicate::parse("item", &["x$gt10"])))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["o-together"]);

    // Document-level co-occurrence alone does match the split order when
    // the components are queried independently.
    let document_level = store
        .search(
            &Query::new("Order")
                .with(Predicate::eq("item-code", "x"))
                .with(Predicate::parse("item-value", &["gt10"])),
        )
        .await
        .unwrap();
    assert_eq!(document_level.total, 2);
}

#[tokio::test]
async fn test_composite_value_arity_is_checked() {
    let store = create_store();
    let err = store
        .search(&Query::new("Order").with(Predicate::eq("item", "x")))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::Search(SearchError::InvalidValue { .. })),
        "got {err}"
    );
}

// ============================================================================
// Includes
// ============================================================================

#[tokio::test]
async fn test_include_attaches_referenced_documents() {
    let store = create_store();
    seed_patients(&store).await;
    seed_orders(&store).await;

    let set = store
        .search(
            &Query::new("Order")
                .with(Predicate::eq("status", "active"))
                .with_include(Include::new("subject")),
        )
        .await
        .unwrap();

    assert_eq!(set.total, 2);
    let included_ids: Vec<&str> = set.included.iter().map(|d| d.id()).collect();
    assert!(included_ids.contains(&"p-1"));
    assert!(included_ids.contains(&"p-2"));
    assert!(set.included.iter().all(|d| d.doc_type() == "Patient"));
}

#[tokio::test]
async fn test_include_skips_dangling_references() {
    let store = create_store();
    store
        .write("Order", "o-1", json!({"subject": {"reference": "Patient/nobody"}}), None)
        .await
        .unwrap();

    let set = store
        .search(&Query::new("Order").with_include(Include::new("subject")))
        .await
        .unwrap();
    assert_eq!(set.total, 1);
    assert!(set.included.is_empty());
}

// ============================================================================
// Sorting and paging
// ============================================================================

#[tokio::test]
async fn test_sort_by_indexed_parameter() {
    let store = create_store();
    seed_orders(&store).await;

    let set = store
        .search(&Query::new("Order").with_sort(Sort::parse("total")))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["o-2", "o-1", "o-3"]);

    let set = store
        .search(&Query::new("Order").with_sort(Sort::parse("-total")))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["o-3", "o-1", "o-2"]);
}

#[tokio::test]
async fn test_sort_by_id_builtin() {
    let store = create_store();
    seed_orders(&store).await;

    let set = store
        .search(&Query::new("Order").with_sort(Sort::parse("_id")))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["o-1", "o-2", "o-3"]);
}

#[tokio::test]
async fn test_pagination_with_total() {
    let store = create_store();
    for i in 0..7 {
        store
            .write("Order", &format!("o-{i}"), json!({"status": "active"}), None)
            .await
            .unwrap();
    }

    let query = Query::new("Order").with_sort(Sort::parse("_id")).with_limit(3);
    let first = store.search(&query).await.unwrap();
    assert_eq!(first.total, 7);
    assert_eq!(first.documents.len(), 3);

    let second = store.search(&query.clone().with_offset(3)).await.unwrap();
    assert_eq!(second.total, 7);
    assert_eq!(second.documents.len(), 3);
    assert_ne!(ids(&first), ids(&second));

    let last = store.search(&query.with_offset(6)).await.unwrap();
    assert_eq!(last.documents.len(), 1);
}

// ============================================================================
// Built-ins
// ============================================================================

#[tokio::test]
async fn test_builtin_id_predicate() {
    let store = create_store();
    seed_orders(&store).await;

    let set = store
        .search(&Query::new("Order").with(Predicate::parse("_id", &["o-1", "o-3"])))
        .await
        .unwrap();
    assert_eq!(set.total, 2);
}

#[tokio::test]
async fn test_builtin_last_updated_predicate() {
    let store = create_store();
    seed_orders(&store).await;

    let all = store
        .search(&Query::new("Order").with(Predicate::parse("_lastUpdated", &["ge2000"])))
        .await
        .unwrap();
    assert_eq!(all.total, 3);

    let none = store
        .search(&Query::new("Order").with(Predicate::parse("_lastUpdated", &["lt2000"])))
        .await
        .unwrap();
    assert_eq!(none.total, 0);
}

// ============================================================================
// Deleted documents
// ============================================================================

#[tokio::test]
async fn test_soft_deleted_documents_are_not_searchable() {
    let store = create_store();
    seed_orders(&store).await;

    store.soft_delete("Order", "o-1", 1).await.unwrap();

    let set = store
        .search(&Query::new("Order").with(Predicate::eq("status", "active")))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["o-2"]);

    // The ledger still has everything, including the deletion.
    use vellum_store::HistoryProvider;
    let history = store.history("Order", "o-1").await.unwrap();
    assert_eq!(history.len(), 2);
}

// ============================================================================
// Unsupported predicates
// ============================================================================

#[tokio::test]
async fn test_unknown_parameter_is_reported() {
    let store = create_store();
    let err = store
        .search(&Query::new("Order").with(Predicate::eq("shade", "blue")))
        .await
        .unwrap_err();
    match err {
        StoreError::Search(SearchError::UnknownParameter { doc_type, parameter }) => {
            assert_eq!(doc_type, "Order");
            assert_eq!(parameter, "shade");
        }
        other => panic!("expected UnknownParameter, got {other}"),
    }
}

#[tokio::test]
async fn test_invalid_modifier_for_kind() {
    let store = create_store();
    let err = store
        .search(
            &Query::new("Order")
                .with(Predicate::eq("status", "act").with_modifier(Modifier::Contains)),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::Search(SearchError::InvalidModifier { .. })),
        "got {err}"
    );
}

#[tokio::test]
async fn test_invalid_comparator_for_kind() {
    let store = create_store();
    let err = store
        .search(&Query::new("Order").with(Predicate::parse("status", &["gtactive"])))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StoreError::Search(SearchError::InvalidValue { .. })),
        "got {err}"
    );
}
