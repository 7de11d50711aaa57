//! Behaviour of the in-memory store against the ProductStore contract.

use chrono::NaiveDate;
use infra_store::{InjectedFailure, MemoryStore, ProductStore, StoreError};
use rates_core::{build_batch, ComparisonResult, BetterProduct, RawProductRecord, Subscriber};

fn record(code: &str, term: &str, rate: &str) -> RawProductRecord {
    RawProductRecord {
        institution_id: Some("0010001".to_string()),
        institution_name: Some("Bank A".to_string()),
        product_code: Some(code.to_string()),
        product_name: Some(format!("{code} deposit")),
        term: Some(term.to_string()),
        base_rate: Some(rate.to_string()),
        max_rate: Some(rate.to_string()),
        ..Default::default()
    }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let store = MemoryStore::new();
    let (batch, _) = build_batch(&[record("P1", "12", "3.1"), record("P1", "6", "2.9")], &[], day());

    assert_eq!(store.upsert_products(&batch).await.unwrap(), 2);
    let first = store.products();
    store.upsert_products(&batch).await.unwrap();

    assert_eq!(store.products(), first);
    assert_eq!(store.calls().upsert(), 2);
}

#[tokio::test]
async fn test_upsert_updates_in_place_and_never_deletes() {
    let store = MemoryStore::new();
    let (first, _) = build_batch(&[record("P1", "12", "3.1"), record("P2", "12", "3.0")], &[], day());
    store.upsert_products(&first).await.unwrap();

    let (second, _) = build_batch(&[record("P1", "12", "3.5")], &[], day());
    store.upsert_products(&second).await.unwrap();

    let rows = store.products();
    assert_eq!(rows.len(), 2);
    let p1 = rows.iter().find(|r| r.product_code == "P1").unwrap();
    assert_eq!(p1.base_rate, Some(3.5));
    assert!(rows.iter().any(|r| r.product_code == "P2"));
}

#[tokio::test]
async fn test_only_active_subscribers_are_returned() {
    let store = MemoryStore::new().with_subscribers(vec![
        Subscriber::new("a@example.com", true),
        Subscriber::new("b@example.com", false),
        Subscriber::new("c@example.com", true),
    ]);

    let active = store.active_subscribers().await.unwrap();
    let emails: Vec<_> = active.iter().map(|s| s.email.as_str()).collect();
    assert_eq!(emails, vec!["a@example.com", "c@example.com"]);
}

#[tokio::test]
async fn test_comparison_result_is_returned_as_configured() {
    let entry = BetterProduct {
        institution: Some("Bank B".to_string()),
        rate_delta: Some(0.4),
        ..Default::default()
    };
    let store = MemoryStore::new().with_comparison(ComparisonResult::from_entries(vec![entry]));

    let result = store.compare_products().await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(store.calls().compare(), 1);
}

#[tokio::test]
async fn test_injected_failures_are_reported() {
    let store = MemoryStore::new()
        .fail_validation(InjectedFailure::Unauthorized)
        .fail_upsert(InjectedFailure::Unreachable);

    let err = store.validate_credentials().await.unwrap_err();
    assert!(err.is_unauthorized());

    let (batch, _) = build_batch(&[record("P1", "12", "3.1")], &[], day());
    let err = store.upsert_products(&batch).await.unwrap_err();
    assert!(matches!(err, StoreError::Unreachable { .. }));
    assert!(store.products().is_empty());
}
