//! Tests for the SQLite call store

use std::sync::Arc;

use callbridge_ingest_core::callback::PhoneMatch;
use callbridge_ingest_core::{
    seed_default_dispositions, CallDirection, CallFields, CallStatus, CallStore, CallbackMatcher, DispositionCategory,
    DispositionDefaults, DispositionOrigin, Error, RejectionReason, SqliteCallStore, StoreError, WebhookEngine,
};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (SqliteCallStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("calls.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let store = SqliteCallStore::new(&db_url)
        .await
        .expect("Failed to create test database");

    (store, temp_dir)
}

fn missed(number: &str, started: DateTime<Utc>) -> CallFields {
    let offset = FixedOffset::east_opt(19_800).unwrap();
    let mut fields = CallFields::new(number, started.with_timezone(&offset));
    fields.status = CallStatus::Missed;
    fields.raw_payload = json!({"call_id": "x", "caller_id_number": number});
    fields
}

#[tokio::test]
async fn test_upsert_round_trips_fields() {
    let (store, _temp_dir) = create_test_db().await;
    let started = Utc::now() - Duration::minutes(10);

    let mut fields = missed("+919876543210", started);
    fields.end_time = Some(fields.start_time + Duration::seconds(42));
    fields.duration_seconds = 42;
    fields.staff_name = Some("Amit".to_string());
    fields.disposition_code = Some("SALES_INQ".to_string());
    fields.customer.vehicle_model = Some("Nexon".to_string());
    fields.customer.is_lead = true;

    let created = store.upsert_call("CALL-1", fields.clone()).await.unwrap();
    assert!(created.created);
    assert_eq!(created.record.fields, fields);

    let loaded = store.get_call(&created.record.id).await.unwrap().unwrap();
    assert_eq!(loaded, created.record);
    assert_eq!(loaded.fields.start_time.offset().local_minus_utc(), 19_800);
}

#[tokio::test]
async fn test_upsert_replaces_by_call_id() {
    let (store, _temp_dir) = create_test_db().await;
    let started = Utc::now();

    let first = store.upsert_call("CALL-1", missed("+919876543210", started)).await.unwrap();

    let mut update = missed("+919876543210", started);
    update.status = CallStatus::Completed;
    update.duration_seconds = 120;
    let second = store.upsert_call("CALL-1", update).await.unwrap();

    assert!(!second.created);
    assert_eq!(second.record.id, first.record.id);
    assert_eq!(second.record.created_at, first.record.created_at);
    assert_eq!(second.record.fields.status, CallStatus::Completed);
    assert_eq!(second.record.fields.duration_seconds, 120);
    assert_eq!(store.count_calls().await.unwrap(), 1);
}

#[tokio::test]
async fn test_mark_contacted_is_compare_and_set() {
    let (store, _temp_dir) = create_test_db().await;
    let now = Utc::now();
    let id = store
        .upsert_call("CALL-1", missed("+919876543210", now))
        .await
        .unwrap()
        .record
        .id;

    assert!(store.mark_contacted(&id, now).await.unwrap());
    assert!(!store.mark_contacted(&id, now + Duration::minutes(1)).await.unwrap());
    assert!(!store.mark_contacted("no-such-id", now).await.unwrap());

    // A replayed delivery must not clear the claim
    let replayed = store.upsert_call("CALL-1", missed("+919876543210", now)).await.unwrap();
    assert_eq!(replayed.record.fields.contacted_at, Some(now));
}

#[tokio::test]
async fn test_find_recent_inbound() {
    let (store, _temp_dir) = create_test_db().await;
    let now = Utc::now();

    store.upsert_call("OLD", missed("+919876543210", now - Duration::hours(5))).await.unwrap();
    store.upsert_call("NEW", missed("+91 98765 43210", now - Duration::hours(1))).await.unwrap();
    store.upsert_call("OTHER", missed("+911234567890", now)).await.unwrap();

    let mut outbound = missed("9876543210", now);
    outbound.direction = CallDirection::Outbound;
    store.upsert_call("OUT", outbound).await.unwrap();

    let phone = PhoneMatch::new("9876543210");
    let found = store
        .find_recent_inbound(&phone, now - Duration::hours(24))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.call_id, "NEW");

    let none = store
        .find_recent_inbound(&phone, now - Duration::minutes(30))
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_dispositions() {
    let (store, _temp_dir) = create_test_db().await;

    assert_eq!(seed_default_dispositions(&store).await.unwrap(), 10);
    assert_eq!(seed_default_dispositions(&store).await.unwrap(), 0);

    let test_drive = store.get_disposition("TEST_DRIVE").await.unwrap().unwrap();
    assert_eq!(test_drive.category, DispositionCategory::TestDrive);
    assert_eq!(test_drive.origin, DispositionOrigin::Admin);
    assert!(test_drive.requires_followup);

    let (auto, created) = store
        .get_or_create_disposition("WRONG_NUMBER", DispositionDefaults::auto_provisioned("WRONG_NUMBER"))
        .await
        .unwrap();
    assert!(created);
    assert_eq!(auto.category, DispositionCategory::Other);
    assert_eq!(auto.origin, DispositionOrigin::Webhook);
    assert_eq!(auto.description.as_deref(), Some("Auto-created from webhook: WRONG_NUMBER"));

    let err = store
        .create_disposition(
            "WRONG_NUMBER",
            DispositionDefaults::admin("Wrong Number", "Dialled in error", DispositionCategory::Other, false),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DispositionExists(_)));
}

#[tokio::test]
async fn test_concurrent_callbacks_claim_once() {
    let (store, _temp_dir) = create_test_db().await;
    let store = Arc::new(store);
    let now = Utc::now();
    store
        .upsert_call("IN-1", missed("+919876543210", now - Duration::hours(2)))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            CallbackMatcher::default().claim(&*store, "9876543210", now).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(Error::CallbackRejected(RejectionReason::AlreadyContacted)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn test_engine_over_sqlite() {
    let (store, _temp_dir) = create_test_db().await;
    let store = Arc::new(store);
    let engine = WebhookEngine::with_defaults(store.clone());
    let now = Utc::now();

    let inbound = json!({
        "call_id": "IN-1",
        "caller_id_number": "+919876543210",
        "start_stamp": (now - Duration::hours(2)).to_rfc3339(),
        "call_status": "no-answer"
    });
    engine
        .ingest_at(inbound.to_string().as_bytes(), Some("application/json"), now)
        .await
        .unwrap();

    let outbound = json!({
        "call_id": "OUT-1",
        "call_to_number": "9876543210",
        "direction": "outbound",
        "call_status": "answered",
        "agent_name": "Neha"
    });
    let outcome = engine
        .ingest_at(outbound.to_string().as_bytes(), Some("application/json"), now)
        .await
        .unwrap();

    assert!(outcome.record.fields.is_callback);
    let stored = store.get_call_by_call_id("OUT-1").await.unwrap().unwrap();
    assert_eq!(stored, outcome.record);
    assert_eq!(stored.fields.raw_payload, outbound);
}

#[tokio::test]
async fn test_in_memory_sqlite() {
    let store = SqliteCallStore::in_memory().await.unwrap();
    store.upsert_call("CALL-1", missed("+919876543210", Utc::now())).await.unwrap();
    assert_eq!(store.count_calls().await.unwrap(), 1);
}
