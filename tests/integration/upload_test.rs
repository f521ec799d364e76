//! Integration tests for the batch upload service

use pretty_assertions::assert_eq;
use ramadan_ingest::config::UploadConfig;
use ramadan_ingest::models::{
    OperationType, ProgressOperation, ProgressStatus, RowError, ScheduleEntry, ScheduleQuery,
    UploadStatus,
};
use ramadan_ingest::services::{BatchUploadService, ProgressHub};
use ramadan_ingest::store::{MemoryScheduleStore, ScheduleStore};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::common::fixtures::{entries_for, entry, quick_upload_config, FlakyStore};

fn service(store: Arc<dyn ScheduleStore>, hub: &ProgressHub) -> BatchUploadService {
    BatchUploadService::new(store, quick_upload_config(), hub.clone())
}

// =============================================================================
// Validation and Deduplication
// =============================================================================

#[tokio::test]
async fn test_duplicate_key_in_submission() {
    let store = Arc::new(MemoryScheduleStore::new());
    let hub = ProgressHub::new();

    let response = service(store.clone(), &hub)
        .upload(
            vec![
                ScheduleEntry::new("2026-03-01", "04:45", "18:12", "Dhaka"),
                ScheduleEntry::new("2026-03-01", "04:46", "18:13", "Dhaka"),
            ],
            "manual",
            None,
        )
        .await
        .unwrap();

    let result = response.result;
    assert_eq!(result.row_count, 1);
    assert_eq!(result.errors, vec![RowError::new(2, "duplicate of row 1")]);
    assert!(result.success);
    assert!(!result.rolled_back);
    // First occurrence wins
    assert_eq!(store.get("2026-03-01", "Dhaka").unwrap().sehri, "04:45");
}

#[tokio::test]
async fn test_invalid_rows_are_reported_and_skipped() {
    let store = Arc::new(MemoryScheduleStore::new());
    let hub = ProgressHub::new();

    let response = service(store.clone(), &hub)
        .upload(
            vec![
                entry("2026-03-01", "Dhaka"),
                ScheduleEntry::new("01/03/2026", "04:45", "18:12", "Dhaka"),
                ScheduleEntry::new("2026-03-02", "4:45", "18:12", "Dhaka"),
                ScheduleEntry::new("2026-03-03", "04:45", "18:12", " "),
                entry("2026-03-04", "  Sylhet  "),
            ],
            "manual",
            None,
        )
        .await
        .unwrap();

    let result = response.result;
    assert_eq!(result.row_count, 2);
    let rows: Vec<usize> = result.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, vec![2, 3, 4]);
    assert!(result.success);
    assert_eq!(result.status(), UploadStatus::Partial);
    // Location is trimmed before it is persisted
    assert!(store.get("2026-03-04", "Sylhet").is_some());
}

#[tokio::test]
async fn test_nothing_valid_is_a_failed_upload() {
    let store = Arc::new(MemoryScheduleStore::new());
    let hub = ProgressHub::new();

    let response = service(store.clone(), &hub)
        .upload(
            vec![ScheduleEntry::new("bad", "04:45", "18:12", "Dhaka")],
            "manual",
            None,
        )
        .await
        .unwrap();

    assert!(!response.result.success);
    assert_eq!(response.result.row_count, 0);
    assert_eq!(hub.get(response.operation_id).unwrap().status, ProgressStatus::Failed);

    let logs = store.uploads();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, UploadStatus::Failed);
}

// =============================================================================
// Batch Isolation
// =============================================================================

#[tokio::test]
async fn test_one_bad_row_does_not_sink_its_batch() {
    let entries = entries_for("Dhaka", 120);
    let bad = entries[26].clone();
    let store = Arc::new(FlakyStore::new().poison(&bad.date, "Dhaka"));
    let hub = ProgressHub::new();

    let response = service(store.clone(), &hub)
        .upload(entries, "bulk", None)
        .await
        .unwrap();

    let result = response.result;
    assert_eq!(result.row_count, 119);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].row, 27);
    assert!(result.rolled_back);
    assert_eq!(result.retried, 50);
    assert!(!result.success);
    assert_eq!(result.status(), UploadStatus::Partial);

    // 3 batches; only the first needed the per-row fallback
    assert_eq!(store.batch_calls.load(Ordering::SeqCst), 3);
    // 49 good rows once, the poisoned row three times
    assert_eq!(store.row_calls.load(Ordering::SeqCst), 49 + 3);
    assert_eq!(store.memory().len(), 119);
    assert!(store.memory().get(&bad.date, "Dhaka").is_none());
}

#[tokio::test]
async fn test_unreachable_store_aborts_without_row_fallback() {
    let store = Arc::new(FlakyStore::new().down());
    let hub = ProgressHub::new();
    let id = hub.create(OperationType::Upload, 0);

    let response = service(store.clone(), &hub)
        .upload(entries_for("Barishal", 28), "outage", Some(id))
        .await
        .unwrap();

    let result = response.result;
    assert!(!result.success);
    assert_eq!(result.row_count, 0);
    assert_eq!(result.retried, 0);
    assert_eq!(result.errors.len(), 28);
    assert!(result.errors.iter().all(|e| e.error.contains("unavailable")));

    assert_eq!(store.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.row_calls.load(Ordering::SeqCst), 0);
    assert_eq!(hub.get(id).unwrap().status, ProgressStatus::Failed);

    // Audit goes to the inner store, which is still reachable
    let uploads = store.memory().uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].status, UploadStatus::Failed);
}

#[tokio::test]
async fn test_outage_during_row_fallback_stops_the_upload() {
    let entries = entries_for("Dhaka", 120);
    let store = Arc::new(
        FlakyStore::new()
            .poison(&entries[3].date, "Dhaka")
            .rows_down(),
    );
    let hub = ProgressHub::new();
    let id = hub.create(OperationType::Upload, 0);

    let response = service(store.clone(), &hub)
        .upload(entries, "outage", Some(id))
        .await
        .unwrap();

    let result = response.result;
    assert!(!result.success);
    assert_eq!(result.row_count, 0);
    assert!(result.rolled_back);
    // The first fallback row hits the outage; every row is attributed
    assert_eq!(result.retried, 1);
    assert_eq!(result.errors.len(), 120);
    assert_eq!(result.errors[0].row, 1);

    assert_eq!(store.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.row_calls.load(Ordering::SeqCst), 1);
    assert_eq!(hub.get(id).unwrap().status, ProgressStatus::Failed);
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_upload() {
    let store = Arc::new(FlakyStore::new().failing_audit());
    let hub = ProgressHub::new();

    let response = service(store.clone(), &hub)
        .upload(entries_for("Cumilla", 3), "bulk", None)
        .await
        .unwrap();

    assert!(response.result.success);
    assert_eq!(response.result.row_count, 3);
    assert!(store.memory().uploads().is_empty());
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let store = Arc::new(MemoryScheduleStore::new());
    let hub = ProgressHub::new();
    let uploader = service(store.clone(), &hub);
    let entries = entries_for("Rangpur", 10);

    uploader.upload(entries.clone(), "first", None).await.unwrap();
    let before = store
        .list_entries(&ScheduleQuery::default())
        .await
        .unwrap();

    let second = uploader.upload(entries, "second", None).await.unwrap();
    let after = store
        .list_entries(&ScheduleQuery::default())
        .await
        .unwrap();

    assert!(second.result.success);
    assert_eq!(before, after);
    assert!(after
        .iter()
        .all(|e| store.revision(&e.date, &e.location) == 1));
    assert_eq!(store.uploads().len(), 2);
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test]
async fn test_progress_follows_batches() {
    let store = Arc::new(MemoryScheduleStore::new());
    let hub = ProgressHub::new();
    let id = hub.create(OperationType::Upload, 0);

    let seen = Arc::new(Mutex::new(Vec::<ProgressOperation>::new()));
    let sink = Arc::clone(&seen);
    let _sub = hub
        .subscribe(id, move |op: &ProgressOperation| sink.lock().unwrap().push(op.clone()))
        .unwrap();

    let uploader = BatchUploadService::new(
        store,
        UploadConfig {
            batch_size: 4,
            ..quick_upload_config()
        },
        hub.clone(),
    );
    let mut entries = entries_for("Mymensingh", 10);
    entries.push(entries[0].clone());

    let response = uploader.upload(entries, "batched", Some(id)).await.unwrap();
    assert_eq!(response.operation_id, id);

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|op| op.status == ProgressStatus::Validating));
    assert!(seen.iter().any(|op| op.status == ProgressStatus::Uploading));
    assert!(seen.windows(2).all(|w| w[0].current <= w[1].current));
    let batches: Vec<u32> = seen.iter().filter_map(|op| op.batch).collect();
    assert!(batches.contains(&3));
    assert!(seen.iter().all(|op| op.total_batches.is_none() || op.total_batches == Some(3)));

    let last = seen.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Completed);
    assert_eq!(last.current, 11);
    assert_eq!(last.total, 11);
}

#[tokio::test]
async fn test_cancellation_is_honoured_between_batches() {
    let store = Arc::new(MemoryScheduleStore::new());
    let hub = ProgressHub::new();
    let id = hub.create(OperationType::Upload, 0);
    hub.cancel(id).unwrap();

    let response = service(store.clone(), &hub)
        .upload(entries_for("Gazipur", 5), "cancelled", Some(id))
        .await
        .unwrap();

    assert_eq!(response.result.row_count, 0);
    assert_eq!(response.result.errors.len(), 5);
    assert!(store.is_empty());
    assert_eq!(hub.get(id).unwrap().status, ProgressStatus::Failed);
}

#[tokio::test]
async fn test_finished_operation_id_is_rejected() {
    let store = Arc::new(MemoryScheduleStore::new());
    let hub = ProgressHub::new();
    let id = hub.create(OperationType::Upload, 0);
    hub.complete(id, "already done").unwrap();

    let result = service(store, &hub)
        .upload(entries_for("Bogura", 1), "late", Some(id))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_row_retry_uses_configured_attempts() {
    let entries = entries_for("Jessore", 2);
    let store = Arc::new(FlakyStore::new().poison(&entries[1].date, "Jessore"));
    let hub = ProgressHub::new();
    let uploader = BatchUploadService::new(
        store.clone(),
        UploadConfig {
            max_row_attempts: 5,
            ..quick_upload_config()
        },
        hub.clone(),
    );

    let response = uploader.upload(entries, "retry", None).await.unwrap();

    assert_eq!(response.result.row_count, 1);
    assert_eq!(response.result.retried, 2);
    assert_eq!(store.row_calls.load(Ordering::SeqCst), 1 + 5);
}
