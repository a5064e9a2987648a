use super::*;
use crate::test_utils::MockRemoteStore;
use complaint_sync_client::{ComplaintStatus, PayloadError};
use serde_json::json;

fn record(id: u64, status: ComplaintStatus) -> ComplaintRecord {
    ComplaintRecord::new(id, status)
}

fn statuses(snapshot: &Snapshot) -> Vec<(String, ComplaintStatus)> {
    snapshot
        .records()
        .iter()
        .map(|r| (r.id.to_string(), r.status))
        .collect()
}

#[test]
fn test_bulk_then_update_recomputes_aggregate() {
    let core = ReconciliationCore::new();
    core.apply_bulk_fetch(BulkFetch::records(vec![
        record(1, ComplaintStatus::Pending),
        record(2, ComplaintStatus::Resolved),
    ]));
    core.apply_update(record(1, ComplaintStatus::Resolved));

    let snapshot = core.snapshot();
    assert_eq!(
        statuses(&snapshot),
        vec![
            ("1".to_string(), ComplaintStatus::Resolved),
            ("2".to_string(), ComplaintStatus::Resolved),
        ]
    );
    assert_eq!(snapshot.aggregate.total, 2);
    assert_eq!(snapshot.aggregate.count(ComplaintStatus::Resolved), 2);
    assert_eq!(snapshot.aggregate.by_status.len(), 1);
    assert_eq!(snapshot.aggregate_source, AggregateSource::Derived);
}

#[test]
fn test_duplicate_create_is_idempotent() {
    let core = ReconciliationCore::new();
    let created = record(5, ComplaintStatus::Pending).with_attribute("department", "Water");

    assert!(core.apply_create(created.clone()));
    let once = core.snapshot();
    assert!(!core.apply_create(created));
    let twice = core.snapshot();

    assert_eq!(once, twice);
    assert_eq!(twice.records.len(), 1);
    assert_eq!(twice.aggregate.by_department.get("Water"), Some(&1));
}

#[test]
fn test_create_for_existing_id_updates() {
    let core = ReconciliationCore::new();
    core.apply_create(record(5, ComplaintStatus::Pending));
    core.apply_create(record(5, ComplaintStatus::Closed));

    let snapshot = core.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(
        snapshot.record(&ComplaintId::from(5u64)).unwrap().status,
        ComplaintStatus::Closed
    );
    assert_eq!(snapshot.aggregate.total, 1);
}

#[test]
fn test_update_for_missing_id_inserts() {
    let core = ReconciliationCore::new();
    core.apply_update(record(9, ComplaintStatus::UnderReview));

    let snapshot = core.snapshot();
    assert!(snapshot.records.contains(&ComplaintId::from(9u64)));
    assert_eq!(snapshot.aggregate.count(ComplaintStatus::UnderReview), 1);
}

#[test]
fn test_upserts_keep_last_value_per_id() {
    let core = ReconciliationCore::new();
    let events = [
        (3, ComplaintStatus::Pending),
        (1, ComplaintStatus::Pending),
        (3, ComplaintStatus::Resolved),
        (2, ComplaintStatus::Closed),
        (1, ComplaintStatus::UnderResolving),
        (3, ComplaintStatus::Closed),
    ];
    for (i, (id, status)) in events.into_iter().enumerate() {
        if i % 2 == 0 {
            core.apply_create(record(id, status));
        } else {
            core.apply_update(record(id, status));
        }
    }

    let snapshot = core.snapshot();
    assert_eq!(
        statuses(&snapshot),
        vec![
            ("3".to_string(), ComplaintStatus::Closed),
            ("1".to_string(), ComplaintStatus::UnderResolving),
            ("2".to_string(), ComplaintStatus::Closed),
        ]
    );
}

#[test]
fn test_bulk_fetch_replaces_and_dedupes() {
    let core = ReconciliationCore::new();
    core.apply_create(record(100, ComplaintStatus::Pending));

    core.apply_bulk_fetch(BulkFetch::records(vec![
        record(1, ComplaintStatus::Pending),
        record(2, ComplaintStatus::Pending),
        record(1, ComplaintStatus::Closed),
    ]));

    let snapshot = core.snapshot();
    assert_eq!(
        statuses(&snapshot),
        vec![
            ("1".to_string(), ComplaintStatus::Closed),
            ("2".to_string(), ComplaintStatus::Pending),
        ]
    );
    assert!(snapshot.last_synced_at.is_some());
    assert_eq!(snapshot.aggregate.total, 2);
}

#[test]
fn test_bulk_fetch_uses_paired_aggregate() {
    let core = ReconciliationCore::new();
    let supplied = Aggregate {
        total: 40,
        ..Default::default()
    };

    core.apply_bulk_fetch(
        BulkFetch::records(vec![record(1, ComplaintStatus::Pending)])
            .with_aggregate(supplied.clone()),
    );

    let snapshot = core.snapshot();
    assert_eq!(*snapshot.aggregate, supplied);
    assert_eq!(snapshot.aggregate_source, AggregateSource::Fetched);
}

#[test]
fn test_pushed_aggregate_replaces_wholesale() {
    let core = ReconciliationCore::new();
    core.apply_bulk_fetch(BulkFetch::records(vec![record(1, ComplaintStatus::Pending)]));
    let records_before = core.snapshot().records;

    let pushed = Aggregate {
        total: 7,
        feedback_count: 3,
        ..Default::default()
    };
    assert!(core.apply_aggregate(pushed.clone()));

    let snapshot = core.snapshot();
    assert_eq!(*snapshot.aggregate, pushed);
    assert!(snapshot.aggregate.by_status.is_empty());
    assert_eq!(snapshot.aggregate_source, AggregateSource::Pushed);
    assert_eq!(snapshot.records, records_before);
}

#[test]
fn test_record_mutation_rederives_pushed_aggregate() {
    let core = ReconciliationCore::new();
    core.apply_aggregate(Aggregate {
        total: 99,
        ..Default::default()
    });
    core.apply_create(record(1, ComplaintStatus::Pending));

    let snapshot = core.snapshot();
    assert_eq!(snapshot.aggregate.total, 1);
    assert_eq!(snapshot.aggregate_source, AggregateSource::Derived);
}

#[test]
fn test_apply_payload_dispatches_by_kind() {
    let core = ReconciliationCore::new();
    core.apply_payload(
        EventKind::Created,
        json!({"id": "a1", "status": "pending", "location": "Ward 2"}),
    )
    .unwrap();
    core.apply_payload(
        EventKind::Updated,
        json!({"id": "a1", "status": "under review", "location": "Ward 2"}),
    )
    .unwrap();
    core.apply_payload(
        EventKind::AggregateUpdated,
        json!({"totalComplaints": 12, "pendingComplaints": 12}),
    )
    .unwrap();

    let snapshot = core.snapshot();
    assert_eq!(
        snapshot.record(&ComplaintId::from("a1")).unwrap().status,
        ComplaintStatus::UnderReview
    );
    assert_eq!(snapshot.aggregate.total, 12);
}

#[test]
fn test_malformed_payload_is_dropped() {
    let core = ReconciliationCore::new();
    core.apply_create(record(1, ComplaintStatus::Pending));
    let before = core.snapshot();

    let err = core
        .apply_payload(EventKind::Updated, json!({"status": "closed"}))
        .unwrap_err();
    assert!(matches!(err, SyncError::Apply(PayloadError::MissingId)));

    let err = core
        .apply_payload(EventKind::AggregateUpdated, json!("nope"))
        .unwrap_err();
    assert!(matches!(err, SyncError::Apply(PayloadError::NotAnObject)));

    assert_eq!(core.snapshot(), before);
}

#[test]
fn test_revision_and_notifications() {
    let core = ReconciliationCore::new();
    let mut rx = core.subscribe();
    assert_eq!(rx.borrow().revision, 0);

    core.apply_create(record(1, ComplaintStatus::Pending));
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().revision, 1);

    // No-op applies do not notify.
    core.apply_create(record(1, ComplaintStatus::Pending));
    assert!(!rx.has_changed().unwrap());
}

#[test]
fn test_shut_down_ignores_input() {
    let core = ReconciliationCore::new();
    core.apply_create(record(1, ComplaintStatus::Pending));
    let before = core.snapshot();

    core.shut_down();

    assert!(!core.apply_update(record(1, ComplaintStatus::Closed)));
    assert!(!core.apply_bulk_fetch(BulkFetch::default()));
    assert!(!core.apply_aggregate(Aggregate::default()));
    assert!(!core.record_sync_failure("late"));
    assert_eq!(core.snapshot(), before);
    assert!(core.is_shut_down());
}

#[tokio::test]
async fn test_refresh_failure_keeps_records_and_flags_error() {
    let core = ReconciliationCore::new();
    let remote = MockRemoteStore::new();
    remote
        .set_complaints(vec![record(1, ComplaintStatus::Pending)])
        .await;
    core.refresh_from(&remote).await.unwrap();

    remote.set_fail_fetch(true).await;
    let err = core.refresh_from(&remote).await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));

    let snapshot = core.snapshot();
    assert_eq!(snapshot.records.len(), 1);
    assert!(snapshot.is_stale());

    remote.set_fail_fetch(false).await;
    core.refresh_from(&remote).await.unwrap();
    assert!(!core.snapshot().is_stale());
}

#[tokio::test]
async fn test_refresh_after_shut_down_is_rejected() {
    let core = ReconciliationCore::new();
    let remote = MockRemoteStore::new();
    core.shut_down();

    let err = core.refresh_from(&remote).await.unwrap_err();
    assert!(matches!(err, SyncError::TornDown));
    assert_eq!(remote.fetch_count(), 0);
}
