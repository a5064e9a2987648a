//! Reconciliation core step definitions.

use std::fmt;

use complaint_sync::{AggregateSource, ReconciliationCore, Snapshot, SyncError};
use complaint_sync_client::{Aggregate, BulkFetch, ComplaintStatus, EventKind};
use cucumber::{given, then, when, World};

use super::{describe_records, normalise, parse_records};

/// Test context for reconciliation core scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct CoreWorld {
    core: ReconciliationCore,
    remembered: Option<Snapshot>,
    last_error: Option<SyncError>,
}

impl fmt::Debug for CoreWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreWorld")
            .field("snapshot", &self.core.snapshot())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl CoreWorld {
    fn new() -> Self {
        Self {
            core: ReconciliationCore::new(),
            remembered: None,
            last_error: None,
        }
    }

    fn bulk_fetch(&mut self, records: &str) {
        self.core
            .apply_bulk_fetch(BulkFetch::records(parse_records(records)));
    }

    fn update(&mut self, record: &str) {
        for record in parse_records(record) {
            self.core.apply_update(record);
        }
    }

    fn remember(&mut self) {
        self.remembered = Some(self.core.snapshot());
    }
}

// --- Given steps ---

#[given("an empty reconciliation core")]
async fn given_empty_core(world: &mut CoreWorld) {
    assert!(world.core.snapshot().records.is_empty());
}

#[given(expr = "a bulk fetch of {string} is applied")]
async fn given_bulk_fetch(world: &mut CoreWorld, records: String) {
    world.bulk_fetch(&records);
}

#[given(expr = "an update event for {string} is applied")]
async fn given_update_event(world: &mut CoreWorld, record: String) {
    world.update(&record);
}

#[given("the snapshot is remembered")]
async fn given_snapshot_remembered(world: &mut CoreWorld) {
    world.remember();
}

// --- When steps ---

#[when(expr = "a bulk fetch of {string} is applied")]
async fn when_bulk_fetch(world: &mut CoreWorld, records: String) {
    world.bulk_fetch(&records);
}

#[when(expr = "an update event for {string} is applied")]
async fn when_update_event(world: &mut CoreWorld, record: String) {
    world.update(&record);
}

#[when(expr = "a create event for {string} is applied {int} times")]
async fn when_create_event(world: &mut CoreWorld, record: String, times: u32) {
    for _ in 0..times {
        for record in parse_records(&record) {
            world.core.apply_create(record);
        }
    }
}

#[when(expr = "an aggregate event with total {int} is applied")]
async fn when_aggregate_event(world: &mut CoreWorld, total: u64) {
    world.core.apply_aggregate(Aggregate {
        total,
        ..Default::default()
    });
}

#[when(expr = "a raw {string} event with payload {string} is applied")]
async fn when_raw_event(world: &mut CoreWorld, event: String, payload: String) {
    let kind = EventKind::from_wire(&event).expect("known event name");
    let payload = serde_json::from_str(&payload).expect("valid JSON");
    world.last_error = world.core.apply_payload(kind, payload).err();
}

#[when("the snapshot is remembered")]
async fn when_snapshot_remembered(world: &mut CoreWorld) {
    world.remember();
}

#[when("the core is shut down")]
async fn when_core_shut_down(world: &mut CoreWorld) {
    world.core.shut_down();
}

// --- Then steps ---

#[then(expr = "the snapshot records are {string}")]
async fn then_records_are(world: &mut CoreWorld, expected: String) {
    assert_eq!(describe_records(&world.core.snapshot()), normalise(&expected));
}

#[then(expr = "the aggregate counts {int} {string} complaints")]
async fn then_aggregate_counts(world: &mut CoreWorld, count: u64, status: String) {
    let status: ComplaintStatus = status.parse().expect("valid status");
    assert_eq!(world.core.snapshot().aggregate.count(status), count);
}

#[then(expr = "the aggregate has {int} status bucket(s)")]
async fn then_status_buckets(world: &mut CoreWorld, buckets: usize) {
    assert_eq!(world.core.snapshot().aggregate.by_status.len(), buckets);
}

#[then(expr = "the aggregate total is {int}")]
async fn then_aggregate_total(world: &mut CoreWorld, total: u64) {
    assert_eq!(world.core.snapshot().aggregate.total, total);
}

#[then(expr = "the aggregate came from {string}")]
async fn then_aggregate_source(world: &mut CoreWorld, source: String) {
    let expected = match source.as_str() {
        "derived" => AggregateSource::Derived,
        "fetched" => AggregateSource::Fetched,
        "pushed" => AggregateSource::Pushed,
        other => panic!("unknown aggregate source '{other}'"),
    };
    assert_eq!(world.core.snapshot().aggregate_source, expected);
}

#[then("the snapshot has been synced")]
async fn then_snapshot_synced(world: &mut CoreWorld) {
    let snapshot = world.core.snapshot();
    assert!(snapshot.last_synced_at.is_some());
    assert!(snapshot.sync_error.is_none());
}

#[then("the last event was rejected as malformed")]
async fn then_rejected_as_malformed(world: &mut CoreWorld) {
    assert!(matches!(world.last_error, Some(SyncError::Apply(_))));
}

#[then("the snapshot is unchanged")]
async fn then_snapshot_unchanged(world: &mut CoreWorld) {
    let remembered = world.remembered.as_ref().expect("snapshot remembered");
    assert_eq!(&world.core.snapshot(), remembered);
}
