//! Canonical in-memory view of complaints and their aggregate counts.
//!
//! Every input (bulk fetch, push event, status-change result) goes through a
//! single `apply_*` entry point. Each apply is one atomic transition of the
//! published [`Snapshot`]; readers never observe a partial update.
//!
//! Merge policy is last-applied-wins by `id`. Create and update events are
//! both upserts, so duplicated or reordered creates never produce duplicate
//! records.
//!
//! The aggregate is either derived from the records or supplied wholesale
//! (pushed event, or paired with a bulk fetch). Any record mutation recomputes
//! it from the records again.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use complaint_sync_client::{
    Aggregate, BulkFetch, ComplaintId, ComplaintRecord, EventKind, RemoteStore,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

// ============================================================================
// Record set
// ============================================================================

/// Records keyed by id, kept in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<ComplaintRecord>,
    index: HashMap<ComplaintId, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a sequence that may repeat ids.
    ///
    /// The last occurrence of an id wins; it keeps the position where the id
    /// first appeared.
    pub fn from_records(records: impl IntoIterator<Item = ComplaintRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.upsert(record);
        }
        set
    }

    /// Insert or replace. Returns `true` when the id was new.
    pub fn upsert(&mut self, record: ComplaintRecord) -> bool {
        match self.index.get(&record.id) {
            Some(&position) => {
                self.records[position] = record;
                false
            }
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    pub fn get(&self, id: &ComplaintId) -> Option<&ComplaintRecord> {
        self.index.get(id).map(|&position| &self.records[position])
    }

    pub fn contains(&self, id: &ComplaintId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComplaintRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[ComplaintRecord] {
        &self.records
    }
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a ComplaintRecord;
    type IntoIter = std::slice::Iter<'a, ComplaintRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Where the current aggregate came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AggregateSource {
    /// Recomputed from the record set.
    #[default]
    Derived,
    /// Paired with the last bulk fetch.
    Fetched,
    /// Replaced by an aggregate push event.
    Pushed,
}

/// Immutable view of the canonical state.
///
/// Cloning is cheap; records and aggregate are shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub records: Arc<RecordSet>,
    pub aggregate: Arc<Aggregate>,
    pub aggregate_source: AggregateSource,
    /// Completion time of the last successful bulk fetch.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Cause of the last failed refresh, cleared by the next successful one.
    pub sync_error: Option<String>,
    /// Incremented on every applied change.
    pub revision: u64,
}

impl Snapshot {
    pub fn record(&self, id: &ComplaintId) -> Option<&ComplaintRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> &[ComplaintRecord] {
        self.records.as_slice()
    }

    pub fn is_stale(&self) -> bool {
        self.sync_error.is_some()
    }
}

// ============================================================================
// Core
// ============================================================================

/// Owner of the canonical complaint view.
///
/// Share it behind an `Arc`; every method takes `&self`. Applies are
/// serialized by the snapshot channel, so concurrent callers still see one
/// transition at a time.
pub struct ReconciliationCore {
    state: watch::Sender<Snapshot>,
    closed: AtomicBool,
}

impl Default for ReconciliationCore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationCore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Snapshot::default());
        Self {
            state,
            closed: AtomicBool::new(false),
        }
    }

    /// Apply one transition. `f` returns whether it changed anything.
    ///
    /// The closed flag is checked under the channel's write lock so a
    /// transition can never land after [`ReconciliationCore::shut_down`].
    fn transition<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Snapshot) -> bool,
    {
        self.state.send_if_modified(|snapshot| {
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            let changed = f(snapshot);
            if changed {
                snapshot.revision += 1;
            }
            changed
        })
    }

    /// Replace the whole record set.
    ///
    /// Returns `false` only when the core has been shut down.
    pub fn apply_bulk_fetch(&self, fetch: BulkFetch) -> bool {
        let BulkFetch { records, aggregate } = fetch;
        let records = RecordSet::from_records(records);
        let count = records.len();

        let applied = self.transition(|snapshot| {
            let (aggregate, source) = match aggregate {
                Some(aggregate) => (aggregate, AggregateSource::Fetched),
                None => (Aggregate::from_records(&records), AggregateSource::Derived),
            };
            snapshot.records = Arc::new(records);
            snapshot.aggregate = Arc::new(aggregate);
            snapshot.aggregate_source = source;
            snapshot.last_synced_at = Some(Utc::now());
            snapshot.sync_error = None;
            true
        });

        if applied {
            debug!(count, "Applied bulk fetch");
        }
        applied
    }

    /// Apply a "created" event. An existing id is treated as an update.
    pub fn apply_create(&self, record: ComplaintRecord) -> bool {
        self.upsert(record, EventKind::Created)
    }

    /// Apply an "updated" event. A missing id is inserted.
    pub fn apply_update(&self, record: ComplaintRecord) -> bool {
        self.upsert(record, EventKind::Updated)
    }

    fn upsert(&self, record: ComplaintRecord, kind: EventKind) -> bool {
        let id = record.id.clone();
        let mut inserted = false;

        let changed = self.transition(|snapshot| {
            if snapshot.records.get(&record.id) == Some(&record) {
                return false;
            }
            let records = Arc::make_mut(&mut snapshot.records);
            inserted = records.upsert(record);
            snapshot.aggregate = Arc::new(Aggregate::from_records(&*records));
            snapshot.aggregate_source = AggregateSource::Derived;
            true
        });

        match (changed, kind, inserted) {
            (false, _, _) => {}
            (true, EventKind::Created, false) => {
                debug!(id = %id, "Create for known complaint applied as update")
            }
            (true, EventKind::Updated, true) => {
                debug!(id = %id, "Update for unknown complaint inserted")
            }
            (true, _, _) => debug!(id = %id, event = %kind, "Applied record event"),
        }
        changed
    }

    /// Replace the aggregate wholesale. Records are untouched.
    pub fn apply_aggregate(&self, aggregate: Aggregate) -> bool {
        let changed = self.transition(|snapshot| {
            if snapshot.aggregate_source == AggregateSource::Pushed
                && *snapshot.aggregate == aggregate
            {
                return false;
            }
            snapshot.aggregate = Arc::new(aggregate);
            snapshot.aggregate_source = AggregateSource::Pushed;
            true
        });
        if changed {
            debug!("Applied pushed aggregate");
        }
        changed
    }

    /// Decode a raw push payload and apply it.
    ///
    /// Malformed payloads are logged and dropped; state is unchanged.
    pub fn apply_payload(&self, kind: EventKind, payload: Value) -> Result<bool> {
        let applied = match kind {
            EventKind::Created | EventKind::Updated => {
                ComplaintRecord::from_payload(payload).map(|record| match kind {
                    EventKind::Created => self.apply_create(record),
                    _ => self.apply_update(record),
                })
            }
            EventKind::AggregateUpdated => {
                Aggregate::from_payload(payload).map(|aggregate| self.apply_aggregate(aggregate))
            }
        };

        applied.map_err(|e| {
            warn!(event = %kind, error = %e, "Dropping malformed push payload");
            SyncError::Apply(e)
        })
    }

    /// Flag the view as stale without touching records.
    pub fn record_sync_failure(&self, cause: impl fmt::Display) -> bool {
        let cause = cause.to_string();
        self.transition(|snapshot| {
            snapshot.sync_error = Some(cause);
            true
        })
    }

    /// Bulk fetch from `remote` and apply the result.
    ///
    /// On failure the previous records stay and the snapshot carries the
    /// error until the next successful fetch.
    pub async fn refresh_from(&self, remote: &dyn RemoteStore) -> Result<()> {
        if self.is_shut_down() {
            return Err(SyncError::TornDown);
        }

        match remote.fetch_complaints().await {
            Ok(fetch) => {
                self.apply_bulk_fetch(fetch);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Bulk fetch failed, keeping previous records");
                self.record_sync_failure(&e);
                Err(e.into())
            }
        }
    }

    /// Latest applied state. Never waits on a writer for longer than a clone.
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified after every applied change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    /// Stop accepting input. Every later apply is ignored.
    pub fn shut_down(&self) {
        self.state.send_if_modified(|_| {
            self.closed.store(true, Ordering::Release);
            false
        });
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests;
