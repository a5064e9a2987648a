//! Cucumber step definitions for reconciliation scenarios.

pub mod reconcile;
pub mod live_sync;

use complaint_sync::Snapshot;
use complaint_sync_client::{ComplaintRecord, ComplaintStatus};

/// Parse `"1=pending, 2=under review"` into records.
pub fn parse_records(list: &str) -> Vec<ComplaintRecord> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, status) = entry
                .split_once('=')
                .unwrap_or_else(|| panic!("expected id=status, got '{entry}'"));
            let status: ComplaintStatus = status.trim().parse().expect("valid status");
            ComplaintRecord::new(id.trim(), status)
        })
        .collect()
}

/// Render snapshot records in the same `id=status` form.
pub fn describe_records(snapshot: &Snapshot) -> String {
    snapshot
        .records()
        .iter()
        .map(|r| format!("{}={}", r.id, r.status))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Normalise an `id=status` list for comparison.
pub fn normalise(list: &str) -> String {
    parse_records(list)
        .iter()
        .map(|r| format!("{}={}", r.id, r.status))
        .collect::<Vec<_>>()
        .join(", ")
}
