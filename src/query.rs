//! Filtering and ordering over a snapshot.

use std::cmp::Reverse;

use complaint_sync_client::{ComplaintRecord, ComplaintStatus};
use serde_json::Value;

use crate::reconcile::Snapshot;

/// Top-level attributes matched by the search text.
const SEARCH_FIELDS: &[&str] = &[
    "complainerName",
    "name",
    "mobile",
    "email",
    "area",
    "location",
    "department",
];

/// Attributes of the nested `user` object matched by the search text.
const USER_SEARCH_FIELDS: &[&str] = &["name", "email"];

/// Status filter plus case-insensitive text search, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplaintQuery {
    /// `None` matches every status.
    pub status: Option<ComplaintStatus>,
    /// Lowercased; empty matches everything.
    search: String,
}

impl ComplaintQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ComplaintStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_search(mut self, text: impl AsRef<str>) -> Self {
        self.search = text.as_ref().trim().to_lowercase();
        self
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn matches(&self, record: &ComplaintRecord) -> bool {
        if self.status.is_some_and(|status| status != record.status) {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }

        if record.id.as_str().to_lowercase().contains(&self.search) {
            return true;
        }

        let hit = |value: Option<&Value>| {
            value
                .and_then(Value::as_str)
                .is_some_and(|text| text.to_lowercase().contains(&self.search))
        };

        SEARCH_FIELDS
            .iter()
            .any(|field| hit(record.attributes.get(*field)))
            || record
                .attributes
                .get("user")
                .is_some_and(|user| USER_SEARCH_FIELDS.iter().any(|field| hit(user.get(*field))))
    }

    /// Matching records, newest `submitted_at` first. Undated records sort
    /// last and otherwise keep snapshot order.
    pub fn apply<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a ComplaintRecord> {
        let mut matched: Vec<&ComplaintRecord> = snapshot
            .records()
            .iter()
            .filter(|record| self.matches(record))
            .collect();
        matched.sort_by_key(|record| Reverse(record.submitted_at));
        matched
    }
}
