//! Wire model shared with the complaint backend.
//!
//! Records arrive from two places: bulk REST reads and push events. Both are
//! decoded through [`ComplaintRecord::from_payload`], so a record looks the
//! same no matter which path delivered it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::PayloadError;

// ============================================================================
// Identity and status
// ============================================================================

/// Opaque complaint identifier.
///
/// The backend may send ids as JSON strings or integers; both are kept in
/// their textual form so `7` and `"7"` name the same complaint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ComplaintId(String);

impl ComplaintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComplaintId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComplaintId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ComplaintId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl TryFrom<&Value> for ComplaintId {
    type Error = PayloadError;

    fn try_from(raw: &Value) -> Result<Self, Self::Error> {
        match raw {
            Value::String(s) if !s.trim().is_empty() => Ok(Self(s.clone())),
            Value::Number(n) => Ok(Self(n.to_string())),
            Value::Null => Err(PayloadError::MissingId),
            Value::String(_) => Err(PayloadError::MissingId),
            other => Err(PayloadError::InvalidField {
                field: "id",
                reason: format!("expected string or number, got {}", other),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for ComplaintId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        ComplaintId::try_from(&raw).map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComplaintStatus {
    Pending,
    UnderReview,
    UnderResolving,
    Resolved,
    Closed,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 5] = [
        ComplaintStatus::Pending,
        ComplaintStatus::UnderReview,
        ComplaintStatus::UnderResolving,
        ComplaintStatus::Resolved,
        ComplaintStatus::Closed,
    ];

    /// Spelling used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Pending => "pending",
            ComplaintStatus::UnderReview => "under review",
            ComplaintStatus::UnderResolving => "under resolving",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = PayloadError;

    /// Case-insensitive; `under review`, `under_review`, `under-review` and
    /// `underReview` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "pending" => Ok(ComplaintStatus::Pending),
            "underreview" => Ok(ComplaintStatus::UnderReview),
            "underresolving" => Ok(ComplaintStatus::UnderResolving),
            "resolved" => Ok(ComplaintStatus::Resolved),
            "closed" => Ok(ComplaintStatus::Closed),
            _ => Err(PayloadError::InvalidField {
                field: "status",
                reason: format!("unknown status '{}'", s),
            }),
        }
    }
}

impl TryFrom<String> for ComplaintStatus {
    type Error = PayloadError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ComplaintStatus> for String {
    fn from(status: ComplaintStatus) -> Self {
        status.as_str().to_string()
    }
}

// ============================================================================
// Records
// ============================================================================

/// A complaint filed by a citizen.
///
/// Everything other than `id`, `status` and the submission time is kept in
/// `attributes` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct ComplaintRecord {
    pub id: ComplaintId,
    pub status: ComplaintStatus,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ComplaintRecord {
    pub fn new(id: impl Into<ComplaintId>, status: ComplaintStatus) -> Self {
        Self {
            id: id.into(),
            status,
            submitted_at: None,
            attributes: Map::new(),
        }
    }

    pub fn with_submitted_at(mut self, at: DateTime<Utc>) -> Self {
        self.submitted_at = Some(at);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Decode a record from a raw JSON payload.
    pub fn from_payload(payload: Value) -> Result<Self, PayloadError> {
        let Value::Object(mut fields) = payload else {
            return Err(PayloadError::NotAnObject);
        };

        let id = match fields.remove("id") {
            Some(raw) => ComplaintId::try_from(&raw)?,
            None => return Err(PayloadError::MissingId),
        };

        let status = match fields.remove("status") {
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(PayloadError::InvalidField {
                    field: "status",
                    reason: format!("expected string, got {}", other),
                })
            }
            None => return Err(PayloadError::MissingField("status")),
        };

        let submitted_at = match fields
            .remove("createdAt")
            .or_else(|| fields.remove("submittedAt"))
        {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| PayloadError::InvalidField {
                        field: "createdAt",
                        reason: e.to_string(),
                    })?
                    .with_timezone(&Utc),
            ),
            Some(other) => {
                return Err(PayloadError::InvalidField {
                    field: "createdAt",
                    reason: format!("expected RFC 3339 string, got {}", other),
                })
            }
        };

        Ok(Self {
            id,
            status,
            submitted_at,
            attributes: fields,
        })
    }

    fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Department the complaint was routed to.
    pub fn department(&self) -> Option<&str> {
        self.attribute_str("department")
    }

    /// Area the complaint was filed from (`location`, falling back to `area`).
    pub fn area(&self) -> Option<&str> {
        self.attribute_str("location")
            .or_else(|| self.attribute_str("area"))
    }

    /// True if the citizen left feedback.
    pub fn has_feedback(&self) -> bool {
        ["feedbacks", "feedback"]
            .iter()
            .filter_map(|key| self.attributes.get(*key))
            .any(|v| !v.is_null())
    }
}

impl TryFrom<Value> for ComplaintRecord {
    type Error = PayloadError;

    fn try_from(payload: Value) -> Result<Self, Self::Error> {
        Self::from_payload(payload)
    }
}

/// Decode the body of a bulk complaints read.
///
/// Accepts a bare array or an envelope carrying `complaints` (or `records`).
/// Entries that fail to decode are skipped with a warning so one bad row
/// does not hide the rest.
pub fn records_from_payload(payload: Value) -> Result<Vec<ComplaintRecord>, PayloadError> {
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut envelope) => {
            match envelope
                .remove("complaints")
                .or_else(|| envelope.remove("records"))
            {
                Some(Value::Array(entries)) => entries,
                Some(Value::Null) => Vec::new(),
                Some(_) => {
                    return Err(PayloadError::InvalidField {
                        field: "complaints",
                        reason: "expected an array".to_string(),
                    })
                }
                None => return Err(PayloadError::MissingField("complaints")),
            }
        }
        _ => return Err(PayloadError::NotAnObject),
    };

    let mut records = Vec::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        match ComplaintRecord::from_payload(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!(position, error = %e, "Skipping malformed complaint in bulk read"),
        }
    }
    Ok(records)
}

// ============================================================================
// Aggregates
// ============================================================================

/// Counts over the complaint set.
///
/// Buckets with a zero count are never stored, so two aggregates describing
/// the same data compare equal regardless of where they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aggregate {
    pub total: u64,
    pub by_status: BTreeMap<ComplaintStatus, u64>,
    pub by_department: BTreeMap<String, u64>,
    pub by_area: BTreeMap<String, u64>,
    pub feedback_count: u64,
}

impl Aggregate {
    /// Recompute every count from a record set.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ComplaintRecord>,
    {
        let mut aggregate = Aggregate::default();
        for record in records {
            aggregate.total += 1;
            *aggregate.by_status.entry(record.status).or_insert(0) += 1;
            if let Some(department) = record.department() {
                *aggregate
                    .by_department
                    .entry(department.to_string())
                    .or_insert(0) += 1;
            }
            if let Some(area) = record.area() {
                *aggregate.by_area.entry(area.to_string()).or_insert(0) += 1;
            }
            if record.has_feedback() {
                aggregate.feedback_count += 1;
            }
        }
        aggregate
    }

    /// Build an aggregate from the backend's analytics endpoints.
    pub fn from_backend(
        analytics: AnalyticsPayload,
        departments: Vec<DepartmentCount>,
        areas: Vec<AreaCount>,
    ) -> Self {
        let mut aggregate = Aggregate::from(analytics);
        for entry in departments {
            if entry.count > 0 {
                *aggregate.by_department.entry(entry.department).or_insert(0) += entry.count;
            }
        }
        for entry in areas {
            if entry.count > 0 {
                *aggregate.by_area.entry(entry.area).or_insert(0) += entry.count;
            }
        }
        aggregate
    }

    /// Decode a pushed aggregate.
    ///
    /// The backend pushes its analytics shape (`totalComplaints`, ...); the
    /// native shape of this type is accepted too.
    pub fn from_payload(payload: Value) -> Result<Self, PayloadError> {
        let Value::Object(ref fields) = payload else {
            return Err(PayloadError::NotAnObject);
        };

        let invalid = |e: serde_json::Error| PayloadError::InvalidField {
            field: "aggregate",
            reason: e.to_string(),
        };

        if fields.contains_key("totalComplaints") {
            let analytics: AnalyticsPayload = serde_json::from_value(payload).map_err(invalid)?;
            Ok(Aggregate::from(analytics))
        } else {
            serde_json::from_value(payload).map_err(invalid)
        }
    }

    /// Count for one status (zero when absent).
    pub fn count(&self, status: ComplaintStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Summary counts as served by `GET /complaints/analytics`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsPayload {
    pub total_complaints: u64,
    pub pending_complaints: u64,
    pub under_review_complaints: u64,
    pub under_resolving_complaints: u64,
    pub resolved_complaints: u64,
    pub closed_complaints: u64,
    pub feedback_count: u64,
}

impl From<AnalyticsPayload> for Aggregate {
    fn from(analytics: AnalyticsPayload) -> Self {
        let by_status = [
            (ComplaintStatus::Pending, analytics.pending_complaints),
            (ComplaintStatus::UnderReview, analytics.under_review_complaints),
            (
                ComplaintStatus::UnderResolving,
                analytics.under_resolving_complaints,
            ),
            (ComplaintStatus::Resolved, analytics.resolved_complaints),
            (ComplaintStatus::Closed, analytics.closed_complaints),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect();

        Aggregate {
            total: analytics.total_complaints,
            by_status,
            by_department: BTreeMap::new(),
            by_area: BTreeMap::new(),
            feedback_count: analytics.feedback_count,
        }
    }
}

/// One row of `GET /complaints/department-stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentCount {
    pub department: String,
    pub count: u64,
}

/// One row of `GET /complaints/area-stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaCount {
    pub area: String,
    pub count: u64,
}

/// Result of a bulk read, optionally paired with an authoritative aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkFetch {
    pub records: Vec<ComplaintRecord>,
    pub aggregate: Option<Aggregate>,
}

impl BulkFetch {
    pub fn records(records: Vec<ComplaintRecord>) -> Self {
        Self {
            records,
            aggregate: None,
        }
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }
}

// ============================================================================
// Push channel vocabulary
// ============================================================================

/// Push event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Updated,
    AggregateUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::AggregateUpdated,
    ];

    /// Event name on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::Created => "newComplaint",
            EventKind::Updated => "complaintUpdate",
            EventKind::AggregateUpdated => "analyticsUpdate",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// State of a push-event connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Lifecycle transition reported by an event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Error(String),
}
