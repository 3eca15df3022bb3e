//! Domain models for reference-data synchronization
//!
//! Reference (master) data lives in per-type local tables and is owned by the
//! remote platform; ticket records reference it by key. Everything here is
//! transient: records are constructed per fetch/diff cycle and dropped once
//! their batch commits.

use std::collections::BTreeMap;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::fingerprint::fingerprint;

/// A master-data entity type synchronized from the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    User,
    Company,
    Department,
}

impl RecordType {
    pub const ALL: [Self; 3] = [Self::User, Self::Company, Self::Department];

    /// REST collection path on the remote API
    #[must_use]
    pub const fn api_path(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Company => "companies",
            Self::Department => "departments",
        }
    }

    /// Local table holding records of this type
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::User => "ref_users",
            Self::Company => "ref_companies",
            Self::Department => "ref_departments",
        }
    }

    /// Domain fields requested from the remote API for this type
    #[must_use]
    pub const fn field_names(self) -> &'static [&'static str] {
        match self {
            Self::User => &[
                "user_name", "name", "first_name", "last_name", "email", "phone",
                "mobile_phone", "company", "department", "location", "manager", "title",
                "time_zone",
            ],
            Self::Company => &[
                "name", "company_type", "city", "country", "phone", "website", "parent",
            ],
            Self::Department => &["name", "description", "company", "head"],
        }
    }

    /// Ticket columns carrying foreign keys into this type
    #[must_use]
    pub const fn ticket_reference_columns(self) -> &'static [&'static str] {
        match self {
            Self::User => &["caller_id", "opened_by", "resolved_by", "assigned_to"],
            Self::Company => &["company"],
            Self::Department => &["department"],
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Company => "company",
            Self::Department => "department",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync strategy for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Pull everything active (plus recently modified inactive records)
    Full,
    /// Pull only records modified since the cursor
    Incremental,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

/// A reference record as fetched from the remote platform.
///
/// The domain-field bag is a `BTreeMap` so iteration order is canonical, which
/// the fingerprint depends on. Remote audit timestamps live outside the bag
/// and never feed the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRecord {
    pub key: String,
    pub active: bool,
    pub fields: BTreeMap<String, String>,
    pub remote_created_at: Option<DateTime<Utc>>,
    pub remote_updated_at: DateTime<Utc>,
    pub fingerprint: String,
}

impl ReferenceRecord {
    /// Build a record, deriving its fingerprint from the field bag.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        active: bool,
        fields: BTreeMap<String, String>,
        remote_created_at: Option<DateTime<Utc>>,
        remote_updated_at: DateTime<Utc>,
    ) -> Self {
        let fingerprint = fingerprint(&fields, active);
        Self {
            key: key.into(),
            active,
            fields,
            remote_created_at,
            remote_updated_at,
            fingerprint,
        }
    }
}

/// Watermark bounding incremental pulls for one record type.
///
/// Held as an explicit value threaded through `synchronize`, never as module
/// state. Advanced only as batches commit; an aborted run leaves it at the
/// last committed batch's high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCursor(Option<DateTime<Utc>>);

impl SyncCursor {
    #[must_use]
    pub const fn new(value: Option<DateTime<Utc>>) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Move the watermark forward; never backwards.
    pub fn advance_to(&mut self, ts: DateTime<Utc>) {
        match self.0 {
            Some(current) if current >= ts => {}
            _ => self.0 = Some(ts),
        }
    }

    /// Pull the watermark back by an overlap window to absorb clock skew
    /// between the remote platform and local commit times. Re-fetched
    /// duplicates are idempotent through fingerprint comparison.
    #[must_use]
    pub fn with_overlap(self, overlap_secs: i64) -> Self {
        Self(self.0.map(|ts| ts - chrono::Duration::seconds(overlap_secs)))
    }
}

/// A transactional ticket record. Reference keys are kept as dedicated
/// columns so missing-reference detection stays a plain SQL scan.
#[derive(Debug, Clone, Default)]
pub struct TicketRecord {
    pub key: String,
    pub caller_id: Option<String>,
    pub opened_by: Option<String>,
    pub resolved_by: Option<String>,
    pub assigned_to: Option<String>,
    pub company: Option<String>,
    pub department: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, String>,
}

impl TicketRecord {
    /// Foreign keys this ticket carries into the given reference type.
    #[must_use]
    pub fn reference_keys(&self, record_type: RecordType) -> Vec<&str> {
        let mut keys = Vec::new();
        for column in record_type.ticket_reference_columns() {
            let value = match *column {
                "caller_id" => self.caller_id.as_deref(),
                "opened_by" => self.opened_by.as_deref(),
                "resolved_by" => self.resolved_by.as_deref(),
                "assigned_to" => self.assigned_to.as_deref(),
                "company" => self.company.as_deref(),
                "department" => self.department.as_deref(),
                _ => None,
            };
            if let Some(v) = value {
                if !v.is_empty() {
                    keys.push(v);
                }
            }
        }
        keys
    }
}

/// Terminal (or in-flight) status of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Partial,
}

impl ExecutionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the execution log: raw counters for a single run.
///
/// Created with status `running` when the run begins and finalized exactly
/// once. Success rate and average request time are derived at read time.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub mode: String,
    pub record_types: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub api_requests: u64,
    pub api_failures: u64,
    pub api_time_secs: f64,
    pub records_fetched: u64,
    pub records_inserted: u64,
    pub records_updated: u64,
    pub records_unchanged: u64,
    pub batches_committed: u64,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
}

impl ExecutionSummary {
    #[must_use]
    pub fn new(mode: &str) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            mode: mode.to_string(),
            record_types: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            duration_secs: None,
            api_requests: 0,
            api_failures: 0,
            api_time_secs: 0.0,
            records_fetched: 0,
            records_inserted: 0,
            records_updated: 0,
            records_unchanged: 0,
            batches_committed: 0,
            status: ExecutionStatus::Running,
            error_message: None,
        }
    }

    /// API success rate in percent, derived from raw counters.
    #[must_use]
    pub fn api_success_rate(&self) -> f64 {
        if self.api_requests == 0 {
            return 100.0;
        }
        (self.api_requests - self.api_failures) as f64 / self.api_requests as f64 * 100.0
    }

    /// Mean duration of one API request in seconds.
    #[must_use]
    pub fn avg_request_secs(&self) -> f64 {
        if self.api_requests == 0 {
            return 0.0;
        }
        self.api_time_secs / self.api_requests as f64
    }

    /// Total records written or skipped during the run.
    #[must_use]
    pub const fn records_processed(&self) -> u64 {
        self.records_inserted + self.records_updated + self.records_unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_only_advances_forward() {
        let t1 = Utc::now();
        let t0 = t1 - chrono::Duration::hours(1);

        let mut cursor = SyncCursor::default();
        cursor.advance_to(t1);
        assert_eq!(cursor.value(), Some(t1));

        cursor.advance_to(t0);
        assert_eq!(cursor.value(), Some(t1));
    }

    #[test]
    fn cursor_overlap_rewinds() {
        let t = Utc::now();
        let cursor = SyncCursor::new(Some(t)).with_overlap(3600);
        assert_eq!(cursor.value(), Some(t - chrono::Duration::hours(1)));

        // An unset cursor stays unset
        assert_eq!(SyncCursor::default().with_overlap(3600).value(), None);
    }

    #[test]
    fn reference_record_derives_fingerprint() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), "Ana Silva".to_string());
        let rec = ReferenceRecord::new("u1", true, fields, None, Utc::now());
        assert_eq!(rec.fingerprint.len(), 64);
    }

    #[test]
    fn ticket_reference_keys_by_type() {
        let ticket = TicketRecord {
            key: "INC001".to_string(),
            caller_id: Some("u1".to_string()),
            opened_by: Some("u2".to_string()),
            resolved_by: None,
            assigned_to: Some(String::new()),
            company: Some("c1".to_string()),
            ..TicketRecord::default()
        };

        assert_eq!(ticket.reference_keys(RecordType::User), vec!["u1", "u2"]);
        assert_eq!(ticket.reference_keys(RecordType::Company), vec!["c1"]);
        assert!(ticket.reference_keys(RecordType::Department).is_empty());
    }

    #[test]
    fn summary_derived_metrics() {
        let mut summary = ExecutionSummary::new("full");
        assert_eq!(summary.api_success_rate(), 100.0);

        summary.api_requests = 10;
        summary.api_failures = 2;
        summary.api_time_secs = 5.0;
        assert!((summary.api_success_rate() - 80.0).abs() < f64::EPSILON);
        assert!((summary.avg_request_secs() - 0.5).abs() < f64::EPSILON);
    }
}
