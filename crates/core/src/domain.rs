use serde::{Deserialize, Serialize};

/// Note written into `extra` for every record flagged by `annotate`.
pub const TIMESTAMP_ERROR_NOTE: &str = "timestamp_error_before_utc_fix";

/// One row of the remote event table. Columns other than these are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    #[serde(default)]
    pub event_at: String, // Compared as a string, never parsed
    /// Stores return this either as a JSON string or as a nested object.
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

/// One batch returned by the read endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<EventRecord>,
    #[serde(rename = "hasMore", default)]
    pub has_more: bool,
}

/// Records whose `event_at` precedes the cutoff, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecordSet {
    records: Vec<EventRecord>,
}

impl ErrorRecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EventRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|record| record.id).collect()
    }

    /// Count plus timestamp and id ranges, as shown to the operator before any write.
    pub fn summary(&self) -> ScanSummary {
        let event_at_range = self
            .records
            .iter()
            .map(|record| record.event_at.as_str())
            .fold(None, |range: Option<(&str, &str)>, value| match range {
                None => Some((value, value)),
                Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
            })
            .map(|(lo, hi)| (lo.to_string(), hi.to_string()));

        let id_range = self
            .records
            .iter()
            .map(|record| record.id)
            .fold(None, |range: Option<(i64, i64)>, id| match range {
                None => Some((id, id)),
                Some((lo, hi)) => Some((lo.min(id), hi.max(id))),
            });

        ScanSummary {
            count: self.records.len(),
            event_at_range,
            id_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub count: usize,
    pub event_at_range: Option<(String, String)>,
    pub id_range: Option<(i64, i64)>,
}

/// Result of a full pass over the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub records: ErrorRecordSet,
    pub pages: u64,
    pub scanned: u64,
    /// Set when a rejected page ended the scan early under the partial policy.
    pub truncated: bool,
}

/// Payload serialized into the `extra` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampAnnotation {
    pub note: String,
    pub original_timestamp_error: bool,
}

impl Default for TimestampAnnotation {
    fn default() -> Self {
        Self {
            note: TIMESTAMP_ERROR_NOTE.to_string(),
            original_timestamp_error: true,
        }
    }
}

/// HTTP status returned by a write endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStatus(pub u16);

impl WriteStatus {
    /// Only 200 counts; 201/204 from a write are not treated as success.
    pub fn is_ok(self) -> bool {
        self.0 == 200
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Delete,
    Annotate,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Delete => "delete",
            MutationKind::Annotate => "annotate",
        }
    }
}

/// A single write as recorded in the mutation journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub run_id: String,
    pub kind: MutationKind,
    pub record_id: i64,
    pub status: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Scanning,
    AwaitingConfirmation,
    Mutating,
    Aborted,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotateChoice {
    Mark,
    StatsOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub summary: ScanSummary,
    pub truncated: bool,
    /// `Aborted` when the operator declined, `Done` otherwise.
    pub phase: RunPhase,
    pub issued: usize,
    pub acknowledged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotateReport {
    pub summary: ScanSummary,
    pub truncated: bool,
    pub phase: RunPhase,
    pub attempted: usize,
    pub succeeded: usize,
}
