use crate::domain::{AnnotateChoice, JournalEntry, Page, ScanSummary, WriteStatus};
use crate::error::SweepError;

pub type Result<T> = std::result::Result<T, SweepError>;

/// Remote table of event records.
pub trait RecordStore {
    /// Fetches one page. A non-success status must surface as
    /// `SweepError::PageRejected` carrying the offset that was requested.
    fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page>;

    fn delete_record(&self, id: i64) -> Result<WriteStatus>;

    /// Overwrites the `extra` column of one record with `extra`.
    fn update_extra(&self, id: i64, extra: &str) -> Result<WriteStatus>;
}

/// The person at the terminal who approves writes.
/// Answers are asked for only after the scan has finished
pub trait Operator: Send + Sync {
    fn confirm_deletion(&self, summary: &ScanSummary) -> Result<bool>;

    fn choose_annotation(&self, summary: &ScanSummary) -> Result<AnnotateChoice>;
}

/// Audit trail of issued writes.
pub trait MutationJournal: Send + Sync {
    fn record(&self, entry: &JournalEntry) -> Result<()>;
}

impl<T: MutationJournal + ?Sized> MutationJournal for std::sync::Arc<T> {
    fn record(&self, entry: &JournalEntry) -> Result<()> {
        (**self).record(entry)
    }
}
