use crate::config::{ScanPolicy, SweepConfig};
use crate::domain::{
    AnnotateChoice, AnnotateReport, ErrorRecordSet, JournalEntry, MutationKind, PurgeReport,
    RunPhase, ScanOutcome, TimestampAnnotation, WriteStatus,
};
use crate::error::SweepError;
use crate::ports::{MutationJournal, Operator, RecordStore, Result};
use std::thread;
use tracing::{debug, info, warn};

/// Application service for scanning the event table and fixing error records
pub struct SweepService {
    store: Box<dyn RecordStore>,
    operator: Box<dyn Operator>,
    journal: Option<Box<dyn MutationJournal>>,
    config: SweepConfig,
    run_id: String,
}

impl SweepService {
    /// Creates a new SweepService with the given dependencies
    pub fn new(
        store: Box<dyn RecordStore>,
        operator: Box<dyn Operator>,
        config: SweepConfig,
        run_id: String,
    ) -> Self {
        Self {
            store,
            operator,
            journal: None,
            config,
            run_id,
        }
    }

    /// Records every issued write in `journal`
    pub fn with_journal(mut self, journal: Box<dyn MutationJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Pages through the resource and keeps every record older than the cutoff
    pub fn scan(&self) -> Result<ScanOutcome> {
        self.enter(RunPhase::Scanning);

        let limit = self.config.page_size;
        let mut offset = 0u64;
        let mut pages = 0u64;
        let mut scanned = 0u64;
        let mut truncated = false;
        let mut records = ErrorRecordSet::new();

        loop {
            let page = match self.store.fetch_page(offset, limit) {
                Ok(page) => page,
                Err(SweepError::PageRejected { offset, status })
                    if self.config.scan_policy == ScanPolicy::AllowPartial =>
                {
                    warn!(
                        offset,
                        status,
                        matched = records.len(),
                        "Page rejected, continuing with a partial result"
                    );
                    truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            pages += 1;
            scanned += page.items.len() as u64;
            for item in page.items {
                if self.config.cutoff.precedes(&item.event_at) {
                    records.push(item);
                }
            }

            if !page.has_more {
                break;
            }

            offset += limit;
            info!(scanned = offset, matched = records.len(), "Scanned page");

            if !self.config.page_pause.is_zero() {
                thread::sleep(self.config.page_pause);
            }
        }

        info!(
            pages,
            scanned,
            matched = records.len(),
            cutoff = %self.config.cutoff,
            "Scan finished"
        );

        Ok(ScanOutcome {
            records,
            pages,
            scanned,
            truncated,
        })
    }

    /// Scan, ask for confirmation, then delete every matched record
    pub fn purge(&self) -> Result<PurgeReport> {
        let outcome = self.scan()?;
        let summary = outcome.records.summary();

        self.enter(RunPhase::AwaitingConfirmation);
        if !self.operator.confirm_deletion(&summary)? {
            self.enter(RunPhase::Aborted);
            info!(matched = summary.count, "Deletion declined by operator");
            return Ok(PurgeReport {
                summary,
                truncated: outcome.truncated,
                phase: RunPhase::Aborted,
                issued: 0,
                acknowledged: 0,
            });
        }

        self.enter(RunPhase::Mutating);
        let ids = outcome.records.ids();
        let total = ids.len();
        let mut acknowledged = 0;

        for (i, id) in ids.into_iter().enumerate() {
            // Status is informational only: no retry, no abort
            let status = self.store.delete_record(id)?;
            if status.is_ok() {
                acknowledged += 1;
            } else {
                debug!(id, status = status.0, "Delete not acknowledged");
            }
            self.journal(MutationKind::Delete, id, status)?;

            let done = i + 1;
            if self.config.pacing.is_checkpoint(done) {
                info!(done, total, "Deleted batch");
                thread::sleep(self.config.pacing.pause);
            }
        }

        self.enter(RunPhase::Done);
        Ok(PurgeReport {
            summary,
            truncated: outcome.truncated,
            phase: RunPhase::Done,
            issued: total,
            acknowledged,
        })
    }

    /// Scan, offer the mark/stats menu, then overwrite `extra` on every matched record
    pub fn annotate(&self) -> Result<AnnotateReport> {
        let outcome = self.scan()?;
        let summary = outcome.records.summary();

        self.enter(RunPhase::AwaitingConfirmation);
        if self.operator.choose_annotation(&summary)? == AnnotateChoice::StatsOnly {
            self.enter(RunPhase::Aborted);
            info!(matched = summary.count, "Statistics only, no records modified");
            return Ok(AnnotateReport {
                summary,
                truncated: outcome.truncated,
                phase: RunPhase::Aborted,
                attempted: 0,
                succeeded: 0,
            });
        }

        self.enter(RunPhase::Mutating);
        let extra = serde_json::to_string(&TimestampAnnotation::default())?;
        let total = outcome.records.len();
        let mut succeeded = 0;

        for (i, record) in outcome.records.records().iter().enumerate() {
            let status = self.store.update_extra(record.id, &extra)?;
            if status.is_ok() {
                succeeded += 1;
            }
            self.journal(MutationKind::Annotate, record.id, status)?;

            let done = i + 1;
            if self.config.pacing.is_checkpoint(done) {
                info!(done, total, succeeded, "Annotated batch");
                thread::sleep(self.config.pacing.pause);
            }
        }

        self.enter(RunPhase::Done);
        Ok(AnnotateReport {
            summary,
            truncated: outcome.truncated,
            phase: RunPhase::Done,
            attempted: total,
            succeeded,
        })
    }

    fn journal(&self, kind: MutationKind, record_id: i64, status: WriteStatus) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.record(&JournalEntry {
                run_id: self.run_id.clone(),
                kind,
                record_id,
                status: status.0,
            }),
            None => Ok(()),
        }
    }

    fn enter(&self, phase: RunPhase) {
        debug!(run_id = %self.run_id, ?phase, "Entering phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cutoff, Pacing};
    use crate::domain::{EventRecord, Page, ScanSummary};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Fetch { offset: u64, limit: u64 },
        Delete(i64),
        Update(i64, String),
    }

    /// In-memory table served in pages of whatever limit is requested
    struct MockStore {
        rows: Vec<EventRecord>,
        reject_at: Option<(u64, u16)>,
        write_status: u16,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl MockStore {
        fn new(rows: Vec<EventRecord>) -> (Self, Arc<Mutex<Vec<Call>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let store = Self {
                rows,
                reject_at: None,
                write_status: 200,
                calls: Arc::clone(&calls),
            };
            (store, calls)
        }
    }

    impl RecordStore for MockStore {
        fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page> {
            self.calls.lock().unwrap().push(Call::Fetch { offset, limit });
            if let Some((reject_offset, status)) = self.reject_at {
                if offset == reject_offset {
                    return Err(SweepError::PageRejected { offset, status });
                }
            }
            let start = (offset as usize).min(self.rows.len());
            let end = (start + limit as usize).min(self.rows.len());
            Ok(Page {
                items: self.rows[start..end].to_vec(),
                has_more: end < self.rows.len(),
            })
        }

        fn delete_record(&self, id: i64) -> Result<WriteStatus> {
            self.calls.lock().unwrap().push(Call::Delete(id));
            Ok(WriteStatus(self.write_status))
        }

        fn update_extra(&self, id: i64, extra: &str) -> Result<WriteStatus> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(id, extra.to_string()));
            Ok(WriteStatus(self.write_status))
        }
    }

    struct ScriptedOperator {
        approve: bool,
        seen: Arc<Mutex<Vec<ScanSummary>>>,
    }

    impl ScriptedOperator {
        fn new(approve: bool) -> (Self, Arc<Mutex<Vec<ScanSummary>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    approve,
                    seen: Arc::clone(&seen),
                },
                seen,
            )
        }
    }

    impl Operator for ScriptedOperator {
        fn confirm_deletion(&self, summary: &ScanSummary) -> Result<bool> {
            self.seen.lock().unwrap().push(summary.clone());
            Ok(self.approve)
        }

        fn choose_annotation(&self, summary: &ScanSummary) -> Result<AnnotateChoice> {
            self.seen.lock().unwrap().push(summary.clone());
            Ok(if self.approve {
                AnnotateChoice::Mark
            } else {
                AnnotateChoice::StatsOnly
            })
        }
    }

    struct MemoryJournal {
        entries: Arc<Mutex<Vec<JournalEntry>>>,
    }

    impl MutationJournal for MemoryJournal {
        fn record(&self, entry: &JournalEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn record(id: i64, event_at: &str) -> EventRecord {
        EventRecord {
            id,
            event_at: event_at.to_string(),
            extra: None,
        }
    }

    fn quiet(mut config: SweepConfig) -> SweepConfig {
        config.page_pause = Duration::ZERO;
        config.pacing = Pacing {
            every: 10,
            pause: Duration::ZERO,
        };
        config
    }

    fn service(store: MockStore, operator: ScriptedOperator) -> SweepService {
        SweepService::new(
            Box::new(store),
            Box::new(operator),
            quiet(SweepConfig::for_purge(Cutoff::default())),
            "test-run".to_string(),
        )
    }

    /// `count` rows, every third one before the cutoff
    fn mixed_rows(count: i64) -> Vec<EventRecord> {
        (1..=count)
            .map(|id| {
                if id % 3 == 0 {
                    record(id, "2025-09-15T12:00:00Z")
                } else {
                    record(id, "2025-10-15T12:00:00Z")
                }
            })
            .collect()
    }

    fn deletes(calls: &Arc<Mutex<Vec<Call>>>) -> Vec<i64> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::Delete(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn fetch_offsets(calls: &Arc<Mutex<Vec<Call>>>) -> Vec<u64> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::Fetch { offset, limit } => {
                    assert_eq!(*limit, 100);
                    Some(*offset)
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_scan_offsets_advance_by_page_size() {
        let (store, calls) = MockStore::new(mixed_rows(250));
        let (operator, _) = ScriptedOperator::new(false);

        let outcome = service(store, operator).scan().unwrap();

        assert_eq!(fetch_offsets(&calls), vec![0, 100, 200]);
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.scanned, 250);
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_scan_keeps_only_records_before_cutoff() {
        let rows = vec![
            record(1, "2025-09-30"),
            record(2, "2025-10-01"),
            record(3, "2025-10-01T00:00:00Z"),
            record(4, "2025-09-30T23:59:59.999Z"),
            record(5, "2025-10-02"),
            record(6, ""),
        ];
        let (store, _) = MockStore::new(rows);
        let (operator, _) = ScriptedOperator::new(false);

        let outcome = service(store, operator).scan().unwrap();

        assert_eq!(outcome.records.ids(), vec![1, 4, 6]);
    }

    #[test]
    fn test_scan_rejected_page_is_an_error_by_default() {
        let (mut store, calls) = MockStore::new(mixed_rows(250));
        store.reject_at = Some((100, 503));
        let (operator, _) = ScriptedOperator::new(true);

        let err = service(store, operator).purge().unwrap_err();

        assert!(matches!(
            err,
            SweepError::PageRejected {
                offset: 100,
                status: 503
            }
        ));
        assert!(deletes(&calls).is_empty());
    }

    #[test]
    fn test_scan_rejected_page_with_partial_policy() {
        let (mut store, calls) = MockStore::new(mixed_rows(250));
        store.reject_at = Some((100, 500));
        let (operator, _) = ScriptedOperator::new(false);
        let config = quiet(SweepConfig::for_purge(Cutoff::default()))
            .with_scan_policy(ScanPolicy::AllowPartial);
        let service = SweepService::new(
            Box::new(store),
            Box::new(operator),
            config,
            "test-run".to_string(),
        );

        let outcome = service.scan().unwrap();

        assert!(outcome.truncated);
        assert_eq!(outcome.pages, 1);
        // First page holds ids 1..=100, every third matches
        assert_eq!(outcome.records.len(), 33);
        assert_eq!(fetch_offsets(&calls), vec![0, 100]);
    }

    #[test]
    fn test_purge_end_to_end_deletes_only_matching_record() {
        let (store, calls) = MockStore::new(vec![record(1, "2025-09-30"), record(2, "2025-10-02")]);
        let (operator, seen) = ScriptedOperator::new(true);

        let report = service(store, operator).purge().unwrap();

        assert_eq!(deletes(&calls), vec![1]);
        assert_eq!(report.phase, RunPhase::Done);
        assert_eq!(report.issued, 1);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(seen.lock().unwrap()[0].count, 1);
    }

    #[test]
    fn test_purge_declined_issues_no_deletes() {
        let (store, calls) = MockStore::new(mixed_rows(30));
        let (operator, _) = ScriptedOperator::new(false);

        let report = service(store, operator).purge().unwrap();

        assert!(deletes(&calls).is_empty());
        assert_eq!(report.phase, RunPhase::Aborted);
        assert_eq!(report.summary.count, 10);
        assert_eq!(report.issued, 0);
    }

    #[test]
    fn test_purge_delete_count_matches_set_size() {
        let (store, calls) = MockStore::new(mixed_rows(350));
        let (operator, _) = ScriptedOperator::new(true);

        let report = service(store, operator).purge().unwrap();

        let expected: Vec<i64> = (1..=350).filter(|id| id % 3 == 0).collect();
        assert_eq!(deletes(&calls), expected);
        assert_eq!(report.issued, expected.len());
    }

    #[test]
    fn test_purge_ignores_write_status() {
        let (mut store, calls) = MockStore::new(mixed_rows(12));
        store.write_status = 404;
        let (operator, _) = ScriptedOperator::new(true);

        let report = service(store, operator).purge().unwrap();

        assert_eq!(deletes(&calls), vec![3, 6, 9, 12]);
        assert_eq!(report.issued, 4);
        assert_eq!(report.acknowledged, 0);
        assert_eq!(report.phase, RunPhase::Done);
    }

    #[test]
    fn test_purge_with_no_matches_still_confirms() {
        let (store, calls) = MockStore::new(vec![record(1, "2025-10-02")]);
        let (operator, seen) = ScriptedOperator::new(true);

        let report = service(store, operator).purge().unwrap();

        assert_eq!(seen.lock().unwrap()[0].count, 0);
        assert!(deletes(&calls).is_empty());
        assert_eq!(report.issued, 0);
        assert_eq!(report.phase, RunPhase::Done);
    }

    #[test]
    fn test_annotate_writes_timestamp_note() {
        let (store, calls) = MockStore::new(mixed_rows(9));
        let (operator, _) = ScriptedOperator::new(true);
        let service = SweepService::new(
            Box::new(store),
            Box::new(operator),
            quiet(SweepConfig::for_annotate(Cutoff::default())),
            "test-run".to_string(),
        );

        let report = service.annotate().unwrap();

        let updates: Vec<(i64, String)> = calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::Update(id, extra) => Some((*id, extra.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(updates.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![3, 6, 9]);
        for (_, extra) in &updates {
            let parsed: serde_json::Value = serde_json::from_str(extra).unwrap();
            assert_eq!(
                parsed,
                serde_json::json!({
                    "note": "timestamp_error_before_utc_fix",
                    "original_timestamp_error": true
                })
            );
        }
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
    }

    #[test]
    fn test_annotate_counts_only_200_as_success() {
        let (mut store, _) = MockStore::new(mixed_rows(9));
        store.write_status = 204;
        let (operator, _) = ScriptedOperator::new(true);

        let report = service(store, operator).annotate().unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 0);
    }

    #[test]
    fn test_annotate_stats_only_leaves_records_untouched() {
        let (store, calls) = MockStore::new(mixed_rows(9));
        let (operator, seen) = ScriptedOperator::new(false);

        let report = service(store, operator).annotate().unwrap();

        assert!(calls
            .lock()
            .unwrap()
            .iter()
            .all(|call| matches!(call, Call::Fetch { .. })));
        assert_eq!(report.phase, RunPhase::Aborted);
        assert_eq!(seen.lock().unwrap()[0].id_range, Some((3, 9)));
    }

    #[test]
    fn test_journal_receives_every_write() {
        let (mut store, _) = MockStore::new(mixed_rows(6));
        store.write_status = 500;
        let (operator, _) = ScriptedOperator::new(true);
        let entries = Arc::new(Mutex::new(Vec::new()));
        let journal = MemoryJournal {
            entries: Arc::clone(&entries),
        };

        service(store, operator)
            .with_journal(Box::new(journal))
            .purge()
            .unwrap();

        let entries = entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record_id, 3);
        assert_eq!(entries[0].kind, MutationKind::Delete);
        assert_eq!(entries[0].status, 500);
        assert_eq!(entries[1].run_id, "test-run");
    }

    fn paced(mut config: SweepConfig, pause: Duration) -> SweepConfig {
        config.page_pause = Duration::ZERO;
        config.pacing = Pacing { every: 10, pause };
        config
    }

    #[test]
    fn test_purge_pauses_at_each_checkpoint() {
        // 60 rows, 20 matching: two checkpoints
        let (store, calls) = MockStore::new(mixed_rows(60));
        let (operator, _) = ScriptedOperator::new(true);
        let pause = Duration::from_millis(25);
        let service = SweepService::new(
            Box::new(store),
            Box::new(operator),
            paced(SweepConfig::for_purge(Cutoff::default()), pause),
            "test-run".to_string(),
        );

        let started = std::time::Instant::now();
        service.purge().unwrap();

        assert_eq!(deletes(&calls).len(), 20);
        assert!(started.elapsed() >= pause * 2);
    }

    #[test]
    fn test_annotate_pauses_at_checkpoint() {
        let (store, _) = MockStore::new(mixed_rows(30));
        let (operator, _) = ScriptedOperator::new(true);
        let pause = Duration::from_millis(25);
        let service = SweepService::new(
            Box::new(store),
            Box::new(operator),
            paced(SweepConfig::for_annotate(Cutoff::default()), pause),
            "test-run".to_string(),
        );

        let started = std::time::Instant::now();
        let report = service.annotate().unwrap();

        assert_eq!(report.attempted, 10);
        assert!(started.elapsed() >= pause);
    }
}
