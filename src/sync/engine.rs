//! Change-detection and sync engine
//!
//! Pulls candidate records from the remote source, diffs them against the
//! local store by key and fingerprint, and applies only the delta in
//! fixed-size atomic batches. The cursor advances batch by batch: a failed
//! batch aborts the run without moving the watermark past the last committed
//! batch, so the next incremental run re-pulls exactly the unapplied records
//! and re-applies them idempotently.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use tracing::info;

use crate::config::SyncConfig;
use crate::database::LocalStore;
use crate::models::RecordType;
use crate::models::ReferenceRecord;
use crate::models::SyncCursor;
use crate::models::SyncMode;
use crate::sync::client::PageFilter;
use crate::sync::client::RemoteSource;
use crate::sync::ledger::ExecutionLedger;
use crate::Result;

/// Outcome of synchronizing one record type.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub record_type: RecordType,
    pub mode: SyncMode,
    pub fetched: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub batches_committed: u64,
    /// Watermark after the run; pass into the next incremental run.
    pub cursor: SyncCursor,
    /// Run stopped by the operator between batches.
    pub cancelled: bool,
}

impl SyncReport {
    fn new(record_type: RecordType, mode: SyncMode, cursor: SyncCursor) -> Self {
        Self {
            record_type,
            mode,
            fetched: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            batches_committed: 0,
            cursor,
            cancelled: false,
        }
    }
}

/// A record paired with the write it needs (insert vs update).
struct PendingWrite {
    record: ReferenceRecord,
    is_insert: bool,
}

pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    source: Arc<dyn RemoteSource>,
    batch_size: usize,
    inactive_window_days: i64,
    cancel: Arc<AtomicBool>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn LocalStore>,
        source: Arc<dyn RemoteSource>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            source,
            batch_size: config.batch_size.max(1),
            inactive_window_days: config.inactive_window_days,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between batches; set it to stop the run at the next
    /// batch boundary. Mid-batch cancellation is not supported, preserving
    /// the all-or-nothing batch invariant.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Synchronize one record type.
    ///
    /// The cursor is an explicit value: callers read it from the store's
    /// high-water mark (minus overlap) for incremental runs and pass the
    /// default for full runs. The returned report carries the advanced
    /// cursor.
    ///
    /// # Errors
    /// Remote errors that exhaust their retries and store errors abort the
    /// run. Batches committed before the abort stay committed; the ledger's
    /// counters reflect them.
    pub async fn synchronize(
        &self,
        record_type: RecordType,
        mode: SyncMode,
        cursor: SyncCursor,
        ledger: &mut ExecutionLedger,
    ) -> Result<SyncReport> {
        ledger.add_record_type(record_type);
        info!("🔄 Synchronizing {record_type} records ({})", mode.as_str());

        let records = match mode {
            SyncMode::Full => self.fetch_full(record_type, ledger).await?,
            SyncMode::Incremental => {
                self.fetch_all_pages(record_type, &PageFilter::modified_since(cursor.value()), ledger)
                    .await?
            }
        };

        self.apply(record_type, mode, records, cursor, ledger).await
    }

    /// Full pull: all active records, plus inactive records modified inside
    /// the recency window, deduplicated by key keeping the newest.
    async fn fetch_full(
        &self,
        record_type: RecordType,
        ledger: &mut ExecutionLedger,
    ) -> Result<Vec<ReferenceRecord>> {
        let active = self
            .fetch_all_pages(record_type, &PageFilter::active_only(), ledger)
            .await?;

        let inactive_since = Utc::now() - chrono::Duration::days(self.inactive_window_days);
        let inactive_filter = PageFilter {
            updated_since: Some(inactive_since),
            active: Some(false),
        };
        let inactive = self
            .fetch_all_pages(record_type, &inactive_filter, ledger)
            .await?;

        let mut by_key: HashMap<String, ReferenceRecord> = HashMap::new();
        for record in active.into_iter().chain(inactive) {
            match by_key.get(&record.key) {
                Some(existing) if existing.remote_updated_at >= record.remote_updated_at => {}
                _ => {
                    by_key.insert(record.key.clone(), record);
                }
            }
        }

        Ok(by_key.into_values().collect())
    }

    async fn fetch_all_pages(
        &self,
        record_type: RecordType,
        filter: &PageFilter,
        ledger: &mut ExecutionLedger,
    ) -> Result<Vec<ReferenceRecord>> {
        let mut all = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let page = self.source.fetch_page(record_type, filter, offset).await?;
            ledger.record_fetched(page.records.len() as u64);
            all.extend(page.records);

            match page.next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }

        Ok(all)
    }

    /// Diff fetched records against the store and apply the delta in
    /// fixed-size atomic batches, oldest-modified-first.
    async fn apply(
        &self,
        record_type: RecordType,
        mode: SyncMode,
        mut records: Vec<ReferenceRecord>,
        cursor: SyncCursor,
        ledger: &mut ExecutionLedger,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new(record_type, mode, cursor);
        report.fetched = records.len() as u64;

        if records.is_empty() {
            info!("No {record_type} records to reconcile");
            return Ok(report);
        }

        // Oldest first, so per-batch cursor advancement stays monotonic
        records.sort_by_key(|r| r.remote_updated_at);
        let observed_max = records
            .last()
            .map(|r| r.remote_updated_at)
            .unwrap_or_else(Utc::now);

        let mut pending: Vec<PendingWrite> = Vec::new();
        let mut unchanged_pending: u64 = 0;

        'outer: for chunk in records.chunks(self.batch_size) {
            let keys: Vec<String> = chunk.iter().map(|r| r.key.clone()).collect();
            let existing = self.store.get_many(record_type, &keys).await?;

            for record in chunk {
                match existing.get(&record.key) {
                    None => pending.push(PendingWrite {
                        record: record.clone(),
                        is_insert: true,
                    }),
                    Some(local) if local.fingerprint != record.fingerprint => {
                        pending.push(PendingWrite {
                            record: record.clone(),
                            is_insert: false,
                        });
                    }
                    Some(_) => {
                        report.unchanged += 1;
                        unchanged_pending += 1;
                    }
                }
            }

            while pending.len() >= self.batch_size {
                if self.is_cancelled() {
                    report.cancelled = true;
                    break 'outer;
                }
                let batch: Vec<PendingWrite> = pending.drain(..self.batch_size).collect();
                self.commit_batch(record_type, batch, &mut unchanged_pending, &mut report, ledger)
                    .await?;
            }
        }

        if !report.cancelled && !pending.is_empty() {
            if self.is_cancelled() {
                report.cancelled = true;
            } else {
                let batch = std::mem::take(&mut pending);
                self.commit_batch(record_type, batch, &mut unchanged_pending, &mut report, ledger)
                    .await?;
            }
        }

        if unchanged_pending > 0 {
            ledger.record_batch(0, 0, unchanged_pending);
        }

        if report.cancelled {
            info!(
                "🛑 {record_type} sync cancelled after {} batches",
                report.batches_committed
            );
        } else {
            // The whole candidate set was reconciled (written or skipped as
            // unchanged), so the watermark covers everything observed.
            report.cursor.advance_to(observed_max);
            info!(
                "✅ {record_type}: {} inserted, {} updated, {} unchanged",
                report.inserted, report.updated, report.unchanged
            );
        }

        Ok(report)
    }

    async fn commit_batch(
        &self,
        record_type: RecordType,
        batch: Vec<PendingWrite>,
        unchanged_pending: &mut u64,
        report: &mut SyncReport,
        ledger: &mut ExecutionLedger,
    ) -> Result<()> {
        let records: Vec<ReferenceRecord> = batch.iter().map(|w| w.record.clone()).collect();
        let high_water = records.iter().map(|r| r.remote_updated_at).max();

        self.store.upsert_batch(record_type, &records).await?;

        let inserted = batch.iter().filter(|w| w.is_insert).count() as u64;
        let updated = batch.len() as u64 - inserted;
        report.inserted += inserted;
        report.updated += updated;
        report.batches_committed += 1;
        if let Some(hw) = high_water {
            report.cursor.advance_to(hw);
        }
        ledger.record_batch(inserted, updated, std::mem::take(unchanged_pending));

        debug!(
            "Committed {record_type} batch: {inserted} inserted, {updated} updated"
        );
        Ok(())
    }
}
