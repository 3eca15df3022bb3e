//! Execution ledger
//!
//! Accumulates counters and timers for one run and persists a summary row:
//! inserted as `running` when the run begins, finalized exactly once when it
//! ends, whatever the exit path. Finalization consumes the ledger, so a
//! second `finish` cannot compile; a ledger dropped without finishing logs an
//! error because its row would be stranded in `running`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::error;
use tracing::info;

use crate::database::LocalStore;
use crate::models::ExecutionStatus;
use crate::models::ExecutionSummary;
use crate::models::RecordType;
use crate::sync::client::ApiMetrics;
use crate::Result;

pub struct ExecutionLedger {
    store: Arc<dyn LocalStore>,
    summary: ExecutionSummary,
    finished: bool,
}

impl ExecutionLedger {
    /// Start a run: create the summary and persist its `running` row.
    pub async fn begin(store: Arc<dyn LocalStore>, mode: &str) -> Result<Self> {
        let summary = ExecutionSummary::new(mode);
        store.insert_execution(&summary).await?;
        info!(
            "📊 Execution {} started ({mode})",
            &summary.execution_id.to_string()[..8]
        );
        Ok(Self {
            store,
            summary,
            finished: false,
        })
    }

    /// Account one remote API call.
    pub fn record_api_call(&mut self, success: bool, elapsed: Duration) {
        self.summary.api_requests += 1;
        if !success {
            self.summary.api_failures += 1;
        }
        self.summary.api_time_secs += elapsed.as_secs_f64();
    }

    /// Overwrite the API counters with a client-side snapshot.
    ///
    /// The HTTP client accumulates its own counters across every call it
    /// serves; the orchestrator copies them in once before finishing.
    pub fn set_api_metrics(&mut self, metrics: ApiMetrics) {
        self.summary.api_requests = metrics.requests;
        self.summary.api_failures = metrics.failures;
        self.summary.api_time_secs = metrics.time_secs;
    }

    /// Account records fetched from the remote source.
    pub fn record_fetched(&mut self, count: u64) {
        self.summary.records_fetched += count;
    }

    /// Account one applied batch.
    ///
    /// A call that carries only unchanged records (no writes) does not count
    /// as a committed batch.
    pub fn record_batch(&mut self, inserted: u64, updated: u64, unchanged: u64) {
        if inserted + updated > 0 {
            self.summary.batches_committed += 1;
        }
        self.summary.records_inserted += inserted;
        self.summary.records_updated += updated;
        self.summary.records_unchanged += unchanged;
    }

    /// Note a record type touched by this run.
    pub fn add_record_type(&mut self, record_type: RecordType) {
        let name = record_type.as_str().to_string();
        if !self.summary.record_types.contains(&name) {
            self.summary.record_types.push(name);
        }
    }

    #[must_use]
    pub const fn batches_committed(&self) -> u64 {
        self.summary.batches_committed
    }

    /// Terminal status for a run that failed: `partial` once any batch
    /// committed, `failed` otherwise.
    #[must_use]
    pub const fn failure_status(&self) -> ExecutionStatus {
        if self.summary.batches_committed > 0 {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Failed
        }
    }

    #[must_use]
    pub const fn summary(&self) -> &ExecutionSummary {
        &self.summary
    }

    /// Finalize the run. Consumes the ledger: exactly-once by move.
    pub async fn finish(
        mut self,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<ExecutionSummary> {
        let ended = Utc::now();
        self.summary.ended_at = Some(ended);
        self.summary.duration_secs =
            Some((ended - self.summary.started_at).num_milliseconds() as f64 / 1000.0);
        self.summary.status = status;
        self.summary.error_message = error_message;
        self.finished = true;

        self.store.finalize_execution(&self.summary).await?;
        info!(
            "⏱️ Execution {} finished in {:.2}s ({status})",
            &self.summary.execution_id.to_string()[..8],
            self.summary.duration_secs.unwrap_or_default()
        );
        Ok(self.summary.clone())
    }
}

impl Drop for ExecutionLedger {
    fn drop(&mut self) {
        if !self.finished {
            error!(
                "Execution {} dropped without finish; its log row is stuck in 'running'",
                self.summary.execution_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::fakes::MemoryStore;

    #[tokio::test]
    async fn begin_persists_running_row_and_finish_finalizes_it() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = ExecutionLedger::begin(store.clone(), "incremental-sync")
            .await
            .unwrap();
        let id = ledger.summary().execution_id;

        assert_eq!(
            store.execution(id).unwrap().status,
            ExecutionStatus::Running
        );

        ledger.record_fetched(3);
        ledger.record_batch(1, 1, 1);
        ledger.add_record_type(RecordType::Company);
        ledger.add_record_type(RecordType::Company);

        let summary = ledger.finish(ExecutionStatus::Success, None).await.unwrap();
        assert_eq!(summary.records_inserted, 1);
        assert_eq!(summary.records_updated, 1);
        assert_eq!(summary.records_unchanged, 1);
        assert_eq!(summary.batches_committed, 1);
        assert_eq!(summary.record_types, vec!["company".to_string()]);
        assert!(summary.duration_secs.is_some());

        let stored = store.execution(id).unwrap();
        assert_eq!(stored.status, ExecutionStatus::Success);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn unchanged_only_calls_do_not_count_batches() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = ExecutionLedger::begin(store, "full-sync").await.unwrap();

        ledger.record_batch(0, 0, 25);
        assert_eq!(ledger.batches_committed(), 0);
        assert_eq!(ledger.summary().records_unchanged, 25);

        ledger
            .finish(ExecutionStatus::Success, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failure_status_depends_on_committed_batches() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = ExecutionLedger::begin(store, "full-sync").await.unwrap();
        assert_eq!(ledger.failure_status(), ExecutionStatus::Failed);

        ledger.record_batch(2, 0, 0);
        assert_eq!(ledger.failure_status(), ExecutionStatus::Partial);

        ledger
            .finish(ExecutionStatus::Partial, Some("batch 2 failed".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn record_api_call_accumulates() {
        let store = Arc::new(MemoryStore::new());
        let mut ledger = ExecutionLedger::begin(store, "full-sync").await.unwrap();

        ledger.record_api_call(true, Duration::from_millis(200));
        ledger.record_api_call(false, Duration::from_millis(300));

        let summary = ledger.summary();
        assert_eq!(summary.api_requests, 2);
        assert_eq!(summary.api_failures, 1);
        assert!((summary.api_time_secs - 0.5).abs() < 1e-9);
        assert!((summary.api_success_rate() - 50.0).abs() < f64::EPSILON);

        ledger
            .finish(ExecutionStatus::Success, None)
            .await
            .unwrap();
    }
}
