//! Execution log persistence

use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use super::Database;
use crate::models::ExecutionStatus;
use crate::models::ExecutionSummary;
use crate::Result;

type ExecutionRow = (
    Uuid,                  // execution_id
    String,                // mode
    String,                // record_types (comma-joined)
    DateTime<Utc>,         // started_at
    Option<DateTime<Utc>>, // ended_at
    Option<f64>,           // duration_secs
    i64,                   // api_requests
    i64,                   // api_failures
    f64,                   // api_time_secs
    i64,                   // records_fetched
    i64,                   // records_inserted
    i64,                   // records_updated
    i64,                   // records_unchanged
    i64,                   // batches_committed
    String,                // status
    Option<String>,        // error_message
);

fn row_to_summary(row: ExecutionRow) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: row.0,
        mode: row.1,
        record_types: if row.2.is_empty() {
            Vec::new()
        } else {
            row.2.split(',').map(str::to_string).collect()
        },
        started_at: row.3,
        ended_at: row.4,
        duration_secs: row.5,
        api_requests: row.6.max(0) as u64,
        api_failures: row.7.max(0) as u64,
        api_time_secs: row.8,
        records_fetched: row.9.max(0) as u64,
        records_inserted: row.10.max(0) as u64,
        records_updated: row.11.max(0) as u64,
        records_unchanged: row.12.max(0) as u64,
        batches_committed: row.13.max(0) as u64,
        status: ExecutionStatus::parse(&row.14).unwrap_or(ExecutionStatus::Failed),
        error_message: row.15,
    }
}

impl Database {
    /// Insert the initial `running` row for an execution
    pub(super) async fn insert_execution_row(&self, summary: &ExecutionSummary) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO execution_log (execution_id, mode, record_types, started_at, status)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(summary.execution_id)
        .bind(&summary.mode)
        .bind(summary.record_types.join(","))
        .bind(summary.started_at)
        .bind(summary.status.as_str())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Write the terminal state and final counters of an execution
    pub(super) async fn finalize_execution_row(&self, summary: &ExecutionSummary) -> Result<()> {
        sqlx::query(
            r"
            UPDATE execution_log SET
                record_types      = $2,
                ended_at          = $3,
                duration_secs     = $4,
                api_requests      = $5,
                api_failures      = $6,
                api_time_secs     = $7,
                records_fetched   = $8,
                records_inserted  = $9,
                records_updated   = $10,
                records_unchanged = $11,
                batches_committed = $12,
                status            = $13,
                error_message     = $14
            WHERE execution_id = $1
            ",
        )
        .bind(summary.execution_id)
        .bind(summary.record_types.join(","))
        .bind(summary.ended_at)
        .bind(summary.duration_secs)
        .bind(summary.api_requests as i64)
        .bind(summary.api_failures as i64)
        .bind(summary.api_time_secs)
        .bind(summary.records_fetched as i64)
        .bind(summary.records_inserted as i64)
        .bind(summary.records_updated as i64)
        .bind(summary.records_unchanged as i64)
        .bind(summary.batches_committed as i64)
        .bind(summary.status.as_str())
        .bind(&summary.error_message)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Most recent executions, newest first
    pub async fn recent_executions(&self, limit: i64) -> Result<Vec<ExecutionSummary>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r"
            SELECT execution_id, mode, record_types, started_at, ended_at, duration_secs,
                   api_requests, api_failures, api_time_secs, records_fetched,
                   records_inserted, records_updated, records_unchanged, batches_committed,
                   status, error_message
            FROM execution_log
            ORDER BY started_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_summary).collect())
    }
}
