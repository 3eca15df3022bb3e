//! Database schema initialization

use super::Database;
use crate::models::RecordType;
use crate::Result;

impl Database {
    /// Create all tables and indexes if they don't exist.
    ///
    /// Safe to run repeatedly; every statement is `IF NOT EXISTS`.
    pub async fn init_schema(&self) -> Result<()> {
        for record_type in RecordType::ALL {
            let table = record_type.table();
            sqlx::query(&format!(
                r"
                CREATE TABLE IF NOT EXISTS {table} (
                    record_key        TEXT PRIMARY KEY,
                    active            BOOLEAN NOT NULL DEFAULT TRUE,
                    fields            TEXT NOT NULL,
                    fingerprint       TEXT NOT NULL,
                    remote_created_at TIMESTAMPTZ,
                    remote_updated_at TIMESTAMPTZ NOT NULL,
                    etl_updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "
            ))
            .execute(self.pool())
            .await?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_remote_updated \
                 ON {table} (remote_updated_at)"
            ))
            .execute(self.pool())
            .await?;
        }

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tickets (
                record_key        TEXT PRIMARY KEY,
                caller_id         TEXT,
                opened_by         TEXT,
                resolved_by       TEXT,
                assigned_to       TEXT,
                company           TEXT,
                department        TEXT,
                closed_at         TIMESTAMPTZ,
                remote_updated_at TIMESTAMPTZ,
                fields            TEXT NOT NULL,
                etl_updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tickets_closed_at ON tickets (closed_at)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS execution_log (
                execution_id      UUID PRIMARY KEY,
                mode              TEXT NOT NULL,
                record_types      TEXT NOT NULL DEFAULT '',
                started_at        TIMESTAMPTZ NOT NULL,
                ended_at          TIMESTAMPTZ,
                duration_secs     DOUBLE PRECISION,
                api_requests      BIGINT NOT NULL DEFAULT 0,
                api_failures      BIGINT NOT NULL DEFAULT 0,
                api_time_secs     DOUBLE PRECISION NOT NULL DEFAULT 0,
                records_fetched   BIGINT NOT NULL DEFAULT 0,
                records_inserted  BIGINT NOT NULL DEFAULT 0,
                records_updated   BIGINT NOT NULL DEFAULT 0,
                records_unchanged BIGINT NOT NULL DEFAULT 0,
                batches_committed BIGINT NOT NULL DEFAULT 0,
                status            TEXT NOT NULL,
                error_message     TEXT
            )
            ",
        )
        .execute(self.pool())
        .await?;

        tracing::info!("✅ Database schema initialized");
        Ok(())
    }
}
