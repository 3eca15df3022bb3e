//! Database layer for `PostgreSQL` operations
//!
//! Provides the local store the sync engine reconciles against:
//!
//! - Reference tables (`ref_users`, `ref_companies`, `ref_departments`) with
//!   batched transactional upserts and fingerprint lookups
//! - Ticket storage plus the referenced-key scan feeding the
//!   missing-reference resolver
//! - The `execution_log` table the execution ledger persists into
//!
//! The sync engine talks to this layer through the [`LocalStore`] trait so
//! its diff/batch logic can be tested against an in-memory store. `Database`
//! is the production implementation over a `sqlx::PgPool`.
//!
//! # Connection Pool
//!
//! Pooling is managed by `sqlx::PgPool` with configurable maximum/minimum
//! connections and acquire timeout.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;

use crate::models::ExecutionSummary;
use crate::models::RecordType;
use crate::models::ReferenceRecord;
use crate::models::TicketRecord;
use crate::Result;

mod executions;
mod reference;
mod schema;
mod tickets;

/// Contract between the sync engine and the local relational store.
///
/// `upsert_batch` must be transactional at batch granularity: either every
/// record in the slice lands or none do. All other guarantees of the engine
/// (cursor advancement, at-least-once re-pull) build on that.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Fetch one reference record by key.
    async fn get(&self, record_type: RecordType, key: &str) -> Result<Option<ReferenceRecord>>;

    /// Fetch many reference records, keyed by record key. Absent keys are
    /// simply missing from the map.
    async fn get_many(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<HashMap<String, ReferenceRecord>>;

    /// Insert or update a batch of records in a single transaction.
    /// Returns the number of rows written.
    async fn upsert_batch(
        &self,
        record_type: RecordType,
        records: &[ReferenceRecord],
    ) -> Result<u64>;

    /// Of the given keys, return those with no local record.
    async fn filter_missing(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<Vec<String>>;

    /// High-water `remote_updated_at` over committed rows of this type.
    async fn max_remote_updated_at(
        &self,
        record_type: RecordType,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Persist a fresh execution row (status `running`).
    async fn insert_execution(&self, summary: &ExecutionSummary) -> Result<()>;

    /// Finalize a previously inserted execution row.
    async fn finalize_execution(&self, summary: &ExecutionSummary) -> Result<()>;

    /// Upsert a slice of tickets in a single transaction.
    async fn upsert_tickets(&self, tickets: &[TicketRecord]) -> Result<u64>;

    /// Keys referenced by stored tickets but absent from the reference table
    /// of the given type.
    async fn referenced_missing_keys(&self, record_type: RecordType) -> Result<Vec<String>>;
}

/// Database connection pool wrapper
///
/// # Thread Safety
///
/// This type is `Clone` and thread-safe. Cloning creates a new reference to
/// the same connection pool (cheap operation).
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database instance with an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new database instance from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be established.
    pub async fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        let pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout()));

        let pool = pool_options.connect(config.database_url()).await?;

        tracing::debug!(
            "Database pool configured: max_connections={}, min_connections={}",
            config.max_connections(),
            config.min_connections()
        );

        Ok(Self::new(pool))
    }

    /// Get a reference to the database pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait]
impl LocalStore for Database {
    async fn get(&self, record_type: RecordType, key: &str) -> Result<Option<ReferenceRecord>> {
        self.get_reference(record_type, key).await
    }

    async fn get_many(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<HashMap<String, ReferenceRecord>> {
        self.get_references(record_type, keys).await
    }

    async fn upsert_batch(
        &self,
        record_type: RecordType,
        records: &[ReferenceRecord],
    ) -> Result<u64> {
        self.upsert_reference_batch(record_type, records).await
    }

    async fn filter_missing(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<Vec<String>> {
        self.missing_reference_keys(record_type, keys).await
    }

    async fn max_remote_updated_at(
        &self,
        record_type: RecordType,
    ) -> Result<Option<DateTime<Utc>>> {
        self.reference_high_water_mark(record_type).await
    }

    async fn insert_execution(&self, summary: &ExecutionSummary) -> Result<()> {
        self.insert_execution_row(summary).await
    }

    async fn finalize_execution(&self, summary: &ExecutionSummary) -> Result<()> {
        self.finalize_execution_row(summary).await
    }

    async fn upsert_tickets(&self, tickets: &[TicketRecord]) -> Result<u64> {
        self.upsert_ticket_batch(tickets).await
    }

    async fn referenced_missing_keys(&self, record_type: RecordType) -> Result<Vec<String>> {
        self.ticket_referenced_missing_keys(record_type).await
    }
}
