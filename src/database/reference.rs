//! Reference-table reads and batched upserts

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;

use super::Database;
use crate::models::RecordType;
use crate::models::ReferenceRecord;
use crate::Result;

type ReferenceRow = (
    String,                // record_key
    bool,                  // active
    String,                // fields (JSON)
    String,                // fingerprint
    Option<DateTime<Utc>>, // remote_created_at
    DateTime<Utc>,         // remote_updated_at
);

fn row_to_record(row: ReferenceRow) -> Result<ReferenceRecord> {
    let fields: BTreeMap<String, String> = serde_json::from_str(&row.2)?;
    Ok(ReferenceRecord {
        key: row.0,
        active: row.1,
        fields,
        fingerprint: row.3,
        remote_created_at: row.4,
        remote_updated_at: row.5,
    })
}

impl Database {
    /// Get one reference record by key
    pub(super) async fn get_reference(
        &self,
        record_type: RecordType,
        key: &str,
    ) -> Result<Option<ReferenceRecord>> {
        let row: Option<ReferenceRow> = sqlx::query_as(&format!(
            "SELECT record_key, active, fields, fingerprint, remote_created_at, remote_updated_at \
             FROM {} WHERE record_key = $1",
            record_type.table()
        ))
        .bind(key)
        .fetch_optional(self.pool())
        .await?;

        row.map(row_to_record).transpose()
    }

    /// Get many reference records keyed by record key
    pub(super) async fn get_references(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<HashMap<String, ReferenceRecord>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<ReferenceRow> = sqlx::query_as(&format!(
            "SELECT record_key, active, fields, fingerprint, remote_created_at, remote_updated_at \
             FROM {} WHERE record_key = ANY($1)",
            record_type.table()
        ))
        .bind(keys)
        .fetch_all(self.pool())
        .await?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            let record = row_to_record(row)?;
            map.insert(record.key.clone(), record);
        }
        Ok(map)
    }

    /// Insert or update a batch of reference records in one transaction.
    ///
    /// All-or-nothing: a failure rolls back every row of the batch, leaving
    /// previously committed batches untouched.
    pub(super) async fn upsert_reference_batch(
        &self,
        record_type: RecordType,
        records: &[ReferenceRecord],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r"
            INSERT INTO {} (record_key, active, fields, fingerprint,
                            remote_created_at, remote_updated_at, etl_updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (record_key) DO UPDATE SET
                active            = EXCLUDED.active,
                fields            = EXCLUDED.fields,
                fingerprint       = EXCLUDED.fingerprint,
                remote_created_at = EXCLUDED.remote_created_at,
                remote_updated_at = EXCLUDED.remote_updated_at,
                etl_updated_at    = NOW()
            ",
            record_type.table()
        );

        let mut tx = self.pool().begin().await?;
        for record in records {
            let fields_json = serde_json::to_string(&record.fields)?;
            sqlx::query(&sql)
                .bind(&record.key)
                .bind(record.active)
                .bind(&fields_json)
                .bind(&record.fingerprint)
                .bind(record.remote_created_at)
                .bind(record.remote_updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            "Committed batch of {} {} records",
            records.len(),
            record_type
        );
        Ok(records.len() as u64)
    }

    /// Of the given keys, return those not present locally
    pub(super) async fn missing_reference_keys(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let present: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT record_key FROM {} WHERE record_key = ANY($1)",
            record_type.table()
        ))
        .bind(keys)
        .fetch_all(self.pool())
        .await?;

        let present: std::collections::HashSet<&str> =
            present.iter().map(|(k,)| k.as_str()).collect();

        Ok(keys
            .iter()
            .filter(|k| !present.contains(k.as_str()))
            .cloned()
            .collect())
    }

    /// Maximum `remote_updated_at` over committed rows of this type
    pub(super) async fn reference_high_water_mark(
        &self,
        record_type: RecordType,
    ) -> Result<Option<DateTime<Utc>>> {
        let row: (Option<DateTime<Utc>>,) = sqlx::query_as(&format!(
            "SELECT MAX(remote_updated_at) FROM {}",
            record_type.table()
        ))
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }
}
