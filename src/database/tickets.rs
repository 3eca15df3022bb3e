//! Ticket persistence and referenced-key scans

use super::Database;
use crate::models::RecordType;
use crate::models::TicketRecord;
use crate::Result;

impl Database {
    /// Upsert a slice of tickets in one transaction
    pub(super) async fn upsert_ticket_batch(&self, tickets: &[TicketRecord]) -> Result<u64> {
        if tickets.is_empty() {
            return Ok(0);
        }

        let sql = r"
            INSERT INTO tickets (record_key, caller_id, opened_by, resolved_by, assigned_to,
                                 company, department, closed_at, remote_updated_at, fields,
                                 etl_updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (record_key) DO UPDATE SET
                caller_id         = EXCLUDED.caller_id,
                opened_by         = EXCLUDED.opened_by,
                resolved_by       = EXCLUDED.resolved_by,
                assigned_to       = EXCLUDED.assigned_to,
                company           = EXCLUDED.company,
                department        = EXCLUDED.department,
                closed_at         = EXCLUDED.closed_at,
                remote_updated_at = EXCLUDED.remote_updated_at,
                fields            = EXCLUDED.fields,
                etl_updated_at    = NOW()
        ";

        let mut tx = self.pool().begin().await?;
        for ticket in tickets {
            let fields_json = serde_json::to_string(&ticket.fields)?;
            sqlx::query(sql)
                .bind(&ticket.key)
                .bind(&ticket.caller_id)
                .bind(&ticket.opened_by)
                .bind(&ticket.resolved_by)
                .bind(&ticket.assigned_to)
                .bind(&ticket.company)
                .bind(&ticket.department)
                .bind(ticket.closed_at)
                .bind(ticket.remote_updated_at)
                .bind(&fields_json)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(tickets.len() as u64)
    }

    /// Keys referenced by tickets but absent from the reference table of the
    /// given type.
    ///
    /// One UNION branch per reference column, anti-joined against the
    /// reference table, so the resolver only ever fetches what is actually
    /// missing.
    pub(super) async fn ticket_referenced_missing_keys(
        &self,
        record_type: RecordType,
    ) -> Result<Vec<String>> {
        let branches: Vec<String> = record_type
            .ticket_reference_columns()
            .iter()
            .map(|col| {
                format!("SELECT {col} AS ref_key FROM tickets WHERE {col} IS NOT NULL AND {col} <> ''")
            })
            .collect();

        let sql = format!(
            "SELECT DISTINCT ref_key FROM ({}) AS refs \
             WHERE ref_key NOT IN (SELECT record_key FROM {}) \
             ORDER BY ref_key",
            branches.join(" UNION "),
            record_type.table()
        );

        let rows: Vec<(String,)> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}
