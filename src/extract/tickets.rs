//! Closed-ticket extraction
//!
//! Pulls tickets closed inside a date window, stores them, then closes the
//! reference gap: any user, company or department key observed on the stored
//! tickets without a local reference record is backfilled through the
//! missing-reference resolver.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::TimeZone;
use chrono::Utc;
use tracing::info;

use crate::config::SyncConfig;
use crate::database::LocalStore;
use crate::models::RecordType;
use crate::sync::client::ServiceDeskClient;
use crate::sync::ledger::ExecutionLedger;
use crate::sync::resolver::MissingReferenceResolver;
use crate::sync::resolver::ResolveReport;
use crate::Result;

/// Days pulled when no explicit date range is given
const DEFAULT_RANGE_DAYS: i64 = 2;

/// Outcome of one ticket extraction.
#[derive(Debug, Default)]
pub struct TicketReport {
    pub fetched: u64,
    pub stored: u64,
    pub resolutions: Vec<(RecordType, ResolveReport)>,
}

pub struct TicketExtractor {
    store: Arc<dyn LocalStore>,
    client: Arc<ServiceDeskClient>,
    resolver: MissingReferenceResolver,
    batch_size: usize,
}

impl TicketExtractor {
    #[must_use]
    pub fn new(
        store: Arc<dyn LocalStore>,
        client: Arc<ServiceDeskClient>,
        config: &SyncConfig,
    ) -> Self {
        let resolver = MissingReferenceResolver::new(store.clone(), client.clone(), config);
        Self {
            store,
            client,
            resolver,
            batch_size: config.batch_size.max(1),
        }
    }

    /// Resolve an optional date range, defaulting to the last two days.
    #[must_use]
    pub fn date_range(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> (NaiveDate, NaiveDate) {
        let today = Utc::now().date_naive();
        let end = end.unwrap_or(today);
        let start = start.unwrap_or(end - chrono::Duration::days(DEFAULT_RANGE_DAYS));
        (start, end)
    }

    /// Extract tickets closed inside `[start, end]` and backfill the
    /// references they carry.
    ///
    /// # Errors
    /// Remote and store errors abort the extraction; unresolvable references
    /// do not.
    pub async fn extract(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        ledger: &mut ExecutionLedger,
    ) -> Result<TicketReport> {
        let (start, end) = Self::date_range(start, end);
        info!("📅 Extracting tickets closed {start} – {end}");

        let closed_from = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
        let closed_to =
            Utc.from_utc_datetime(&(end + chrono::Duration::days(1)).and_time(NaiveTime::MIN));

        let tickets = self.client.fetch_tickets(closed_from, closed_to).await?;
        ledger.record_fetched(tickets.len() as u64);

        let mut report = TicketReport {
            fetched: tickets.len() as u64,
            ..TicketReport::default()
        };

        if tickets.is_empty() {
            info!("No tickets closed in the window");
            return Ok(report);
        }

        for batch in tickets.chunks(self.batch_size) {
            report.stored += self.store.upsert_tickets(batch).await?;
            ledger.record_batch(batch.len() as u64, 0, 0);
        }
        info!("✅ {} tickets stored", report.stored);

        // Reference closure: backfill keys the tickets point at but the
        // reference tables don't have yet
        for record_type in RecordType::ALL {
            let missing = self.store.referenced_missing_keys(record_type).await?;
            if missing.is_empty() {
                continue;
            }
            let keys: BTreeSet<String> = missing.into_iter().collect();
            let resolution = self
                .resolver
                .resolve_missing(record_type, &keys, ledger)
                .await?;
            report.resolutions.push((record_type, resolution));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_defaults_to_last_two_days() {
        let (start, end) = TicketExtractor::date_range(None, None);
        assert_eq!(end, Utc::now().date_naive());
        assert_eq!(end - start, chrono::Duration::days(DEFAULT_RANGE_DAYS));
    }

    #[test]
    fn explicit_range_passes_through() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            TicketExtractor::date_range(Some(start), Some(end)),
            (start, end)
        );
    }

    #[test]
    fn open_ended_start_defaults_relative_to_end() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let (start, _) = TicketExtractor::date_range(None, Some(end));
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
    }
}
