//! Ticket extraction handler

use std::sync::Arc;

use chrono::NaiveDate;

use crate::cli::output::print_error;
use crate::cli::output::print_execution_summary;
use crate::cli::output::print_success;
use crate::database::Database;
use crate::database::LocalStore;
use crate::extract::TicketExtractor;
use crate::extract::TicketReport;
use crate::models::ExecutionStatus;
use crate::sync::ExecutionLedger;
use crate::sync::RemoteSource;
use crate::sync::ServiceDeskClient;
use crate::AppConfig;
use crate::Result;

pub async fn handle_tickets(
    config: &AppConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let database = Arc::new(Database::from_config(config).await?);
    let client = Arc::new(ServiceDeskClient::from_config(config)?);
    let store: Arc<dyn LocalStore> = database;

    let extractor = TicketExtractor::new(store.clone(), client.clone(), &config.sync);

    let mut ledger = ExecutionLedger::begin(store, "tickets").await?;
    let outcome = extractor.extract(start, end, &mut ledger).await;
    ledger.set_api_metrics(client.metrics());

    match outcome {
        Ok(report) => {
            print_ticket_report(&report);
            let summary = ledger.finish(ExecutionStatus::Success, None).await?;
            print_execution_summary(&summary);
            Ok(())
        }
        Err(e) => {
            print_error(&e.to_string());
            let status = ledger.failure_status();
            let summary = ledger.finish(status, Some(e.to_string())).await?;
            print_execution_summary(&summary);
            Err(e)
        }
    }
}

pub(crate) fn print_ticket_report(report: &TicketReport) {
    print_success(&format!(
        "{} tickets fetched, {} stored",
        report.fetched, report.stored
    ));
    for (record_type, resolution) in &report.resolutions {
        print_success(&format!(
            "{record_type} references: {} backfilled, {} unresolvable",
            resolution.backfilled.len(),
            resolution.unresolvable.len()
        ));
    }
}
