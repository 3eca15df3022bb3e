//! Full ETL handler: reference sync, then tickets plus reference closure

use std::sync::Arc;

use chrono::NaiveDate;

use crate::cli::output::print_error;
use crate::cli::output::print_execution_summary;
use crate::cli::output::print_info;
use crate::database::Database;
use crate::database::LocalStore;
use crate::extract::TicketExtractor;
use crate::models::ExecutionStatus;
use crate::models::RecordType;
use crate::models::SyncMode;
use crate::sync::ExecutionLedger;
use crate::sync::RemoteSource;
use crate::sync::ServiceDeskClient;
use crate::sync::SyncEngine;
use crate::AppConfig;
use crate::Result;
use crate::SyncError;

pub async fn handle_run(
    config: &AppConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    full_refs: bool,
) -> Result<()> {
    let database = Arc::new(Database::from_config(config).await?);
    let client = Arc::new(ServiceDeskClient::from_config(config)?);
    let store: Arc<dyn LocalStore> = database;

    let engine = SyncEngine::new(store.clone(), client.clone(), &config.sync);
    super::sync::spawn_cancel_on_ctrl_c(engine.cancel_handle());
    let extractor = TicketExtractor::new(store.clone(), client.clone(), &config.sync);

    let mode = if full_refs {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };

    let mut ledger = ExecutionLedger::begin(store.clone(), "full-etl").await?;

    // Stage 1: reference data. A failure here is recorded but does not stop
    // ticket extraction; the run finishes as partial.
    print_info("Stage 1: reference data");
    let mut cancelled = false;
    let mut ref_error: Option<SyncError> = None;
    match super::sync::sync_types(
        &engine,
        &store,
        config,
        &RecordType::ALL,
        mode,
        &mut ledger,
    )
    .await
    {
        Ok(was_cancelled) => cancelled = was_cancelled,
        Err(e) => {
            print_error(&format!("Reference sync failed, continuing with tickets: {e}"));
            ref_error = Some(e);
        }
    }

    // Stage 2: tickets (skipped when the operator already cancelled)
    let ticket_outcome = if cancelled {
        Ok(None)
    } else {
        print_info("Stage 2: tickets");
        extractor.extract(start, end, &mut ledger).await.map(Some)
    };

    ledger.set_api_metrics(client.metrics());

    match ticket_outcome {
        Err(e) => {
            print_error(&e.to_string());
            let status = ledger.failure_status();
            let summary = ledger.finish(status, Some(e.to_string())).await?;
            print_execution_summary(&summary);
            Err(e)
        }
        Ok(report) => {
            if let Some(report) = &report {
                super::tickets::print_ticket_report(report);
            }
            if cancelled {
                let summary = ledger
                    .finish(
                        ExecutionStatus::Partial,
                        Some("cancelled by operator".to_string()),
                    )
                    .await?;
                print_execution_summary(&summary);
                Ok(())
            } else if let Some(e) = ref_error {
                let summary = ledger
                    .finish(ExecutionStatus::Partial, Some(e.to_string()))
                    .await?;
                print_execution_summary(&summary);
                Err(e)
            } else {
                let summary = ledger.finish(ExecutionStatus::Success, None).await?;
                print_execution_summary(&summary);
                Ok(())
            }
        }
    }
}
