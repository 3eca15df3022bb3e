//! Reference synchronization handler

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::cli::output::print_error;
use crate::cli::output::print_execution_summary;
use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::database::Database;
use crate::database::LocalStore;
use crate::models::ExecutionStatus;
use crate::models::RecordType;
use crate::models::SyncCursor;
use crate::models::SyncMode;
use crate::sync::ExecutionLedger;
use crate::sync::RemoteSource;
use crate::sync::ServiceDeskClient;
use crate::sync::SyncEngine;
use crate::AppConfig;
use crate::Result;

pub async fn handle_sync(
    config: &AppConfig,
    record_type: Option<RecordType>,
    full: bool,
) -> Result<()> {
    let database = Arc::new(Database::from_config(config).await?);
    let client = Arc::new(ServiceDeskClient::from_config(config)?);
    let store: Arc<dyn LocalStore> = database;

    let engine = SyncEngine::new(store.clone(), client.clone(), &config.sync);
    spawn_cancel_on_ctrl_c(engine.cancel_handle());

    let mode = if full {
        SyncMode::Full
    } else {
        SyncMode::Incremental
    };
    let types: Vec<RecordType> =
        record_type.map_or_else(|| RecordType::ALL.to_vec(), |t| vec![t]);

    let mut ledger =
        ExecutionLedger::begin(store.clone(), &format!("{}-sync", mode.as_str())).await?;
    let outcome = sync_types(&engine, &store, config, &types, mode, &mut ledger).await;
    ledger.set_api_metrics(client.metrics());
    finish_ledger(ledger, outcome).await
}

/// Stop at the next batch boundary when the operator hits Ctrl-C.
pub(crate) fn spawn_cancel_on_ctrl_c(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Stop requested; finishing the current batch");
            cancel.store(true, Ordering::SeqCst);
        }
    });
}

/// Synchronize each type in turn. Returns whether the run was cancelled.
pub(crate) async fn sync_types(
    engine: &SyncEngine,
    store: &Arc<dyn LocalStore>,
    config: &AppConfig,
    types: &[RecordType],
    mode: SyncMode,
    ledger: &mut ExecutionLedger,
) -> Result<bool> {
    for record_type in types {
        let cursor = match mode {
            SyncMode::Incremental => {
                SyncCursor::new(store.max_remote_updated_at(*record_type).await?)
                    .with_overlap(config.cursor_overlap_secs())
            }
            SyncMode::Full => SyncCursor::default(),
        };

        let report = engine.synchronize(*record_type, mode, cursor, ledger).await?;
        print_success(&format!(
            "{record_type}: {} inserted, {} updated, {} unchanged",
            report.inserted, report.updated, report.unchanged
        ));
        if report.cancelled {
            print_info("Cancelled by operator; stopping");
            return Ok(true);
        }
    }
    Ok(false)
}

/// Finalize the ledger for every exit path of a sync-style command.
pub(crate) async fn finish_ledger(ledger: ExecutionLedger, outcome: Result<bool>) -> Result<()> {
    match outcome {
        Ok(false) => {
            let summary = ledger.finish(ExecutionStatus::Success, None).await?;
            print_execution_summary(&summary);
            Ok(())
        }
        Ok(true) => {
            let summary = ledger
                .finish(
                    ExecutionStatus::Partial,
                    Some("cancelled by operator".to_string()),
                )
                .await?;
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
