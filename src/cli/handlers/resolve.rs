//! Missing-reference backfill handler

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cli::output::print_info;
use crate::cli::output::print_success;
use crate::database::Database;
use crate::database::LocalStore;
use crate::models::RecordType;
use crate::sync::ExecutionLedger;
use crate::sync::MissingReferenceResolver;
use crate::sync::RemoteSource;
use crate::sync::ServiceDeskClient;
use crate::AppConfig;
use crate::Result;

pub async fn handle_resolve_missing(
    config: &AppConfig,
    record_type: Option<RecordType>,
) -> Result<()> {
    let database = Arc::new(Database::from_config(config).await?);
    let client = Arc::new(ServiceDeskClient::from_config(config)?);
    let store: Arc<dyn LocalStore> = database;

    let resolver = MissingReferenceResolver::new(store.clone(), client.clone(), &config.sync);
    let types: Vec<RecordType> =
        record_type.map_or_else(|| RecordType::ALL.to_vec(), |t| vec![t]);

    let mut ledger = ExecutionLedger::begin(store.clone(), "resolve-missing").await?;
    let outcome = resolve_types(&store, &resolver, &types, &mut ledger).await;
    ledger.set_api_metrics(client.metrics());
    super::sync::finish_ledger(ledger, outcome.map(|()| false)).await
}

async fn resolve_types(
    store: &Arc<dyn LocalStore>,
    resolver: &MissingReferenceResolver,
    types: &[RecordType],
    ledger: &mut ExecutionLedger,
) -> Result<()> {
    for record_type in types {
        let missing = store.referenced_missing_keys(*record_type).await?;
        if missing.is_empty() {
            print_info(&format!(
                "All {record_type} references on stored tickets are local"
            ));
            continue;
        }

        let keys: BTreeSet<String> = missing.into_iter().collect();
        let report = resolver
            .resolve_missing(*record_type, &keys, ledger)
            .await?;
        print_success(&format!(
            "{record_type}: {} backfilled, {} unresolvable",
            report.backfilled.len(),
            report.unresolvable.len()
        ));
    }
    Ok(())
}
