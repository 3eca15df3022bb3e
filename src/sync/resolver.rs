//! Missing-reference resolver
//!
//! Tickets carry foreign keys into reference data that may not be local yet
//! (records created remotely between reference syncs, or older than the
//! current pull window). Given a set of observed keys, the resolver fetches
//! only the absent subset by key list and upserts it through the same batch
//! discipline as the sync engine. Keys the remote cannot return are reported
//! as unresolvable, never silently dropped; the caller decides whether a
//! dangling reference is acceptable.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::config::SyncConfig;
use crate::database::LocalStore;
use crate::models::RecordType;
use crate::sync::client::RemoteSource;
use crate::sync::ledger::ExecutionLedger;
use crate::Result;

/// Outcome of one resolution pass. Every requested key ends up either
/// already present, backfilled, or unresolvable.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub requested: usize,
    pub already_present: usize,
    pub backfilled: BTreeSet<String>,
    pub unresolvable: BTreeSet<String>,
}

pub struct MissingReferenceResolver {
    store: Arc<dyn LocalStore>,
    source: Arc<dyn RemoteSource>,
    batch_size: usize,
}

impl MissingReferenceResolver {
    #[must_use]
    pub fn new(
        store: Arc<dyn LocalStore>,
        source: Arc<dyn RemoteSource>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            source,
            batch_size: config.batch_size.max(1),
        }
    }

    /// Backfill the subset of `keys` that has no local record.
    ///
    /// # Errors
    /// Remote fetch errors and store errors abort the pass. Unresolvable
    /// keys are not errors.
    pub async fn resolve_missing(
        &self,
        record_type: RecordType,
        keys: &BTreeSet<String>,
        ledger: &mut ExecutionLedger,
    ) -> Result<ResolveReport> {
        let mut report = ResolveReport {
            requested: keys.len(),
            ..ResolveReport::default()
        };
        if keys.is_empty() {
            return Ok(report);
        }

        let key_vec: Vec<String> = keys.iter().cloned().collect();
        let missing = self.store.filter_missing(record_type, &key_vec).await?;
        report.already_present = keys.len() - missing.len();

        if missing.is_empty() {
            info!("✅ All {} referenced {record_type} keys are local", keys.len());
            return Ok(report);
        }

        info!(
            "🔍 Backfilling {} missing {record_type} references",
            missing.len()
        );
        ledger.add_record_type(record_type);

        let fetched = self.source.fetch_by_keys(record_type, &missing).await?;
        ledger.record_fetched(fetched.len() as u64);

        let wanted: BTreeSet<&str> = missing.iter().map(String::as_str).collect();
        for batch in fetched.chunks(self.batch_size) {
            self.store.upsert_batch(record_type, batch).await?;
            ledger.record_batch(batch.len() as u64, 0, 0);
            report.backfilled.extend(
                batch
                    .iter()
                    .filter(|r| wanted.contains(r.key.as_str()))
                    .map(|r| r.key.clone()),
            );
        }

        for key in &missing {
            if !report.backfilled.contains(key) {
                warn!("Unresolvable {record_type} reference: {key}");
                report.unresolvable.insert(key.clone());
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::ExecutionStatus;
    use crate::sync::fakes::record_at;
    use crate::sync::fakes::MemoryStore;
    use crate::sync::fakes::ScriptedRemote;

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    async fn setup() -> (
        Arc<MemoryStore>,
        Arc<ScriptedRemote>,
        MissingReferenceResolver,
        ExecutionLedger,
    ) {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(ScriptedRemote::new(100));
        let resolver = MissingReferenceResolver::new(
            store.clone(),
            remote.clone(),
            &SyncConfig::default(),
        );
        let ledger = ExecutionLedger::begin(store.clone(), "resolve-missing")
            .await
            .unwrap();
        (store, remote, resolver, ledger)
    }

    #[tokio::test]
    async fn present_keys_are_not_fetched() {
        let (store, remote, resolver, mut ledger) = setup().await;
        let now = Utc::now();
        store
            .upsert_batch(RecordType::User, &[record_at("u1", "Ana", now)])
            .await
            .unwrap();

        let report = resolver
            .resolve_missing(RecordType::User, &keys(&["u1"]), &mut ledger)
            .await
            .unwrap();

        assert_eq!(report.already_present, 1);
        assert!(report.backfilled.is_empty());
        assert!(report.unresolvable.is_empty());
        assert_eq!(remote.metrics().requests, 0);

        ledger.finish(ExecutionStatus::Success, None).await.unwrap();
    }

    #[tokio::test]
    async fn absent_keys_are_backfilled_and_unknown_reported() {
        let (store, remote, resolver, mut ledger) = setup().await;
        let now = Utc::now();
        remote.seed(RecordType::User, vec![record_at("u2", "Bruno", now)]);

        let report = resolver
            .resolve_missing(RecordType::User, &keys(&["u2", "ghost"]), &mut ledger)
            .await
            .unwrap();

        assert_eq!(report.requested, 2);
        assert_eq!(report.backfilled, keys(&["u2"]));
        assert_eq!(report.unresolvable, keys(&["ghost"]));
        assert!(store.get(RecordType::User, "u2").await.unwrap().is_some());

        ledger.finish(ExecutionStatus::Success, None).await.unwrap();
    }

    #[tokio::test]
    async fn closure_property_every_key_accounted_for() {
        let (store, remote, resolver, mut ledger) = setup().await;
        let now = Utc::now();
        store
            .upsert_batch(RecordType::Company, &[record_at("c1", "Acme", now)])
            .await
            .unwrap();
        remote.seed(RecordType::Company, vec![record_at("c2", "Bluth", now)]);

        let requested = keys(&["c1", "c2", "c3"]);
        let report = resolver
            .resolve_missing(RecordType::Company, &requested, &mut ledger)
            .await
            .unwrap();

        // present + backfilled + unresolvable covers the input exactly
        let mut accounted = report.backfilled.clone();
        accounted.extend(report.unresolvable.iter().cloned());
        accounted.insert("c1".to_string());
        assert_eq!(accounted, requested);
        assert_eq!(report.already_present, 1);

        ledger.finish(ExecutionStatus::Success, None).await.unwrap();
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let (_store, remote, resolver, mut ledger) = setup().await;

        let report = resolver
            .resolve_missing(RecordType::Department, &BTreeSet::new(), &mut ledger)
            .await
            .unwrap();

        assert_eq!(report.requested, 0);
        assert_eq!(remote.metrics().requests, 0);

        ledger.finish(ExecutionStatus::Success, None).await.unwrap();
    }
}
