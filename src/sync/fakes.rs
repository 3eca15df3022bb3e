//! In-memory fakes for engine, resolver and ledger tests
//!
//! `MemoryStore` honors the same batch-atomicity contract as the real
//! database (a failed batch writes nothing) and supports failure injection
//! by batch index. `ScriptedRemote` serves seeded records through the same
//! filter/pagination semantics as the HTTP client.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use uuid::Uuid;

use crate::database::LocalStore;
use crate::models::ExecutionSummary;
use crate::models::RecordType;
use crate::models::ReferenceRecord;
use crate::models::TicketRecord;
use crate::sync::client::ApiMetrics;
use crate::sync::client::PageFilter;
use crate::sync::client::RemotePage;
use crate::sync::client::RemoteSource;
use crate::Result;
use crate::SyncError;

/// Build a reference record with a single `name` field.
pub fn record_at(key: &str, name: &str, updated: DateTime<Utc>) -> ReferenceRecord {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), name.to_string());
    ReferenceRecord::new(key, true, fields, None, updated)
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RecordType, BTreeMap<String, ReferenceRecord>>>,
    tickets: Mutex<BTreeMap<String, TicketRecord>>,
    executions: Mutex<Vec<ExecutionSummary>>,
    high_waters: Mutex<Vec<DateTime<Utc>>>,
    fail_on_batch: AtomicI64,
    batches_seen: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fail_on_batch: AtomicI64::new(-1),
            ..Self::default()
        }
    }

    /// Make the n-th `upsert_batch` call (0-based) fail atomically.
    pub fn fail_on_batch(&self, index: i64) {
        self.fail_on_batch.store(index, Ordering::SeqCst);
    }

    /// Stored keys of a type, sorted.
    pub async fn all_keys(&self, record_type: RecordType) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .get(&record_type)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// High-water `remote_updated_at` of each committed batch, in commit order.
    pub async fn batch_high_waters(&self) -> Vec<DateTime<Utc>> {
        self.high_waters.lock().unwrap().clone()
    }

    /// Stored execution summary by id.
    #[must_use]
    pub fn execution(&self, id: Uuid) -> Option<ExecutionSummary> {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.execution_id == id)
            .cloned()
    }

    /// Seed tickets directly.
    pub fn seed_tickets(&self, tickets: Vec<TicketRecord>) {
        let mut map = self.tickets.lock().unwrap();
        for t in tickets {
            map.insert(t.key.clone(), t);
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, record_type: RecordType, key: &str) -> Result<Option<ReferenceRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&record_type)
            .and_then(|m| m.get(key))
            .cloned())
    }

    async fn get_many(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<HashMap<String, ReferenceRecord>> {
        let records = self.records.lock().unwrap();
        let table = records.get(&record_type);
        Ok(keys
            .iter()
            .filter_map(|k| table.and_then(|m| m.get(k)).map(|r| (k.clone(), r.clone())))
            .collect())
    }

    async fn upsert_batch(
        &self,
        record_type: RecordType,
        records: &[ReferenceRecord],
    ) -> Result<u64> {
        let index = self.batches_seen.fetch_add(1, Ordering::SeqCst);
        if index == self.fail_on_batch.load(Ordering::SeqCst) {
            return Err(SyncError::Custom("injected batch failure".to_string()));
        }

        let mut map = self.records.lock().unwrap();
        let table = map.entry(record_type).or_default();
        for record in records {
            table.insert(record.key.clone(), record.clone());
        }
        if let Some(hw) = records.iter().map(|r| r.remote_updated_at).max() {
            self.high_waters.lock().unwrap().push(hw);
        }
        Ok(records.len() as u64)
    }

    async fn filter_missing(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<Vec<String>> {
        let records = self.records.lock().unwrap();
        let table = records.get(&record_type);
        Ok(keys
            .iter()
            .filter(|k| !table.is_some_and(|m| m.contains_key(*k)))
            .cloned()
            .collect())
    }

    async fn max_remote_updated_at(
        &self,
        record_type: RecordType,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&record_type)
            .and_then(|m| m.values().map(|r| r.remote_updated_at).max()))
    }

    async fn insert_execution(&self, summary: &ExecutionSummary) -> Result<()> {
        self.executions.lock().unwrap().push(summary.clone());
        Ok(())
    }

    async fn finalize_execution(&self, summary: &ExecutionSummary) -> Result<()> {
        let mut executions = self.executions.lock().unwrap();
        match executions
            .iter_mut()
            .find(|s| s.execution_id == summary.execution_id)
        {
            Some(slot) => {
                *slot = summary.clone();
                Ok(())
            }
            None => Err(SyncError::Custom(format!(
                "finalize for unknown execution {}",
                summary.execution_id
            ))),
        }
    }

    async fn upsert_tickets(&self, tickets: &[TicketRecord]) -> Result<u64> {
        let mut map = self.tickets.lock().unwrap();
        for ticket in tickets {
            map.insert(ticket.key.clone(), ticket.clone());
        }
        Ok(tickets.len() as u64)
    }

    async fn referenced_missing_keys(&self, record_type: RecordType) -> Result<Vec<String>> {
        let present = self.records.lock().unwrap();
        let present = present.get(&record_type);
        let tickets = self.tickets.lock().unwrap();

        let mut missing: Vec<String> = tickets
            .values()
            .flat_map(|t| {
                t.reference_keys(record_type)
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|k| !present.is_some_and(|m| m.contains_key(k)))
            .collect();
        missing.sort();
        missing.dedup();
        Ok(missing)
    }
}

#[derive(Default)]
pub struct ScriptedRemote {
    records: Mutex<HashMap<RecordType, Vec<ReferenceRecord>>>,
    page_size: usize,
    requests: AtomicU64,
}

impl ScriptedRemote {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    pub fn seed(&self, record_type: RecordType, records: Vec<ReferenceRecord>) {
        self.records
            .lock()
            .unwrap()
            .entry(record_type)
            .or_default()
            .extend(records);
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn fetch_page(
        &self,
        record_type: RecordType,
        filter: &PageFilter,
        offset: u64,
    ) -> Result<RemotePage> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let records = self.records.lock().unwrap();
        let mut matching: Vec<ReferenceRecord> = records
            .get(&record_type)
            .map(|v| {
                v.iter()
                    .filter(|r| filter.active.is_none_or(|a| r.active == a))
                    .filter(|r| {
                        // Inclusive lower bound, as the real API contract
                        filter
                            .updated_since
                            .is_none_or(|since| r.remote_updated_at >= since)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by_key(|r| r.remote_updated_at);

        let start = (offset as usize).min(matching.len());
        let end = (start + self.page_size).min(matching.len());
        let page: Vec<ReferenceRecord> = matching[start..end].to_vec();
        let next_offset = (page.len() == self.page_size).then(|| offset + self.page_size as u64);

        Ok(RemotePage {
            records: page,
            next_offset,
        })
    }

    async fn fetch_by_keys(
        &self,
        record_type: RecordType,
        keys: &[String],
    ) -> Result<Vec<ReferenceRecord>> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let records = self.records.lock().unwrap();
        Ok(records
            .get(&record_type)
            .map(|v| {
                v.iter()
                    .filter(|r| keys.contains(&r.key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn metrics(&self) -> ApiMetrics {
        ApiMetrics {
            requests: self.requests.load(Ordering::Relaxed),
            failures: 0,
            time_secs: 0.0,
        }
    }
}
