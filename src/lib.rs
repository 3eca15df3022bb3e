//! `desksync` - ServiceDesk data synchronization and extraction
//!
//! `desksync` pulls records from a ServiceDesk-style ticketing platform's
//! REST API, reconciles them against a local `PostgreSQL` store, and logs
//! execution metrics. The core is an incremental reference-data sync engine:
//! users, companies and departments are fingerprinted, diffed against local
//! state by key, and only the delta is written, in fixed-size atomic batches.
//!
//! # Architecture
//!
//! - `fingerprint`: canonical content hash used as the change-detection
//!   equality proxy
//! - `database`: the local store ([`LocalStore`] trait + `sqlx` PostgreSQL
//!   implementation)
//! - `sync`: the remote API client, change-detection engine,
//!   missing-reference resolver and execution ledger
//! - `extract`: closed-ticket extraction and the legacy wide-record shim
//! - `cli`: command dispatcher
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use desksync::database::LocalStore;
//! use desksync::models::{RecordType, SyncCursor, SyncMode};
//! use desksync::sync::{ExecutionLedger, ServiceDeskClient, SyncEngine};
//! use desksync::{AppConfig, Database};
//!
//! # async fn example() -> desksync::Result<()> {
//! let config = AppConfig::load()?;
//! let store: Arc<dyn LocalStore> = Arc::new(Database::from_config(&config).await?);
//! let client = Arc::new(ServiceDeskClient::from_config(&config)?);
//!
//! let engine = SyncEngine::new(store.clone(), client, &config.sync);
//! let mut ledger = ExecutionLedger::begin(store.clone(), "incremental-sync").await?;
//!
//! let cursor = SyncCursor::new(store.max_remote_updated_at(RecordType::User).await?)
//!     .with_overlap(config.cursor_overlap_secs());
//! let report = engine
//!     .synchronize(RecordType::User, SyncMode::Incremental, cursor, &mut ledger)
//!     .await?;
//! println!("{} users updated", report.updated);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod extract;
pub mod fingerprint;
pub mod logging;
pub mod models;
pub mod sync;

pub use config::AppConfig;
pub use database::Database;
pub use database::LocalStore;
pub use errors::Result;
pub use errors::SyncError;
