//! PostgreSQL-backed store tests
//!
//! Run against a scratch database:
//! `DESKSYNC_TEST_DATABASE_URL=postgresql://localhost/desksync_test \
//!  cargo test --test store_integration -- --ignored --nocapture`

use std::collections::BTreeMap;

use chrono::Utc;
use desksync::database::Database;
use desksync::database::LocalStore;
use desksync::models::RecordType;
use desksync::models::ReferenceRecord;
use desksync::models::TicketRecord;
use sqlx::PgPool;

async fn test_database() -> Database {
    let url = std::env::var("DESKSYNC_TEST_DATABASE_URL")
        .expect("DESKSYNC_TEST_DATABASE_URL must point at a scratch database");
    let pool = PgPool::connect(&url).await.expect("connect to test database");
    let database = Database::new(pool);
    database.init_schema().await.expect("init schema");
    database
}

fn record(key: &str, name: &str) -> ReferenceRecord {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), name.to_string());
    ReferenceRecord::new(key, true, fields, None, Utc::now())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (set DESKSYNC_TEST_DATABASE_URL)"]
async fn upsert_batch_roundtrip() {
    let database = test_database().await;

    let records = vec![record("it-user-1", "Ana"), record("it-user-2", "Bruno")];
    let written = database
        .upsert_batch(RecordType::User, &records)
        .await
        .unwrap();
    assert_eq!(written, 2);

    let keys: Vec<String> = records.iter().map(|r| r.key.clone()).collect();
    let stored = database.get_many(RecordType::User, &keys).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(
        stored["it-user-1"].fields.get("name").map(String::as_str),
        Some("Ana")
    );
    assert_eq!(stored["it-user-1"].fingerprint, records[0].fingerprint);

    // Re-upserting with changed content replaces the row
    let changed = record("it-user-1", "Ana Silva");
    database
        .upsert_batch(RecordType::User, &[changed.clone()])
        .await
        .unwrap();
    let reread = database
        .get(RecordType::User, "it-user-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reread.fingerprint, changed.fingerprint);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (set DESKSYNC_TEST_DATABASE_URL)"]
async fn missing_keys_and_high_water_mark() {
    let database = test_database().await;

    let rec = record("it-company-1", "Acme");
    database
        .upsert_batch(RecordType::Company, &[rec.clone()])
        .await
        .unwrap();

    let missing = database
        .filter_missing(
            RecordType::Company,
            &["it-company-1".to_string(), "it-company-ghost".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(missing, vec!["it-company-ghost".to_string()]);

    let high_water = database
        .max_remote_updated_at(RecordType::Company)
        .await
        .unwrap()
        .expect("at least one row");
    assert!(high_water >= rec.remote_updated_at - chrono::Duration::seconds(1));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (set DESKSYNC_TEST_DATABASE_URL)"]
async fn ticket_reference_scan_finds_absent_keys() {
    let database = test_database().await;

    database
        .upsert_batch(RecordType::User, &[record("it-user-present", "Ana")])
        .await
        .unwrap();

    let ticket = TicketRecord {
        key: "it-ticket-1".to_string(),
        caller_id: Some("it-user-present".to_string()),
        opened_by: Some("it-user-absent".to_string()),
        closed_at: Some(Utc::now()),
        ..TicketRecord::default()
    };
    database.upsert_tickets(&[ticket]).await.unwrap();

    let missing = database
        .referenced_missing_keys(RecordType::User)
        .await
        .unwrap();
    assert!(missing.contains(&"it-user-absent".to_string()));
    assert!(!missing.contains(&"it-user-present".to_string()));
}
