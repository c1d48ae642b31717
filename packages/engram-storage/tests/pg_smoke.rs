//! Postgres backend smoke tests. They need a reachable server with the
//! pgvector extension; set `ENGRAM_PG_DSN` to run them.

use std::env;

use serde_json::json;

use engram_domain::{MemoryRecord, RecordKind, meta};
use engram_storage::{PgStore, RecordFilter};
use engram_testkit::{PG_DSN_ENV, TestDatabase};

fn base_dsn() -> Option<String> {
	match env::var(PG_DSN_ENV) {
		Ok(dsn) if !dsn.trim().is_empty() => Some(dsn),
		_ => {
			eprintln!("{PG_DSN_ENV} is unset; skipping Postgres smoke test.");

			None
		},
	}
}

fn record(id: &str, kind: RecordKind, text: &str, embedding: Vec<f32>) -> MemoryRecord {
	MemoryRecord::new(id, kind, text).expect("valid record").with_embedding(embedding)
}

async fn connect(db: &TestDatabase, schema_mode: &str) -> PgStore {
	let cfg = engram_config::Postgres {
		dsn: db.dsn().to_string(),
		pool_max_conns: 2,
		schema_mode: schema_mode.to_string(),
	};
	let store = PgStore::connect(&cfg, 3).await.expect("connect");

	store.ensure_schema().await.expect("ensure schema");

	store
}

#[tokio::test]
async fn round_trips_records_and_ranks_by_cosine() {
	let Some(dsn) = base_dsn() else {
		return;
	};
	let db = TestDatabase::new(&dsn).await.expect("create test database");
	let store = connect(&db, "columns").await;
	let mut tagged = record("a", RecordKind::Test, "login via form", vec![1.0, 0.0, 0.0]);

	tagged.set_meta("framework", json!("playwright"));
	tagged.set_meta(meta::EMBEDDING_VERSION, json!("1::1::det"));
	tagged.set_meta(meta::FINGERPRINT, json!("f00"));

	let stored = store
		.upsert(&[
			tagged,
			record("b", RecordKind::Test, "login via sso", vec![0.999, 0.045, 0.0]),
			record("c", RecordKind::Test, "export report", vec![0.0, 1.0, 0.0]),
		])
		.await
		.expect("upsert");

	assert_eq!(stored, 3);

	// Annotations written through columns come back merged into metadata.
	let restored = store.get("a").await.expect("get").expect("record present");

	assert_eq!(restored.meta_str(meta::EMBEDDING_VERSION), Some("1::1::det"));
	assert_eq!(restored.meta_str(meta::FINGERPRINT), Some("f00"));
	assert_eq!(restored.meta_str("framework"), Some("playwright"));

	let results = store.query(&[1.0, 0.0, 0.0], 3, None).await.expect("query");

	assert_eq!(results.len(), 3);
	assert_eq!(results[0].record.id, "a");
	assert_eq!(results[1].record.id, "b");
	assert_eq!(results[2].record.id, "c");
	assert!((results[1].score - 0.999).abs() < 1e-3);
	assert!(results[2].score.abs() < 1e-5);

	let filter = RecordFilter::by_metadata("framework", "playwright");

	assert_eq!(store.count(Some(&filter)).await.expect("count"), 1);
	assert_eq!(store.list_ids(None).await.expect("list"), vec!["a", "b", "c"]);

	let removed = store.delete(&["a".to_string()]).await.expect("delete");

	assert_eq!(removed, 1);
	assert_eq!(store.count(None).await.expect("count"), 2);

	db.cleanup().await.expect("cleanup");
}

#[tokio::test]
async fn metadata_schema_mode_keeps_annotations_in_the_blob() {
	let Some(dsn) = base_dsn() else {
		return;
	};
	let db = TestDatabase::new(&dsn).await.expect("create test database");
	let store = connect(&db, "metadata").await;
	let mut annotated = record("a", RecordKind::Failure, "timeout on submit", vec![0.0, 0.6, 0.8]);

	annotated.set_meta(meta::EMBEDDING_VERSION, json!("1::1::det"));
	annotated.set_meta(meta::MANUALLY_STALE, json!(true));

	store.upsert(&[annotated]).await.expect("upsert");

	let restored = store.get("a").await.expect("get").expect("record present");

	assert_eq!(restored.meta_str(meta::EMBEDDING_VERSION), Some("1::1::det"));
	assert!(restored.meta_bool(meta::MANUALLY_STALE));

	db.cleanup().await.expect("cleanup");
}

#[tokio::test]
async fn ensure_schema_is_idempotent() {
	let Some(dsn) = base_dsn() else {
		return;
	};
	let db = TestDatabase::new(&dsn).await.expect("create test database");
	let store = connect(&db, "columns").await;

	store.ensure_schema().await.expect("second ensure_schema");

	db.cleanup().await.expect("cleanup");
}
