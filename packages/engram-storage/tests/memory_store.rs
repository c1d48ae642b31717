use serde_json::json;

use engram_domain::{MemoryRecord, RecordKind};
use engram_storage::{MemoryStore, RecordFilter};

fn store() -> MemoryStore {
	MemoryStore::open(&engram_config::MemoryBackend::default()).expect("open store")
}

fn record(id: &str, kind: RecordKind, text: &str, embedding: Vec<f32>) -> MemoryRecord {
	MemoryRecord::new(id, kind, text).expect("valid record").with_embedding(embedding)
}

#[test]
fn upsert_skips_records_without_embedding() {
	let store = store();
	let with_vector = record("a", RecordKind::Test, "login test", vec![1.0, 0.0]);
	let without_vector = MemoryRecord::new("b", RecordKind::Test, "logout test").expect("valid");
	let stored = store.upsert(&[with_vector, without_vector]).expect("upsert");

	assert_eq!(stored, 1);
	assert_eq!(store.count(None).expect("count"), 1);
	assert!(store.get("b").expect("get").is_none());
}

#[test]
fn query_ranks_by_cosine_similarity() {
	let store = store();

	store
		.upsert(&[
			record("a", RecordKind::Test, "login via form", vec![1.0, 0.0, 0.0]),
			record("b", RecordKind::Test, "login via sso", vec![0.999, 0.045, 0.0]),
			record("c", RecordKind::Test, "export report", vec![0.0, 1.0, 0.0]),
		])
		.expect("upsert");

	let results = store.query(&[1.0, 0.0, 0.0], 3, None).expect("query");

	assert_eq!(results.len(), 3);
	assert_eq!(results[0].record.id, "a");
	assert_eq!(results[1].record.id, "b");
	assert_eq!(results[2].record.id, "c");
	assert!((results[0].score - 1.0).abs() < 1e-5);
	assert!((results[1].score - 0.999).abs() < 1e-3);
	assert!(results[2].score.abs() < 1e-6);
}

#[test]
fn query_breaks_ties_by_id() {
	let store = store();

	store
		.upsert(&[
			record("beta", RecordKind::Step, "click submit", vec![1.0, 0.0]),
			record("alpha", RecordKind::Step, "press submit", vec![2.0, 0.0]),
		])
		.expect("upsert");

	let results = store.query(&[1.0, 0.0], 2, None).expect("query");

	assert_eq!(results[0].record.id, "alpha");
	assert_eq!(results[1].record.id, "beta");
}

#[test]
fn filters_apply_before_the_top_k_cut() {
	let store = store();

	store
		.upsert(&[
			record("a", RecordKind::Test, "login", vec![1.0, 0.0]),
			record("b", RecordKind::Failure, "login timeout", vec![0.99, 0.14]),
			record("c", RecordKind::Failure, "checkout timeout", vec![0.5, 0.86]),
		])
		.expect("upsert");

	let filter = RecordFilter::by_kinds(vec![RecordKind::Failure]);
	let results = store.query(&[1.0, 0.0], 1, Some(&filter)).expect("query");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].record.id, "b");
}

#[test]
fn filters_match_metadata_equality() {
	let store = store();
	let mut tagged = record("a", RecordKind::Test, "login", vec![1.0, 0.0]);

	tagged.set_meta("framework", json!("playwright"));

	let mut other = record("b", RecordKind::Test, "login again", vec![1.0, 0.0]);

	other.set_meta("framework", json!("cypress"));

	store.upsert(&[tagged, other]).expect("upsert");

	let filter = RecordFilter::by_metadata("framework", "playwright");
	let results = store.query(&[1.0, 0.0], 10, Some(&filter)).expect("query");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].record.id, "a");
	assert_eq!(store.count(Some(&filter)).expect("count"), 1);
}

#[test]
fn delete_is_logically_immediate() {
	let store = store();

	store
		.upsert(&[
			record("a", RecordKind::Test, "login", vec![1.0, 0.0]),
			record("b", RecordKind::Test, "logout", vec![0.9, 0.44]),
		])
		.expect("upsert");

	let removed = store.delete(&["a".to_string(), "missing".to_string()]).expect("delete");

	assert_eq!(removed, 1);
	assert!(store.get("a").expect("get").is_none());

	let results = store.query(&[1.0, 0.0], 10, None).expect("query");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].record.id, "b");
}

#[test]
fn rebuild_reclaims_dead_index_entries() {
	let store = store();

	store
		.upsert(&[record("a", RecordKind::Test, "login", vec![1.0, 0.0])])
		.expect("upsert");
	// Overwrite and delete both leave tombstones behind.
	store
		.upsert(&[record("a", RecordKind::Test, "login v2", vec![0.0, 1.0])])
		.expect("upsert");
	store
		.upsert(&[record("b", RecordKind::Test, "logout", vec![1.0, 0.0])])
		.expect("upsert");
	store.delete(&["b".to_string()]).expect("delete");

	assert_eq!(store.index_len(), 3);

	store.rebuild();

	assert_eq!(store.index_len(), 1);

	let results = store.query(&[0.0, 1.0], 10, None).expect("query");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].record.text, "login v2");
}

#[test]
fn overwrite_is_last_writer_wins() {
	let store = store();

	store
		.upsert(&[record("a", RecordKind::Test, "login", vec![1.0, 0.0])])
		.expect("upsert");
	store
		.upsert(&[record("a", RecordKind::Test, "login reworked", vec![0.0, 1.0])])
		.expect("upsert");

	let results = store.query(&[0.0, 1.0], 10, None).expect("query");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].record.text, "login reworked");
	assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn delete_then_reinsert_does_not_resurrect_tombstones() {
	let store = store();

	store
		.upsert(&[record("a", RecordKind::Test, "login", vec![1.0, 0.0])])
		.expect("upsert");
	store.delete(&["a".to_string()]).expect("delete");
	store
		.upsert(&[record("a", RecordKind::Test, "login again", vec![1.0, 0.0])])
		.expect("reinsert");

	let results = store.query(&[1.0, 0.0], 10, None).expect("query");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].record.text, "login again");
}

#[test]
fn snapshot_round_trips_through_disk() {
	let dir = tempfile::tempdir().expect("tempdir");
	let path = dir.path().join("engram-snapshot.json");
	let cfg = engram_config::MemoryBackend { snapshot_path: Some(path.clone()) };
	let store = MemoryStore::open(&cfg).expect("open");
	let mut tagged = record("a", RecordKind::Scenario, "checkout flow", vec![0.6, 0.8]);

	tagged.set_meta("framework", json!("playwright"));

	store.upsert(&[tagged]).expect("upsert");
	store.snapshot().expect("snapshot");

	let reloaded = MemoryStore::open(&cfg).expect("reload");
	let restored = reloaded.get("a").expect("get").expect("record present");

	assert_eq!(restored.text, "checkout flow");
	assert_eq!(restored.meta_str("framework"), Some("playwright"));
	assert_eq!(restored.embedding, Some(vec![0.6, 0.8]));

	let results = reloaded.query(&[0.6, 0.8], 1, None).expect("query");

	assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn snapshot_without_path_is_an_error() {
	assert!(store().snapshot().is_err());
}

#[test]
fn list_ids_is_sorted_and_filtered() {
	let store = store();

	store
		.upsert(&[
			record("b", RecordKind::Test, "login", vec![1.0, 0.0]),
			record("a", RecordKind::Failure, "timeout", vec![0.0, 1.0]),
			record("c", RecordKind::Test, "logout", vec![0.5, 0.5]),
		])
		.expect("upsert");

	assert_eq!(store.list_ids(None).expect("list"), vec!["a", "b", "c"]);

	let filter = RecordFilter::by_kinds(vec![RecordKind::Test]);

	assert_eq!(store.list_ids(Some(&filter)).expect("list"), vec!["b", "c"]);
}
