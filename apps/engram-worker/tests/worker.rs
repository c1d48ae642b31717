use std::sync::Arc;

use serde_json::json;

use engram_domain::{MemoryRecord, RecordKind, meta};
use engram_providers::{DeterministicEmbedder, Embedder};
use engram_service::{EngramService, ReindexManager, ReindexQueue};
use engram_storage::{MemoryStore, VectorStore};
use engram_worker::{StoredTextBuilder, WorkerState};

const DIM: usize = 16;

fn service() -> Arc<EngramService> {
	let cfg = engram_testkit::memory_config(DIM as u32);
	let store =
		VectorStore::Memory(MemoryStore::open(&cfg.storage.memory).expect("open store"));
	let embedder =
		Embedder::Deterministic(DeterministicEmbedder::new(DIM, "deterministic".to_string()));

	Arc::new(EngramService::new(cfg, store, embedder))
}

fn state(service: Arc<EngramService>) -> (Arc<ReindexManager>, WorkerState) {
	let queue = Arc::new(ReindexQueue::new(100));
	let manager = Arc::new(ReindexManager::new(service.clone(), queue));
	let builder = Arc::new(StoredTextBuilder::new(service));

	(manager.clone(), WorkerState::new(manager, builder))
}

async fn seed_outdated_record(service: &EngramService, id: &str, text: &str) {
	let mut record = MemoryRecord::new(id, RecordKind::Test, text)
		.expect("valid record")
		.with_embedding(vec![0.25; DIM]);

	record.set_meta(meta::EMBEDDING_VERSION, json!("0::9::legacy"));

	let stored = service.store.upsert(&[record]).await.expect("upsert");

	assert_eq!(stored, 1);
}

#[tokio::test]
async fn a_tick_drains_queued_stale_records() {
	let service = service();
	let (manager, state) = state(service.clone());

	seed_outdated_record(&service, "a", "login via form").await;
	seed_outdated_record(&service, "b", "checkout flow").await;

	assert!(manager.check_and_queue_stale("a", RecordKind::Test, None).await.expect("queue"));
	assert!(manager.check_and_queue_stale("b", RecordKind::Test, None).await.expect("queue"));

	let processed = engram_worker::worker::drain_once(&state).await;

	assert_eq!(processed, 2);
	assert!(manager.queue().is_empty());

	for id in ["a", "b"] {
		let record = service.store.get(id).await.expect("get").expect("present");

		assert_eq!(
			record.meta_str(meta::EMBEDDING_VERSION),
			Some(service.current_version().to_string().as_str())
		);
		assert_eq!(service.check_staleness(id, None).await.expect("check"), None);
	}
}

#[tokio::test]
async fn a_sweep_finds_and_queues_stale_records() {
	let service = service();
	let (manager, state) = state(service.clone());

	seed_outdated_record(&service, "stale", "login via form").await;
	service
		.ingest(vec![MemoryRecord::new("fresh", RecordKind::Test, "export report")
			.expect("valid record")])
		.await
		.expect("ingest");

	let queued = engram_worker::worker::sweep_stale(&state).await.expect("sweep");

	assert_eq!(queued, 1);
	assert_eq!(manager.queue().get().expect("job").entity_id, "stale");
}

#[tokio::test]
async fn draining_an_empty_queue_is_a_quiet_no_op() {
	let (_, state) = state(service());

	assert_eq!(engram_worker::worker::drain_once(&state).await, 0);
}

#[tokio::test]
async fn drain_respects_the_process_batch_size() {
	let service = service();
	let (manager, state) = state(service.clone());
	let batch_size = service.cfg.reindex.queue.process_batch_size as usize;

	for i in 0..batch_size + 3 {
		seed_outdated_record(&service, &format!("r{i}"), &format!("record number {i}")).await;
		assert!(
			manager
				.check_and_queue_stale(&format!("r{i}"), RecordKind::Test, None)
				.await
				.expect("queue")
		);
	}

	let processed = engram_worker::worker::drain_once(&state).await;

	assert_eq!(processed, batch_size);
	assert_eq!(manager.queue().len(), 3);
}
