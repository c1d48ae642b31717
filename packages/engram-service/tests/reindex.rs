use std::{
	collections::HashMap,
	sync::Arc,
	thread,
	time::Duration as StdDuration,
};

use serde_json::{Map, Value, json};

use engram_domain::{
	MemoryRecord, RecordKind, ReindexJob, ReindexReason, fingerprint, meta,
};
use engram_providers::{Embedder, FixedEmbedder};
use engram_service::{
	BoxFuture, EngramService, ReindexManager, ReindexQueue, ServiceResult, TextBuilder,
};
use engram_storage::{MemoryStore, VectorStore};

fn job(id: &str, reason: ReindexReason, priority: u8) -> ReindexJob {
	ReindexJob::new(id, RecordKind::Test, reason, priority)
}

fn service(fixtures: &[(&str, Vec<f32>)]) -> Arc<EngramService> {
	let vectors =
		fixtures.iter().map(|(text, vec)| (text.to_string(), vec.clone())).collect::<HashMap<_, _>>();
	let cfg = engram_testkit::memory_config(3);
	let store =
		VectorStore::Memory(MemoryStore::open(&cfg.storage.memory).expect("open store"));

	Arc::new(EngramService::new(cfg, store, Embedder::Fixed(FixedEmbedder::new(3, vectors))))
}

fn manager(service: Arc<EngramService>, max_size: usize) -> ReindexManager {
	ReindexManager::new(service, Arc::new(ReindexQueue::new(max_size)))
}

/// Text builder over a fixed entity table, the shape an external entity
/// source would have.
struct TableBuilder {
	entities: HashMap<String, Map<String, Value>>,
}
impl TableBuilder {
	fn with(entries: &[(&str, &str)]) -> Self {
		let entities = entries
			.iter()
			.map(|(id, text)| {
				let mut entity = Map::new();

				entity.insert("id".to_string(), json!(id));
				entity.insert("text".to_string(), json!(text));

				(id.to_string(), entity)
			})
			.collect();

		Self { entities }
	}
}
impl TextBuilder for TableBuilder {
	fn render(&self, _kind: RecordKind, entity: &Map<String, Value>) -> ServiceResult<String> {
		Ok(entity.get("text").and_then(|value| value.as_str()).unwrap_or_default().to_string())
	}

	fn fetch<'a>(
		&'a self,
		_kind: RecordKind,
		entity_id: &'a str,
	) -> BoxFuture<'a, ServiceResult<Option<Map<String, Value>>>> {
		Box::pin(async move { Ok(self.entities.get(entity_id).cloned()) })
	}
}

#[test]
fn duplicate_entity_ids_are_rejected_while_pending() {
	let queue = ReindexQueue::new(10);

	assert!(queue.add(job("a", ReindexReason::VersionMismatch, 80)));
	assert!(!queue.add(job("a", ReindexReason::ManualRequest, 70)));
	assert_eq!(queue.len(), 1);
}

#[test]
fn jobs_drain_in_priority_order() {
	let queue = ReindexQueue::new(10);

	assert!(queue.add(job("low", ReindexReason::AgeThreshold, 30)));
	assert!(queue.add(job("high", ReindexReason::VersionMismatch, 80)));
	assert!(queue.add(job("mid", ReindexReason::DriftDetected, 70)));

	let order: Vec<String> =
		std::iter::from_fn(|| queue.get()).map(|job| job.entity_id).collect();

	assert_eq!(order, vec!["high", "mid", "low"]);
}

#[test]
fn equal_priorities_drain_first_in_first_out() {
	let queue = ReindexQueue::new(10);

	for id in ["first", "second", "third"] {
		assert!(queue.add(job(id, ReindexReason::ManualRequest, 70)));
	}

	let order: Vec<String> =
		std::iter::from_fn(|| queue.get()).map(|job| job.entity_id).collect();

	assert_eq!(order, vec!["first", "second", "third"]);
}

#[test]
fn capacity_overflow_is_rejected() {
	let queue = ReindexQueue::new(2);

	assert!(queue.add(job("a", ReindexReason::ManualRequest, 70)));
	assert!(queue.add(job("b", ReindexReason::ManualRequest, 70)));
	assert!(!queue.add(job("c", ReindexReason::ManualRequest, 70)));
}

#[test]
fn dequeued_entities_may_be_queued_again() {
	let queue = ReindexQueue::new(10);

	assert!(queue.add(job("a", ReindexReason::ContentChanged, 60)));
	assert_eq!(queue.get().expect("job").entity_id, "a");
	assert!(queue.add(job("a", ReindexReason::ContentChanged, 60)));
}

#[test]
fn clear_forgets_jobs_and_seen_ids() {
	let queue = ReindexQueue::new(10);

	assert!(queue.add(job("a", ReindexReason::ManualRequest, 70)));
	queue.clear();
	assert!(queue.is_empty());
	assert!(queue.add(job("a", ReindexReason::ManualRequest, 70)));
}

#[test]
fn get_timeout_expires_on_an_empty_queue() {
	let queue = ReindexQueue::new(10);

	assert!(queue.get_timeout(StdDuration::from_millis(20)).is_none());
}

#[test]
fn get_timeout_wakes_up_for_a_concurrent_add() {
	let queue = Arc::new(ReindexQueue::new(10));
	let producer = {
		let queue = queue.clone();

		thread::spawn(move || {
			thread::sleep(StdDuration::from_millis(20));
			queue.add(job("a", ReindexReason::ManualRequest, 70));
		})
	};
	let received = queue.get_timeout(StdDuration::from_secs(5));

	producer.join().expect("producer thread");
	assert_eq!(received.expect("job").entity_id, "a");
}

#[test]
fn concurrent_producers_and_consumers_drain_cleanly() {
	let queue = Arc::new(ReindexQueue::new(1_000));
	let producers: Vec<_> = (0..4)
		.map(|worker| {
			let queue = queue.clone();

			thread::spawn(move || {
				for i in 0..50 {
					queue.add(job(
						&format!("w{worker}-{i}"),
						ReindexReason::ManualRequest,
						70,
					));
				}
			})
		})
		.collect();

	for producer in producers {
		producer.join().expect("producer thread");
	}

	let consumers: Vec<_> = (0..4)
		.map(|_| {
			let queue = queue.clone();

			thread::spawn(move || std::iter::from_fn(|| queue.get()).count())
		})
		.collect();
	let drained: usize = consumers.into_iter().map(|c| c.join().expect("consumer")).sum();

	assert_eq!(drained, 200);
	assert!(queue.is_empty());
}

#[tokio::test]
async fn stale_records_are_queued_with_configured_priorities() {
	let service = service(&[]);
	let manager = manager(service.clone(), 10);
	let mut record = MemoryRecord::new("a", RecordKind::Test, "login")
		.expect("valid record")
		.with_embedding(vec![1.0, 0.0, 0.0]);

	record.set_meta(meta::EMBEDDING_VERSION, json!("0::9::legacy"));
	record.set_meta(meta::FINGERPRINT, json!(fingerprint::compute("login")));
	service.store.upsert(&[record]).await.expect("upsert");

	assert!(manager.check_and_queue_stale("a", RecordKind::Test, None).await.expect("queue"));
	// The job is pending, so a second detection does not enqueue another.
	assert!(!manager.check_and_queue_stale("a", RecordKind::Test, None).await.expect("queue"));

	let queued = manager.queue().get().expect("job");

	assert_eq!(queued.reason, ReindexReason::VersionMismatch);
	assert_eq!(queued.priority, 80);
	assert_eq!(queued.metadata.get("stored_version"), Some(&json!("0::9::legacy")));
}

#[tokio::test]
async fn fresh_records_are_not_queued() {
	let service = service(&[("login", vec![1.0, 0.0, 0.0])]);
	let manager = manager(service.clone(), 10);

	service
		.ingest(vec![MemoryRecord::new("a", RecordKind::Test, "login").expect("valid record")])
		.await
		.expect("ingest");

	assert!(!manager.check_and_queue_stale("a", RecordKind::Test, None).await.expect("queue"));
	assert!(manager.queue().is_empty());
}

#[tokio::test]
async fn drift_jobs_record_the_observed_similarity() {
	let service = service(&[]);
	let manager = manager(service, 10);

	assert!(manager.queue_for_drift("a", RecordKind::Scenario, 0.42));

	let job = manager.queue().get().expect("job");

	assert_eq!(job.reason, ReindexReason::DriftDetected);
	assert_eq!(job.priority, 70);
	assert_eq!(job.metadata.get("similarity"), Some(&json!(0.42_f32)));
}

#[tokio::test]
async fn processing_an_empty_queue_reports_idle() {
	let service = service(&[]);
	let manager = manager(service, 10);
	let builder = TableBuilder::with(&[]);

	assert!(!manager.process_next_job(&builder).await.expect("process"));
}

#[tokio::test]
async fn processing_reingests_the_entity_and_freshens_it() {
	let service = service(&[("login reworked", vec![0.0, 1.0, 0.0])]);
	let manager = manager(service.clone(), 10);
	let mut record = MemoryRecord::new("a", RecordKind::Test, "login")
		.expect("valid record")
		.with_embedding(vec![1.0, 0.0, 0.0]);

	record.set_meta(meta::EMBEDDING_VERSION, json!("0::9::legacy"));
	record.set_meta("framework", json!("playwright"));
	service.store.upsert(&[record]).await.expect("upsert");

	assert!(manager.check_and_queue_stale("a", RecordKind::Test, None).await.expect("queue"));

	let builder = TableBuilder::with(&[("a", "login reworked")]);

	assert!(manager.process_next_job(&builder).await.expect("process"));
	assert!(manager.queue().is_empty());

	let refreshed = service.store.get("a").await.expect("get").expect("present");

	assert_eq!(refreshed.text, "login reworked");
	assert_eq!(refreshed.embedding, Some(vec![0.0, 1.0, 0.0]));
	assert_eq!(
		refreshed.meta_str(meta::EMBEDDING_VERSION),
		Some(service.current_version().to_string().as_str())
	);
	// Caller metadata survives the round trip.
	assert_eq!(refreshed.meta_str("framework"), Some("playwright"));
	assert_eq!(service.check_staleness("a", None).await.expect("check"), None);
}

#[tokio::test]
async fn vanished_entities_count_as_processed() {
	let service = service(&[]);
	let manager = manager(service, 10);

	assert!(manager.queue_manual("ghost", RecordKind::Test));

	let builder = TableBuilder::with(&[]);

	assert!(manager.process_next_job(&builder).await.expect("process"));
	assert!(manager.queue().is_empty());
}
