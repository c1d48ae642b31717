use std::{
	cmp::Ordering,
	collections::{BinaryHeap, HashSet},
	sync::{Arc, Condvar, Mutex, MutexGuard},
	time::{Duration, Instant},
};

use serde_json::{Map, json};

use engram_domain::{MemoryRecord, RecordKind, ReindexJob, ReindexReason};

use crate::{EngramService, ServiceResult, Staleness, TextBuilder};

/// Bounded priority queue of pending reindex jobs, safe for concurrent
/// producers and consumers. Highest priority first; first-in-first-out
/// within a priority class. An entity id stays in the seen set from enqueue
/// until its job is dequeued, so an entity has at most one pending job.
pub struct ReindexQueue {
	inner: Mutex<QueueInner>,
	available: Condvar,
	max_size: usize,
}

#[derive(Default)]
struct QueueInner {
	heap: BinaryHeap<QueueEntry>,
	seen: HashSet<String>,
	next_seq: u64,
}

struct QueueEntry {
	job: ReindexJob,
	seq: u64,
}
impl PartialEq for QueueEntry {
	fn eq(&self, other: &Self) -> bool {
		self.job.priority == other.job.priority && self.seq == other.seq
	}
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for QueueEntry {
	fn cmp(&self, other: &Self) -> Ordering {
		// Max-heap: higher priority wins, then the lower sequence number.
		self.job.priority.cmp(&other.job.priority).then_with(|| other.seq.cmp(&self.seq))
	}
}

impl ReindexQueue {
	pub fn new(max_size: usize) -> Self {
		Self { inner: Mutex::new(QueueInner::default()), available: Condvar::new(), max_size }
	}

	pub fn from_config(cfg: &engram_config::ReindexQueueConfig) -> Self {
		Self::new(cfg.max_size as usize)
	}

	/// False when the entity already has a pending job or the queue is at
	/// capacity.
	pub fn add(&self, job: ReindexJob) -> bool {
		let mut inner = self.lock();

		if inner.seen.contains(&job.entity_id) {
			tracing::debug!(entity_id = %job.entity_id, "Reindex job already pending.");

			return false;
		}
		if inner.heap.len() >= self.max_size {
			tracing::warn!(entity_id = %job.entity_id, max_size = self.max_size, "Reindex queue full.");

			return false;
		}

		inner.seen.insert(job.entity_id.clone());

		let seq = inner.next_seq;

		inner.next_seq += 1;
		inner.heap.push(QueueEntry { job, seq });

		self.available.notify_one();

		true
	}

	pub fn get(&self) -> Option<ReindexJob> {
		Self::pop(&mut self.lock())
	}

	/// Blocks up to `timeout` for a job to become available.
	pub fn get_timeout(&self, timeout: Duration) -> Option<ReindexJob> {
		let deadline = Instant::now() + timeout;
		let mut inner = self.lock();

		loop {
			if let Some(job) = Self::pop(&mut inner) {
				return Some(job);
			}

			let remaining = deadline.checked_duration_since(Instant::now())?;
			let (guard, result) = self
				.available
				.wait_timeout(inner, remaining)
				.unwrap_or_else(|err| err.into_inner());

			inner = guard;

			if result.timed_out() {
				return Self::pop(&mut inner);
			}
		}
	}

	pub fn len(&self) -> usize {
		self.lock().heap.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().heap.is_empty()
	}

	/// Drops every pending job and forgets every seen id.
	pub fn clear(&self) {
		let mut inner = self.lock();

		inner.heap.clear();
		inner.seen.clear();
	}

	fn pop(inner: &mut QueueInner) -> Option<ReindexJob> {
		let entry = inner.heap.pop()?;

		// The id leaves the seen set with its job, so the entity can be
		// queued again once this job is out of the queue.
		inner.seen.remove(&entry.job.entity_id);

		Some(entry.job)
	}

	fn lock(&self) -> MutexGuard<'_, QueueInner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// Schedules re-embedding work: maps staleness and drift verdicts to
/// prioritized jobs and drains them back through the ingestion pipeline.
pub struct ReindexManager {
	service: Arc<EngramService>,
	queue: Arc<ReindexQueue>,
}
impl ReindexManager {
	pub fn new(service: Arc<EngramService>, queue: Arc<ReindexQueue>) -> Self {
		Self { service, queue }
	}

	pub fn queue(&self) -> &Arc<ReindexQueue> {
		&self.queue
	}

	pub fn service(&self) -> &EngramService {
		&self.service
	}

	/// Runs the staleness detector and enqueues a job for the first
	/// matching reason. Returns whether a job was actually enqueued.
	pub async fn check_and_queue_stale(
		&self,
		id: &str,
		kind: RecordKind,
		current_text: Option<&str>,
	) -> ServiceResult<bool> {
		let Some(staleness) = self.service.check_staleness(id, current_text).await? else {
			return Ok(false);
		};
		let reason = ReindexReason::from(staleness.reason());
		let mut metadata = Map::new();

		match &staleness {
			Staleness::VersionMismatch { stored, expected } => {
				metadata.insert("stored_version".to_string(), json!(stored));
				metadata.insert("expected_version".to_string(), json!(expected));
			},
			Staleness::AgeThreshold { age_days } => {
				metadata.insert("age_days".to_string(), json!(age_days));
			},
			_ => {},
		}

		let job =
			ReindexJob::new(id, kind, reason, self.priority_for(reason)).with_metadata(metadata);

		Ok(self.queue.add(job))
	}

	/// Enqueues a drift-triggered job, recording the observed similarity.
	pub fn queue_for_drift(&self, id: &str, kind: RecordKind, similarity: f32) -> bool {
		let reason = ReindexReason::DriftDetected;
		let mut metadata = Map::new();

		metadata.insert("similarity".to_string(), json!(similarity));

		let job =
			ReindexJob::new(id, kind, reason, self.priority_for(reason)).with_metadata(metadata);

		self.queue.add(job)
	}

	pub fn queue_manual(&self, id: &str, kind: RecordKind) -> bool {
		let reason = ReindexReason::ManualRequest;

		self.queue.add(ReindexJob::new(id, kind, reason, self.priority_for(reason)))
	}

	pub fn priority_for(&self, reason: ReindexReason) -> u8 {
		let priorities = &self.service.cfg.reindex.priorities;

		match reason {
			ReindexReason::VersionMismatch => priorities.version_mismatch,
			ReindexReason::DriftDetected => priorities.drift_detected,
			ReindexReason::ManualRequest => priorities.manual_request,
			ReindexReason::ManualStale => priorities.manual_stale,
			ReindexReason::ContentChanged => priorities.content_changed,
			ReindexReason::NoEmbedding => priorities.no_embedding,
			ReindexReason::NoVersion => priorities.no_version,
			ReindexReason::AgeThreshold => priorities.age_threshold,
		}
	}

	/// Dequeues one job and re-runs ingestion for its entity. Returns false
	/// only when the queue is empty. An entity that vanished between
	/// enqueue and processing is logged and counted as processed.
	pub async fn process_next_job(&self, builder: &dyn TextBuilder) -> ServiceResult<bool> {
		let Some(job) = self.queue.get() else {
			return Ok(false);
		};

		tracing::info!(
			entity_id = %job.entity_id,
			reason = job.reason.as_str(),
			priority = job.priority,
			"Processing reindex job.",
		);

		let Some(entity) = builder.fetch(job.entity_kind, &job.entity_id).await? else {
			tracing::warn!(entity_id = %job.entity_id, "Entity vanished before reindexing.");

			return Ok(true);
		};
		let text = builder.render(job.entity_kind, &entity)?;
		let mut record = MemoryRecord::new(job.entity_id.clone(), job.entity_kind, text)?;

		if let Some(existing) = self.service.store.get(&job.entity_id).await? {
			record.created_at = existing.created_at;
			record.metadata = existing.metadata;
		}

		for (key, value) in &entity {
			if key == "id" || key == "text" {
				continue;
			}

			record.metadata.insert(key.clone(), value.clone());
		}

		let stored = self.service.ingest(vec![record]).await?;

		if stored == 0 {
			tracing::warn!(entity_id = %job.entity_id, "Reindex ingestion stored nothing.");
		}

		Ok(true)
	}
}
