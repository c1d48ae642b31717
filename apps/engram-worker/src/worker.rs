use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use serde_json::{Map, Value, json};
use tokio::{task::JoinSet, time as tokio_time};

use engram_domain::RecordKind;
use engram_service::{
	BoxFuture, EngramService, ReindexManager, ServiceError, ServiceResult, TextBuilder,
};

/// Rebuilds the embeddable text of a record from what the store already
/// holds. This covers the common reindex triggers (version bumps, age,
/// drift), where the entity text is unchanged and only the vector is stale.
pub struct StoredTextBuilder {
	service: Arc<EngramService>,
}
impl StoredTextBuilder {
	pub fn new(service: Arc<EngramService>) -> Self {
		Self { service }
	}
}
impl TextBuilder for StoredTextBuilder {
	fn render(&self, _kind: RecordKind, entity: &Map<String, Value>) -> ServiceResult<String> {
		entity
			.get("text")
			.and_then(|value| value.as_str())
			.filter(|text| !text.trim().is_empty())
			.map(str::to_string)
			.ok_or_else(|| ServiceError::InvalidRequest {
				message: "Entity has no text to rebuild from.".to_string(),
			})
	}

	fn fetch<'a>(
		&'a self,
		_kind: RecordKind,
		entity_id: &'a str,
	) -> BoxFuture<'a, ServiceResult<Option<Map<String, Value>>>> {
		Box::pin(async move {
			let Some(record) = self.service.store.get(entity_id).await? else {
				return Ok(None);
			};
			let mut entity = Map::new();

			entity.insert("id".to_string(), json!(record.id));
			entity.insert("text".to_string(), json!(record.text));

			Ok(Some(entity))
		})
	}
}

pub struct WorkerState {
	manager: Arc<ReindexManager>,
	builder: Arc<dyn TextBuilder>,
}
impl WorkerState {
	pub fn new(manager: Arc<ReindexManager>, builder: Arc<dyn TextBuilder>) -> Self {
		Self { manager, builder }
	}
}

pub async fn run_worker(state: WorkerState) -> color_eyre::Result<()> {
	let worker_cfg = &state.manager.service().cfg.reindex.worker;
	let interval = Duration::from_secs(worker_cfg.interval_seconds);
	let sweep_interval = Duration::from_secs(worker_cfg.sweep_interval_seconds);
	let mut last_sweep = Instant::now();

	tracing::info!(
		interval_seconds = worker_cfg.interval_seconds,
		sweep_interval_seconds = worker_cfg.sweep_interval_seconds,
		"Reindex worker started.",
	);

	loop {
		let processed = drain_once(&state).await;

		if processed > 0 {
			tracing::info!(processed, "Drained reindex jobs.");
		}

		if last_sweep.elapsed() >= sweep_interval {
			match sweep_stale(&state).await {
				Ok(queued) => {
					if queued > 0 {
						tracing::info!(queued, "Staleness sweep queued records.");
					}

					last_sweep = Instant::now();
				},
				Err(err) => tracing::error!(error = %err, "Staleness sweep failed."),
			}
		}

		tokio_time::sleep(interval).await;
	}
}

/// Processes up to `process_batch_size` jobs with at most
/// `max_concurrent_jobs` in flight. Job failures are logged; they never
/// stop the drain.
pub async fn drain_once(state: &WorkerState) -> usize {
	let cfg = &state.manager.service().cfg.reindex;
	let batch_size = cfg.queue.process_batch_size as usize;
	let max_concurrent = cfg.worker.max_concurrent_jobs as usize;
	let mut join_set: JoinSet<ServiceResult<bool>> = JoinSet::new();
	let mut issued = 0;
	let mut processed = 0;

	loop {
		while join_set.len() < max_concurrent && issued < batch_size {
			let manager = state.manager.clone();
			let builder = state.builder.clone();

			join_set.spawn(async move { manager.process_next_job(builder.as_ref()).await });

			issued += 1;
		}

		match join_set.join_next().await {
			None => break,
			Some(Ok(Ok(true))) => processed += 1,
			// The queue ran dry; let the in-flight jobs finish without
			// issuing more.
			Some(Ok(Ok(false))) => issued = batch_size,
			Some(Ok(Err(err))) => tracing::error!(error = %err, "Reindex job failed."),
			Some(Err(err)) => tracing::error!(error = %err, "Reindex task panicked."),
		}
	}

	processed
}

/// Walks every stored id through the staleness detector and queues what it
/// flags.
pub async fn sweep_stale(state: &WorkerState) -> ServiceResult<usize> {
	let service = state.manager.service();
	let ids = service.store.list_ids(None).await?;
	let mut queued = 0;

	for id in ids {
		let Some(record) = service.store.get(&id).await? else {
			continue;
		};

		if state.manager.check_and_queue_stale(&id, record.kind, None).await? {
			queued += 1;
		}
	}

	Ok(queued)
}
