mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Drift, EmbeddingVersionConfig, Ingest, MemoryBackend, Postgres, Provider, Reindex,
	ReindexPriorities, ReindexQueueConfig, ReindexWorker, Search, Service, Staleness, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(validation("service.log_level must be non-empty."));
	}
	if !matches!(cfg.storage.backend.as_str(), "memory" | "postgres") {
		return Err(validation("storage.backend must be one of memory or postgres."));
	}
	if cfg.storage.backend == "postgres" {
		if cfg.storage.postgres.dsn.trim().is_empty() {
			return Err(validation("storage.postgres.dsn must be non-empty."));
		}
		if cfg.storage.postgres.pool_max_conns == 0 {
			return Err(validation("storage.postgres.pool_max_conns must be greater than zero."));
		}
	}
	if !matches!(cfg.storage.postgres.schema_mode.as_str(), "columns" | "metadata") {
		return Err(validation("storage.postgres.schema_mode must be one of columns or metadata."));
	}
	if !matches!(cfg.provider.kind.as_str(), "remote" | "deterministic") {
		return Err(validation("provider.kind must be one of remote or deterministic."));
	}
	if cfg.provider.dimensions == 0 {
		return Err(validation("provider.dimensions must be greater than zero."));
	}
	if cfg.provider.timeout_ms == 0 {
		return Err(validation("provider.timeout_ms must be greater than zero."));
	}
	if cfg.provider.max_batch_size == 0 {
		return Err(validation("provider.max_batch_size must be greater than zero."));
	}
	if cfg.provider.kind == "remote" {
		for (label, value) in [
			("provider.api_base", &cfg.provider.api_base),
			("provider.api_key", &cfg.provider.api_key),
			("provider.model", &cfg.provider.model),
		] {
			if value.trim().is_empty() {
				return Err(validation(&format!("{label} must be non-empty.")));
			}
		}
	}

	for (label, value) in [
		("embedding_version.schema_version", &cfg.embedding_version.schema_version),
		("embedding_version.content_version", &cfg.embedding_version.content_version),
		("embedding_version.model_family", &cfg.embedding_version.model_family),
	] {
		if value.trim().is_empty() {
			return Err(validation(&format!("{label} must be non-empty.")));
		}
	}

	if cfg.ingest.batch_size == 0 {
		return Err(validation("ingest.batch_size must be greater than zero."));
	}
	if !matches!(cfg.search.mode.as_str(), "lenient" | "strict") {
		return Err(validation("search.mode must be one of lenient or strict."));
	}
	if cfg.search.default_top_k == 0 {
		return Err(validation("search.default_top_k must be greater than zero."));
	}

	for (label, value) in [
		("search.duplicate_threshold", cfg.search.duplicate_threshold),
		("search.complement_min", cfg.search.complement_min),
		("search.complement_max", cfg.search.complement_max),
		("drift.threshold", cfg.drift.threshold),
		("drift.alert_threshold", cfg.drift.alert_threshold),
	] {
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(validation(&format!("{label} must be in the range 0.0-1.0.")));
		}
	}

	if cfg.search.complement_min >= cfg.search.complement_max {
		return Err(validation("search.complement_min must be less than search.complement_max."));
	}
	if cfg.drift.alert_threshold > cfg.drift.threshold {
		return Err(validation("drift.alert_threshold must not exceed drift.threshold."));
	}
	if cfg.staleness.max_age_days <= 0 {
		return Err(validation("staleness.max_age_days must be greater than zero."));
	}
	if cfg.reindex.queue.max_size == 0 {
		return Err(validation("reindex.queue.max_size must be greater than zero."));
	}
	if cfg.reindex.queue.process_batch_size == 0 {
		return Err(validation("reindex.queue.process_batch_size must be greater than zero."));
	}

	for (label, value) in [
		("reindex.priorities.version_mismatch", cfg.reindex.priorities.version_mismatch),
		("reindex.priorities.drift_detected", cfg.reindex.priorities.drift_detected),
		("reindex.priorities.manual_request", cfg.reindex.priorities.manual_request),
		("reindex.priorities.manual_stale", cfg.reindex.priorities.manual_stale),
		("reindex.priorities.content_changed", cfg.reindex.priorities.content_changed),
		("reindex.priorities.no_embedding", cfg.reindex.priorities.no_embedding),
		("reindex.priorities.no_version", cfg.reindex.priorities.no_version),
		("reindex.priorities.age_threshold", cfg.reindex.priorities.age_threshold),
	] {
		if value > 100 {
			return Err(validation(&format!("{label} must be in the range 0-100.")));
		}
	}

	if cfg.reindex.worker.interval_seconds == 0 {
		return Err(validation("reindex.worker.interval_seconds must be greater than zero."));
	}
	if cfg.reindex.worker.max_concurrent_jobs == 0 {
		return Err(validation("reindex.worker.max_concurrent_jobs must be greater than zero."));
	}
	if cfg.reindex.worker.sweep_interval_seconds == 0 {
		return Err(validation("reindex.worker.sweep_interval_seconds must be greater than zero."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.storage
		.memory
		.snapshot_path
		.as_deref()
		.map(|path| path.as_os_str().is_empty())
		.unwrap_or(false)
	{
		cfg.storage.memory.snapshot_path = None;
	}
	if cfg.provider.path.trim().is_empty() {
		cfg.provider.path = "/v1/embeddings".to_string();
	}
}

fn validation(message: &str) -> Error {
	Error::Validation { message: message.to_string() }
}
