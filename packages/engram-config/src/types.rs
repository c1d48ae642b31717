use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub provider: Provider,
	pub embedding_version: EmbeddingVersionConfig,
	pub ingest: Ingest,
	pub search: Search,
	pub staleness: Staleness,
	pub drift: Drift,
	pub reindex: Reindex,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Service {
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: "info".to_string() }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Storage {
	/// One of `memory` or `postgres`.
	pub backend: String,
	pub postgres: Postgres,
	pub memory: MemoryBackend,
}
impl Default for Storage {
	fn default() -> Self {
		Self {
			backend: "memory".to_string(),
			postgres: Postgres::default(),
			memory: MemoryBackend::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
	/// Where reliability annotations live: `columns` mirrors them into
	/// dedicated columns, `metadata` keeps them inside the jsonb blob.
	pub schema_mode: String,
}
impl Default for Postgres {
	fn default() -> Self {
		Self { dsn: String::new(), pool_max_conns: 5, schema_mode: "columns".to_string() }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemoryBackend {
	pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Provider {
	/// One of `remote` or `deterministic`.
	pub kind: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub max_batch_size: u32,
	pub default_headers: Map<String, Value>,
}
impl Default for Provider {
	fn default() -> Self {
		Self {
			kind: "deterministic".to_string(),
			api_base: String::new(),
			api_key: String::new(),
			path: "/v1/embeddings".to_string(),
			model: "deterministic".to_string(),
			dimensions: 384,
			timeout_ms: 30_000,
			max_batch_size: 128,
			default_headers: Map::new(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EmbeddingVersionConfig {
	pub schema_version: String,
	pub content_version: String,
	pub model_family: String,
}
impl Default for EmbeddingVersionConfig {
	fn default() -> Self {
		Self {
			schema_version: "1".to_string(),
			content_version: "1".to_string(),
			model_family: "deterministic".to_string(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ingest {
	pub batch_size: u32,
}
impl Default for Ingest {
	fn default() -> Self {
		Self { batch_size: 100 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// `lenient` degrades provider/store failures to empty results;
	/// `strict` propagates them.
	pub mode: String,
	pub default_top_k: u32,
	pub duplicate_threshold: f32,
	pub complement_min: f32,
	pub complement_max: f32,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			mode: "lenient".to_string(),
			default_top_k: 10,
			duplicate_threshold: 0.9,
			complement_min: 0.5,
			complement_max: 0.8,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Staleness {
	pub max_age_days: i64,
	pub check_fingerprint: bool,
	pub check_version: bool,
}
impl Default for Staleness {
	fn default() -> Self {
		Self { max_age_days: 90, check_fingerprint: true, check_version: true }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Drift {
	pub threshold: f32,
	pub alert_threshold: f32,
}
impl Default for Drift {
	fn default() -> Self {
		Self { threshold: 0.85, alert_threshold: 0.75 }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Reindex {
	pub queue: ReindexQueueConfig,
	pub priorities: ReindexPriorities,
	pub worker: ReindexWorker,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReindexQueueConfig {
	pub max_size: u32,
	pub process_batch_size: u32,
}
impl Default for ReindexQueueConfig {
	fn default() -> Self {
		Self { max_size: 1_000, process_batch_size: 10 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReindexPriorities {
	pub version_mismatch: u8,
	pub drift_detected: u8,
	pub manual_request: u8,
	pub manual_stale: u8,
	pub content_changed: u8,
	pub no_embedding: u8,
	pub no_version: u8,
	pub age_threshold: u8,
}
impl Default for ReindexPriorities {
	fn default() -> Self {
		Self {
			version_mismatch: 80,
			drift_detected: 70,
			manual_request: 70,
			manual_stale: 70,
			content_changed: 60,
			no_embedding: 50,
			no_version: 40,
			age_threshold: 30,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReindexWorker {
	pub interval_seconds: u64,
	pub max_concurrent_jobs: u32,
	pub sweep_interval_seconds: u64,
}
impl Default for ReindexWorker {
	fn default() -> Self {
		Self { interval_seconds: 30, max_concurrent_jobs: 4, sweep_interval_seconds: 3_600 }
	}
}
