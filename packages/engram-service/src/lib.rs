pub mod drift;
pub mod ingest;
pub mod reindex;
pub mod search;
pub mod staleness;

use std::{future::Future, pin::Pin};

use serde_json::{Map, Value};

use engram_config::Config;
use engram_domain::{EmbeddingVersion, RecordKind};
use engram_providers::Embedder;
use engram_storage::VectorStore;

pub use reindex::{ReindexManager, ReindexQueue};
pub use search::{RecommendationKind, SearchResult};
pub use staleness::Staleness;

pub type ServiceResult<T> = Result<T, ServiceError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error(transparent)]
	Domain(#[from] engram_domain::Error),
	#[error("Provider error: {0}")]
	Provider(#[from] engram_providers::Error),
	#[error("Storage error: {0}")]
	Storage(#[from] engram_storage::Error),
}

/// External collaborator that turns typed entities into embeddable text.
/// `render` maps an entity payload to its natural-language form; `fetch`
/// resolves the current payload when an entity needs re-indexing.
pub trait TextBuilder
where
	Self: Send + Sync,
{
	fn render(&self, kind: RecordKind, entity: &Map<String, Value>) -> ServiceResult<String>;

	fn fetch<'a>(
		&'a self,
		kind: RecordKind,
		entity_id: &'a str,
	) -> BoxFuture<'a, ServiceResult<Option<Map<String, Value>>>>;
}

/// The vector memory engine: ingestion, search, and the reliability layer
/// share one store and one embedding provider, both chosen at construction.
pub struct EngramService {
	pub cfg: Config,
	pub store: VectorStore,
	pub embedder: Embedder,
}
impl EngramService {
	pub fn new(cfg: Config, store: VectorStore, embedder: Embedder) -> Self {
		Self { cfg, store, embedder }
	}

	/// The process-wide embedding version every fresh ingestion is stamped
	/// with.
	pub fn current_version(&self) -> EmbeddingVersion {
		EmbeddingVersion::new(
			self.cfg.embedding_version.schema_version.clone(),
			self.cfg.embedding_version.content_version.clone(),
			self.cfg.embedding_version.model_family.clone(),
		)
	}

	pub(crate) fn lenient_search(&self) -> bool {
		self.cfg.search.mode == "lenient"
	}
}
