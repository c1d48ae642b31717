pub mod memory;
pub mod postgres;
pub mod schema;

mod error;

pub use error::Error;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Result<T, E = Error> = std::result::Result<T, E>;

use serde_json::Value;

use engram_domain::{MemoryRecord, RecordKind};

/// One nearest-neighbor hit: the stored record and its cosine similarity,
/// clamped to [0, 1].
#[derive(Clone, Debug)]
pub struct ScoredRecord {
	pub record: MemoryRecord,
	pub score: f32,
}

/// Restricts a query to a kind set and/or one metadata key equality. The
/// filter applies before the top-k cut.
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
	pub kinds: Option<Vec<RecordKind>>,
	pub metadata_eq: Option<(String, String)>,
}
impl RecordFilter {
	pub fn by_kinds(kinds: impl Into<Vec<RecordKind>>) -> Self {
		Self { kinds: Some(kinds.into()), metadata_eq: None }
	}

	pub fn by_metadata(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self { kinds: None, metadata_eq: Some((key.into(), value.into())) }
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata_eq = Some((key.into(), value.into()));

		self
	}

	pub fn is_empty(&self) -> bool {
		self.kinds.is_none() && self.metadata_eq.is_none()
	}

	pub(crate) fn matches(&self, record: &MemoryRecord) -> bool {
		if let Some(kinds) = &self.kinds
			&& !kinds.contains(&record.kind)
		{
			return false;
		}

		if let Some((key, expected)) = &self.metadata_eq {
			let matched = match record.metadata.get(key) {
				// Mirrors Postgres `->>` extraction: scalars compare by
				// their text form.
				Some(Value::String(actual)) => actual == expected,
				Some(Value::Number(actual)) => actual.to_string() == *expected,
				Some(Value::Bool(actual)) => actual.to_string() == *expected,
				_ => false,
			};

			if !matched {
				return false;
			}
		}

		true
	}
}

/// Closed set of vector store backends, chosen at construction time from
/// configuration. All operations are keyed by record id; upserts are
/// last-writer-wins.
pub enum VectorStore {
	Postgres(PgStore),
	Memory(MemoryStore),
}
impl VectorStore {
	pub async fn from_config(cfg: &engram_config::Storage, vector_dim: u32) -> Result<Self> {
		match cfg.backend.as_str() {
			"postgres" => {
				let store = PgStore::connect(&cfg.postgres, vector_dim).await?;

				store.ensure_schema().await?;

				Ok(Self::Postgres(store))
			},
			"memory" => Ok(Self::Memory(MemoryStore::open(&cfg.memory)?)),
			other =>
				Err(Error::InvalidArgument(format!("Unsupported storage backend: {other}."))),
		}
	}

	/// Insert-or-replace by id. Records without an embedding are skipped
	/// and excluded from the returned count.
	pub async fn upsert(&self, records: &[MemoryRecord]) -> Result<usize> {
		match self {
			Self::Postgres(store) => store.upsert(records).await,
			Self::Memory(store) => store.upsert(records),
		}
	}

	/// Up to `top_k` records by descending cosine similarity; ties break by
	/// ascending id.
	pub async fn query(
		&self,
		vector: &[f32],
		top_k: usize,
		filter: Option<&RecordFilter>,
	) -> Result<Vec<ScoredRecord>> {
		match self {
			Self::Postgres(store) => store.query(vector, top_k, filter).await,
			Self::Memory(store) => store.query(vector, top_k, filter),
		}
	}

	pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
		match self {
			Self::Postgres(store) => store.get(id).await,
			Self::Memory(store) => store.get(id),
		}
	}

	pub async fn delete(&self, ids: &[String]) -> Result<usize> {
		match self {
			Self::Postgres(store) => store.delete(ids).await,
			Self::Memory(store) => store.delete(ids),
		}
	}

	pub async fn count(&self, filter: Option<&RecordFilter>) -> Result<u64> {
		match self {
			Self::Postgres(store) => store.count(filter).await,
			Self::Memory(store) => store.count(filter),
		}
	}

	pub async fn list_ids(&self, filter: Option<&RecordFilter>) -> Result<Vec<String>> {
		match self {
			Self::Postgres(store) => store.list_ids(filter).await,
			Self::Memory(store) => store.list_ids(filter),
		}
	}
}
