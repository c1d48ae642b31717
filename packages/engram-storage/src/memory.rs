use std::{
	collections::HashMap,
	fs,
	path::PathBuf,
	sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use engram_domain::MemoryRecord;

use crate::{Error, RecordFilter, Result, ScoredRecord};

/// In-process backend: a flat index of normalized vectors, so cosine
/// similarity reduces to a dot product. Deletions and overwrites leave dead
/// index entries behind; they are skipped at query time and reclaimed by
/// `rebuild`. An optional JSON snapshot persists the records across
/// restarts.
pub struct MemoryStore {
	inner: RwLock<Inner>,
	snapshot_path: Option<PathBuf>,
}

#[derive(Default)]
struct Inner {
	records: HashMap<String, Slot>,
	index: Vec<IndexEntry>,
	// Monotonic across the store's lifetime: an index entry is live only
	// while its revision matches the slot's, so entries orphaned by
	// overwrites and delete/re-insert cycles never resurface.
	next_revision: u64,
}

struct Slot {
	revision: u64,
	record: MemoryRecord,
}

struct IndexEntry {
	id: String,
	revision: u64,
	normalized: Vec<f32>,
}

impl MemoryStore {
	pub fn open(cfg: &engram_config::MemoryBackend) -> Result<Self> {
		let store = Self {
			inner: RwLock::new(Inner::default()),
			snapshot_path: cfg.snapshot_path.clone(),
		};

		if let Some(path) = &store.snapshot_path
			&& path.exists()
		{
			let raw = fs::read_to_string(path)?;
			let records: Vec<MemoryRecord> = serde_json::from_str(&raw)?;

			store.upsert(&records)?;

			tracing::info!(count = records.len(), path = %path.display(), "Loaded snapshot.");
		}

		Ok(store)
	}

	pub fn upsert(&self, records: &[MemoryRecord]) -> Result<usize> {
		let mut inner = self.write();
		let mut stored = 0;

		for record in records {
			let Some(embedding) = record.embedding.as_deref().filter(|vec| !vec.is_empty())
			else {
				tracing::debug!(id = %record.id, "Skipping record without embedding.");

				continue;
			};
			let normalized = normalize(embedding);
			let revision = inner.next_revision;

			inner.next_revision += 1;
			inner
				.records
				.insert(record.id.clone(), Slot { revision, record: record.clone() });
			inner.index.push(IndexEntry { id: record.id.clone(), revision, normalized });

			stored += 1;
		}

		Ok(stored)
	}

	pub fn query(
		&self,
		vector: &[f32],
		top_k: usize,
		filter: Option<&RecordFilter>,
	) -> Result<Vec<ScoredRecord>> {
		if top_k == 0 {
			return Ok(Vec::new());
		}

		let inner = self.read();
		let query = normalize(vector);
		let mut scored = Vec::new();

		for entry in &inner.index {
			let Some(slot) = inner.records.get(&entry.id) else {
				continue;
			};

			// Dead entries from overwrites keep an older revision.
			if slot.revision != entry.revision {
				continue;
			}
			if let Some(filter) = filter
				&& !filter.matches(&slot.record)
			{
				continue;
			}

			let score = if entry.normalized.len() == query.len() {
				dot(&query, &entry.normalized).clamp(0.0, 1.0)
			} else {
				0.0
			};

			scored.push(ScoredRecord { record: slot.record.clone(), score });
		}

		scored.sort_by(|a, b| {
			b.score.total_cmp(&a.score).then_with(|| a.record.id.cmp(&b.record.id))
		});
		scored.truncate(top_k);

		Ok(scored)
	}

	pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
		Ok(self.read().records.get(id).map(|slot| slot.record.clone()))
	}

	pub fn delete(&self, ids: &[String]) -> Result<usize> {
		let mut inner = self.write();
		let mut removed = 0;

		for id in ids {
			// The index entry stays behind as a tombstone until `rebuild`.
			if inner.records.remove(id).is_some() {
				removed += 1;
			}
		}

		Ok(removed)
	}

	pub fn count(&self, filter: Option<&RecordFilter>) -> Result<u64> {
		let inner = self.read();
		let count = inner
			.records
			.values()
			.filter(|slot| filter.map(|f| f.matches(&slot.record)).unwrap_or(true))
			.count();

		Ok(count as u64)
	}

	pub fn list_ids(&self, filter: Option<&RecordFilter>) -> Result<Vec<String>> {
		let inner = self.read();
		let mut ids: Vec<String> = inner
			.records
			.values()
			.filter(|slot| filter.map(|f| f.matches(&slot.record)).unwrap_or(true))
			.map(|slot| slot.record.id.clone())
			.collect();

		ids.sort();

		Ok(ids)
	}

	/// Drops dead index entries left behind by deletes and overwrites.
	pub fn rebuild(&self) {
		let mut inner = self.write();
		let mut index = Vec::with_capacity(inner.records.len());

		for slot in inner.records.values() {
			let Some(embedding) = slot.record.embedding.as_deref() else {
				continue;
			};

			index.push(IndexEntry {
				id: slot.record.id.clone(),
				revision: slot.revision,
				normalized: normalize(embedding),
			});
		}

		inner.index = index;
	}

	/// Number of index entries, dead ones included. Exposed for rebuild
	/// bookkeeping.
	pub fn index_len(&self) -> usize {
		self.read().index.len()
	}

	pub fn snapshot(&self) -> Result<()> {
		let Some(path) = &self.snapshot_path else {
			return Err(Error::InvalidArgument("No snapshot path configured.".to_string()));
		};
		let inner = self.read();
		let mut records: Vec<&MemoryRecord> =
			inner.records.values().map(|slot| &slot.record).collect();

		records.sort_by(|a, b| a.id.cmp(&b.id));

		let encoded = serde_json::to_vec(&records)?;

		fs::write(path, encoded)?;

		Ok(())
	}

	fn read(&self) -> RwLockReadGuard<'_, Inner> {
		self.inner.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, Inner> {
		self.inner.write().unwrap_or_else(|err| err.into_inner())
	}
}

fn normalize(vector: &[f32]) -> Vec<f32> {
	let norm = vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();

	if norm <= f64::EPSILON {
		return vector.to_vec();
	}

	vector.iter().map(|v| (f64::from(*v) / norm) as f32).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum::<f64>() as f32
}
