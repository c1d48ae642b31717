use serde_json::{Map, Value, json};
use time::OffsetDateTime;

use engram_domain::{MemoryRecord, RecordKind, fingerprint, meta};

use crate::{EngramService, ServiceError, ServiceResult, TextBuilder};

impl EngramService {
	/// Embeds and upserts records in fixed-size batches. A failing batch is
	/// logged and skipped; later batches still run. Returns the number of
	/// records actually stored.
	pub async fn ingest(&self, records: Vec<MemoryRecord>) -> ServiceResult<usize> {
		for record in &records {
			if record.id.trim().is_empty() || record.text.trim().is_empty() {
				return Err(ServiceError::Domain(engram_domain::Error::Validation {
					message: "Records must carry a non-empty id and text.".to_string(),
				}));
			}
		}

		let batch_size = self.cfg.ingest.batch_size as usize;
		let mut iter = records.into_iter().peekable();
		let mut stored = 0;

		while iter.peek().is_some() {
			let mut batch: Vec<MemoryRecord> = iter.by_ref().take(batch_size).collect();

			match self.ingest_batch(&mut batch).await {
				Ok(count) => stored += count,
				Err(err) => {
					tracing::error!(
						error = %err,
						batch_len = batch.len(),
						"Ingestion batch failed. Skipping.",
					);
				},
			}
		}

		Ok(stored)
	}

	/// Accepts raw entity payloads of a known kind. The `id` field keys the
	/// record, the text builder renders the embeddable text, and the
	/// remaining fields ride along as metadata.
	pub async fn ingest_entities(
		&self,
		kind: RecordKind,
		entities: &[Map<String, Value>],
		builder: &dyn TextBuilder,
	) -> ServiceResult<usize> {
		let mut records = Vec::with_capacity(entities.len());

		for entity in entities {
			let id = entity.get("id").and_then(|value| value.as_str()).ok_or_else(|| {
				ServiceError::InvalidRequest { message: "Entity is missing an id field.".to_string() }
			})?;
			let text = builder.render(kind, entity)?;
			let mut metadata = entity.clone();

			// The id keys the record and the rendered text is the record
			// body; neither belongs in the metadata map.
			metadata.remove("id");
			metadata.remove("text");

			records.push(MemoryRecord::new(id, kind, text)?.with_metadata(metadata));
		}

		self.ingest(records).await
	}

	async fn ingest_batch(&self, batch: &mut [MemoryRecord]) -> ServiceResult<usize> {
		let texts: Vec<String> = batch.iter().map(|record| record.text.clone()).collect();
		let vectors = self.embedder.embed(&texts).await?;
		let version = self.current_version().to_string();
		let now = OffsetDateTime::now_utc();

		for (record, vector) in batch.iter_mut().zip(vectors) {
			record.embedding = Some(vector);
			record.set_meta(meta::EMBEDDING_VERSION, json!(version));
			record.set_meta(meta::FINGERPRINT, json!(fingerprint::compute(&record.text)));
			// A fresh embedding supersedes the manual flag and any prior
			// drift verdict.
			record.remove_meta(meta::MANUALLY_STALE);
			record.remove_meta(meta::DRIFT_SCORE);
			record.remove_meta(meta::DRIFT_DETECTED);
			record.updated_at = now;
		}

		Ok(self.store.upsert(batch).await?)
	}
}
