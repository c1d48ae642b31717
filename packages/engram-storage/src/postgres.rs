use std::str::FromStr;

use serde_json::{Map, Value, json};
use sqlx::{
	PgPool, Postgres, QueryBuilder, Row,
	postgres::{PgPoolOptions, PgRow},
};

use engram_domain::{MemoryRecord, RecordKind, meta};

use crate::{Error, RecordFilter, Result, ScoredRecord, schema};

const SELECT_COLUMNS: &str = "\
id, kind, text, metadata, embedding::text AS embedding_text, embedding_version, fingerprint, \
drift_score, drift_detected, manually_stale, created_at, updated_at";

const UPSERT_SQL: &str = "\
INSERT INTO memory_records (
	id,
	kind,
	text,
	metadata,
	embedding,
	embedding_version,
	fingerprint,
	drift_score,
	drift_detected,
	manually_stale,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5::text::vector, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (id) DO UPDATE
SET
	kind = EXCLUDED.kind,
	text = EXCLUDED.text,
	metadata = EXCLUDED.metadata,
	embedding = EXCLUDED.embedding,
	embedding_version = EXCLUDED.embedding_version,
	fingerprint = EXCLUDED.fingerprint,
	drift_score = EXCLUDED.drift_score,
	drift_detected = EXCLUDED.drift_detected,
	manually_stale = EXCLUDED.manually_stale,
	created_at = EXCLUDED.created_at,
	updated_at = EXCLUDED.updated_at";

const SCHEMA_LOCK_ID: i64 = 8_201_114;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SchemaMode {
	/// Reliability annotations are mirrored into dedicated columns and
	/// stripped from the metadata blob; reads merge them back.
	Columns,
	/// Annotations live only inside the metadata blob.
	Metadata,
}

#[derive(Default)]
struct ColumnAnnotations {
	embedding_version: Option<String>,
	fingerprint: Option<String>,
	drift_score: Option<f32>,
	drift_detected: Option<bool>,
	manually_stale: Option<bool>,
}

/// Durable backend: one `memory_records` table with a pgvector column and
/// an HNSW cosine index. Vectors cross the wire as bracketed text.
pub struct PgStore {
	pool: PgPool,
	schema_mode: SchemaMode,
	vector_dim: u32,
}
impl PgStore {
	pub async fn connect(cfg: &engram_config::Postgres, vector_dim: u32) -> Result<Self> {
		let schema_mode = match cfg.schema_mode.as_str() {
			"columns" => SchemaMode::Columns,
			"metadata" => SchemaMode::Metadata,
			other =>
				return Err(Error::InvalidArgument(format!("Unsupported schema_mode: {other}."))),
		};
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool, schema_mode, vector_dim })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema(self.vector_dim);
		// Advisory locks are held per connection. A single transaction
		// scopes the lock to one connection and releases it on commit.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}

	pub async fn upsert(&self, records: &[MemoryRecord]) -> Result<usize> {
		let mut stored = 0;

		for record in records {
			let Some(embedding) = record.embedding.as_deref().filter(|vec| !vec.is_empty())
			else {
				tracing::debug!(id = %record.id, "Skipping record without embedding.");

				continue;
			};

			self.check_dimension(embedding)?;

			let (blob, annotations) = self.split_annotations(&record.metadata);

			sqlx::query(UPSERT_SQL)
				.bind(record.id.as_str())
				.bind(record.kind.as_str())
				.bind(record.text.as_str())
				.bind(blob)
				.bind(vector_to_pg(embedding))
				.bind(annotations.embedding_version)
				.bind(annotations.fingerprint)
				.bind(annotations.drift_score)
				.bind(annotations.drift_detected)
				.bind(annotations.manually_stale)
				.bind(record.created_at)
				.bind(record.updated_at)
				.execute(&self.pool)
				.await?;

			stored += 1;
		}

		Ok(stored)
	}

	pub async fn query(
		&self,
		vector: &[f32],
		top_k: usize,
		filter: Option<&RecordFilter>,
	) -> Result<Vec<ScoredRecord>> {
		if top_k == 0 {
			return Ok(Vec::new());
		}

		self.check_dimension(vector)?;

		let vec_text = vector_to_pg(vector);
		let mut builder = QueryBuilder::<Postgres>::new(format!(
			"SELECT {SELECT_COLUMNS}, (1 - (embedding <=> "
		));

		builder.push_bind(vec_text.clone());
		builder.push("::text::vector))::real AS score FROM memory_records");
		push_filter(&mut builder, filter);
		builder.push(" ORDER BY embedding <=> ");
		builder.push_bind(vec_text);
		builder.push("::text::vector ASC, id ASC LIMIT ");
		builder.push_bind(top_k as i64);

		let rows = builder.build().fetch_all(&self.pool).await?;
		let mut results = Vec::with_capacity(rows.len());

		for row in rows {
			let score: f32 = row.try_get("score")?;

			results.push(ScoredRecord {
				record: self.record_from_row(&row)?,
				score: score.clamp(0.0, 1.0),
			});
		}

		Ok(results)
	}

	pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
		let sql = format!("SELECT {SELECT_COLUMNS} FROM memory_records WHERE id = $1");
		let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

		row.map(|row| self.record_from_row(&row)).transpose()
	}

	pub async fn delete(&self, ids: &[String]) -> Result<usize> {
		if ids.is_empty() {
			return Ok(0);
		}

		let result = sqlx::query("DELETE FROM memory_records WHERE id = ANY($1)")
			.bind(ids)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() as usize)
	}

	pub async fn count(&self, filter: Option<&RecordFilter>) -> Result<u64> {
		let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM memory_records");

		push_filter(&mut builder, filter);

		let row = builder.build().fetch_one(&self.pool).await?;
		let count: i64 = row.try_get(0)?;

		Ok(count as u64)
	}

	pub async fn list_ids(&self, filter: Option<&RecordFilter>) -> Result<Vec<String>> {
		let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM memory_records");

		push_filter(&mut builder, filter);
		builder.push(" ORDER BY id ASC");

		let rows = builder.build().fetch_all(&self.pool).await?;

		rows.iter().map(|row| row.try_get::<String, _>("id").map_err(Error::from)).collect()
	}

	fn check_dimension(&self, vector: &[f32]) -> Result<()> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Vector dimension {} does not match configured dimension {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		Ok(())
	}

	fn split_annotations(&self, metadata: &Map<String, Value>) -> (Value, ColumnAnnotations) {
		if self.schema_mode == SchemaMode::Metadata {
			return (Value::Object(metadata.clone()), ColumnAnnotations::default());
		}

		let mut blob = metadata.clone();
		let annotations = ColumnAnnotations {
			embedding_version: blob
				.remove(meta::EMBEDDING_VERSION)
				.and_then(|v| v.as_str().map(str::to_string)),
			fingerprint: blob
				.remove(meta::FINGERPRINT)
				.and_then(|v| v.as_str().map(str::to_string)),
			drift_score: blob.remove(meta::DRIFT_SCORE).and_then(|v| v.as_f64()).map(|v| v as f32),
			drift_detected: blob.remove(meta::DRIFT_DETECTED).and_then(|v| v.as_bool()),
			manually_stale: blob.remove(meta::MANUALLY_STALE).and_then(|v| v.as_bool()),
		};

		(Value::Object(blob), annotations)
	}

	fn record_from_row(&self, row: &PgRow) -> Result<MemoryRecord> {
		let kind: String = row.try_get("kind")?;
		let kind = RecordKind::from_str(&kind)?;
		let metadata: Value = row.try_get("metadata")?;
		let Value::Object(mut metadata) = metadata else {
			return Err(Error::InvalidArgument("Stored metadata is not a JSON object.".to_string()));
		};

		if self.schema_mode == SchemaMode::Columns {
			if let Some(version) = row.try_get::<Option<String>, _>("embedding_version")? {
				metadata.insert(meta::EMBEDDING_VERSION.to_string(), json!(version));
			}
			if let Some(fingerprint) = row.try_get::<Option<String>, _>("fingerprint")? {
				metadata.insert(meta::FINGERPRINT.to_string(), json!(fingerprint));
			}
			if let Some(score) = row.try_get::<Option<f32>, _>("drift_score")? {
				metadata.insert(meta::DRIFT_SCORE.to_string(), json!(score));
			}
			if let Some(flag) = row.try_get::<Option<bool>, _>("drift_detected")? {
				metadata.insert(meta::DRIFT_DETECTED.to_string(), json!(flag));
			}
			if let Some(flag) = row.try_get::<Option<bool>, _>("manually_stale")? {
				metadata.insert(meta::MANUALLY_STALE.to_string(), json!(flag));
			}
		}

		let embedding_text: String = row.try_get("embedding_text")?;

		Ok(MemoryRecord {
			id: row.try_get("id")?,
			kind,
			text: row.try_get("text")?,
			metadata,
			embedding: Some(parse_pg_vector(&embedding_text)?),
			created_at: row.try_get("created_at")?,
			updated_at: row.try_get("updated_at")?,
		})
	}
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: Option<&RecordFilter>) {
	let Some(filter) = filter else {
		return;
	};
	let mut prefix = " WHERE ";

	if let Some(kinds) = &filter.kinds {
		let kinds: Vec<String> = kinds.iter().map(|kind| kind.as_str().to_string()).collect();

		builder.push(prefix);
		builder.push("kind = ANY(");
		builder.push_bind(kinds);
		builder.push(")");

		prefix = " AND ";
	}
	if let Some((key, value)) = &filter.metadata_eq {
		builder.push(prefix);
		builder.push("metadata->>");
		builder.push_bind(key.clone());
		builder.push(" = ");
		builder.push_bind(value.clone());
	}
}

pub(crate) fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub(crate) fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets =
		trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')).ok_or_else(|| {
			Error::InvalidArgument("Vector text is not bracketed.".to_string())
		})?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut vec = Vec::new();

	for part in without_brackets.split(',') {
		let value: f32 = part.trim().parse().map_err(|_| {
			Error::InvalidArgument("Vector text contains a non-numeric value.".to_string())
		})?;

		vec.push(value);
	}

	Ok(vec)
}
