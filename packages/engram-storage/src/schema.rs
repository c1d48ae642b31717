const SCHEMA_SQL: &str = "\
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS memory_records (
	id text PRIMARY KEY,
	kind text NOT NULL,
	text text NOT NULL,
	metadata jsonb NOT NULL DEFAULT '{}'::jsonb,
	embedding vector(<VECTOR_DIM>) NOT NULL,
	embedding_version text,
	fingerprint text,
	drift_score real,
	drift_detected boolean,
	manually_stale boolean,
	created_at timestamptz NOT NULL,
	updated_at timestamptz NOT NULL
);

CREATE INDEX IF NOT EXISTS memory_records_kind_idx
	ON memory_records (kind);

CREATE INDEX IF NOT EXISTS memory_records_metadata_idx
	ON memory_records USING gin (metadata);

CREATE INDEX IF NOT EXISTS memory_records_embedding_idx
	ON memory_records USING hnsw (embedding vector_cosine_ops);
";

pub fn render_schema(vector_dim: u32) -> String {
	SCHEMA_SQL.replace("<VECTOR_DIM>", &vector_dim.to_string())
}
