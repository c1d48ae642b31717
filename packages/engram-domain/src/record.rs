use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{Error, Result};

/// Reserved metadata keys used by the reliability layer.
pub mod meta {
	pub const EMBEDDING_VERSION: &str = "embedding_version";
	pub const FINGERPRINT: &str = "fingerprint";
	pub const DRIFT_SCORE: &str = "drift_score";
	pub const DRIFT_DETECTED: &str = "drift_detected";
	pub const MANUALLY_STALE: &str = "manually_stale";
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
	Test,
	Scenario,
	Step,
	Page,
	Code,
	Failure,
	Assertion,
	Locator,
}
impl RecordKind {
	pub const ALL: [Self; 8] = [
		Self::Test,
		Self::Scenario,
		Self::Step,
		Self::Page,
		Self::Code,
		Self::Failure,
		Self::Assertion,
		Self::Locator,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Test => "test",
			Self::Scenario => "scenario",
			Self::Step => "step",
			Self::Page => "page",
			Self::Code => "code",
			Self::Failure => "failure",
			Self::Assertion => "assertion",
			Self::Locator => "locator",
		}
	}
}
impl fmt::Display for RecordKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for RecordKind {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"test" => Ok(Self::Test),
			"scenario" => Ok(Self::Scenario),
			"step" => Ok(Self::Step),
			"page" => Ok(Self::Page),
			"code" => Ok(Self::Code),
			"failure" => Ok(Self::Failure),
			"assertion" => Ok(Self::Assertion),
			"locator" => Ok(Self::Locator),
			_ => Err(Error::InvalidKind { value: s.to_string() }),
		}
	}
}

/// A semantic unit of memory. The vector store is the source of truth for a
/// record once stored; callers hold at most a copy.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MemoryRecord {
	pub id: String,
	pub kind: RecordKind,
	pub text: String,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default)]
	pub embedding: Option<Vec<f32>>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl MemoryRecord {
	pub fn new(id: impl Into<String>, kind: RecordKind, text: impl Into<String>) -> Result<Self> {
		let id = id.into();
		let text = text.into();

		if id.trim().is_empty() {
			return Err(Error::Validation { message: "Record id must be non-empty.".to_string() });
		}
		if text.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Record {id} text must be non-empty."),
			});
		}

		let now = OffsetDateTime::now_utc();

		Ok(Self {
			id,
			kind,
			text,
			metadata: Map::new(),
			embedding: None,
			created_at: now,
			updated_at: now,
		})
	}

	pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
		self.metadata = metadata;

		self
	}

	pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
		self.embedding = Some(embedding);

		self
	}

	pub fn has_embedding(&self) -> bool {
		self.embedding.as_ref().map(|vec| !vec.is_empty()).unwrap_or(false)
	}

	pub fn meta_str(&self, key: &str) -> Option<&str> {
		self.metadata.get(key).and_then(|value| value.as_str())
	}

	pub fn meta_f64(&self, key: &str) -> Option<f64> {
		self.metadata.get(key).and_then(|value| value.as_f64())
	}

	pub fn meta_bool(&self, key: &str) -> bool {
		self.metadata.get(key).and_then(|value| value.as_bool()).unwrap_or(false)
	}

	pub fn set_meta(&mut self, key: &str, value: Value) {
		self.metadata.insert(key.to_string(), value);
	}

	pub fn remove_meta(&mut self, key: &str) -> Option<Value> {
		self.metadata.remove(key)
	}
}
