use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::record::RecordKind;

pub const MAX_PRIORITY: u8 = 100;

/// Why a stored record needs re-embedding. The detector reports the first
/// matching reason in a fixed precedence order.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessReason {
	NoEmbedding,
	NoVersion,
	VersionMismatch,
	ContentChanged,
	AgeThreshold,
	ManualStale,
}
impl StalenessReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::NoEmbedding => "no_embedding",
			Self::NoVersion => "no_version",
			Self::VersionMismatch => "version_mismatch",
			Self::ContentChanged => "content_changed",
			Self::AgeThreshold => "age_threshold",
			Self::ManualStale => "manual_stale",
		}
	}
}

/// Key set of the reindex priority table: every staleness reason plus the
/// two triggers that bypass the staleness detector.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexReason {
	NoEmbedding,
	NoVersion,
	VersionMismatch,
	ContentChanged,
	AgeThreshold,
	ManualStale,
	DriftDetected,
	ManualRequest,
}
impl ReindexReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::NoEmbedding => "no_embedding",
			Self::NoVersion => "no_version",
			Self::VersionMismatch => "version_mismatch",
			Self::ContentChanged => "content_changed",
			Self::AgeThreshold => "age_threshold",
			Self::ManualStale => "manual_stale",
			Self::DriftDetected => "drift_detected",
			Self::ManualRequest => "manual_request",
		}
	}
}
impl From<StalenessReason> for ReindexReason {
	fn from(reason: StalenessReason) -> Self {
		match reason {
			StalenessReason::NoEmbedding => Self::NoEmbedding,
			StalenessReason::NoVersion => Self::NoVersion,
			StalenessReason::VersionMismatch => Self::VersionMismatch,
			StalenessReason::ContentChanged => Self::ContentChanged,
			StalenessReason::AgeThreshold => Self::AgeThreshold,
			StalenessReason::ManualStale => Self::ManualStale,
		}
	}
}

/// A scheduled re-embedding of one entity. Jobs are deduplicated by
/// `entity_id` while enqueued and discarded after processing.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReindexJob {
	pub entity_id: String,
	pub entity_kind: RecordKind,
	pub reason: ReindexReason,
	pub priority: u8,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}
impl ReindexJob {
	pub fn new(
		entity_id: impl Into<String>,
		entity_kind: RecordKind,
		reason: ReindexReason,
		priority: u8,
	) -> Self {
		Self {
			entity_id: entity_id.into(),
			entity_kind,
			reason,
			priority: priority.min(MAX_PRIORITY),
			created_at: OffsetDateTime::now_utc(),
			metadata: Map::new(),
		}
	}

	pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
		self.metadata = metadata;

		self
	}
}
