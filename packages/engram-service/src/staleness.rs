use serde_json::json;
use time::OffsetDateTime;

use engram_domain::{MemoryRecord, StalenessReason, fingerprint, meta};

use crate::{EngramService, ServiceResult};

/// A staleness verdict with its supporting detail. `reason()` collapses it
/// to the closed reason set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Staleness {
	NoEmbedding,
	NoVersion,
	VersionMismatch { stored: String, expected: String },
	ContentChanged,
	AgeThreshold { age_days: i64 },
	ManualStale,
}
impl Staleness {
	pub fn reason(&self) -> StalenessReason {
		match self {
			Self::NoEmbedding => StalenessReason::NoEmbedding,
			Self::NoVersion => StalenessReason::NoVersion,
			Self::VersionMismatch { .. } => StalenessReason::VersionMismatch,
			Self::ContentChanged => StalenessReason::ContentChanged,
			Self::AgeThreshold { .. } => StalenessReason::AgeThreshold,
			Self::ManualStale => StalenessReason::ManualStale,
		}
	}
}

impl EngramService {
	/// Runs the staleness checks in fixed order and reports the first match.
	/// A missing record is a first-class `NoEmbedding` verdict, not an
	/// error; only storage I/O failures propagate.
	pub async fn check_staleness(
		&self,
		id: &str,
		current_text: Option<&str>,
	) -> ServiceResult<Option<Staleness>> {
		let Some(record) = self.store.get(id).await? else {
			return Ok(Some(Staleness::NoEmbedding));
		};

		if !record.has_embedding() {
			return Ok(Some(Staleness::NoEmbedding));
		}

		if self.cfg.staleness.check_version {
			let Some(stored) = record.meta_str(meta::EMBEDDING_VERSION) else {
				return Ok(Some(Staleness::NoVersion));
			};
			let expected = self.current_version().to_string();

			if stored != expected {
				return Ok(Some(Staleness::VersionMismatch {
					stored: stored.to_string(),
					expected,
				}));
			}
		}

		if self.cfg.staleness.check_fingerprint
			&& let Some(text) = current_text
			&& fingerprint_changed(&record, text)
		{
			return Ok(Some(Staleness::ContentChanged));
		}

		let age_days = (OffsetDateTime::now_utc() - record.updated_at).whole_days();

		if age_days > self.cfg.staleness.max_age_days {
			return Ok(Some(Staleness::AgeThreshold { age_days }));
		}

		if record.meta_bool(meta::MANUALLY_STALE) {
			return Ok(Some(Staleness::ManualStale));
		}

		Ok(None)
	}

	/// True when no fingerprint is stored for `id` or the stored one
	/// differs from the current text's fingerprint.
	pub async fn has_content_changed(&self, id: &str, current_text: &str) -> ServiceResult<bool> {
		Ok(self
			.store
			.get(id)
			.await?
			.map(|record| fingerprint_changed(&record, current_text))
			.unwrap_or(true))
	}

	/// True only when a version is stored and matches the configured
	/// current version exactly, all three fields included.
	pub async fn is_version_current(&self, id: &str) -> ServiceResult<bool> {
		let Some(record) = self.store.get(id).await? else {
			return Ok(false);
		};
		let expected = self.current_version().to_string();

		Ok(record.meta_str(meta::EMBEDDING_VERSION).map(|stored| stored == expected).unwrap_or(false))
	}

	/// Sets the manual staleness flag. Idempotent; returns false when the
	/// record does not exist.
	pub async fn mark_stale(&self, id: &str) -> ServiceResult<bool> {
		self.set_manual_flag(id, true).await
	}

	/// Clears the manual staleness flag. Idempotent; returns false when the
	/// record does not exist.
	pub async fn clear_stale_flag(&self, id: &str) -> ServiceResult<bool> {
		self.set_manual_flag(id, false).await
	}

	async fn set_manual_flag(&self, id: &str, value: bool) -> ServiceResult<bool> {
		let Some(mut record) = self.store.get(id).await? else {
			return Ok(false);
		};

		if value {
			record.set_meta(meta::MANUALLY_STALE, json!(true));
		} else {
			record.remove_meta(meta::MANUALLY_STALE);
		}

		// The flag rides along without refreshing updated_at, so marking a
		// record stale never resets its age.
		self.store.upsert(&[record]).await?;

		Ok(true)
	}
}

pub(crate) fn fingerprint_changed(record: &MemoryRecord, current_text: &str) -> bool {
	record
		.meta_str(meta::FINGERPRINT)
		.map(|stored| stored != fingerprint::compute(current_text))
		.unwrap_or(true)
}
