use serde_json::json;

use engram_domain::{DriftResult, cosine_similarity, meta};

use crate::{EngramService, ServiceResult};

impl EngramService {
	/// Compares a freshly computed embedding against the stored one. With
	/// nothing to compare against the verdict is the sentinel
	/// `has_drifted = false, similarity = 1.0`. Otherwise drift is flagged
	/// strictly below the threshold and the verdict is annotated back onto
	/// the stored record.
	pub async fn check_drift(&self, id: &str, new_embedding: &[f32]) -> ServiceResult<DriftResult> {
		let threshold = self.cfg.drift.threshold;
		let Some(mut record) = self.store.get(id).await? else {
			return Ok(no_prior(id, threshold, new_embedding));
		};
		let Some(old_embedding) = record.embedding.clone().filter(|vec| !vec.is_empty()) else {
			return Ok(no_prior(id, threshold, new_embedding));
		};
		let similarity = cosine_similarity(&old_embedding, new_embedding);
		let has_drifted = similarity < threshold;

		if similarity < self.cfg.drift.alert_threshold {
			tracing::warn!(
				id = %record.id,
				similarity,
				alert_threshold = self.cfg.drift.alert_threshold,
				"Embedding drift fell below the alert threshold.",
			);
		}

		record.set_meta(meta::DRIFT_SCORE, json!(similarity));
		record.set_meta(meta::DRIFT_DETECTED, json!(has_drifted));

		self.store.upsert(&[record]).await?;

		Ok(DriftResult {
			record_id: id.to_string(),
			has_drifted,
			similarity,
			threshold,
			old_embedding: Some(old_embedding),
			new_embedding: Some(new_embedding.to_vec()),
		})
	}
}

fn no_prior(id: &str, threshold: f32, new_embedding: &[f32]) -> DriftResult {
	DriftResult {
		record_id: id.to_string(),
		has_drifted: false,
		similarity: 1.0,
		threshold,
		old_embedding: None,
		new_embedding: Some(new_embedding.to_vec()),
	}
}
