use serde::{Deserialize, Serialize};

/// Outcome of comparing a newly computed embedding against the stored one.
/// Point-in-time data; it is not persisted beyond the `drift_score` and
/// `drift_detected` metadata annotations.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DriftResult {
	pub record_id: String,
	pub has_drifted: bool,
	pub similarity: f32,
	pub threshold: f32,
	#[serde(default)]
	pub old_embedding: Option<Vec<f32>>,
	#[serde(default)]
	pub new_embedding: Option<Vec<f32>>,
}
