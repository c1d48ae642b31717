use std::collections::HashMap;

use crate::{Error, Result};

/// Fixture provider backed by an explicit text-to-vector map. A text with
/// no fixture fails the whole call, which also makes this the failure
/// injection point for pipeline tests.
pub struct FixedEmbedder {
	dimension: usize,
	vectors: HashMap<String, Vec<f32>>,
}
impl FixedEmbedder {
	pub fn new(dimension: usize, vectors: HashMap<String, Vec<f32>>) -> Self {
		Self { dimension, vectors }
	}

	pub fn dimension(&self) -> usize {
		self.dimension
	}

	pub fn model_name(&self) -> &str {
		"fixed"
	}

	pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		texts
			.iter()
			.map(|text| {
				self.vectors.get(text).cloned().ok_or_else(|| Error::InvalidResponse {
					message: format!("No fixture vector for text: {text:?}."),
				})
			})
			.collect()
	}
}
