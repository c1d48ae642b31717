/// Offline provider producing stable pseudo-random unit vectors. The vector
/// for a given text never changes, so tests and air-gapped deployments get
/// reproducible similarity scores without a model.
pub struct DeterministicEmbedder {
	dimension: usize,
	model: String,
}
impl DeterministicEmbedder {
	pub fn new(dimension: usize, model: String) -> Self {
		Self { dimension, model }
	}

	pub fn dimension(&self) -> usize {
		self.dimension
	}

	pub fn model_name(&self) -> &str {
		&self.model
	}

	pub fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
		texts.iter().map(|text| self.vector_for(text)).collect()
	}

	fn vector_for(&self, text: &str) -> Vec<f32> {
		let mut hasher = blake3::Hasher::new();

		hasher.update(text.as_bytes());

		let mut reader = hasher.finalize_xof();
		let mut bytes = vec![0_u8; self.dimension * 4];

		reader.fill(&mut bytes);

		let mut vec: Vec<f32> = bytes
			.chunks_exact(4)
			.map(|chunk| {
				let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);

				(f64::from(raw) / f64::from(u32::MAX) * 2.0 - 1.0) as f32
			})
			.collect();
		let norm = vec.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();

		if norm <= f64::EPSILON {
			if let Some(first) = vec.first_mut() {
				*first = 1.0;
			}

			return vec;
		}

		for value in &mut vec {
			*value = (f64::from(*value) / norm) as f32;
		}

		vec
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn embedder() -> DeterministicEmbedder {
		DeterministicEmbedder::new(64, "deterministic".to_string())
	}

	#[test]
	fn vectors_are_stable_per_text() {
		let texts = vec!["login test".to_string()];

		assert_eq!(embedder().embed(&texts), embedder().embed(&texts));
	}

	#[test]
	fn vectors_are_unit_norm() {
		let vectors = embedder().embed(&["checkout flow".to_string()]);
		let norm = vectors[0].iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();

		assert!((norm - 1.0).abs() < 1e-5);
	}

	#[test]
	fn distinct_texts_get_distinct_vectors() {
		let vectors =
			embedder().embed(&["login test".to_string(), "payment failure".to_string()]);

		assert_ne!(vectors[0], vectors[1]);
	}
}
