use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// HTTP embedding provider speaking the OpenAI-shaped embeddings API:
/// `{model, input, dimensions}` in, `{data: [{index, embedding}]}` out.
pub struct RemoteEmbedder {
	client: Client,
	url: String,
	model: String,
	dimension: usize,
	max_batch_size: usize,
}
impl RemoteEmbedder {
	pub fn new(cfg: &engram_config::Provider) -> Result<Self> {
		let client = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.build()?;

		Ok(Self {
			client,
			url: format!("{}{}", cfg.api_base, cfg.path),
			model: cfg.model.clone(),
			dimension: cfg.dimensions as usize,
			max_batch_size: cfg.max_batch_size as usize,
		})
	}

	pub fn dimension(&self) -> usize {
		self.dimension
	}

	pub fn model_name(&self) -> &str {
		&self.model
	}

	/// Large inputs are chunked into provider-sized sub-batches; the
	/// aggregate output preserves input order across chunks.
	pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let mut vectors = Vec::with_capacity(texts.len());

		for chunk in texts.chunks(self.max_batch_size) {
			let body = serde_json::json!({
				"model": self.model,
				"input": chunk,
				"dimensions": self.dimension,
			});
			let res = self.client.post(&self.url).json(&body).send().await?;
			let json: Value = res.error_for_status()?.json().await?;
			let parsed = parse_embedding_response(json)?;

			if parsed.len() != chunk.len() {
				return Err(Error::InvalidResponse {
					message: format!(
						"Embedding response held {} vectors for {} inputs.",
						parsed.len(),
						chunk.len()
					),
				});
			}

			vectors.extend(parsed);
		}

		Ok(vectors)
	}
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;

	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse { message: "Embedding item missing embedding array.".to_string() }
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
