pub mod deterministic;
pub mod fixed;
pub mod remote;

mod error;

pub use deterministic::DeterministicEmbedder;
pub use error::{Error, Result};
pub use fixed::FixedEmbedder;
pub use remote::RemoteEmbedder;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

/// Closed set of embedding providers, chosen at construction time. All
/// variants share the same contract: N input texts produce exactly N
/// vectors of `dimension()` components, in input order, or the whole call
/// fails.
pub enum Embedder {
	Remote(RemoteEmbedder),
	Deterministic(DeterministicEmbedder),
	Fixed(FixedEmbedder),
}
impl Embedder {
	pub fn from_config(cfg: &engram_config::Provider) -> Result<Self> {
		match cfg.kind.as_str() {
			"remote" => Ok(Self::Remote(RemoteEmbedder::new(cfg)?)),
			"deterministic" =>
				Ok(Self::Deterministic(DeterministicEmbedder::new(
					cfg.dimensions as usize,
					cfg.model.clone(),
				))),
			other => Err(Error::InvalidConfig {
				message: format!("Unsupported provider kind: {other}."),
			}),
		}
	}

	pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let vectors = match self {
			Self::Remote(provider) => provider.embed(texts).await?,
			Self::Deterministic(provider) => provider.embed(texts),
			Self::Fixed(provider) => provider.embed(texts)?,
		};

		if vectors.len() != texts.len() {
			return Err(Error::InvalidResponse {
				message: format!(
					"Provider returned {} vectors for {} texts.",
					vectors.len(),
					texts.len()
				),
			});
		}

		let dimension = self.dimension();

		for vector in &vectors {
			if vector.len() != dimension {
				return Err(Error::InvalidResponse {
					message: format!(
						"Provider returned a {}-dimension vector, expected {dimension}.",
						vector.len()
					),
				});
			}
		}

		Ok(vectors)
	}

	pub fn dimension(&self) -> usize {
		match self {
			Self::Remote(provider) => provider.dimension(),
			Self::Deterministic(provider) => provider.dimension(),
			Self::Fixed(provider) => provider.dimension(),
		}
	}

	pub fn model_name(&self) -> &str {
		match self {
			Self::Remote(provider) => provider.model_name(),
			Self::Deterministic(provider) => provider.model_name(),
			Self::Fixed(provider) => provider.model_name(),
		}
	}
}

pub(crate) fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}
