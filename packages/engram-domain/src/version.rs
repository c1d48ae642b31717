use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const SEPARATOR: &str = "::";

/// Identifies how an embedding was produced. Serialized as
/// `"schema::content::model"`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EmbeddingVersion {
	pub schema_version: String,
	pub content_version: String,
	pub model_family: String,
}
impl EmbeddingVersion {
	pub fn new(
		schema_version: impl Into<String>,
		content_version: impl Into<String>,
		model_family: impl Into<String>,
	) -> Self {
		Self {
			schema_version: schema_version.into(),
			content_version: content_version.into(),
			model_family: model_family.into(),
		}
	}

	/// Full three-field equality. Only a fully matching version counts as
	/// current.
	pub fn is_current(&self, expected: &Self) -> bool {
		self == expected
	}

	/// Schema and content versions match; the model family may differ.
	/// Comparable versions can be reasoned about for staleness.
	pub fn is_comparable(&self, other: &Self) -> bool {
		self.schema_version == other.schema_version
			&& self.content_version == other.content_version
	}
}
impl fmt::Display for EmbeddingVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}{SEPARATOR}{}{SEPARATOR}{}",
			self.schema_version, self.content_version, self.model_family
		)
	}
}
impl FromStr for EmbeddingVersion {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let mut parts = s.split(SEPARATOR);
		let (Some(schema), Some(content), Some(model), None) =
			(parts.next(), parts.next(), parts.next(), parts.next())
		else {
			return Err(Error::InvalidVersion { value: s.to_string() });
		};

		if schema.is_empty() || content.is_empty() || model.is_empty() {
			return Err(Error::InvalidVersion { value: s.to_string() });
		}

		Ok(Self::new(schema, content, model))
	}
}
