use std::collections::{BTreeSet, HashMap};

use engram_domain::MemoryRecord;
use engram_storage::{RecordFilter, ScoredRecord};

use crate::{EngramService, ServiceError, ServiceResult};

const MAX_SHARED_TERMS: usize = 8;

/// One ranked hit. `rank` is the 1-based position within the result list
/// it came from, not an attribute of the record.
#[derive(Clone, Debug)]
pub struct SearchResult {
	pub record: MemoryRecord,
	pub score: f32,
	pub rank: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecommendationKind {
	/// Neighbors scoring above the duplicate threshold.
	Duplicate,
	/// Plain nearest neighbors.
	Similar,
	/// Related-but-different neighbors inside the complement band.
	Complement,
}

impl EngramService {
	/// Top-k semantic search. An empty query returns an empty list without
	/// touching the provider. In lenient mode provider and store failures
	/// degrade to an empty list; in strict mode they propagate.
	pub async fn search(
		&self,
		query: &str,
		filter: Option<&RecordFilter>,
		top_k: usize,
		min_score: f32,
	) -> ServiceResult<Vec<SearchResult>> {
		if query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let result = self.search_inner(query, filter, top_k, min_score).await;

		self.degrade(result, "search")
	}

	/// Nearest neighbors of a stored record, never including the record
	/// itself. A missing record or one without an embedding yields an
	/// empty list.
	pub async fn find_similar(
		&self,
		id: &str,
		filter: Option<&RecordFilter>,
		top_k: usize,
	) -> ServiceResult<Vec<SearchResult>> {
		let result = self.find_similar_inner(id, filter, top_k).await;

		self.degrade(result, "find_similar")
	}

	/// Runs `search` once per query with a widened candidate pool, then
	/// averages each record's score across the queries it appeared in.
	pub async fn multi_query_search(
		&self,
		queries: &[String],
		filter: Option<&RecordFilter>,
		top_k: usize,
	) -> ServiceResult<Vec<SearchResult>> {
		let mut pooled: HashMap<String, (MemoryRecord, f32, u32)> = HashMap::new();

		for query in queries {
			for result in self.search(query, filter, top_k * 2, 0.0).await? {
				let entry = pooled
					.entry(result.record.id.clone())
					.or_insert_with(|| (result.record, 0.0, 0));

				entry.1 += result.score;
				entry.2 += 1;
			}
		}

		let mut averaged: Vec<(MemoryRecord, f32)> = pooled
			.into_values()
			.map(|(record, total, appearances)| (record, total / appearances as f32))
			.collect();

		averaged.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
		averaged.truncate(top_k);

		Ok(averaged
			.into_iter()
			.enumerate()
			.map(|(index, (record, score))| SearchResult { record, score, rank: index + 1 })
			.collect())
	}

	pub async fn get_recommendations(
		&self,
		id: &str,
		kind: RecommendationKind,
		top_k: usize,
	) -> ServiceResult<Vec<SearchResult>> {
		let neighbors = self.find_similar(id, None, top_k).await?;
		let search = &self.cfg.search;

		Ok(match kind {
			RecommendationKind::Similar => neighbors,
			RecommendationKind::Duplicate =>
				rerank(neighbors.into_iter().filter(|n| n.score > search.duplicate_threshold)),
			RecommendationKind::Complement => rerank(neighbors.into_iter().filter(|n| {
				n.score > search.complement_min && n.score < search.complement_max
			})),
		})
	}

	/// Human-readable rationale for one hit: shared terms and metadata
	/// highlights. Informational only; ranking never depends on it.
	pub fn explain_search(&self, query: &str, result: &SearchResult) -> String {
		let query_terms = terms(query);
		let text_terms = terms(&result.record.text);
		let shared: Vec<&String> =
			query_terms.intersection(&text_terms).take(MAX_SHARED_TERMS).collect();
		let mut out = format!(
			"Rank {}: {} {:?} scored {:.3}.",
			result.rank,
			result.record.kind,
			result.record.id,
			result.score
		);

		if shared.is_empty() {
			out.push_str(" No query terms appear verbatim; the match is semantic.");
		} else {
			let joined = shared.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");

			out.push_str(&format!(" Shared terms: {joined}."));
		}

		for key in ["framework", "tags", "file_path"] {
			if let Some(value) = result.record.meta_str(key) {
				out.push_str(&format!(" {key}: {value}."));
			}
		}

		out
	}

	async fn search_inner(
		&self,
		query: &str,
		filter: Option<&RecordFilter>,
		top_k: usize,
		min_score: f32,
	) -> ServiceResult<Vec<SearchResult>> {
		let vector = self.embed_query(query).await?;
		let scored = self.store.query(&vector, top_k, filter).await?;

		Ok(rank(scored.into_iter().filter(|s| s.score >= min_score)))
	}

	async fn find_similar_inner(
		&self,
		id: &str,
		filter: Option<&RecordFilter>,
		top_k: usize,
	) -> ServiceResult<Vec<SearchResult>> {
		let Some(reference) = self.store.get(id).await? else {
			return Ok(Vec::new());
		};
		let Some(embedding) = reference.embedding.filter(|vec| !vec.is_empty()) else {
			return Ok(Vec::new());
		};
		// One extra neighbor tolerates the reference showing up in its own
		// neighborhood.
		let scored = self.store.query(&embedding, top_k + 1, filter).await?;

		Ok(rank(scored.into_iter().filter(|s| s.record.id != id).take(top_k)))
	}

	async fn embed_query(&self, query: &str) -> ServiceResult<Vec<f32>> {
		let mut vectors = self.embedder.embed(&[query.to_string()]).await?;

		vectors.pop().ok_or_else(|| {
			ServiceError::Provider(engram_providers::Error::InvalidResponse {
				message: "Provider returned no vector for the query.".to_string(),
			})
		})
	}

	fn degrade(
		&self,
		result: ServiceResult<Vec<SearchResult>>,
		operation: &str,
	) -> ServiceResult<Vec<SearchResult>> {
		match result {
			Ok(results) => Ok(results),
			Err(err) if self.lenient_search() => {
				tracing::warn!(error = %err, operation, "Search degraded to an empty result.");

				Ok(Vec::new())
			},
			Err(err) => Err(err),
		}
	}
}

fn rank(results: impl IntoIterator<Item = ScoredRecord>) -> Vec<SearchResult> {
	results
		.into_iter()
		.enumerate()
		.map(|(index, scored)| SearchResult {
			record: scored.record,
			score: scored.score,
			rank: index + 1,
		})
		.collect()
}

fn rerank(results: impl IntoIterator<Item = SearchResult>) -> Vec<SearchResult> {
	results
		.into_iter()
		.enumerate()
		.map(|(index, mut result)| {
			result.rank = index + 1;

			result
		})
		.collect()
}

fn terms(text: &str) -> BTreeSet<String> {
	text.split(|c: char| !c.is_alphanumeric())
		.filter(|term| term.len() > 2)
		.map(str::to_lowercase)
		.collect()
}
