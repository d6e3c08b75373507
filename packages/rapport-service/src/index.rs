//! Similarity Index Client.
//!
//! Qdrant's payload filters are applied as a hint only. Every caller goes through
//! [`nearest_filtered`], which over-fetches and re-checks the filter in memory against the payload
//! returned with each hit.

use std::{cmp::Ordering, collections::HashMap};

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, DeletePointsBuilder, Filter, PointStruct, Query, QueryPointsBuilder,
		UpsertPointsBuilder, Value, Vector, point_id::PointIdOptions, value::Kind,
	},
};
use uuid::Uuid;

use rapport_storage::qdrant::{DENSE_VECTOR_NAME, QdrantStore};

use crate::{BoxFuture, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
	pub question_id: Uuid,
	pub score: f32,
	pub status: Option<String>,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
	/// Allowed statuses. Empty means any.
	pub statuses: Vec<String>,
	/// Points without a status pass the status check.
	pub allow_missing_status: bool,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
	pub exclude_ids: Vec<Uuid>,
}
impl IndexFilter {
	/// Filter for neighbors a user could actually be shown.
	pub fn selectable() -> Self {
		Self {
			statuses: rapport_domain::question::SELECTABLE_STATUSES
				.iter()
				.map(|status| status.as_str().to_string())
				.collect(),
			allow_missing_status: true,
			..Default::default()
		}
	}

	pub fn matches(&self, neighbor: &Neighbor) -> bool {
		if self.exclude_ids.contains(&neighbor.question_id) {
			return false;
		}
		if !self.statuses.is_empty() {
			match neighbor.status.as_deref() {
				Some(status) if self.statuses.iter().any(|allowed| allowed == status) => {},
				None if self.allow_missing_status => {},
				_ => return false,
			}
		}

		same_if_set(self.style_id, neighbor.style_id)
			&& same_if_set(self.tone_id, neighbor.tone_id)
			&& same_if_set(self.topic_id, neighbor.topic_id)
	}

	fn to_qdrant(&self) -> Option<Filter> {
		let mut must = Vec::new();

		// Qdrant cannot match a missing key here; the in-memory check covers it.
		if !self.statuses.is_empty() && !self.allow_missing_status {
			must.push(Condition::matches("status", self.statuses.clone()));
		}

		for (field, value) in
			[("style_id", self.style_id), ("tone_id", self.tone_id), ("topic_id", self.topic_id)]
		{
			if let Some(value) = value {
				must.push(Condition::matches(field, value.to_string()));
			}
		}

		if must.is_empty() { None } else { Some(Filter::must(must)) }
	}
}

#[derive(Debug, Clone)]
pub struct IndexPoint {
	pub question_id: Uuid,
	pub vector: Vec<f32>,
	pub status: Option<String>,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
	pub embedding_version: String,
}

pub trait SimilarityIndex
where
	Self: Send + Sync,
{
	/// Raw nearest neighbors. The filter is a hint; results may include non-matching points.
	fn nearest<'a>(
		&'a self,
		vector: &'a [f32],
		limit: u32,
		filter: Option<&'a IndexFilter>,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>>;

	fn upsert<'a>(&'a self, point: &'a IndexPoint) -> BoxFuture<'a, Result<()>>;

	fn delete<'a>(&'a self, question_id: Uuid) -> BoxFuture<'a, Result<()>>;
}

/// Up to `limit` neighbors that pass `filter`, best first, ties broken by id.
pub async fn nearest_filtered(
	index: &dyn SimilarityIndex,
	vector: &[f32],
	limit: u32,
	filter: &IndexFilter,
	overfetch_factor: u32,
) -> Result<Vec<Neighbor>> {
	if vector.is_empty() || limit == 0 {
		return Ok(Vec::new());
	}

	let fetch = limit.saturating_mul(overfetch_factor.max(1));
	let mut hits: Vec<Neighbor> = index
		.nearest(vector, fetch, Some(filter))
		.await?
		.into_iter()
		.filter(|neighbor| filter.matches(neighbor))
		.collect();

	sort_neighbors(&mut hits);
	hits.dedup_by(|a, b| a.question_id == b.question_id);
	hits.truncate(limit as usize);

	Ok(hits)
}

pub fn sort_neighbors(hits: &mut [Neighbor]) {
	hits.sort_by(|a, b| {
		b.score
			.partial_cmp(&a.score)
			.unwrap_or(Ordering::Equal)
			.then(a.question_id.cmp(&b.question_id))
	});
}

impl SimilarityIndex for QdrantStore {
	fn nearest<'a>(
		&'a self,
		vector: &'a [f32],
		limit: u32,
		filter: Option<&'a IndexFilter>,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(async move {
			let mut search = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(vector.to_vec()))
				.using(DENSE_VECTOR_NAME)
				.limit(u64::from(limit))
				.with_payload(true);

			if let Some(filter) = filter.and_then(IndexFilter::to_qdrant) {
				search = search.filter(filter);
			}

			let response = self.client.query(search).await?;
			let neighbors = response
				.result
				.into_iter()
				.filter_map(|point| {
					let question_id = payload_uuid(&point.payload, "question_id").or_else(|| {
						point.id.as_ref().and_then(|id| match &id.point_id_options {
							Some(PointIdOptions::Uuid(raw)) => Uuid::parse_str(raw).ok(),
							_ => None,
						})
					})?;

					Some(Neighbor {
						question_id,
						score: point.score,
						status: payload_string(&point.payload, "status"),
						style_id: payload_uuid(&point.payload, "style_id"),
						tone_id: payload_uuid(&point.payload, "tone_id"),
						topic_id: payload_uuid(&point.payload, "topic_id"),
					})
				})
				.collect();

			Ok(neighbors)
		})
	}

	fn upsert<'a>(&'a self, point: &'a IndexPoint) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut payload = Payload::new();

			payload.insert("question_id", point.question_id.to_string());
			payload.insert("embedding_version", point.embedding_version.clone());

			for (key, value) in [
				("status", point.status.clone()),
				("style_id", point.style_id.map(|id| id.to_string())),
				("tone_id", point.tone_id.map(|id| id.to_string())),
				("topic_id", point.topic_id.map(|id| id.to_string())),
			] {
				if let Some(value) = value {
					payload.insert(key, value);
				}
			}

			let mut vectors = HashMap::new();

			vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(point.vector.clone()));

			let upsert = UpsertPointsBuilder::new(
				self.collection.clone(),
				vec![PointStruct::new(point.question_id.to_string(), vectors, payload)],
			)
			.wait(true);

			self.client.upsert_points(upsert).await?;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, question_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let filter =
				Filter::must([Condition::matches("question_id", question_id.to_string())]);
			let delete =
				DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

			self.client.delete_points(delete).await?;

			Ok(())
		})
	}
}

fn same_if_set(wanted: Option<Uuid>, actual: Option<Uuid>) -> bool {
	wanted.is_none_or(|wanted| actual == Some(wanted))
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match &payload.get(key)?.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	payload_string(payload, key).and_then(|text| Uuid::parse_str(&text).ok())
}
