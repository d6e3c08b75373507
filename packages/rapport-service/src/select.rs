use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{IndexFilter, RapportService, Result, index};
use rapport_domain::{
	selection::{self, Candidate, Exclusions, SelectionInput, TopicWindow},
	shuffle::{self, Mulberry32},
};
use rapport_storage::{queries::{self, ScanFilter}, vector};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SelectRequest {
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
	pub organization_id: Option<Uuid>,
	pub count: Option<u32>,
	pub seed: Option<u32>,
	#[serde(default)]
	pub exclude_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectResponse {
	pub question_ids: Vec<Uuid>,
	/// Replaying the request with this seed reproduces the same order.
	pub seed: u32,
}

impl RapportService {
	/// Next questions for a user.
	///
	/// An unresolved user gets an empty list rather than an error.
	pub async fn select_next(
		&self,
		user_id: Option<Uuid>,
		req: SelectRequest,
	) -> Result<SelectResponse> {
		let seed = req.seed.unwrap_or_else(shuffle::fresh_seed);
		let Some(user_id) = user_id else {
			tracing::debug!("Selection requested without a resolved user.");

			return Ok(SelectResponse { question_ids: Vec::new(), seed });
		};
		let now = OffsetDateTime::now_utc();
		let count = selection::clamp_count(req.count, &self.cfg.selection);

		if count == 0 {
			return Ok(SelectResponse { question_ids: Vec::new(), seed });
		}

		let exclusions = self.load_exclusions(user_id, &req.exclude_ids).await?;
		let limit = selection::fetch_limit(count, &self.cfg.selection);
		let filter = scan_filter(user_id, &req);
		let windows: Vec<TopicWindow> = queries::fetch_active_topic_windows(&self.db.pool, now)
			.await?
			.into_iter()
			.map(TopicWindow::from)
			.collect();
		let topic_ids: Vec<Uuid> = match selection::active_takeover(&windows, now) {
			Some(takeover) => vec![takeover.topic_id],
			None => selection::active_topics(&windows, now),
		};
		let mut topic_candidates = HashMap::new();

		for topic_id in topic_ids {
			let topic_filter = ScanFilter {
				topic_id: Some(topic_id),
				organization_id: req.organization_id,
				user_id: Some(user_id),
				exclude_ids: req.exclude_ids.clone(),
				..Default::default()
			};
			let rows = queries::scan_candidates(&self.db.pool, &topic_filter, seed, limit).await?;

			topic_candidates
				.insert(topic_id, rows.into_iter().map(Candidate::from).collect::<Vec<_>>());
		}

		let general = self.general_candidates(user_id, &req, filter, seed, limit).await?;
		let mut rng = Mulberry32::new(seed);
		let question_ids = selection::select_candidates(
			SelectionInput {
				general: &general,
				topic_candidates: &topic_candidates,
				windows: &windows,
				exclusions: &exclusions,
				now,
				count: count as usize,
			},
			&mut rng,
		);

		tracing::debug!(
			user_id = %user_id,
			seed,
			requested = count,
			returned = question_ids.len(),
			"Selected questions."
		);

		Ok(SelectResponse { question_ids, seed })
	}

	/// Nearest neighbors of the user's preference vector, topped up from the plain scan.
	///
	/// Neighbor ids are re-checked against the database so exclusions, status, and organization
	/// hold even when the index payload is stale.
	async fn general_candidates(
		&self,
		user_id: Uuid,
		req: &SelectRequest,
		mut filter: ScanFilter,
		seed: u32,
		limit: u32,
	) -> Result<Vec<Candidate>> {
		let mut candidates = Vec::new();
		let preference = self.stored_preference(user_id).await?;

		if !preference.is_empty() {
			let index_filter = IndexFilter {
				style_id: req.style_id,
				tone_id: req.tone_id,
				topic_id: req.topic_id,
				exclude_ids: req.exclude_ids.clone(),
				..IndexFilter::selectable()
			};
			// Extra neighbors absorb the ones the database re-check drops.
			let wanted = limit
				.saturating_mul(self.cfg.curation.overfetch_factor.max(1))
				.min(self.cfg.selection.max_fetch.max(limit));

			match index::nearest_filtered(
				self.index.as_ref(),
				&preference,
				wanted,
				&index_filter,
				self.cfg.curation.overfetch_factor,
			)
			.await
			{
				Ok(neighbors) if !neighbors.is_empty() => {
					let ranked: Vec<Uuid> =
						neighbors.iter().map(|neighbor| neighbor.question_id).collect();
					let neighbor_filter =
						ScanFilter { question_ids: Some(ranked.clone()), ..filter.clone() };
					let mut rows: HashMap<Uuid, Candidate> =
						queries::scan_candidates(&self.db.pool, &neighbor_filter, seed, wanted)
							.await?
							.into_iter()
							.map(|row| {
								let candidate = Candidate::from(row);

								(candidate.question_id, candidate)
							})
							.collect();

					candidates.extend(ranked.iter().filter_map(|id| rows.remove(id)));
					candidates.truncate(limit as usize);
				},
				Ok(_) => {},
				Err(err) => {
					tracing::warn!(
						error = %err,
						user_id = %user_id,
						"Preference lookup failed. Falling back to the plain scan."
					);
				},
			}
		}

		let missing = limit.saturating_sub(u32::try_from(candidates.len()).unwrap_or(u32::MAX));

		if missing == 0 {
			return Ok(candidates);
		}

		filter.exclude_ids.extend(candidates.iter().map(|candidate| candidate.question_id));
		candidates.extend(
			queries::scan_candidates(&self.db.pool, &filter, seed, missing)
				.await?
				.into_iter()
				.map(Candidate::from),
		);

		Ok(candidates)
	}

	async fn stored_preference(&self, user_id: Uuid) -> Result<Vec<f32>> {
		match queries::fetch_user_preference(&self.db.pool, user_id).await? {
			Some(Some(text)) => Ok(vector::parse_vector_text(&text)?),
			_ => Ok(Vec::new()),
		}
	}

	async fn load_exclusions(&self, user_id: Uuid, extra: &[Uuid]) -> Result<Exclusions> {
		let mut exclusions = Exclusions::default();

		exclusions.question_ids.extend(extra.iter().copied());
		exclusions
			.hidden_styles
			.extend(queries::fetch_hidden_styles(&self.db.pool, user_id).await?);
		exclusions.hidden_tones.extend(queries::fetch_hidden_tones(&self.db.pool, user_id).await?);

		Ok(exclusions)
	}
}

fn scan_filter(user_id: Uuid, req: &SelectRequest) -> ScanFilter {
	ScanFilter {
		style_id: req.style_id,
		tone_id: req.tone_id,
		topic_id: req.topic_id,
		organization_id: req.organization_id,
		user_id: Some(user_id),
		exclude_ids: req.exclude_ids.clone(),
		question_ids: None,
	}
}
