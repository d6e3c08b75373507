use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, RapportService, Result};
use rapport_domain::{
	preference::{self, SignalRow, SignalSource},
	relation::RelationStatus,
};
use rapport_storage::{queries, vector};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreferenceResponse {
	pub user_id: Uuid,
	/// Empty when the user has no usable signals yet.
	pub vector: Vec<f32>,
}

impl RapportService {
	/// Rebuilds a user's preference vector from liked or long-viewed questions.
	///
	/// Runs from the job outbox. Questions without an embedding are skipped; no usable signal
	/// clears the stored vector.
	pub async fn recompute_preference(&self, user_id: Uuid) -> Result<Vec<f32>> {
		let now = OffsetDateTime::now_utc();
		let rows: Vec<SignalRow> = queries::fetch_signal_rows(&self.db.pool, user_id)
			.await?
			.into_iter()
			.filter_map(|row| {
				let status = row.status.parse::<RelationStatus>().ok()?;

				Some(SignalRow {
					question_id: row.question_id,
					status,
					view_duration_ms: row.view_duration_ms,
					updated_at: row.updated_at,
				})
			})
			.collect();
		let selection = preference::select_signals(&rows, now, &self.cfg.preference);
		let mut stored: HashMap<Uuid, Vec<f32>> = HashMap::new();

		if !selection.question_ids.is_empty() {
			for (question_id, text) in
				queries::fetch_question_vectors(&self.db.pool, &selection.question_ids).await?
			{
				match vector::parse_vector_text(&text) {
					Ok(parsed) => {
						stored.insert(question_id, parsed);
					},
					Err(err) => {
						tracing::warn!(
							question_id = %question_id,
							error = %err,
							"Skipping unreadable question embedding."
						);
					},
				}
			}
		}

		let embeddings: Vec<Option<Vec<f32>>> =
			selection.question_ids.iter().map(|id| stored.remove(id)).collect();
		let aggregated = preference::aggregate(&embeddings);
		let vec_text = (!aggregated.is_empty()).then(|| vector::format_vector_text(&aggregated));

		queries::update_user_preference(&self.db.pool, user_id, vec_text.as_deref(), now).await?;

		tracing::info!(
			user_id = %user_id,
			source = signal_source_label(selection.source),
			signals = selection.question_ids.len(),
			dim = aggregated.len(),
			"Preference recomputed."
		);

		Ok(aggregated)
	}

	pub async fn get_preference_vector(&self, user_id: Uuid) -> Result<PreferenceResponse> {
		let Some(stored) = queries::fetch_user_preference(&self.db.pool, user_id).await? else {
			return Err(Error::NotFound { message: format!("User {user_id} not found.") });
		};
		let vector = match stored {
			Some(text) => vector::parse_vector_text(&text)?,
			None => Vec::new(),
		};

		Ok(PreferenceResponse { user_id, vector })
	}
}

fn signal_source_label(source: SignalSource) -> &'static str {
	match source {
		SignalSource::Liked => "liked",
		SignalSource::LongViews => "long_views",
		SignalSource::None => "none",
	}
}
