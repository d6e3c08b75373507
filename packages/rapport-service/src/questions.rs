use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, RapportService, Result,
	index::{self, IndexFilter},
};
use rapport_domain::question::{self, QuestionStatus};
use rapport_storage::{
	models::Question,
	outbox::{self, JobKind},
	queries, vector,
};

const MAX_SIMILAR: u32 = 50;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateQuestionRequest {
	pub text: String,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
	pub organization_id: Option<Uuid>,
	pub status: Option<QuestionStatus>,
	/// User submissions are stored as private custom text instead of curated text.
	#[serde(default)]
	pub user_submitted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateQuestionResponse {
	pub question_id: Uuid,
	pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetadataUpdate {
	pub status: Option<QuestionStatus>,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PruneReport {
	pub pruned_question_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimilarQuestion {
	pub question_id: Uuid,
	pub score: f32,
	pub text: Option<String>,
}

impl RapportService {
	pub async fn create_question(
		&self,
		req: CreateQuestionRequest,
	) -> Result<CreateQuestionResponse> {
		let text = req.text.trim();

		if text.is_empty() {
			return Err(Error::InvalidRequest { message: "text must not be empty.".to_string() });
		}

		let now = OffsetDateTime::now_utc();
		let (curated, custom, status) = if req.user_submitted {
			(None, Some(text.to_string()), Some(QuestionStatus::Private))
		} else {
			(Some(text.to_string()), None, req.status.or(Some(QuestionStatus::Pending)))
		};
		let question = Question {
			question_id: Uuid::new_v4(),
			text: curated,
			custom_text: custom,
			style: None,
			tone: None,
			topic: None,
			style_id: req.style_id,
			tone_id: req.tone_id,
			topic_id: req.topic_id,
			organization_id: req.organization_id,
			status: status.map(|status| status.as_str().to_string()),
			total_shows: 0,
			total_likes: 0,
			total_thumbs_down: 0,
			average_view_duration: 0.0,
			last_shown_at: None,
			is_ai_generated: false,
			pool_date: None,
			pool_status: None,
			pruned_at: None,
			created_at: now,
			updated_at: now,
		};
		let mut tx = self.db.pool.begin().await?;

		queries::insert_question(&mut *tx, &question).await?;
		outbox::enqueue(&mut *tx, JobKind::IndexQuestion, question.question_id, now).await?;

		tx.commit().await?;

		tracing::info!(
			question_id = %question.question_id,
			user_submitted = req.user_submitted,
			"Question created."
		);

		Ok(CreateQuestionResponse { question_id: question.question_id, status: question.status })
	}

	/// Updates filter fields on the question and its embedding row together, then queues a
	/// reindex so the index payload follows.
	pub async fn update_question_metadata(
		&self,
		question_id: Uuid,
		update: MetadataUpdate,
	) -> Result<Question> {
		if update.status.is_none()
			&& update.style_id.is_none()
			&& update.tone_id.is_none()
			&& update.topic_id.is_none()
		{
			return Err(Error::InvalidRequest { message: "No updates provided.".to_string() });
		}

		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let updated = queries::update_question_metadata(
			&mut *tx,
			question_id,
			update.status.map(QuestionStatus::as_str),
			update.style_id,
			update.tone_id,
			update.topic_id,
			now,
		)
		.await?;

		if !updated {
			return Err(Error::NotFound { message: format!("Question {question_id} not found.") });
		}

		queries::sync_filter_projection(&mut *tx, &[question_id]).await?;
		outbox::enqueue(&mut *tx, JobKind::IndexQuestion, question_id, now).await?;

		let question = queries::fetch_question(&mut *tx, question_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Question {question_id} not found.") }
		})?;

		tx.commit().await?;

		Ok(question)
	}

	/// Prunes overexposed questions nobody liked. They stay in storage but stop being served.
	pub async fn prune_stale_questions(&self) -> Result<PruneReport> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let pruned = queries::prune_questions(&mut *tx, self.cfg.pruning.min_shows, now).await?;

		if !pruned.is_empty() {
			queries::sync_filter_projection(&mut *tx, &pruned).await?;
		}
		for question_id in &pruned {
			outbox::enqueue(&mut *tx, JobKind::IndexQuestion, *question_id, now).await?;
		}

		tx.commit().await?;

		tracing::info!(pruned = pruned.len(), "Stale questions pruned.");

		Ok(PruneReport { pruned_question_ids: pruned })
	}

	/// Nearest selectable neighbors of a stored question.
	pub async fn similar_questions(
		&self,
		question_id: Uuid,
		limit: u32,
	) -> Result<Vec<SimilarQuestion>> {
		let Some(embedding) = queries::fetch_question_embedding(&self.db.pool, question_id).await?
		else {
			return Err(Error::NotFound {
				message: format!("Question {question_id} has no embedding."),
			});
		};
		let vector = vector::parse_vector_text(&embedding.vec_text)?;
		let filter = IndexFilter { exclude_ids: vec![question_id], ..IndexFilter::selectable() };
		let neighbors = index::nearest_filtered(
			self.index.as_ref(),
			&vector,
			limit.clamp(1, MAX_SIMILAR),
			&filter,
			self.cfg.curation.overfetch_factor,
		)
		.await?;
		let ids: Vec<Uuid> = neighbors.iter().map(|neighbor| neighbor.question_id).collect();
		let questions = queries::fetch_questions(&self.db.pool, &ids).await?;
		let similar = neighbors
			.into_iter()
			.filter_map(|neighbor| {
				// The index may lag behind a prune; the row is the source of truth.
				let question =
					questions.iter().find(|question| question.question_id == neighbor.question_id)?;

				if question.pruned_at.is_some()
					|| !question::is_selectable_status(question.status.as_deref())
				{
					return None;
				}

				Some(SimilarQuestion {
					question_id: neighbor.question_id,
					score: neighbor.score,
					text: question.embeddable_text().map(str::to_string),
				})
			})
			.collect();

		Ok(similar)
	}
}
