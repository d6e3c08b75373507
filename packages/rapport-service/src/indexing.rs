//! Outbox job handlers. Each one is idempotent, since delivery is at least once.

use uuid::Uuid;

use crate::{
	Error, IndexPoint, RapportService, Result,
	embedding::{self, embed_text},
	embedding_version,
};
use rapport_storage::{
	models::JobOutboxEntry,
	outbox::JobKind,
	queries, vector,
};

impl RapportService {
	pub async fn handle_job(&self, job: &JobOutboxEntry) -> Result<()> {
		let kind: JobKind = job.kind.parse()?;

		match kind {
			JobKind::IndexQuestion => self.index_question(job.subject_id).await,
			JobKind::DeleteQuestion => self.remove_question(job.subject_id).await,
			JobKind::RecomputePreference => {
				self.recompute_preference(job.subject_id).await?;

				Ok(())
			},
		}
	}

	/// Brings the stored embedding and the index point in line with the question row.
	///
	/// The provider is only called when the text digest or the embedding version changed.
	pub async fn index_question(&self, question_id: Uuid) -> Result<()> {
		let Some(question) = queries::fetch_question(&self.db.pool, question_id).await? else {
			return self.remove_question(question_id).await;
		};
		let Some(text) = question.embeddable_text() else {
			tracing::info!(question_id = %question_id, "Question has no text. Removing it.");

			return self.remove_question(question_id).await;
		};
		let version = embedding_version(&self.cfg);
		let digest = embedding::text_digest(text);
		let existing = queries::fetch_question_embedding(&self.db.pool, question_id).await?;
		let reusable = existing.filter(|stored| {
			stored.text_digest == digest && stored.embedding_version == version
		});
		let vector = match reusable {
			Some(stored) => vector::parse_vector_text(&stored.vec_text)?,
			None => {
				let vector = embed_text(&self.providers, &self.cfg, Some(text)).await?;
				let dim = i32::try_from(vector.len()).map_err(|_| Error::Provider {
					message: "Embedding dimension is out of range.".to_string(),
				})?;

				queries::upsert_question_embedding(
					&self.db.pool,
					question_id,
					&version,
					&vector::format_vector_text(&vector),
					dim,
					&digest,
				)
				.await?;

				tracing::debug!(question_id = %question_id, "Question embedding stored.");

				vector
			},
		};

		self.index
			.upsert(&IndexPoint {
				question_id,
				vector,
				status: question.status.clone(),
				style_id: question.style_id,
				tone_id: question.tone_id,
				topic_id: question.topic_id,
				embedding_version: version,
			})
			.await?;

		Ok(())
	}

	pub async fn remove_question(&self, question_id: Uuid) -> Result<()> {
		queries::delete_question_embedding(&self.db.pool, question_id).await?;

		match self.index.delete(question_id).await {
			Ok(()) => Ok(()),
			Err(err) if is_not_found_error(&err) => {
				tracing::debug!(question_id = %question_id, "Index point already gone.");

				Ok(())
			},
			Err(err) => Err(err),
		}
	}
}

fn is_not_found_error(err: &Error) -> bool {
	let Error::Qdrant { message } = err else {
		return false;
	};
	let message = message.to_lowercase();
	let point_not_found =
		(message.contains("not found") || message.contains("404")) && message.contains("point");
	let no_point_found = message.contains("no point") && message.contains("found");

	point_not_found || no_point_found
}
