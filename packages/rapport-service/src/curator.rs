//! Duplicate Curator.
//!
//! A sweep walks every stored embedding in question id order, asks the similarity index for each
//! one's nearest neighbors, and records pairs above the similarity threshold for human review.
//! Progress is committed after every batch so a failed or interrupted sweep resumes from its
//! cursor instead of starting over. Detections are keyed by their sorted ids, which makes
//! re-running any part of a sweep harmless.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, RapportService, Result,
	index::{self, IndexFilter, Neighbor, SimilarityIndex},
};
use rapport_config::Curation;
use rapport_domain::duplicates::{self, DetectionStatus, DuplicateCandidate, SweepStatus};
use rapport_storage::{
	models::{DuplicateDetection, DuplicateSweep},
	outbox::{self, JobKind},
	queries::{self, SweepProgress},
	vector,
};

#[derive(Debug, Clone)]
pub struct SweepItem {
	pub question_id: Uuid,
	pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct SweepBatchOutcome {
	pub detections: Vec<DuplicateCandidate>,
	/// Per-item failures. The batch keeps going past them.
	pub errors: Vec<String>,
	pub questions: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SweepReport {
	pub sweep: DuplicateSweep,
	pub batches_run: u32,
	pub detections_created: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
	Approved,
	Rejected,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReviewRequest {
	pub decision: ReviewDecision,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewResponse {
	pub detection_id: Uuid,
	pub status: DetectionStatus,
	pub kept_question_id: Option<Uuid>,
	pub deleted_question_ids: Vec<Uuid>,
}

/// Finds duplicate pairs for one batch of embeddings.
pub async fn sweep_batch(
	index: &dyn SimilarityIndex,
	items: &[SweepItem],
	cfg: &Curation,
) -> SweepBatchOutcome {
	let mut outcome = SweepBatchOutcome::default();
	let mut keys = HashSet::new();

	for item in items {
		if item.vector.is_empty() {
			continue;
		}

		outcome.questions += 1;

		let filter = IndexFilter { exclude_ids: vec![item.question_id], ..Default::default() };
		let neighbors = match index::nearest_filtered(
			index,
			&item.vector,
			cfg.neighbor_limit,
			&filter,
			cfg.overfetch_factor,
		)
		.await
		{
			Ok(neighbors) => neighbors,
			Err(err) => {
				tracing::warn!(
					question_id = %item.question_id,
					error = %err,
					"Similarity query failed during sweep."
				);
				outcome.errors.push(format!("Question {}: {err}", item.question_id));

				continue;
			},
		};
		let scored: Vec<(Uuid, f32)> =
			neighbors.iter().map(|neighbor| (neighbor.question_id, neighbor.score)).collect();

		for candidate in
			duplicates::pairs_from_neighbors(item.question_id, &scored, cfg.similarity_threshold)
		{
			if keys.insert(candidate.unique_key.clone()) {
				outcome.detections.push(candidate);
			}
		}
	}

	outcome
}

/// Closest existing question when it is similar enough to count as a duplicate. Writes nothing.
pub async fn is_near_duplicate(
	index: &dyn SimilarityIndex,
	vector: &[f32],
	cfg: &Curation,
) -> Result<Option<Neighbor>> {
	let nearest =
		index::nearest_filtered(index, vector, 1, &IndexFilter::default(), cfg.overfetch_factor)
			.await?;

	Ok(nearest.into_iter().next().filter(|neighbor| neighbor.score > cfg.similarity_threshold))
}

impl RapportService {
	pub async fn start_sweep(&self) -> Result<DuplicateSweep> {
		let now = OffsetDateTime::now_utc();
		let batch_size = self.cfg.curation.batch_size;
		let total = queries::count_embedded_questions(&self.db.pool).await?;
		let total_batches =
			duplicates::plan_batches(u64::try_from(total).unwrap_or_default(), batch_size);
		let mut sweep = DuplicateSweep {
			sweep_id: Uuid::new_v4(),
			status: SweepStatus::Pending.as_str().to_string(),
			total_questions: total,
			total_batches: i64::try_from(total_batches).unwrap_or(i64::MAX),
			batch_size: i32::try_from(batch_size).unwrap_or(i32::MAX),
			batches_processed: 0,
			questions_processed: 0,
			duplicates_found: 0,
			errors: Vec::new(),
			cursor: None,
			started_at: now,
			updated_at: now,
			finished_at: None,
		};
		let mut tx = self.db.pool.begin().await?;

		queries::insert_sweep(&mut *tx, &sweep).await?;
		queries::set_sweep_status(
			&mut *tx,
			sweep.sweep_id,
			SweepStatus::Running.as_str(),
			&[],
			None,
			now,
		)
		.await?;

		tx.commit().await?;

		sweep.status = SweepStatus::Running.as_str().to_string();

		tracing::info!(
			sweep_id = %sweep.sweep_id,
			total_questions = total,
			total_batches = sweep.total_batches,
			"Duplicate sweep started."
		);

		Ok(sweep)
	}

	/// Runs up to `curation.max_batches_per_run` batches of a running sweep.
	pub async fn run_sweep_step(&self, sweep_id: Uuid) -> Result<SweepReport> {
		let sweep = self.load_sweep(sweep_id).await?;
		let status = parse_sweep_status(&sweep.status)?;

		if status.is_terminal() {
			return Ok(SweepReport { sweep, batches_run: 0, detections_created: 0 });
		}
		if status == SweepStatus::Pending {
			queries::set_sweep_status(
				&self.db.pool,
				sweep_id,
				SweepStatus::Running.as_str(),
				&[],
				None,
				OffsetDateTime::now_utc(),
			)
			.await?;
		}

		match self.run_batches(&sweep).await {
			Ok((batches_run, detections_created)) => {
				let sweep = self.load_sweep(sweep_id).await?;

				Ok(SweepReport { sweep, batches_run, detections_created })
			},
			Err(err) => {
				tracing::error!(sweep_id = %sweep_id, error = %err, "Duplicate sweep failed.");

				let now = OffsetDateTime::now_utc();

				queries::set_sweep_status(
					&self.db.pool,
					sweep_id,
					SweepStatus::Failed.as_str(),
					&[err.to_string()],
					Some(now),
					now,
				)
				.await?;

				Err(err)
			},
		}
	}

	/// Puts a failed sweep back to running. It continues from its last committed cursor.
	pub async fn resume_sweep(&self, sweep_id: Uuid) -> Result<DuplicateSweep> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let Some(sweep) = queries::fetch_sweep_for_update(&mut *tx, sweep_id).await? else {
			return Err(Error::NotFound { message: format!("Sweep {sweep_id} not found.") });
		};

		match parse_sweep_status(&sweep.status)? {
			SweepStatus::Completed => {
				return Err(Error::Conflict {
					message: format!("Sweep {sweep_id} is already completed."),
				});
			},
			SweepStatus::Running => {},
			SweepStatus::Failed | SweepStatus::Pending => {
				queries::set_sweep_status(
					&mut *tx,
					sweep_id,
					SweepStatus::Running.as_str(),
					&[],
					None,
					now,
				)
				.await?;
			},
		}

		tx.commit().await?;

		tracing::info!(sweep_id = %sweep_id, cursor = ?sweep.cursor, "Duplicate sweep resumed.");

		self.load_sweep(sweep_id).await
	}

	pub async fn get_sweep(&self, sweep_id: Uuid) -> Result<DuplicateSweep> {
		self.load_sweep(sweep_id).await
	}

	pub async fn list_detections(
		&self,
		status: Option<DetectionStatus>,
		limit: u32,
	) -> Result<Vec<DuplicateDetection>> {
		let rows = queries::list_detections(
			&self.db.pool,
			status.map(DetectionStatus::as_str),
			limit.clamp(1, 500),
		)
		.await?;

		Ok(rows)
	}

	/// Settles a pending detection. Approval keeps the oldest question and deletes the rest.
	pub async fn review_detection(
		&self,
		detection_id: Uuid,
		decision: ReviewDecision,
	) -> Result<ReviewResponse> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let Some(detection) = queries::fetch_detection_for_update(&mut *tx, detection_id).await?
		else {
			return Err(Error::NotFound { message: format!("Detection {detection_id} not found.") });
		};

		if detection.status != DetectionStatus::Pending.as_str() {
			return Err(Error::Conflict {
				message: format!("Detection {detection_id} was already {}.", detection.status),
			});
		}

		let (status, kept_question_id, deleted_question_ids) = match decision {
			ReviewDecision::Rejected => (DetectionStatus::Rejected, None, Vec::new()),
			ReviewDecision::Approved => {
				let questions = queries::fetch_questions(&mut *tx, &detection.question_ids).await?;
				let mut ids = questions.iter().map(|question| question.question_id);
				let kept = ids.next();
				let removed: Vec<Uuid> = ids.collect();

				if !removed.is_empty() {
					queries::delete_questions(&mut *tx, &removed).await?;
				}
				for question_id in &removed {
					outbox::enqueue(&mut *tx, JobKind::DeleteQuestion, *question_id, now).await?;
				}

				(DetectionStatus::Approved, kept, removed)
			},
		};

		queries::set_detection_status(&mut *tx, detection_id, status.as_str(), now).await?;

		tx.commit().await?;

		tracing::info!(
			detection_id = %detection_id,
			status = status.as_str(),
			deleted = deleted_question_ids.len(),
			"Duplicate detection reviewed."
		);

		Ok(ReviewResponse { detection_id, status, kept_question_id, deleted_question_ids })
	}

	async fn load_sweep(&self, sweep_id: Uuid) -> Result<DuplicateSweep> {
		queries::fetch_sweep(&self.db.pool, sweep_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Sweep {sweep_id} not found.") })
	}

	async fn run_batches(&self, sweep: &DuplicateSweep) -> Result<(u32, i64)> {
		let cfg = &self.cfg.curation;
		let mut cursor = sweep.cursor;
		let mut batches_run = 0;
		let mut created_total = 0;

		while batches_run < cfg.max_batches_per_run {
			let page = queries::fetch_embedding_page(&self.db.pool, cursor, cfg.batch_size).await?;

			if page.is_empty() {
				self.complete_sweep(sweep.sweep_id).await?;

				break;
			}

			let page_len = page.len();
			let last_id = page.last().map(|(question_id, _)| *question_id);
			let mut errors = Vec::new();
			let items: Vec<SweepItem> = page
				.into_iter()
				.filter_map(|(question_id, text)| match vector::parse_vector_text(&text) {
					Ok(vector) => Some(SweepItem { question_id, vector }),
					Err(err) => {
						errors.push(format!("Question {question_id}: {err}"));

						None
					},
				})
				.collect();
			let outcome = sweep_batch(self.index.as_ref(), &items, cfg).await;
			let now = OffsetDateTime::now_utc();
			let mut created = 0;

			errors.extend(outcome.errors);

			for candidate in &outcome.detections {
				match queries::insert_detection(&self.db.pool, candidate, now).await {
					Ok(true) => created += 1,
					Ok(false) => {},
					Err(err) => {
						tracing::warn!(
							sweep_id = %sweep.sweep_id,
							unique_key = %candidate.unique_key,
							error = %err,
							"Failed to record duplicate detection."
						);
						errors.push(format!("Detection {}: {err}", candidate.unique_key));
					},
				}
			}

			let recorded = queries::record_sweep_batch(
				&self.db.pool,
				sweep.sweep_id,
				&SweepProgress {
					from_cursor: cursor,
					cursor: last_id,
					questions: outcome.questions,
					duplicates: created,
					errors: &errors,
				},
				now,
			)
			.await?;

			if !recorded {
				tracing::info!(
					sweep_id = %sweep.sweep_id,
					"Sweep cursor moved by another runner. Stopping this step."
				);

				break;
			}

			batches_run += 1;
			created_total += created;
			cursor = last_id;

			tracing::info!(
				sweep_id = %sweep.sweep_id,
				questions = outcome.questions,
				duplicates = created,
				errors = errors.len(),
				"Sweep batch committed."
			);

			if page_len < cfg.batch_size as usize {
				self.complete_sweep(sweep.sweep_id).await?;

				break;
			}
		}

		Ok((batches_run, created_total))
	}

	async fn complete_sweep(&self, sweep_id: Uuid) -> Result<()> {
		let now = OffsetDateTime::now_utc();

		queries::set_sweep_status(
			&self.db.pool,
			sweep_id,
			SweepStatus::Completed.as_str(),
			&[],
			Some(now),
			now,
		)
		.await?;

		tracing::info!(sweep_id = %sweep_id, "Duplicate sweep completed.");

		Ok(())
	}
}

fn parse_sweep_status(raw: &str) -> Result<SweepStatus> {
	raw.parse().map_err(|err: rapport_domain::question::UnknownValue| Error::Storage {
		message: err.to_string(),
	})
}
