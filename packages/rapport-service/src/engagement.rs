use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, RapportService, Result};
use rapport_domain::relation::{self, RelationEvent, RelationStatus, Transition};
use rapport_storage::{
	outbox::{self, JobKind},
	queries,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeenRequest {
	#[serde(default)]
	pub view_duration_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngagementResponse {
	pub question_id: Uuid,
	pub status: RelationStatus,
}

impl RapportService {
	/// Records an exposure. Liked and hidden questions keep their status.
	pub async fn mark_seen(
		&self,
		user_id: Uuid,
		question_id: Uuid,
		req: SeenRequest,
	) -> Result<EngagementResponse> {
		if req.view_duration_ms < 0 {
			return Err(Error::InvalidRequest {
				message: "view_duration_ms must be zero or greater.".to_string(),
			});
		}

		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let transition = apply_event(
			&mut tx,
			user_id,
			question_id,
			RelationEvent::Seen,
			req.view_duration_ms,
			now,
		)
		.await?;

		queries::record_question_show(&mut *tx, question_id, req.view_duration_ms, now).await?;

		// A long dwell can become an implicit positive when the user has no likes.
		if transition.affects_preference()
			|| req.view_duration_ms >= self.cfg.preference.min_view_duration_ms
		{
			outbox::enqueue(&mut *tx, JobKind::RecomputePreference, user_id, now).await?;
		}

		tx.commit().await?;

		Ok(EngagementResponse { question_id, status: transition.next })
	}

	pub async fn toggle_like(
		&self,
		user_id: Uuid,
		question_id: Uuid,
	) -> Result<EngagementResponse> {
		self.toggle(user_id, question_id, RelationEvent::ToggleLike).await
	}

	pub async fn toggle_hide(
		&self,
		user_id: Uuid,
		question_id: Uuid,
	) -> Result<EngagementResponse> {
		self.toggle(user_id, question_id, RelationEvent::ToggleHide).await
	}

	/// Hides every question of a style from this user's selections.
	pub async fn hide_style(&self, user_id: Uuid, style_id: Uuid) -> Result<()> {
		let mut tx = self.db.pool.begin().await?;

		queries::ensure_user(&mut *tx, user_id).await?;
		queries::hide_style(&mut *tx, user_id, style_id).await?;

		tx.commit().await?;

		Ok(())
	}

	pub async fn hide_tone(&self, user_id: Uuid, tone_id: Uuid) -> Result<()> {
		let mut tx = self.db.pool.begin().await?;

		queries::ensure_user(&mut *tx, user_id).await?;
		queries::hide_tone(&mut *tx, user_id, tone_id).await?;

		tx.commit().await?;

		Ok(())
	}

	async fn toggle(
		&self,
		user_id: Uuid,
		question_id: Uuid,
		event: RelationEvent,
	) -> Result<EngagementResponse> {
		let now = OffsetDateTime::now_utc();
		let mut tx = self.db.pool.begin().await?;
		let transition = apply_event(&mut tx, user_id, question_id, event, 0, now).await?;

		if transition.affects_preference() {
			queries::adjust_question_reactions(
				&mut *tx,
				question_id,
				transition.like_delta(),
				transition.hide_delta(),
			)
			.await?;
			outbox::enqueue(&mut *tx, JobKind::RecomputePreference, user_id, now).await?;
		}

		tx.commit().await?;

		tracing::debug!(
			user_id = %user_id,
			question_id = %question_id,
			status = transition.next.as_str(),
			"Relation toggled."
		);

		Ok(EngagementResponse { question_id, status: transition.next })
	}
}

/// Locks the relation row, applies `event`, and writes the result back.
async fn apply_event(
	tx: &mut Transaction<'_, Postgres>,
	user_id: Uuid,
	question_id: Uuid,
	event: RelationEvent,
	view_duration_ms: i64,
	now: OffsetDateTime,
) -> Result<Transition> {
	if queries::fetch_question(&mut **tx, question_id).await?.is_none() {
		return Err(Error::NotFound { message: format!("Question {question_id} not found.") });
	}

	queries::ensure_user(&mut **tx, user_id).await?;

	let previous = queries::fetch_relation_for_update(&mut **tx, user_id, question_id)
		.await?
		.map(|row| row.status.parse::<RelationStatus>())
		.transpose()
		.map_err(|err| Error::Storage { message: err.to_string() })?;
	let transition = relation::apply(previous, event);
	let seen_increment = i32::from(event == RelationEvent::Seen);

	queries::upsert_relation(
		&mut **tx,
		user_id,
		question_id,
		transition.next.as_str(),
		seen_increment,
		view_duration_ms,
		now,
	)
	.await?;

	Ok(transition)
}
