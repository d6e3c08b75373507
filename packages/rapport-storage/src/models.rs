use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Question {
	pub question_id: Uuid,
	pub text: Option<String>,
	pub custom_text: Option<String>,
	pub style: Option<String>,
	pub tone: Option<String>,
	pub topic: Option<String>,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
	pub organization_id: Option<Uuid>,
	pub status: Option<String>,
	pub total_shows: i64,
	pub total_likes: i64,
	pub total_thumbs_down: i64,
	pub average_view_duration: f64,
	#[serde(with = "crate::time_serde::option")]
	pub last_shown_at: Option<OffsetDateTime>,
	pub is_ai_generated: bool,
	#[serde(with = "crate::time_serde::date::option")]
	pub pool_date: Option<Date>,
	pub pool_status: Option<String>,
	#[serde(with = "crate::time_serde::option")]
	pub pruned_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}
impl Question {
	/// Text used for display and embedding. Curated text wins over a user's custom text.
	pub fn embeddable_text(&self) -> Option<&str> {
		rapport_domain::question::display_text(self.text.as_deref())
			.or_else(|| rapport_domain::question::display_text(self.custom_text.as_deref()))
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateRow {
	pub question_id: Uuid,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
}
impl From<CandidateRow> for rapport_domain::selection::Candidate {
	fn from(row: CandidateRow) -> Self {
		Self {
			question_id: row.question_id,
			style_id: row.style_id,
			tone_id: row.tone_id,
			topic_id: row.topic_id,
		}
	}
}

/// A `question_embeddings` row with the vector still in pgvector text form.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionEmbedding {
	pub question_id: Uuid,
	pub embedding_version: String,
	pub embedding_dim: i32,
	pub vec_text: String,
	pub text_digest: String,
	pub status: Option<String>,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserQuestion {
	pub user_id: Uuid,
	pub question_id: Uuid,
	pub status: String,
	pub seen_count: i32,
	pub view_duration_ms: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tag {
	pub id: Uuid,
	pub slug: String,
	pub name: String,
	pub prompt_description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TopicWindowRow {
	pub window_id: Uuid,
	pub topic_id: Uuid,
	pub starts_at: OffsetDateTime,
	pub ends_at: OffsetDateTime,
	pub is_takeover: bool,
}
impl From<TopicWindowRow> for rapport_domain::selection::TopicWindow {
	fn from(row: TopicWindowRow) -> Self {
		Self {
			topic_id: row.topic_id,
			starts_at: row.starts_at,
			ends_at: row.ends_at,
			is_takeover: row.is_takeover,
		}
	}
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DuplicateDetection {
	pub detection_id: Uuid,
	pub question_ids: Vec<Uuid>,
	pub unique_key: String,
	pub reason: String,
	pub confidence: f32,
	pub status: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub reviewed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DuplicateSweep {
	pub sweep_id: Uuid,
	pub status: String,
	pub total_questions: i64,
	pub total_batches: i64,
	pub batch_size: i32,
	pub batches_processed: i64,
	pub questions_processed: i64,
	pub duplicates_found: i64,
	pub errors: Vec<String>,
	pub cursor: Option<Uuid>,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub finished_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobOutboxEntry {
	pub outbox_id: Uuid,
	pub kind: String,
	pub subject_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PoolRun {
	#[serde(with = "crate::time_serde::date")]
	pub pool_date: Date,
	pub status: String,
	pub created: i32,
	pub rejected_short: i32,
	pub rejected_exact: i32,
	pub rejected_similar: i32,
	pub errors: Vec<String>,
	#[serde(with = "crate::time_serde")]
	pub started_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub finished_at: Option<OffsetDateTime>,
}
