use sqlx::{PgExecutor, Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Result,
	models::{
		CandidateRow, DuplicateDetection, DuplicateSweep, PoolRun, Question, QuestionEmbedding, Tag,
		TopicWindowRow, UserQuestion,
	},
};
use rapport_domain::generation;

const QUESTION_COLUMNS: &str = "\
question_id,
	text,
	custom_text,
	style,
	tone,
	topic,
	style_id,
	tone_id,
	topic_id,
	organization_id,
	status,
	total_shows,
	total_likes,
	total_thumbs_down,
	average_view_duration,
	last_shown_at,
	is_ai_generated,
	pool_date,
	pool_status,
	pruned_at,
	created_at,
	updated_at";
const EMBEDDING_COLUMNS: &str = "\
question_id,
	embedding_version,
	embedding_dim,
	vec::text AS vec_text,
	text_digest,
	status,
	style_id,
	tone_id,
	topic_id,
	updated_at";
const SWEEP_COLUMNS: &str = "\
sweep_id,
	status,
	total_questions,
	total_batches,
	batch_size,
	batches_processed,
	questions_processed,
	duplicates_found,
	errors,
	cursor,
	started_at,
	updated_at,
	finished_at";
const DETECTION_COLUMNS: &str = "\
detection_id,
	question_ids,
	unique_key,
	reason,
	confidence,
	status,
	created_at,
	reviewed_at";

/// Restrictions applied by the candidate scan itself.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
	pub organization_id: Option<Uuid>,
	/// Drops questions this user has seen, liked, or hidden, and their hidden styles and tones.
	pub user_id: Option<Uuid>,
	pub exclude_ids: Vec<Uuid>,
	/// Restricts the scan to these ids when set.
	pub question_ids: Option<Vec<Uuid>>,
}

pub struct SweepProgress<'a> {
	/// Cursor the batch started from. The update only applies while the row still holds it.
	pub from_cursor: Option<Uuid>,
	pub cursor: Option<Uuid>,
	pub questions: i64,
	pub duplicates: i64,
	pub errors: &'a [String],
}

pub struct PoolRunTotals<'a> {
	pub status: &'a str,
	pub created: i32,
	pub rejected_short: i32,
	pub rejected_exact: i32,
	pub rejected_similar: i32,
	pub errors: &'a [String],
}

// Questions.

pub async fn insert_question<'e, E>(executor: E, question: &Question) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO questions (
	question_id,
	text,
	custom_text,
	style,
	tone,
	topic,
	style_id,
	tone_id,
	topic_id,
	organization_id,
	status,
	total_shows,
	total_likes,
	total_thumbs_down,
	average_view_duration,
	last_shown_at,
	is_ai_generated,
	pool_date,
	pool_status,
	pruned_at,
	created_at,
	updated_at
)
VALUES (
	$1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
	$12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
)",
	)
	.bind(question.question_id)
	.bind(question.text.as_deref())
	.bind(question.custom_text.as_deref())
	.bind(question.style.as_deref())
	.bind(question.tone.as_deref())
	.bind(question.topic.as_deref())
	.bind(question.style_id)
	.bind(question.tone_id)
	.bind(question.topic_id)
	.bind(question.organization_id)
	.bind(question.status.as_deref())
	.bind(question.total_shows)
	.bind(question.total_likes)
	.bind(question.total_thumbs_down)
	.bind(question.average_view_duration)
	.bind(question.last_shown_at)
	.bind(question.is_ai_generated)
	.bind(question.pool_date)
	.bind(question.pool_status.as_deref())
	.bind(question.pruned_at)
	.bind(question.created_at)
	.bind(question.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_question<'e, E>(executor: E, question_id: Uuid) -> Result<Option<Question>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{QUESTION_COLUMNS}
FROM questions
WHERE question_id = $1"
	);
	let row = sqlx::query_as(&sql).bind(question_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn fetch_questions<'e, E>(executor: E, question_ids: &[Uuid]) -> Result<Vec<Question>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{QUESTION_COLUMNS}
FROM questions
WHERE question_id = ANY($1)
ORDER BY created_at ASC, question_id ASC"
	);
	let rows = sqlx::query_as(&sql).bind(question_ids).fetch_all(executor).await?;

	Ok(rows)
}

/// Case-insensitive exact match against curated text.
/// Exact-text check on the comparison key: trimmed, lowercase, whitespace collapsed.
pub async fn question_text_exists<'e, E>(executor: E, text: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let exists: bool = sqlx::query_scalar(
		"\
SELECT EXISTS (
	SELECT 1
	FROM questions
	WHERE lower(btrim(regexp_replace(text, '\\s+', ' ', 'g'))) = $1
)",
	)
	.bind(generation::comparison_key(text))
	.fetch_one(executor)
	.await?;

	Ok(exists)
}

pub async fn update_question_metadata<'e, E>(
	executor: E,
	question_id: Uuid,
	status: Option<&str>,
	style_id: Option<Uuid>,
	tone_id: Option<Uuid>,
	topic_id: Option<Uuid>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE questions
SET
	status = COALESCE($2, status),
	style_id = COALESCE($3, style_id),
	tone_id = COALESCE($4, tone_id),
	topic_id = COALESCE($5, topic_id),
	pruned_at = CASE
		WHEN $2 = 'pruned' THEN COALESCE(pruned_at, $6)
		WHEN $2 IS NOT NULL AND $2 <> 'pruning' THEN NULL
		ELSE pruned_at
	END,
	updated_at = $6
WHERE question_id = $1",
	)
	.bind(question_id)
	.bind(status)
	.bind(style_id)
	.bind(tone_id)
	.bind(topic_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Copies a question's filter fields onto its embedding row.
///
/// Every write that changes status, style, tone, or topic goes through here so the projection used
/// by similarity queries never drifts from the question row.
pub async fn sync_filter_projection<'e, E>(executor: E, question_ids: &[Uuid]) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE question_embeddings qe
SET
	status = q.status,
	style_id = q.style_id,
	tone_id = q.tone_id,
	topic_id = q.topic_id,
	updated_at = now()
FROM questions q
WHERE q.question_id = qe.question_id
	AND q.question_id = ANY($1)",
	)
	.bind(question_ids)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Marks overexposed, never-liked questions as pruned and returns their ids.
pub async fn prune_questions<'e, E>(
	executor: E,
	min_shows: i64,
	now: OffsetDateTime,
) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar(
		"\
UPDATE questions
SET status = 'pruned', pruned_at = $2, updated_at = $2
WHERE pruned_at IS NULL
	AND total_shows >= $1
	AND total_likes = 0
RETURNING question_id",
	)
	.bind(min_shows)
	.bind(now)
	.fetch_all(executor)
	.await?;

	Ok(ids)
}

pub async fn delete_questions<'e, E>(executor: E, question_ids: &[Uuid]) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM questions WHERE question_id = ANY($1)")
		.bind(question_ids)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}

pub async fn record_question_show<'e, E>(
	executor: E,
	question_id: Uuid,
	view_duration_ms: i64,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE questions
SET
	average_view_duration =
		(average_view_duration * total_shows + $2::double precision) / (total_shows + 1),
	total_shows = total_shows + 1,
	last_shown_at = $3
WHERE question_id = $1",
	)
	.bind(question_id)
	.bind(view_duration_ms)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn adjust_question_reactions<'e, E>(
	executor: E,
	question_id: Uuid,
	like_delta: i64,
	hide_delta: i64,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE questions
SET
	total_likes = GREATEST(0, total_likes + $2),
	total_thumbs_down = GREATEST(0, total_thumbs_down + $3)
WHERE question_id = $1",
	)
	.bind(question_id)
	.bind(like_delta)
	.bind(hide_delta)
	.execute(executor)
	.await?;

	Ok(())
}

// Candidate scan.

/// Selectable questions in a seed-keyed order.
///
/// Hashing the id with the seed gives every call with the same seed the same sample, and different
/// seeds different samples, without an `ORDER BY random()` full sort. Per-user exclusions run
/// before the limit so a long history cannot starve the sample.
pub async fn scan_candidates<'e, E>(
	executor: E,
	filter: &ScanFilter,
	seed: u32,
	limit: u32,
) -> Result<Vec<CandidateRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT q.question_id, q.style_id, q.tone_id, q.topic_id
FROM questions q
WHERE (q.status IS NULL OR q.status IN ('approved', 'public'))
	AND q.pruned_at IS NULL
	AND q.text IS NOT NULL
	AND btrim(q.text) <> ''
	AND ($1::uuid IS NULL OR q.style_id = $1)
	AND ($2::uuid IS NULL OR q.tone_id = $2)
	AND ($3::uuid IS NULL OR q.topic_id = $3)
	AND ($4::uuid IS NULL OR q.organization_id = $4)
	AND NOT (q.question_id = ANY($7::uuid[]))
	AND ($8::uuid[] IS NULL OR q.question_id = ANY($8::uuid[]))
	AND (
		$9::uuid IS NULL
		OR (
			NOT EXISTS (
				SELECT 1
				FROM user_questions uq
				WHERE uq.user_id = $9
					AND uq.question_id = q.question_id
					AND uq.status IN ('seen', 'liked', 'hidden')
			)
			AND NOT EXISTS (
				SELECT 1
				FROM user_hidden_styles hs
				WHERE hs.user_id = $9 AND hs.style_id = q.style_id
			)
			AND NOT EXISTS (
				SELECT 1
				FROM user_hidden_tones ht
				WHERE ht.user_id = $9 AND ht.tone_id = q.tone_id
			)
		)
	)
ORDER BY md5(q.question_id::text || $5::text), q.question_id
LIMIT $6",
	)
	.bind(filter.style_id)
	.bind(filter.tone_id)
	.bind(filter.topic_id)
	.bind(filter.organization_id)
	.bind(i64::from(seed))
	.bind(i64::from(limit))
	.bind(&filter.exclude_ids)
	.bind(filter.question_ids.as_deref())
	.bind(filter.user_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn fetch_active_topic_windows<'e, E>(
	executor: E,
	now: OffsetDateTime,
) -> Result<Vec<TopicWindowRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT window_id, topic_id, starts_at, ends_at, is_takeover
FROM topic_windows
WHERE starts_at <= $1 AND ends_at > $1
ORDER BY starts_at ASC, topic_id ASC",
	)
	.bind(now)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn insert_topic_window<'e, E>(
	executor: E,
	window_id: Uuid,
	topic_id: Uuid,
	starts_at: OffsetDateTime,
	ends_at: OffsetDateTime,
	is_takeover: bool,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO topic_windows (window_id, topic_id, starts_at, ends_at, is_takeover)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(window_id)
	.bind(topic_id)
	.bind(starts_at)
	.bind(ends_at)
	.bind(is_takeover)
	.execute(executor)
	.await?;

	Ok(())
}

// Users and relations.

pub async fn ensure_user<'e, E>(executor: E, user_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("INSERT INTO users (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
		.bind(user_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn fetch_hidden_styles<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar("SELECT style_id FROM user_hidden_styles WHERE user_id = $1")
		.bind(user_id)
		.fetch_all(executor)
		.await?;

	Ok(ids)
}

pub async fn fetch_hidden_tones<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar("SELECT tone_id FROM user_hidden_tones WHERE user_id = $1")
		.bind(user_id)
		.fetch_all(executor)
		.await?;

	Ok(ids)
}

pub async fn hide_style<'e, E>(executor: E, user_id: Uuid, style_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"INSERT INTO user_hidden_styles (user_id, style_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
	)
	.bind(user_id)
	.bind(style_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn hide_tone<'e, E>(executor: E, user_id: Uuid, tone_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"INSERT INTO user_hidden_tones (user_id, tone_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
	)
	.bind(user_id)
	.bind(tone_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_relation_for_update<'e, E>(
	executor: E,
	user_id: Uuid,
	question_id: Uuid,
) -> Result<Option<UserQuestion>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as(
		"\
SELECT user_id, question_id, status, seen_count, view_duration_ms, created_at, updated_at
FROM user_questions
WHERE user_id = $1 AND question_id = $2
FOR UPDATE",
	)
	.bind(user_id)
	.bind(question_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn fetch_relation<'e, E>(
	executor: E,
	user_id: Uuid,
	question_id: Uuid,
) -> Result<Option<UserQuestion>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as(
		"\
SELECT user_id, question_id, status, seen_count, view_duration_ms, created_at, updated_at
FROM user_questions
WHERE user_id = $1 AND question_id = $2",
	)
	.bind(user_id)
	.bind(question_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn upsert_relation<'e, E>(
	executor: E,
	user_id: Uuid,
	question_id: Uuid,
	status: &str,
	seen_increment: i32,
	view_duration_ms: i64,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO user_questions (
	user_id,
	question_id,
	status,
	seen_count,
	view_duration_ms,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $6)
ON CONFLICT (user_id, question_id) DO UPDATE
SET
	status = EXCLUDED.status,
	seen_count = user_questions.seen_count + EXCLUDED.seen_count,
	view_duration_ms = user_questions.view_duration_ms + EXCLUDED.view_duration_ms,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(user_id)
	.bind(question_id)
	.bind(status)
	.bind(seen_increment)
	.bind(view_duration_ms.max(0))
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Liked and seen rows, the raw material for a preference vector.
pub async fn fetch_signal_rows<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<UserQuestion>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT user_id, question_id, status, seen_count, view_duration_ms, created_at, updated_at
FROM user_questions
WHERE user_id = $1 AND status IN ('liked', 'seen')
ORDER BY updated_at DESC",
	)
	.bind(user_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn update_user_preference<'e, E>(
	executor: E,
	user_id: Uuid,
	vec_text: Option<&str>,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO users (user_id, question_preference_embedding, preference_updated_at)
VALUES ($1, $2::text::vector, $3)
ON CONFLICT (user_id) DO UPDATE
SET
	question_preference_embedding = EXCLUDED.question_preference_embedding,
	preference_updated_at = EXCLUDED.preference_updated_at",
	)
	.bind(user_id)
	.bind(vec_text)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// `None` when the user is unknown, `Some(None)` when known without a preference yet.
pub async fn fetch_user_preference<'e, E>(
	executor: E,
	user_id: Uuid,
) -> Result<Option<Option<String>>>
where
	E: PgExecutor<'e>,
{
	let row: Option<(Option<String>,)> = sqlx::query_as(
		"SELECT question_preference_embedding::text FROM users WHERE user_id = $1",
	)
	.bind(user_id)
	.fetch_optional(executor)
	.await?;

	Ok(row.map(|(vec,)| vec))
}

// Embeddings.

pub async fn fetch_question_embedding<'e, E>(
	executor: E,
	question_id: Uuid,
) -> Result<Option<QuestionEmbedding>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{EMBEDDING_COLUMNS}
FROM question_embeddings
WHERE question_id = $1"
	);
	let row = sqlx::query_as(&sql).bind(question_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn fetch_question_vectors<'e, E>(
	executor: E,
	question_ids: &[Uuid],
) -> Result<Vec<(Uuid, String)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT question_id, vec::text
FROM question_embeddings
WHERE question_id = ANY($1)",
	)
	.bind(question_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Stores a vector and refreshes the filter projection from the question row in one statement.
pub async fn upsert_question_embedding<'e, E>(
	executor: E,
	question_id: Uuid,
	embedding_version: &str,
	vec_text: &str,
	embedding_dim: i32,
	text_digest: &str,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO question_embeddings (
	question_id,
	embedding_version,
	embedding_dim,
	vec,
	text_digest,
	status,
	style_id,
	tone_id,
	topic_id
)
SELECT q.question_id, $2, $3, $4::text::vector, $5, q.status, q.style_id, q.tone_id, q.topic_id
FROM questions q
WHERE q.question_id = $1
ON CONFLICT (question_id) DO UPDATE
SET
	embedding_version = EXCLUDED.embedding_version,
	embedding_dim = EXCLUDED.embedding_dim,
	vec = EXCLUDED.vec,
	text_digest = EXCLUDED.text_digest,
	status = EXCLUDED.status,
	style_id = EXCLUDED.style_id,
	tone_id = EXCLUDED.tone_id,
	topic_id = EXCLUDED.topic_id,
	updated_at = now()",
	)
	.bind(question_id)
	.bind(embedding_version)
	.bind(embedding_dim)
	.bind(vec_text)
	.bind(text_digest)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn delete_question_embedding<'e, E>(executor: E, question_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("DELETE FROM question_embeddings WHERE question_id = $1")
		.bind(question_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn count_embedded_questions<'e, E>(executor: E) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count = sqlx::query_scalar("SELECT count(*) FROM question_embeddings")
		.fetch_one(executor)
		.await?;

	Ok(count)
}

/// The next page of embeddings strictly after `after`, in id order.
pub async fn fetch_embedding_page<'e, E>(
	executor: E,
	after: Option<Uuid>,
	limit: u32,
) -> Result<Vec<(Uuid, String)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT question_id, vec::text
FROM question_embeddings
WHERE ($1::uuid IS NULL OR question_id > $1)
ORDER BY question_id ASC
LIMIT $2",
	)
	.bind(after)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

// Tags.

pub async fn list_styles<'e, E>(executor: E) -> Result<Vec<Tag>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"SELECT style_id AS id, slug, name, prompt_description FROM styles ORDER BY slug",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list_tones<'e, E>(executor: E) -> Result<Vec<Tag>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"SELECT tone_id AS id, slug, name, prompt_description FROM tones ORDER BY slug",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Inserts a style, tone, or topic. `table` is one of the three fixed tag tables.
pub async fn insert_tag<'e, E>(executor: E, table: TagTable, tag: &Tag) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO ");

	builder.push(table.name());
	builder.push(" (");
	builder.push(table.id_column());
	builder.push(", slug, name, prompt_description) VALUES (");

	let mut values = builder.separated(", ");

	values.push_bind(tag.id);
	values.push_bind(tag.slug.as_str());
	values.push_bind(tag.name.as_str());
	values.push_bind(tag.prompt_description.as_deref());
	builder.push(")");
	builder.build().execute(executor).await?;

	Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum TagTable {
	Styles,
	Tones,
	Topics,
}
impl TagTable {
	fn name(self) -> &'static str {
		match self {
			Self::Styles => "styles",
			Self::Tones => "tones",
			Self::Topics => "topics",
		}
	}

	fn id_column(self) -> &'static str {
		match self {
			Self::Styles => "style_id",
			Self::Tones => "tone_id",
			Self::Topics => "topic_id",
		}
	}
}

// Duplicate detections.

/// Returns `true` when the row was new. The `unique_key` constraint makes this idempotent.
pub async fn insert_detection<'e, E>(
	executor: E,
	candidate: &rapport_domain::duplicates::DuplicateCandidate,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO duplicate_detections (
	detection_id,
	question_ids,
	unique_key,
	reason,
	confidence,
	status,
	created_at
)
VALUES ($1, $2, $3, $4, $5, 'pending', $6)
ON CONFLICT (unique_key) DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(&candidate.question_ids)
	.bind(candidate.unique_key.as_str())
	.bind(candidate.reason.as_str())
	.bind(candidate.confidence)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn list_detections<'e, E>(
	executor: E,
	status: Option<&str>,
	limit: u32,
) -> Result<Vec<DuplicateDetection>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{DETECTION_COLUMNS}
FROM duplicate_detections
WHERE ($1::text IS NULL OR status = $1)
ORDER BY created_at DESC, detection_id ASC
LIMIT $2"
	);
	let rows =
		sqlx::query_as(&sql).bind(status).bind(i64::from(limit)).fetch_all(executor).await?;

	Ok(rows)
}

pub async fn fetch_detection_for_update<'e, E>(
	executor: E,
	detection_id: Uuid,
) -> Result<Option<DuplicateDetection>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{DETECTION_COLUMNS}
FROM duplicate_detections
WHERE detection_id = $1
FOR UPDATE"
	);
	let row = sqlx::query_as(&sql).bind(detection_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn count_detections_by_key<'e, E>(executor: E, unique_key: &str) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count =
		sqlx::query_scalar("SELECT count(*) FROM duplicate_detections WHERE unique_key = $1")
			.bind(unique_key)
			.fetch_one(executor)
			.await?;

	Ok(count)
}

pub async fn set_detection_status<'e, E>(
	executor: E,
	detection_id: Uuid,
	status: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"UPDATE duplicate_detections SET status = $2, reviewed_at = $3 WHERE detection_id = $1",
	)
	.bind(detection_id)
	.bind(status)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

// Sweeps.

pub async fn insert_sweep<'e, E>(executor: E, sweep: &DuplicateSweep) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO duplicate_sweeps (
	sweep_id,
	status,
	total_questions,
	total_batches,
	batch_size,
	batches_processed,
	questions_processed,
	duplicates_found,
	errors,
	cursor,
	started_at,
	updated_at,
	finished_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
	)
	.bind(sweep.sweep_id)
	.bind(sweep.status.as_str())
	.bind(sweep.total_questions)
	.bind(sweep.total_batches)
	.bind(sweep.batch_size)
	.bind(sweep.batches_processed)
	.bind(sweep.questions_processed)
	.bind(sweep.duplicates_found)
	.bind(&sweep.errors)
	.bind(sweep.cursor)
	.bind(sweep.started_at)
	.bind(sweep.updated_at)
	.bind(sweep.finished_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_sweep<'e, E>(executor: E, sweep_id: Uuid) -> Result<Option<DuplicateSweep>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{SWEEP_COLUMNS}
FROM duplicate_sweeps
WHERE sweep_id = $1"
	);
	let row = sqlx::query_as(&sql).bind(sweep_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn fetch_sweep_for_update<'e, E>(
	executor: E,
	sweep_id: Uuid,
) -> Result<Option<DuplicateSweep>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{SWEEP_COLUMNS}
FROM duplicate_sweeps
WHERE sweep_id = $1
FOR UPDATE"
	);
	let row = sqlx::query_as(&sql).bind(sweep_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn latest_sweep<'e, E>(executor: E) -> Result<Option<DuplicateSweep>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
	{SWEEP_COLUMNS}
FROM duplicate_sweeps
ORDER BY started_at DESC, sweep_id ASC
LIMIT 1"
	);
	let row = sqlx::query_as(&sql).fetch_optional(executor).await?;

	Ok(row)
}

/// Commits one batch worth of progress.
pub async fn record_sweep_batch<'e, E>(
	executor: E,
	sweep_id: Uuid,
	progress: &SweepProgress<'_>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE duplicate_sweeps
SET
	cursor = COALESCE($2, cursor),
	batches_processed = batches_processed + 1,
	questions_processed = questions_processed + $3,
	duplicates_found = duplicates_found + $4,
	errors = errors || $5,
	updated_at = $6
WHERE sweep_id = $1 AND cursor IS NOT DISTINCT FROM $7",
	)
	.bind(sweep_id)
	.bind(progress.cursor)
	.bind(progress.questions)
	.bind(progress.duplicates)
	.bind(progress.errors)
	.bind(now)
	.bind(progress.from_cursor)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn set_sweep_status<'e, E>(
	executor: E,
	sweep_id: Uuid,
	status: &str,
	errors: &[String],
	finished_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE duplicate_sweeps
SET
	status = $2,
	errors = errors || $3,
	finished_at = $4,
	updated_at = $5
WHERE sweep_id = $1",
	)
	.bind(sweep_id)
	.bind(status)
	.bind(errors)
	.bind(finished_at)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

// Pool runs.

/// Claims `pool_date` for this run. Returns `false` when a live or finished run holds it.
///
/// A failed run, or a running one whose lease started before `stale_before`, is taken over. Its
/// counters are kept so the resumed run adds to them.
pub async fn claim_pool_run<'e, E>(
	executor: E,
	pool_date: Date,
	now: OffsetDateTime,
	stale_before: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO pool_runs (pool_date, status, started_at)
VALUES ($1, 'running', $2)
ON CONFLICT (pool_date) DO UPDATE
SET status = 'running', started_at = EXCLUDED.started_at, finished_at = NULL
WHERE pool_runs.status = 'failed'
	OR (pool_runs.status = 'running' AND pool_runs.started_at < $3)",
	)
	.bind(pool_date)
	.bind(now)
	.bind(stale_before)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Adds this run's counters to the row and records its final status.
pub async fn finish_pool_run<'e, E>(
	executor: E,
	pool_date: Date,
	totals: &PoolRunTotals<'_>,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE pool_runs
SET
	status = $2,
	created = created + $3,
	rejected_short = rejected_short + $4,
	rejected_exact = rejected_exact + $5,
	rejected_similar = rejected_similar + $6,
	errors = errors || $7,
	finished_at = $8
WHERE pool_date = $1",
	)
	.bind(pool_date)
	.bind(totals.status)
	.bind(totals.created)
	.bind(totals.rejected_short)
	.bind(totals.rejected_exact)
	.bind(totals.rejected_similar)
	.bind(totals.errors)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Pool questions already written for `pool_date`, per style and tone.
pub async fn count_pool_questions<'e, E>(
	executor: E,
	pool_date: Date,
) -> Result<Vec<(Uuid, Uuid, i64)>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as(
		"\
SELECT style_id, tone_id, count(*)
FROM questions
WHERE pool_date = $1
	AND is_ai_generated
	AND style_id IS NOT NULL
	AND tone_id IS NOT NULL
GROUP BY style_id, tone_id",
	)
	.bind(pool_date)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn fetch_pool_run<'e, E>(executor: E, pool_date: Date) -> Result<Option<PoolRun>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as(
		"\
SELECT
	pool_date,
	status,
	created,
	rejected_short,
	rejected_exact,
	rejected_similar,
	errors,
	started_at,
	finished_at
FROM pool_runs
WHERE pool_date = $1",
	)
	.bind(pool_date)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
