use std::{fmt, str::FromStr};

use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, Result, db::Db, models::JobOutboxEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
	IndexQuestion,
	DeleteQuestion,
	RecomputePreference,
}
impl JobKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::IndexQuestion => "INDEX_QUESTION",
			Self::DeleteQuestion => "DELETE_QUESTION",
			Self::RecomputePreference => "RECOMPUTE_PREFERENCE",
		}
	}
}
impl FromStr for JobKind {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"INDEX_QUESTION" => Ok(Self::IndexQuestion),
			"DELETE_QUESTION" => Ok(Self::DeleteQuestion),
			"RECOMPUTE_PREFERENCE" => Ok(Self::RecomputePreference),
			other => Err(Error::UnknownJobKind(other.to_string())),
		}
	}
}
impl fmt::Display for JobKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub async fn enqueue<'e, E>(
	executor: E,
	kind: JobKind,
	subject_id: Uuid,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let outbox_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO job_outbox (outbox_id, kind, subject_id, status, available_at, created_at, updated_at)
VALUES ($1, $2, $3, 'PENDING', $4, $4, $4)",
	)
	.bind(outbox_id)
	.bind(kind.as_str())
	.bind(subject_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(outbox_id)
}

/// Claims the oldest due job and pushes its `available_at` out by `lease`.
///
/// A worker that dies mid-job leaves the row claimable again once the lease expires.
pub async fn claim_next(
	db: &Db,
	now: OffsetDateTime,
	lease: Duration,
) -> Result<Option<JobOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row: Option<JobOutboxEntry> = sqlx::query_as(
		"\
SELECT
	outbox_id,
	kind,
	subject_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM job_outbox
WHERE status IN ('PENDING', 'FAILED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + lease;

		sqlx::query(
			"UPDATE job_outbox SET available_at = $1, updated_at = $2 WHERE outbox_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.outbox_id)
		.execute(&mut *tx)
		.await?;

		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_done(db: &Db, outbox_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query("UPDATE job_outbox SET status = 'DONE', updated_at = $1 WHERE outbox_id = $2")
		.bind(now)
		.bind(outbox_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn mark_failed(
	db: &Db,
	outbox_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE job_outbox
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE outbox_id = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn fetch_entry(db: &Db, outbox_id: Uuid) -> Result<Option<JobOutboxEntry>> {
	let row = sqlx::query_as(
		"\
SELECT
	outbox_id,
	kind,
	subject_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM job_outbox
WHERE outbox_id = $1",
	)
	.bind(outbox_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}
