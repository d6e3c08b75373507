use std::time::Duration as StdDuration;

use color_eyre::{Result, eyre};
use time::{Date, Duration, OffsetDateTime};
use tokio::time as tokio_time;

use rapport_domain::duplicates::SweepStatus;
use rapport_service::RapportService;
use rapport_storage::{models::JobOutboxEntry, outbox, queries};

const CLAIM_LEASE_SECONDS: i64 = 30;
const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;
const MAX_JOBS_PER_POLL: usize = 64;

pub struct WorkerState {
	pub service: RapportService,
}

/// In-process memory of scheduled work. The database guards against duplicates across workers;
/// this only keeps one worker from re-asking every tick.
#[derive(Debug, Default)]
struct Schedule {
	last_tick: Option<OffsetDateTime>,
	last_pool_date: Option<Date>,
	last_prune_date: Option<Date>,
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let cfg = &state.service.cfg.worker;
	let poll_interval = StdDuration::from_millis(cfg.poll_interval_ms);
	let tick_interval = Duration::seconds(i64::try_from(cfg.sweep_interval_seconds)?);
	let mut schedule = Schedule::default();

	tracing::info!(
		poll_interval_ms = cfg.poll_interval_ms,
		sweep_interval_seconds = cfg.sweep_interval_seconds,
		"Worker started."
	);

	loop {
		for _ in 0..MAX_JOBS_PER_POLL {
			match process_outbox_once(&state.service).await {
				Ok(true) => {},
				Ok(false) => break,
				Err(err) => {
					tracing::error!(error = %err, "Job outbox processing failed.");

					break;
				},
			}
		}

		let now = OffsetDateTime::now_utc();

		if schedule.last_tick.is_none_or(|last| now - last >= tick_interval) {
			run_scheduled(&state.service, &mut schedule, now).await;

			schedule.last_tick = Some(now);
		}

		tokio_time::sleep(poll_interval).await;
	}
}

async fn run_scheduled(service: &RapportService, schedule: &mut Schedule, now: OffsetDateTime) {
	if let Err(err) = sweep_tick(service, now).await {
		tracing::error!(error = %err, "Scheduled duplicate sweep failed.");
	}

	let today = now.date();

	if service.cfg.pool.enabled
		&& daily_due(now, service.cfg.pool.run_hour_utc, schedule.last_pool_date)
	{
		match service.generate_pool(today).await {
			Ok(Some(report)) => {
				tracing::info!(
					pool_date = %today,
					created = report.created,
					rejected_short = report.rejected_short,
					rejected_exact = report.rejected_exact,
					rejected_similar = report.rejected_similar,
					errors = report.errors.len(),
					"Daily pool generated."
				);

				schedule.last_pool_date = Some(today);
			},
			// Held elsewhere. Keep trying until it completes so an abandoned run is resumed.
			Ok(None) => match queries::fetch_pool_run(&service.db.pool, today).await {
				Ok(Some(run)) if run.status == "completed" => schedule.last_pool_date = Some(today),
				Ok(_) => tracing::debug!(pool_date = %today, "Pool run held by another worker."),
				Err(err) => tracing::error!(error = %err, "Failed to read the pool run."),
			},
			Err(err) => tracing::error!(error = %err, "Daily pool generation failed."),
		}
	}
	if service.cfg.pruning.enabled
		&& daily_due(now, service.cfg.pool.run_hour_utc, schedule.last_prune_date)
	{
		match service.prune_stale_questions().await {
			Ok(_) => schedule.last_prune_date = Some(today),
			Err(err) => tracing::error!(error = %err, "Stale question pruning failed."),
		}
	}
}

/// Advances the open sweep, or opens a new one once the last finished sweep is old enough.
///
/// A failed sweep is left for an operator to resume; the next scheduled sweep starts fresh.
async fn sweep_tick(service: &RapportService, now: OffsetDateTime) -> Result<()> {
	let latest = queries::latest_sweep(&service.db.pool).await?;
	let every_hours = service.cfg.worker.sweep_every_hours;
	let sweep_id = match latest {
		Some(sweep) => {
			let status: SweepStatus =
				sweep.status.parse().map_err(|err| eyre::eyre!("Stored sweep: {err}."))?;
			let last_finished = sweep.finished_at.unwrap_or(sweep.updated_at);

			if !status.is_terminal() {
				sweep.sweep_id
			} else if new_sweep_due(Some(last_finished), now, every_hours) {
				service.start_sweep().await?.sweep_id
			} else {
				return Ok(());
			}
		},
		None if new_sweep_due(None, now, every_hours) => service.start_sweep().await?.sweep_id,
		None => return Ok(()),
	};
	let report = service.run_sweep_step(sweep_id).await?;

	tracing::info!(
		sweep_id = %sweep_id,
		status = %report.sweep.status,
		batches_run = report.batches_run,
		detections_created = report.detections_created,
		"Duplicate sweep step finished."
	);

	Ok(())
}

/// Returns `false` when the queue was empty.
async fn process_outbox_once(service: &RapportService) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(job) =
		outbox::claim_next(&service.db, now, Duration::seconds(CLAIM_LEASE_SECONDS)).await?
	else {
		return Ok(false);
	};

	match service.handle_job(&job).await {
		Ok(()) => {
			outbox::mark_done(&service.db, job.outbox_id, OffsetDateTime::now_utc()).await?;
		},
		Err(err) => {
			mark_failed(service, &job, &err.to_string()).await?;
			tracing::error!(
				error = %err,
				outbox_id = %job.outbox_id,
				kind = %job.kind,
				"Outbox job failed."
			);
		},
	}

	Ok(true)
}

async fn mark_failed(service: &RapportService, job: &JobOutboxEntry, error: &str) -> Result<()> {
	let next_attempts = job.attempts.saturating_add(1);
	let now = OffsetDateTime::now_utc();
	let available_at = now + backoff_for_attempt(next_attempts);

	outbox::mark_failed(
		&service.db,
		job.outbox_id,
		next_attempts,
		&sanitize_outbox_error(error),
		available_at,
		now,
	)
	.await?;

	Ok(())
}

fn new_sweep_due(
	last_finished: Option<OffsetDateTime>,
	now: OffsetDateTime,
	every_hours: u64,
) -> bool {
	if every_hours == 0 {
		return false;
	}

	let Some(last_finished) = last_finished else {
		return true;
	};
	let every = Duration::hours(i64::try_from(every_hours).unwrap_or(i64::MAX / 3_600));

	now - last_finished >= every
}

fn daily_due(now: OffsetDateTime, run_hour_utc: u8, last_run: Option<Date>) -> bool {
	now.hour() >= run_hour_utc && last_run != Some(now.date())
}

fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::milliseconds(base.min(MAX_BACKOFF_MS))
}
