use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{relation::RelationStatus, vector};

#[derive(Debug, Clone)]
pub struct SignalRow {
	pub question_id: Uuid,
	pub status: RelationStatus,
	pub view_duration_ms: i64,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
	Liked,
	LongViews,
	None,
}

#[derive(Debug, Clone)]
pub struct SignalSelection {
	pub source: SignalSource,
	pub question_ids: Vec<Uuid>,
}

/// Picks the questions whose embeddings make up a user's preference.
///
/// Explicit likes win outright. Without any, recent `seen` rows with a long enough dwell time
/// stand in as implicit positives. Newest first, capped at `max_signals`.
pub fn select_signals(
	rows: &[SignalRow],
	now: OffsetDateTime,
	cfg: &rapport_config::Preference,
) -> SignalSelection {
	let mut liked: Vec<&SignalRow> =
		rows.iter().filter(|row| row.status == RelationStatus::Liked).collect();

	if !liked.is_empty() {
		return SignalSelection {
			source: SignalSource::Liked,
			question_ids: newest_ids(&mut liked, cfg.max_signals),
		};
	}

	let cutoff = now - Duration::days(cfg.recent_window_days);
	let mut viewed: Vec<&SignalRow> = rows
		.iter()
		.filter(|row| row.status == RelationStatus::Seen)
		.filter(|row| row.view_duration_ms >= cfg.min_view_duration_ms)
		.filter(|row| row.updated_at >= cutoff)
		.collect();

	if viewed.is_empty() {
		return SignalSelection { source: SignalSource::None, question_ids: Vec::new() };
	}

	SignalSelection {
		source: SignalSource::LongViews,
		question_ids: newest_ids(&mut viewed, cfg.max_signals),
	}
}

/// Mean of the embeddings that exist. Missing embeddings are skipped, not treated as zeros.
pub fn aggregate(embeddings: &[Option<Vec<f32>>]) -> Vec<f32> {
	let present: Vec<Vec<f32>> = embeddings.iter().flatten().cloned().collect();

	vector::average(&present)
}

fn newest_ids(rows: &mut [&SignalRow], max: u32) -> Vec<Uuid> {
	rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.question_id.cmp(&b.question_id)));

	rows.iter().take(max as usize).map(|row| row.question_id).collect()
}
