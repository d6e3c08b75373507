//! Candidate selection core.
//!
//! The storage scan hands over already-selectable rows (status, text, and prune checks happen in
//! SQL). Everything else happens here in a fixed order: hard exclusion, topic takeover or topic
//! injection, seeded shuffle, then truncation.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::shuffle::{SeededRandom, shuffle_in_place};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	pub question_id: Uuid,
	pub style_id: Option<Uuid>,
	pub tone_id: Option<Uuid>,
	pub topic_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct Exclusions {
	/// Ids the client asked to skip. The scan already drops the user's history.
	pub question_ids: HashSet<Uuid>,
	pub hidden_styles: HashSet<Uuid>,
	pub hidden_tones: HashSet<Uuid>,
}
impl Exclusions {
	pub fn excludes(&self, candidate: &Candidate) -> bool {
		if self.question_ids.contains(&candidate.question_id) {
			return true;
		}
		if candidate.style_id.is_some_and(|style_id| self.hidden_styles.contains(&style_id)) {
			return true;
		}

		candidate.tone_id.is_some_and(|tone_id| self.hidden_tones.contains(&tone_id))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicWindow {
	pub topic_id: Uuid,
	pub starts_at: OffsetDateTime,
	pub ends_at: OffsetDateTime,
	pub is_takeover: bool,
}
impl TopicWindow {
	pub fn is_active(&self, now: OffsetDateTime) -> bool {
		self.starts_at <= now && now < self.ends_at
	}
}

pub struct SelectionInput<'a> {
	pub general: &'a [Candidate],
	/// Selectable questions per topic, for every topic with an active window.
	pub topic_candidates: &'a HashMap<Uuid, Vec<Candidate>>,
	pub windows: &'a [TopicWindow],
	pub exclusions: &'a Exclusions,
	pub now: OffsetDateTime,
	pub count: usize,
}

/// The takeover in effect at `now`. Overlapping takeovers resolve to the earliest start, then the
/// lowest topic id.
pub fn active_takeover(windows: &[TopicWindow], now: OffsetDateTime) -> Option<&TopicWindow> {
	windows
		.iter()
		.filter(|window| window.is_takeover && window.is_active(now))
		.min_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.topic_id.cmp(&b.topic_id)))
}

/// Topics with an active ordinary window, sorted and deduplicated.
pub fn active_topics(windows: &[TopicWindow], now: OffsetDateTime) -> Vec<Uuid> {
	let mut topics: Vec<Uuid> = windows
		.iter()
		.filter(|window| !window.is_takeover && window.is_active(now))
		.map(|window| window.topic_id)
		.collect();

	topics.sort();
	topics.dedup();

	topics
}

/// Rows to request from the scan.
///
/// Exclusions are applied by the scan itself, so only the margin for the in-memory guard is added.
pub fn fetch_limit(count: u32, cfg: &rapport_config::Selection) -> u32 {
	count.saturating_add(cfg.fetch_margin).min(cfg.max_fetch).max(count.min(cfg.max_fetch))
}

pub fn clamp_count(requested: Option<u32>, cfg: &rapport_config::Selection) -> u32 {
	requested.unwrap_or(cfg.default_count).min(cfg.max_count)
}

pub fn select_candidates<R>(input: SelectionInput<'_>, rng: &mut R) -> Vec<Uuid>
where
	R: SeededRandom + ?Sized,
{
	if input.count == 0 {
		return Vec::new();
	}

	if let Some(takeover) = active_takeover(input.windows, input.now) {
		let pool = input
			.topic_candidates
			.get(&takeover.topic_id)
			.map(|candidates| {
				admissible(candidates, input.exclusions, &HashSet::new())
					.into_iter()
					.filter(|candidate| candidate.topic_id == Some(takeover.topic_id))
					.map(|candidate| candidate.question_id)
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();

		return shuffle_and_truncate(pool, input.count, rng);
	}

	let mut picked = HashSet::new();
	let mut injected = Vec::new();

	for topic_id in active_topics(input.windows, input.now) {
		let Some(candidates) = input.topic_candidates.get(&topic_id) else { continue };
		let mut options: Vec<Uuid> = admissible(candidates, input.exclusions, &picked)
			.into_iter()
			.filter(|candidate| candidate.topic_id == Some(topic_id))
			.map(|candidate| candidate.question_id)
			.collect();

		shuffle_in_place(&mut options, rng);

		if let Some(question_id) = options.first().copied() {
			picked.insert(question_id);
			injected.push(question_id);
		}
	}

	let general: Vec<Uuid> = admissible(input.general, input.exclusions, &picked)
		.into_iter()
		.map(|candidate| candidate.question_id)
		.collect();
	let mut out = injected;

	out.extend(shuffle_and_truncate(general, input.count, rng));
	out.truncate(input.count);

	out
}

/// Candidates that pass the hard filter, first occurrence only.
fn admissible<'a>(
	candidates: &'a [Candidate],
	exclusions: &Exclusions,
	already: &HashSet<Uuid>,
) -> Vec<&'a Candidate> {
	let mut seen = HashSet::new();

	candidates
		.iter()
		.filter(|candidate| !exclusions.excludes(candidate))
		.filter(|candidate| !already.contains(&candidate.question_id))
		.filter(|candidate| seen.insert(candidate.question_id))
		.collect()
}

fn shuffle_and_truncate<R>(mut ids: Vec<Uuid>, count: usize, rng: &mut R) -> Vec<Uuid>
where
	R: SeededRandom + ?Sized,
{
	shuffle_in_place(&mut ids, rng);
	ids.truncate(count);

	ids
}
