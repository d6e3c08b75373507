//! Generated-question hygiene and combination planning for the nightly pool.

use std::sync::LazyLock;

use regex::Regex;
use time::Date;
use uuid::Uuid;

use crate::shuffle::{self, Seed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
	pub style_id: Uuid,
	pub tone_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
	TooShort,
	ExactMatch,
	NearDuplicate,
}
impl Rejection {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::TooShort => "too_short",
			Self::ExactMatch => "exact_match",
			Self::NearDuplicate => "near_duplicate",
		}
	}
}

const QUOTE_CHARS: &[char] = &['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

const LIST_MARKER_PATTERN: &str = r"^\s*(?:[-*\u{2022}]+|\d+[.)]|\(\d+\))\s*";
const LABEL_PREFIX_PATTERN: &str = r"(?i)^\s*(?:question|q)\s*[:\-]\s*";
const WHITESPACE_PATTERN: &str = r"\s+";

static LIST_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| compile(LIST_MARKER_PATTERN));
static LABEL_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| compile(LABEL_PREFIX_PATTERN));
static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(WHITESPACE_PATTERN));

fn compile(pattern: &str) -> Option<Regex> {
	match Regex::new(pattern) {
		Ok(re) => Some(re),
		Err(err) => {
			tracing::error!(pattern, error = %err, "Text cleaning pattern failed to compile.");

			None
		},
	}
}

fn replace(pattern: &LazyLock<Option<Regex>>, text: &str, with: &str) -> String {
	match pattern.as_ref() {
		Some(re) => re.replace_all(text, with).into_owned(),
		None => text.to_string(),
	}
}

/// Normalizes raw model output into a single question line.
///
/// Takes the first non-empty line, drops list markers and a `Question:` label, strips wrapping
/// quotes, and collapses whitespace.
pub fn clean_generated_text(raw: &str) -> String {
	let line = raw.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or_default();
	let line = replace(&LIST_MARKER, line, "");
	let line = replace(&LABEL_PREFIX, &line, "");
	let mut text = line.trim();

	loop {
		let stripped = text.trim_matches(QUOTE_CHARS).trim();

		if stripped == text {
			break;
		}

		text = stripped;
	}

	replace(&WHITESPACE, text, " ")
}

/// Key for the exact-match check: trimmed, lowercase, whitespace collapsed.
///
/// `queries::question_text_exists` builds the same key in SQL from the stored text.
pub fn comparison_key(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn check_length(text: &str, min_length: u32) -> Result<(), Rejection> {
	if text.chars().count() < min_length as usize {
		return Err(Rejection::TooShort);
	}

	Ok(())
}

/// Seed derived from the calendar date so a rerun of the same day walks combinations in the same
/// order.
pub fn seed_for_date(date: Date) -> Seed {
	let julian = date.to_julian_day();

	(julian as u32).wrapping_mul(0x9E37_79B1)
}

/// Every style and tone pair, shuffled for `date` and capped at `limit`.
pub fn plan_combinations(
	style_ids: &[Uuid],
	tone_ids: &[Uuid],
	date: Date,
	limit: u32,
) -> Vec<Combination> {
	let mut styles = style_ids.to_vec();
	let mut tones = tone_ids.to_vec();

	styles.sort();
	styles.dedup();
	tones.sort();
	tones.dedup();

	let all: Vec<Combination> = styles
		.iter()
		.flat_map(|style_id| {
			tones.iter().map(move |tone_id| Combination { style_id: *style_id, tone_id: *tone_id })
		})
		.collect();
	let mut planned = shuffle::shuffle(all, seed_for_date(date));

	planned.truncate(limit as usize);

	planned
}
