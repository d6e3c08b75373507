use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::question::UnknownValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStatus {
	Unseen,
	Seen,
	Liked,
	Hidden,
	Sent,
}
impl RelationStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unseen => "unseen",
			Self::Seen => "seen",
			Self::Liked => "liked",
			Self::Hidden => "hidden",
			Self::Sent => "sent",
		}
	}

	/// Statuses that remove a question from a user's candidate pool.
	pub fn excludes_from_selection(self) -> bool {
		matches!(self, Self::Seen | Self::Liked | Self::Hidden)
	}
}
impl FromStr for RelationStatus {
	type Err = UnknownValue;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"unseen" => Ok(Self::Unseen),
			"seen" => Ok(Self::Seen),
			"liked" => Ok(Self::Liked),
			"hidden" => Ok(Self::Hidden),
			"sent" => Ok(Self::Sent),
			_ => Err(UnknownValue { kind: "relation status", value: raw.to_string() }),
		}
	}
}
impl fmt::Display for RelationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationEvent {
	Seen,
	ToggleLike,
	ToggleHide,
	Sent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	pub previous: Option<RelationStatus>,
	pub next: RelationStatus,
}
impl Transition {
	pub fn changed(&self) -> bool {
		self.previous != Some(self.next)
	}

	/// Change to `total_likes`.
	pub fn like_delta(&self) -> i64 {
		flag_delta(self.previous == Some(RelationStatus::Liked), self.next == RelationStatus::Liked)
	}

	/// Change to `total_thumbs_down`.
	pub fn hide_delta(&self) -> i64 {
		flag_delta(
			self.previous == Some(RelationStatus::Hidden),
			self.next == RelationStatus::Hidden,
		)
	}

	/// Likes and hides feed the preference vector; plain exposure does not.
	pub fn affects_preference(&self) -> bool {
		self.like_delta() != 0 || self.hide_delta() != 0
	}
}

/// Liked and hidden are sticky against exposure events; only an explicit toggle clears them.
pub fn apply(previous: Option<RelationStatus>, event: RelationEvent) -> Transition {
	use RelationStatus::*;

	let next = match (previous, event) {
		(Some(Liked), RelationEvent::Seen) => Liked,
		(Some(Hidden), RelationEvent::Seen) => Hidden,
		(_, RelationEvent::Seen) => Seen,
		(Some(Liked), RelationEvent::ToggleLike) => Seen,
		(_, RelationEvent::ToggleLike) => Liked,
		(Some(Hidden), RelationEvent::ToggleHide) => Seen,
		(_, RelationEvent::ToggleHide) => Hidden,
		(None | Some(Unseen), RelationEvent::Sent) => Sent,
		(Some(current), RelationEvent::Sent) => current,
	};

	Transition { previous, next }
}

fn flag_delta(before: bool, after: bool) -> i64 {
	match (before, after) {
		(false, true) => 1,
		(true, false) => -1,
		_ => 0,
	}
}
