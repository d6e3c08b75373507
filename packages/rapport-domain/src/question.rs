use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
	Pending,
	Approved,
	Public,
	Private,
	Pruning,
	Pruned,
}
impl QuestionStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Approved => "approved",
			Self::Public => "public",
			Self::Private => "private",
			Self::Pruning => "pruning",
			Self::Pruned => "pruned",
		}
	}
}
impl FromStr for QuestionStatus {
	type Err = UnknownValue;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"pending" => Ok(Self::Pending),
			"approved" => Ok(Self::Approved),
			"public" => Ok(Self::Public),
			"private" => Ok(Self::Private),
			"pruning" => Ok(Self::Pruning),
			"pruned" => Ok(Self::Pruned),
			_ => Err(UnknownValue { kind: "question status", value: raw.to_string() }),
		}
	}
}
impl fmt::Display for QuestionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
	Available,
	Distributed,
}
impl PoolStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Available => "available",
			Self::Distributed => "distributed",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue {
	pub kind: &'static str,
	pub value: String,
}
impl fmt::Display for UnknownValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Unknown {}: {:?}.", self.kind, self.value)
	}
}
impl std::error::Error for UnknownValue {}

/// Statuses the Candidate Selector may serve. A missing status predates moderation and counts as
/// selectable.
pub const SELECTABLE_STATUSES: [QuestionStatus; 2] =
	[QuestionStatus::Approved, QuestionStatus::Public];

pub fn is_selectable_status(status: Option<&str>) -> bool {
	match status {
		None => true,
		Some(raw) => raw
			.parse::<QuestionStatus>()
			.map(|status| SELECTABLE_STATUSES.contains(&status))
			.unwrap_or(false),
	}
}

/// Text shown to users: the curated text when present, otherwise nothing.
pub fn display_text(text: Option<&str>) -> Option<&str> {
	text.map(str::trim).filter(|value| !value.is_empty())
}
