use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::question::UnknownValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
	Pending,
	Running,
	Completed,
	Failed,
}
impl SweepStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}
}
impl FromStr for SweepStatus {
	type Err = UnknownValue;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"pending" => Ok(Self::Pending),
			"running" => Ok(Self::Running),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			_ => Err(UnknownValue { kind: "sweep status", value: raw.to_string() }),
		}
	}
}
impl fmt::Display for SweepStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
	Pending,
	Approved,
	Rejected,
}
impl DetectionStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Approved => "approved",
			Self::Rejected => "rejected",
		}
	}
}
impl FromStr for DetectionStatus {
	type Err = UnknownValue;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"pending" => Ok(Self::Pending),
			"approved" => Ok(Self::Approved),
			"rejected" => Ok(Self::Rejected),
			_ => Err(UnknownValue { kind: "detection status", value: raw.to_string() }),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCandidate {
	/// Sorted ascending, no repeats.
	pub question_ids: Vec<Uuid>,
	pub unique_key: String,
	pub confidence: f32,
	pub reason: String,
}

pub fn sorted_ids(ids: &[Uuid]) -> Vec<Uuid> {
	let mut sorted = ids.to_vec();

	sorted.sort();
	sorted.dedup();

	sorted
}

/// Natural key for a group: the sorted ids joined with `:`. Independent of input order.
pub fn unique_key(ids: &[Uuid]) -> String {
	sorted_ids(ids).iter().map(Uuid::to_string).collect::<Vec<_>>().join(":")
}

/// Pairs worth recording for one sweep item.
///
/// Only neighbors ordered after the source are kept, so a pair surfaces from exactly one side no
/// matter which question the sweep visits first.
pub fn pairs_from_neighbors(
	source_id: Uuid,
	neighbors: &[(Uuid, f32)],
	threshold: f32,
) -> Vec<DuplicateCandidate> {
	let mut out: Vec<DuplicateCandidate> = Vec::new();

	for (neighbor_id, score) in neighbors {
		if *neighbor_id <= source_id || *score <= threshold {
			continue;
		}

		let question_ids = sorted_ids(&[source_id, *neighbor_id]);
		let unique_key = unique_key(&question_ids);

		if out.iter().any(|candidate| candidate.unique_key == unique_key) {
			continue;
		}

		out.push(DuplicateCandidate {
			question_ids,
			unique_key,
			confidence: score.clamp(0.0, 1.0),
			reason: format!("Cosine similarity {score:.4} exceeds threshold {threshold:.2}."),
		});
	}

	out
}

/// Number of batches needed to cover `total` items.
pub fn plan_batches(total: u64, batch_size: u32) -> u64 {
	if batch_size == 0 {
		return 0;
	}

	total.div_ceil(u64::from(batch_size))
}
