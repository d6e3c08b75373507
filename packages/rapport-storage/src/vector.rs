//! pgvector values travel as text (`[1,2,3]`) so no extra codec is needed on the sqlx side.

use crate::{Error, Result};

pub fn format_vector_text(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8 + 2);

	out.push('[');

	for (index, value) in vec.iter().enumerate() {
		if index > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub fn parse_vector_text(raw: &str) -> Result<Vec<f32>> {
	let inner = raw
		.trim()
		.strip_prefix('[')
		.and_then(|rest| rest.strip_suffix(']'))
		.ok_or_else(|| Error::MalformedVector(format!("{raw:?} is not a vector literal.")))?;

	if inner.trim().is_empty() {
		return Ok(Vec::new());
	}

	inner
		.split(',')
		.map(|part| {
			part.trim().parse::<f32>().map_err(|_| {
				Error::MalformedVector(format!("{part:?} is not a number."))
			})
		})
		.collect()
}
