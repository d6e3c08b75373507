/// Element-wise mean of the usable vectors.
///
/// Empty vectors are ignored. The first non-empty vector fixes the dimension and any vector of a
/// different length is skipped. Returns an empty vector when nothing usable remains, which callers
/// read as "no embedding available".
pub fn average(vectors: &[Vec<f32>]) -> Vec<f32> {
	let Some(dim) = vectors.iter().map(Vec::len).find(|len| *len > 0) else {
		return Vec::new();
	};
	let mut sum = vec![0.0_f64; dim];
	let mut used = 0_usize;

	for (index, vec) in vectors.iter().enumerate() {
		if vec.is_empty() {
			continue;
		}
		if vec.len() != dim {
			tracing::warn!(index, expected = dim, actual = vec.len(), "Skipping vector.");

			continue;
		}

		for (slot, value) in sum.iter_mut().zip(vec.iter()) {
			*slot += f64::from(*value);
		}

		used += 1;
	}

	// f64 accumulation keeps the mean stable across input orderings.
	sum.into_iter().map(|value| (value / used as f64) as f32).collect()
}

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}
