use rapport_config::Config;

use crate::{Error, Providers, Result};

/// Embeds one piece of text.
///
/// Blank or absent text returns an empty vector and never reaches the provider. A vector whose
/// length disagrees with the configured dimension is an error, not something to store.
pub async fn embed_text(
	providers: &Providers,
	cfg: &Config,
	text: Option<&str>,
) -> Result<Vec<f32>> {
	let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
		return Ok(Vec::new());
	};
	let inputs = vec![text.to_string()];
	let mut vectors = providers.embedding.embed(&cfg.providers.embedding, &inputs).await?;
	let Some(vector) = vectors.pop() else {
		return Err(Error::Provider {
			message: "Embedding provider returned no vectors.".to_string(),
		});
	};

	check_dimension(&vector, cfg.storage.qdrant.vector_dim)?;

	Ok(vector)
}

pub fn check_dimension(vector: &[f32], expected: u32) -> Result<()> {
	if vector.len() != expected as usize {
		return Err(Error::Provider {
			message: format!(
				"Embedding dimension mismatch: expected {expected}, got {}.",
				vector.len()
			),
		});
	}

	Ok(())
}

/// blake3 of the trimmed text; a change means the stored vector is stale.
pub fn text_digest(text: &str) -> String {
	blake3::hash(text.trim().as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn digest_ignores_surrounding_whitespace() {
		assert_eq!(text_digest("  What's new?\n"), text_digest("What's new?"));
		assert_ne!(text_digest("What's new?"), text_digest("What is new?"));
	}

	#[test]
	fn dimension_must_match() {
		assert!(check_dimension(&[0.0; 3], 3).is_ok());
		assert!(matches!(check_dimension(&[0.0; 2], 3), Err(Error::Provider { .. })));
	}
}
