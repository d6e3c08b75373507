mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Curation, EmbeddingProviderConfig, LlmProviderConfig, Pool, Postgres, Preference,
	Providers, Pruning, Qdrant, Selection, Service, Storage, Worker,
};

use std::{fs, path::Path};

pub const QUESTION_STATUSES: [&str; 6] =
	["pending", "approved", "public", "private", "pruning", "pruned"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.admin_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.admin_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("generation", &cfg.providers.generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.selection.max_count == 0 {
		return Err(Error::Validation {
			message: "selection.max_count must be greater than zero.".to_string(),
		});
	}
	if cfg.selection.default_count == 0 || cfg.selection.default_count > cfg.selection.max_count
	{
		return Err(Error::Validation {
			message: "selection.default_count must be between 1 and selection.max_count."
				.to_string(),
		});
	}
	if cfg.selection.max_fetch < cfg.selection.max_count {
		return Err(Error::Validation {
			message: "selection.max_fetch must be at least selection.max_count.".to_string(),
		});
	}
	if cfg.preference.min_view_duration_ms < 0 {
		return Err(Error::Validation {
			message: "preference.min_view_duration_ms must be zero or greater.".to_string(),
		});
	}
	if cfg.preference.recent_window_days <= 0 {
		return Err(Error::Validation {
			message: "preference.recent_window_days must be greater than zero.".to_string(),
		});
	}
	if cfg.preference.max_signals == 0 {
		return Err(Error::Validation {
			message: "preference.max_signals must be greater than zero.".to_string(),
		});
	}

	let threshold = cfg.curation.similarity_threshold;

	if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
		return Err(Error::Validation {
			message: "curation.similarity_threshold must be in the range (0.0, 1.0].".to_string(),
		});
	}

	for (label, value) in [
		("curation.batch_size", cfg.curation.batch_size),
		("curation.neighbor_limit", cfg.curation.neighbor_limit),
		("curation.overfetch_factor", cfg.curation.overfetch_factor),
		("curation.max_batches_per_run", cfg.curation.max_batches_per_run),
		("pool.questions_per_combination", cfg.pool.questions_per_combination),
		("pool.max_attempts_per_combination", cfg.pool.max_attempts_per_combination),
		("pool.max_combinations_per_run", cfg.pool.max_combinations_per_run),
		("pool.stale_run_minutes", cfg.pool.stale_run_minutes),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if cfg.pool.run_hour_utc > 23 {
		return Err(Error::Validation {
			message: "pool.run_hour_utc must be in the range 0-23.".to_string(),
		});
	}
	if !QUESTION_STATUSES.contains(&cfg.pool.default_status.as_str()) {
		return Err(Error::Validation {
			message: format!(
				"pool.default_status must be one of {}.",
				QUESTION_STATUSES.join(", ")
			),
		});
	}
	if cfg.pool.max_retry_after_ms < cfg.pool.fallback_retry_after_ms {
		return Err(Error::Validation {
			message: "pool.max_retry_after_ms must be at least pool.fallback_retry_after_ms."
				.to_string(),
		});
	}
	if cfg.pruning.min_shows <= 0 {
		return Err(Error::Validation {
			message: "pruning.min_shows must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.pool.default_status = cfg.pool.default_status.trim().to_ascii_lowercase();
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	if cfg.service.log_level.is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
