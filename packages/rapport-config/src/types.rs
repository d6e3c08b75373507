use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub selection: Selection,
	#[serde(default)]
	pub preference: Preference,
	#[serde(default)]
	pub curation: Curation,
	#[serde(default)]
	pub pool: Pool,
	#[serde(default)]
	pub pruning: Pruning,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
	#[serde(default = "default_bind_localhost_only")]
	pub bind_localhost_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Candidate Selector limits.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Selection {
	pub default_count: u32,
	pub max_count: u32,
	/// Extra rows fetched on top of `count + exclusions` before post-filtering.
	pub fetch_margin: u32,
	/// Hard cap for a single candidate scan.
	pub max_fetch: u32,
}
impl Default for Selection {
	fn default() -> Self {
		Self { default_count: 10, max_count: 100, fetch_margin: 20, max_fetch: 500 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Preference {
	/// Dwell time that turns a plain `seen` row into an implicit positive signal.
	pub min_view_duration_ms: i64,
	pub recent_window_days: i64,
	pub max_signals: u32,
}
impl Default for Preference {
	fn default() -> Self {
		Self { min_view_duration_ms: 5_000, recent_window_days: 30, max_signals: 200 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Curation {
	pub similarity_threshold: f32,
	pub batch_size: u32,
	pub neighbor_limit: u32,
	pub overfetch_factor: u32,
	pub max_batches_per_run: u32,
}
impl Default for Curation {
	fn default() -> Self {
		Self {
			similarity_threshold: 0.95,
			batch_size: 50,
			neighbor_limit: 5,
			overfetch_factor: 5,
			max_batches_per_run: 20,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pool {
	pub enabled: bool,
	pub run_hour_utc: u8,
	pub questions_per_combination: u32,
	pub max_attempts_per_combination: u32,
	pub max_combinations_per_run: u32,
	pub min_length: u32,
	pub default_status: String,
	pub max_rate_limit_retries: u32,
	pub fallback_retry_after_ms: u64,
	pub max_retry_after_ms: u64,
	/// A `running` pool run older than this is treated as abandoned and may be taken over.
	pub stale_run_minutes: u32,
}
impl Default for Pool {
	fn default() -> Self {
		Self {
			enabled: true,
			run_hour_utc: 3,
			questions_per_combination: 1,
			max_attempts_per_combination: 3,
			max_combinations_per_run: 40,
			min_length: 10,
			default_status: "approved".to_string(),
			max_rate_limit_retries: 3,
			fallback_retry_after_ms: 20_000,
			max_retry_after_ms: 60_000,
			stale_run_minutes: 60,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pruning {
	pub enabled: bool,
	pub min_shows: i64,
}
impl Default for Pruning {
	fn default() -> Self {
		Self { enabled: false, min_shows: 50 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub sweep_interval_seconds: u64,
	/// Start a new sweep when the last finished one is older than this. Zero disables.
	pub sweep_every_hours: u64,
}
impl Default for Worker {
	fn default() -> Self {
		Self { poll_interval_ms: 500, sweep_interval_seconds: 60, sweep_every_hours: 24 }
	}
}

fn default_bind_localhost_only() -> bool {
	true
}
