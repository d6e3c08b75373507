pub mod curator;
pub mod embedding;
pub mod engagement;
pub mod index;
pub mod indexing;
pub mod pool;
pub mod preference;
pub mod questions;
pub mod select;

mod error;

pub use curator::{
	ReviewDecision, ReviewRequest, ReviewResponse, SweepBatchOutcome, SweepItem, SweepReport,
};
pub use engagement::{EngagementResponse, SeenRequest};
pub use error::{Error, Result};
pub use index::{IndexFilter, IndexPoint, Neighbor, SimilarityIndex};
pub use pool::PoolReport;
pub use preference::PreferenceResponse;
pub use questions::{
	CreateQuestionRequest, CreateQuestionResponse, MetadataUpdate, PruneReport, SimilarQuestion,
};
pub use select::{SelectRequest, SelectResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use rapport_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use rapport_providers::generation;
use rapport_storage::{db::Db, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, generation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let providers = Arc::new(DefaultProviders);

		Self { embedding: providers.clone(), generation: providers }
	}
}

pub struct RapportService {
	pub cfg: Config,
	pub db: Db,
	pub index: Arc<dyn SimilarityIndex>,
	pub providers: Providers,
}
impl RapportService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self::with_parts(cfg, db, Arc::new(qdrant), Providers::default())
	}

	pub fn with_parts(
		cfg: Config,
		db: Db,
		index: Arc<dyn SimilarityIndex>,
		providers: Providers,
	) -> Self {
		Self { cfg, db, index, providers }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(rapport_providers::embedding::embed(cfg, texts).await?) })
	}
}
impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(generation::generate(cfg, messages).await?) })
	}
}

/// Identifies the model that produced a stored vector. A change forces re-embedding.
pub fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id,
		cfg.providers.embedding.model,
		cfg.storage.qdrant.vector_dim
	)
}
