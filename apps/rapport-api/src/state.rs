use std::sync::Arc;

use rapport_service::RapportService;
use rapport_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RapportService>,
}
impl AppState {
	pub async fn new(config: rapport_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.qdrant.vector_dim).await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		Ok(Self::from_service(RapportService::new(config, db, qdrant)))
	}

	pub fn from_service(service: RapportService) -> Self {
		Self { service: Arc::new(service) }
	}
}
