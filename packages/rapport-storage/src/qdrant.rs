use qdrant_client::qdrant::{
	CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType,
	VectorParamsBuilder, VectorsConfigBuilder,
};

use crate::Result;

pub const DENSE_VECTOR_NAME: &str = "dense";
/// Keyword payload fields mirrored from the question row for filtered similarity queries.
pub const PAYLOAD_INDEX_FIELDS: [&str; 4] = ["status", "style_id", "tone_id", "topic_id"];

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &rapport_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection and its payload indexes when missing. Safe to call on every start.
	pub async fn ensure_collection(&self) -> Result<()> {
		if !self.client.collection_exists(&self.collection).await? {
			let mut vectors_config = VectorsConfigBuilder::default();

			vectors_config.add_named_vector_params(
				DENSE_VECTOR_NAME,
				VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
			);

			self.client
				.create_collection(
					CreateCollectionBuilder::new(self.collection.clone())
						.vectors_config(vectors_config),
				)
				.await?;

			tracing::info!(collection = %self.collection, "Created Qdrant collection.");
		}

		for field in PAYLOAD_INDEX_FIELDS {
			self.client
				.create_field_index(
					CreateFieldIndexCollectionBuilder::new(
						self.collection.clone(),
						field,
						FieldType::Keyword,
					)
					.wait(true),
				)
				.await?;
		}

		Ok(())
	}
}
