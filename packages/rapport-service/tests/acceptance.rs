mod acceptance {
	mod curation;
	mod engagement;
	mod outbox;
	mod pool;
	mod preference;
	mod selection;

	use std::sync::{Arc, Mutex};

	use serde_json::{Map, Value};
	use time::OffsetDateTime;
	use uuid::Uuid;

	use rapport_service::{
		BoxFuture, EmbeddingProvider, GenerationProvider, IndexFilter, IndexPoint, Neighbor,
		Providers, RapportService, Result, SimilarityIndex, index,
	};
	use rapport_storage::{db::Db, models::Question, queries, vector};
	use rapport_testkit::TestDatabase;

	pub async fn test_db() -> Option<TestDatabase> {
		let base_dsn = rapport_testkit::env_dsn()?;
		let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");

		Some(db)
	}

	pub fn test_config(dsn: String, vector_dim: u32) -> rapport_config::Config {
		rapport_config::Config {
			service: rapport_config::Service {
				http_bind: "127.0.0.1:0".to_string(),
				admin_bind: "127.0.0.1:0".to_string(),
				log_level: "info".to_string(),
				bind_localhost_only: true,
			},
			storage: rapport_config::Storage {
				postgres: rapport_config::Postgres { dsn, pool_max_conns: 2 },
				qdrant: rapport_config::Qdrant {
					url: "http://127.0.0.1:1".to_string(),
					collection: "unused".to_string(),
					vector_dim,
				},
			},
			providers: rapport_config::Providers {
				embedding: rapport_config::EmbeddingProviderConfig {
					provider_id: "test".to_string(),
					api_base: "http://127.0.0.1:1".to_string(),
					api_key: "test-key".to_string(),
					path: "/embeddings".to_string(),
					model: "test".to_string(),
					dimensions: vector_dim,
					timeout_ms: 1_000,
					default_headers: Map::new(),
				},
				generation: rapport_config::LlmProviderConfig {
					provider_id: "test".to_string(),
					api_base: "http://127.0.0.1:1".to_string(),
					api_key: "test-key".to_string(),
					path: "/chat/completions".to_string(),
					model: "test".to_string(),
					temperature: 0.7,
					timeout_ms: 1_000,
					default_headers: Map::new(),
				},
			},
			selection: Default::default(),
			preference: Default::default(),
			curation: Default::default(),
			pool: Default::default(),
			pruning: Default::default(),
			worker: Default::default(),
		}
	}

	pub async fn build_service(
		cfg: rapport_config::Config,
		index: Arc<dyn SimilarityIndex>,
	) -> RapportService {
		let vector_dim = cfg.storage.qdrant.vector_dim as usize;
		let providers =
			Providers::new(Arc::new(StubEmbedding { vector_dim }), Arc::new(StubGeneration));

		build_service_with(cfg, index, providers).await
	}

	pub async fn build_service_with(
		cfg: rapport_config::Config,
		index: Arc<dyn SimilarityIndex>,
		providers: Providers,
	) -> RapportService {
		let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

		db.ensure_schema(cfg.storage.qdrant.vector_dim).await.expect("Failed to ensure schema.");

		RapportService::with_parts(cfg, db, index, providers)
	}

	pub fn question(text: &str, status: Option<&str>) -> Question {
		let now = OffsetDateTime::now_utc();

		Question {
			question_id: Uuid::new_v4(),
			text: Some(text.to_string()),
			custom_text: None,
			style: None,
			tone: None,
			topic: None,
			style_id: None,
			tone_id: None,
			topic_id: None,
			organization_id: None,
			status: status.map(str::to_string),
			total_shows: 0,
			total_likes: 0,
			total_thumbs_down: 0,
			average_view_duration: 0.0,
			last_shown_at: None,
			is_ai_generated: false,
			pool_date: None,
			pool_status: None,
			pruned_at: None,
			created_at: now,
			updated_at: now,
		}
	}

	pub async fn insert(service: &RapportService, question: &Question) -> Uuid {
		queries::insert_question(&service.db.pool, question)
			.await
			.expect("Failed to insert question.");

		question.question_id
	}

	pub async fn store_embedding(service: &RapportService, question_id: Uuid, values: &[f32]) {
		queries::upsert_question_embedding(
			&service.db.pool,
			question_id,
			"test:test",
			&vector::format_vector_text(values),
			values.len() as i32,
			"digest",
		)
		.await
		.expect("Failed to store embedding.");
	}

	#[derive(Default)]
	pub struct InMemoryIndex {
		points: Mutex<Vec<IndexPoint>>,
	}
	impl InMemoryIndex {
		pub fn add(&self, question_id: Uuid, vector: Vec<f32>) {
			self.points.lock().expect("Index lock poisoned.").push(IndexPoint {
				question_id,
				vector,
				status: Some("approved".to_string()),
				style_id: None,
				tone_id: None,
				topic_id: None,
				embedding_version: "test:test".to_string(),
			});
		}

		pub fn len(&self) -> usize {
			self.points.lock().expect("Index lock poisoned.").len()
		}
	}
	impl SimilarityIndex for InMemoryIndex {
		fn nearest<'a>(
			&'a self,
			vector: &'a [f32],
			limit: u32,
			_filter: Option<&'a IndexFilter>,
		) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
			let mut hits: Vec<Neighbor> = self
				.points
				.lock()
				.expect("Index lock poisoned.")
				.iter()
				.filter_map(|point| {
					let score = rapport_domain::vector::cosine_similarity(vector, &point.vector)?;

					Some(Neighbor {
						question_id: point.question_id,
						score,
						status: point.status.clone(),
						style_id: point.style_id,
						tone_id: point.tone_id,
						topic_id: point.topic_id,
					})
				})
				.collect();

			index::sort_neighbors(&mut hits);
			hits.truncate(limit as usize);

			Box::pin(async move { Ok(hits) })
		}

		fn upsert<'a>(&'a self, point: &'a IndexPoint) -> BoxFuture<'a, Result<()>> {
			let mut points = self.points.lock().expect("Index lock poisoned.");

			points.retain(|existing| existing.question_id != point.question_id);
			points.push(point.clone());

			Box::pin(async { Ok(()) })
		}

		fn delete<'a>(&'a self, question_id: Uuid) -> BoxFuture<'a, Result<()>> {
			self.points
				.lock()
				.expect("Index lock poisoned.")
				.retain(|existing| existing.question_id != question_id);

			Box::pin(async { Ok(()) })
		}
	}

	pub struct StubEmbedding {
		pub vector_dim: usize,
	}
	impl EmbeddingProvider for StubEmbedding {
		fn embed<'a>(
			&'a self,
			_cfg: &'a rapport_config::EmbeddingProviderConfig,
			texts: &'a [String],
		) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
			let vectors = texts.iter().map(|_| vec![0.1; self.vector_dim]).collect();

			Box::pin(async move { Ok(vectors) })
		}
	}

	pub struct StubGeneration;
	impl GenerationProvider for StubGeneration {
		fn generate<'a>(
			&'a self,
			_cfg: &'a rapport_config::LlmProviderConfig,
			_messages: &'a [Value],
		) -> BoxFuture<'a, Result<String>> {
			Box::pin(async { Ok("What is a small thing that made your day better?".to_string()) })
		}
	}
}
