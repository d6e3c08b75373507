use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
	time::Duration as StdDuration,
};

use serde_json::Value;
use time::{Duration, OffsetDateTime, macros::date};
use uuid::Uuid;

use rapport_service::{
	BoxFuture, EmbeddingProvider, Error, GenerationProvider, Providers, RapportService, Result,
};
use rapport_storage::{
	models::Tag,
	outbox,
	queries::{self, TagTable},
};

use super::InMemoryIndex;

/// Replies in order, whichever combination asks.
struct ScriptedGeneration {
	replies: Mutex<VecDeque<Result<String>>>,
	calls: Mutex<u32>,
}
impl ScriptedGeneration {
	fn new(replies: Vec<Result<String>>) -> Self {
		Self { replies: Mutex::new(replies.into()), calls: Mutex::new(0) }
	}

	fn calls(&self) -> u32 {
		*self.calls.lock().expect("Calls lock poisoned.")
	}
}
impl GenerationProvider for ScriptedGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a rapport_config::LlmProviderConfig,
		_messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>> {
		*self.calls.lock().expect("Calls lock poisoned.") += 1;

		let reply = self.replies.lock().expect("Replies lock poisoned.").pop_front();

		Box::pin(async move {
			reply.unwrap_or_else(|| {
				Err(Error::Provider { message: "No scripted reply left.".to_string() })
			})
		})
	}
}

/// Fixed vectors per text, `[0, 0, 1]` for anything else.
struct KeyedEmbedding {
	vectors: HashMap<String, Vec<f32>>,
}
impl EmbeddingProvider for KeyedEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a rapport_config::EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let vectors = texts
			.iter()
			.map(|text| self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
			.collect();

		Box::pin(async move { Ok(vectors) })
	}
}

fn tag(slug: &str) -> Tag {
	Tag {
		id: Uuid::new_v4(),
		slug: slug.to_string(),
		name: slug.to_string(),
		prompt_description: None,
	}
}

fn pool_config(dsn: String) -> rapport_config::Config {
	let mut cfg = super::test_config(dsn, 3);

	cfg.pool.max_rate_limit_retries = 1;
	cfg.pool.fallback_retry_after_ms = 1;
	cfg.pool.max_retry_after_ms = 1;

	cfg
}

async fn seed_tags(service: &RapportService) -> (Tag, Tag, Tag) {
	let style = tag("icebreaker");
	let playful = tag("playful");
	let serious = tag("serious");

	queries::insert_tag(&service.db.pool, TagTable::Styles, &style)
		.await
		.expect("Failed to insert style.");

	for tone in [&playful, &serious] {
		queries::insert_tag(&service.db.pool, TagTable::Tones, tone)
			.await
			.expect("Failed to insert tone.");
	}

	(style, playful, serious)
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn pool_run_screens_generated_questions_and_survives_rate_limits() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping pool_run_screens_generated_questions; set RAPPORT_PG_DSN to run.");

		return;
	};
	let mut cfg = pool_config(test_db.dsn().to_string());

	cfg.pool.questions_per_combination = 2;
	cfg.pool.max_attempts_per_combination = 5;

	let rate_limited = || -> Result<String> {
		Err(Error::RateLimited { retry_after: Some(StdDuration::from_millis(1)) })
	};
	let generation = Arc::new(ScriptedGeneration::new(vec![
		rate_limited(),
		rate_limited(),
		Ok("1. \"What is the silliest thing you believe?\"".to_string()),
		Ok("Why?".to_string()),
		Ok("Which cartoon would you live in?".to_string()),
		Ok("Question: What game did you invent as a kid?".to_string()),
		Ok("What game did you make up as a child?".to_string()),
	]));
	let embedding = Arc::new(KeyedEmbedding {
		vectors: HashMap::from([
			("Which cartoon would you live in?".to_string(), vec![1.0, 0.0, 0.0]),
			("What game did you invent as a kid?".to_string(), vec![0.0, 1.0, 0.0]),
			("What game did you make up as a child?".to_string(), vec![0.0, 0.99, 0.05]),
		]),
	});
	let index = Arc::new(InMemoryIndex::default());
	let service = super::build_service_with(
		cfg,
		index.clone(),
		Providers::new(embedding, generation.clone()),
	)
	.await;
	let (style, _, _) = seed_tags(&service).await;
	let existing = super::insert(
		&service,
		&super::question("what is the SILLIEST thing you   believe?", Some("approved")),
	)
	.await;

	index.add(existing, vec![1.0, 0.0, 0.01]);

	let day = date!(2026 - 03 - 14);
	let report = service
		.generate_pool(day)
		.await
		.expect("generate_pool failed.")
		.expect("Pool run was not claimed.");

	assert_eq!(generation.calls(), 7);
	assert_eq!(report.created, 1);
	assert_eq!(report.rejected_exact, 1);
	assert_eq!(report.rejected_short, 1);
	assert_eq!(report.rejected_similar, 2);
	assert_eq!(report.errors.len(), 1);
	assert!(report.errors[0].starts_with("Rate limit retries exhausted for icebreaker / "));

	let run = queries::fetch_pool_run(&service.db.pool, day)
		.await
		.expect("Fetch failed.")
		.expect("Pool run missing.");

	assert_eq!(run.status, "completed");
	assert_eq!(run.created, 1);
	assert_eq!(run.rejected_similar, 2);

	let now = OffsetDateTime::now_utc() + Duration::seconds(1);
	let job = outbox::claim_next(&service.db, now, Duration::seconds(30))
		.await
		.expect("Claim failed.")
		.expect("Index job missing.");

	assert_eq!(job.kind, "INDEX_QUESTION");

	let question = queries::fetch_question(&service.db.pool, job.subject_id)
		.await
		.expect("Fetch failed.")
		.expect("Pool question missing.");

	assert_eq!(question.text.as_deref(), Some("What game did you invent as a kid?"));
	assert_eq!(question.status.as_deref(), Some("approved"));
	assert_eq!(question.style_id, Some(style.id));
	assert_eq!(question.pool_date, Some(day));
	assert_eq!(question.pool_status.as_deref(), Some("available"));
	assert!(question.is_ai_generated);
	assert!(service.generate_pool(day).await.expect("generate_pool failed.").is_none());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn abandoned_pool_run_resumes_with_unfinished_combinations() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping abandoned_pool_run_resumes; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = pool_config(test_db.dsn().to_string());
	let generation = Arc::new(ScriptedGeneration::new(vec![Ok(
		"What song reminds you of summer?".to_string(),
	)]));
	let embedding = Arc::new(KeyedEmbedding { vectors: HashMap::new() });
	let service = super::build_service_with(
		cfg,
		Arc::new(InMemoryIndex::default()),
		Providers::new(embedding, generation.clone()),
	)
	.await;
	let (style, playful, serious) = seed_tags(&service).await;
	let day = date!(2026 - 03 - 15);
	let mut finished = super::question("What is your favorite board game?", Some("approved"));

	finished.style_id = Some(style.id);
	finished.tone_id = Some(playful.id);
	finished.is_ai_generated = true;
	finished.pool_date = Some(day);
	finished.pool_status = Some("available".to_string());

	super::insert(&service, &finished).await;

	let crashed_at = OffsetDateTime::now_utc() - Duration::hours(2);

	assert!(
		queries::claim_pool_run(&service.db.pool, day, crashed_at, crashed_at)
			.await
			.expect("Claim failed.")
	);

	let report = service
		.generate_pool(day)
		.await
		.expect("generate_pool failed.")
		.expect("Abandoned run was not taken over.");

	assert_eq!(generation.calls(), 1);
	assert_eq!(report.created, 1);
	assert!(report.errors.is_empty());

	let counts: HashMap<(Uuid, Uuid), i64> = queries::count_pool_questions(&service.db.pool, day)
		.await
		.expect("Count failed.")
		.into_iter()
		.map(|(style_id, tone_id, count)| ((style_id, tone_id), count))
		.collect();

	assert_eq!(counts.get(&(style.id, playful.id)), Some(&1));
	assert_eq!(counts.get(&(style.id, serious.id)), Some(&1));

	let run = queries::fetch_pool_run(&service.db.pool, day)
		.await
		.expect("Fetch failed.")
		.expect("Pool run missing.");

	assert_eq!(run.status, "completed");
	assert_eq!(run.created, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
