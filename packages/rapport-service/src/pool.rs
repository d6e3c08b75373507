//! Pool Generator.
//!
//! One run per calendar day, guarded by the `pool_runs` row. Combinations are walked in a
//! date-seeded order and every accepted question is written with an INDEX_QUESTION job in the same
//! transaction, so the worker picks up its embedding afterwards.

use std::{collections::HashMap, time::Duration};

use serde::Serialize;
use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, GenerationProvider, RapportService, Result, curator, embedding::embed_text};
use rapport_config::{LlmProviderConfig, Pool};
use rapport_domain::{
	generation::{self, Combination, Rejection},
	question::PoolStatus,
	vector::cosine_similarity,
};
use rapport_providers::generation::{system_message, user_message};
use rapport_storage::{
	models::{Question, Tag},
	outbox::{self, JobKind},
	queries::{self, PoolRunTotals},
};

const SYSTEM_PROMPT: &str = "You write one open-ended conversation question for a small group. \
Reply with the question only, on a single line, without numbering or quotes.";

#[derive(Clone, Debug, Default, Serialize)]
pub struct PoolReport {
	#[serde(with = "rapport_storage::time_serde::date::option")]
	pub pool_date: Option<Date>,
	pub created: u32,
	pub rejected_short: u32,
	pub rejected_exact: u32,
	pub rejected_similar: u32,
	pub errors: Vec<String>,
}
impl PoolReport {
	fn reject(&mut self, rejection: Rejection) {
		match rejection {
			Rejection::TooShort => self.rejected_short += 1,
			Rejection::ExactMatch => self.rejected_exact += 1,
			Rejection::NearDuplicate => self.rejected_similar += 1,
		}
	}
}

/// How long to back off after a 429.
pub fn rate_limit_wait(hint: Option<Duration>, cfg: &Pool) -> Duration {
	let fallback = Duration::from_millis(cfg.fallback_retry_after_ms);
	let max = Duration::from_millis(cfg.max_retry_after_ms);

	hint.unwrap_or(fallback).min(max)
}

/// Calls the generation provider, sleeping through rate limits up to
/// `pool.max_rate_limit_retries` times.
pub async fn generate_with_retry(
	provider: &dyn GenerationProvider,
	llm: &LlmProviderConfig,
	messages: &[Value],
	cfg: &Pool,
) -> Result<String> {
	let mut retries = 0;

	loop {
		match provider.generate(llm, messages).await {
			Err(Error::RateLimited { retry_after }) if retries < cfg.max_rate_limit_retries => {
				let wait = rate_limit_wait(retry_after, cfg);

				retries += 1;

				tracing::warn!(
					retry = retries,
					wait_ms = wait.as_millis() as u64,
					"Generation provider rate limited. Backing off."
				);

				tokio::time::sleep(wait).await;
			},
			other => return other,
		}
	}
}

pub fn build_messages(style: &Tag, tone: &Tag) -> Vec<Value> {
	let describe = |tag: &Tag| match tag.prompt_description.as_deref().map(str::trim) {
		Some(description) if !description.is_empty() => format!("{} ({description})", tag.name),
		_ => tag.name.clone(),
	};

	vec![
		system_message(SYSTEM_PROMPT),
		user_message(&format!(
			"Style: {}.\nTone: {}.\nWrite one new question in this style and tone.",
			describe(style),
			describe(tone)
		)),
	]
}

impl RapportService {
	/// Generates the day's pool. Returns `None` when another run already claimed `pool_date`.
	///
	/// A failed or abandoned run for the same day is resumed. Combinations that already have
	/// their questions are skipped, and the report only counts this invocation's work.
	pub async fn generate_pool(&self, pool_date: Date) -> Result<Option<PoolReport>> {
		let now = OffsetDateTime::now_utc();
		let lease = time::Duration::minutes(i64::from(self.cfg.pool.stale_run_minutes));
		let stale_before = now - lease;

		if !queries::claim_pool_run(&self.db.pool, pool_date, now, stale_before).await? {
			tracing::info!(%pool_date, "Pool run already claimed.");

			return Ok(None);
		}

		let mut report = PoolReport { pool_date: Some(pool_date), ..Default::default() };
		let outcome = self.fill_pool(pool_date, &mut report).await;
		let status = if outcome.is_ok() { "completed" } else { "failed" };

		if let Err(err) = &outcome {
			tracing::error!(%pool_date, error = %err, "Pool run failed.");
			report.errors.push(err.to_string());
		}

		queries::finish_pool_run(
			&self.db.pool,
			pool_date,
			&PoolRunTotals {
				status,
				created: to_i32(report.created),
				rejected_short: to_i32(report.rejected_short),
				rejected_exact: to_i32(report.rejected_exact),
				rejected_similar: to_i32(report.rejected_similar),
				errors: &report.errors,
			},
			OffsetDateTime::now_utc(),
		)
		.await?;

		outcome?;

		tracing::info!(
			%pool_date,
			created = report.created,
			rejected_short = report.rejected_short,
			rejected_exact = report.rejected_exact,
			rejected_similar = report.rejected_similar,
			errors = report.errors.len(),
			"Pool run finished."
		);

		Ok(Some(report))
	}

	async fn fill_pool(&self, pool_date: Date, report: &mut PoolReport) -> Result<()> {
		let cfg = &self.cfg.pool;
		let styles: HashMap<Uuid, Tag> = queries::list_styles(&self.db.pool)
			.await?
			.into_iter()
			.map(|tag| (tag.id, tag))
			.collect();
		let tones: HashMap<Uuid, Tag> = queries::list_tones(&self.db.pool)
			.await?
			.into_iter()
			.map(|tag| (tag.id, tag))
			.collect();
		let style_ids: Vec<Uuid> = styles.keys().copied().collect();
		let tone_ids: Vec<Uuid> = tones.keys().copied().collect();
		let plan = generation::plan_combinations(
			&style_ids,
			&tone_ids,
			pool_date,
			cfg.max_combinations_per_run,
		);
		let existing: HashMap<(Uuid, Uuid), u32> =
			queries::count_pool_questions(&self.db.pool, pool_date)
				.await?
				.into_iter()
				.map(|(style_id, tone_id, count)| {
					((style_id, tone_id), u32::try_from(count).unwrap_or(u32::MAX))
				})
				.collect();
		// Accepted this run. Not indexed yet, so the near-duplicate check compares against them
		// directly.
		let mut accepted_vectors: Vec<Vec<f32>> = Vec::new();

		for Combination { style_id, tone_id } in plan {
			let (Some(style), Some(tone)) = (styles.get(&style_id), tones.get(&tone_id)) else {
				continue;
			};
			let mut accepted = existing.get(&(style_id, tone_id)).copied().unwrap_or(0);

			if accepted >= cfg.questions_per_combination {
				tracing::debug!(
					style = %style.slug,
					tone = %tone.slug,
					"Combination already filled."
				);

				continue;
			}

			let messages = build_messages(style, tone);
			let mut attempts = 0;

			while accepted < cfg.questions_per_combination
				&& attempts < cfg.max_attempts_per_combination
			{
				attempts += 1;

				let raw = match generate_with_retry(
					self.providers.generation.as_ref(),
					&self.cfg.providers.generation,
					&messages,
					cfg,
				)
				.await
				{
					Ok(raw) => raw,
					Err(Error::RateLimited { .. }) => {
						report.errors.push(format!(
							"Rate limit retries exhausted for {} / {}.",
							style.slug, tone.slug
						));

						break;
					},
					Err(err) => {
						tracing::warn!(
							style = %style.slug,
							tone = %tone.slug,
							error = %err,
							"Generation failed."
						);
						report.errors.push(format!("{} / {}: {err}", style.slug, tone.slug));

						continue;
					},
				};
				let text = generation::clean_generated_text(&raw);
				let vector = match self.screen(&text, &accepted_vectors).await {
					Ok(vector) => vector,
					Err(Screen::Rejected(rejection)) => {
						tracing::info!(
							style = %style.slug,
							tone = %tone.slug,
							reason = rejection.as_str(),
							"Generated question rejected."
						);
						report.reject(rejection);

						continue;
					},
					Err(Screen::Failed(err)) => {
						report.errors.push(format!("{} / {}: {err}", style.slug, tone.slug));

						continue;
					},
				};

				self.insert_pool_question(&text, style, tone, pool_date).await?;

				accepted_vectors.push(vector);
				accepted += 1;
				report.created += 1;
			}
		}

		Ok(())
	}

	/// Cheapest checks first. Returns the embedding of an accepted text.
	async fn screen(&self, text: &str, accepted: &[Vec<f32>]) -> Result<Vec<f32>, Screen> {
		generation::check_length(text, self.cfg.pool.min_length).map_err(Screen::Rejected)?;

		let exists = queries::question_text_exists(&self.db.pool, text)
			.await
			.map_err(|err| Screen::Failed(err.into()))?;

		if exists {
			return Err(Screen::Rejected(Rejection::ExactMatch));
		}

		let vector =
			embed_text(&self.providers, &self.cfg, Some(text)).await.map_err(Screen::Failed)?;

		if self.similar_to_accepted(&vector, accepted) {
			return Err(Screen::Rejected(Rejection::NearDuplicate));
		}

		let near = curator::is_near_duplicate(self.index.as_ref(), &vector, &self.cfg.curation)
			.await
			.map_err(Screen::Failed)?;

		if near.is_some() {
			return Err(Screen::Rejected(Rejection::NearDuplicate));
		}

		Ok(vector)
	}

	fn similar_to_accepted(&self, vector: &[f32], accepted: &[Vec<f32>]) -> bool {
		accepted.iter().any(|other| {
			cosine_similarity(vector, other)
				.is_some_and(|score| score > self.cfg.curation.similarity_threshold)
		})
	}

	async fn insert_pool_question(
		&self,
		text: &str,
		style: &Tag,
		tone: &Tag,
		pool_date: Date,
	) -> Result<Uuid> {
		let now = OffsetDateTime::now_utc();
		let question = Question {
			question_id: Uuid::new_v4(),
			text: Some(text.to_string()),
			custom_text: None,
			style: Some(style.name.clone()),
			tone: Some(tone.name.clone()),
			topic: None,
			style_id: Some(style.id),
			tone_id: Some(tone.id),
			topic_id: None,
			organization_id: None,
			status: Some(self.cfg.pool.default_status.clone()),
			total_shows: 0,
			total_likes: 0,
			total_thumbs_down: 0,
			average_view_duration: 0.0,
			last_shown_at: None,
			is_ai_generated: true,
			pool_date: Some(pool_date),
			pool_status: Some(PoolStatus::Available.as_str().to_string()),
			pruned_at: None,
			created_at: now,
			updated_at: now,
		};
		let mut tx = self.db.pool.begin().await?;

		queries::insert_question(&mut *tx, &question).await?;
		outbox::enqueue(&mut *tx, JobKind::IndexQuestion, question.question_id, now).await?;

		tx.commit().await?;

		tracing::debug!(question_id = %question.question_id, "Pool question created.");

		Ok(question.question_id)
	}
}

enum Screen {
	Rejected(Rejection),
	Failed(Error),
}

fn to_i32(value: u32) -> i32 {
	i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wait_prefers_hint_but_respects_cap() {
		let cfg = Pool {
			fallback_retry_after_ms: 2_000,
			max_retry_after_ms: 10_000,
			..Default::default()
		};

		assert_eq!(rate_limit_wait(None, &cfg), Duration::from_millis(2_000));
		assert_eq!(rate_limit_wait(Some(Duration::from_secs(3)), &cfg), Duration::from_secs(3));
		assert_eq!(rate_limit_wait(Some(Duration::from_secs(60)), &cfg), Duration::from_secs(10));
	}

	#[test]
	fn prompt_mentions_style_and_tone() {
		let style = Tag {
			id: Uuid::nil(),
			slug: "deep".to_string(),
			name: "Deep".to_string(),
			prompt_description: Some("reflective, personal".to_string()),
		};
		let tone = Tag {
			id: Uuid::nil(),
			slug: "playful".to_string(),
			name: "Playful".to_string(),
			prompt_description: None,
		};
		let messages = build_messages(&style, &tone);
		let user = messages[1]["content"].as_str().unwrap_or_default();

		assert_eq!(messages.len(), 2);
		assert!(user.contains("Deep (reflective, personal)"));
		assert!(user.contains("Tone: Playful."));
	}
}
