use std::{collections::HashSet, sync::Arc};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use rapport_domain::question::QuestionStatus;
use rapport_service::{MetadataUpdate, SeenRequest, SelectRequest};
use rapport_storage::{
	models::Tag,
	queries::{self, TagTable},
	vector,
};

use super::InMemoryIndex;

fn request(count: u32, seed: Option<u32>) -> SelectRequest {
	SelectRequest { count: Some(count), seed, ..Default::default() }
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn seen_questions_are_never_selected_again() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping seen_questions_are_never_selected_again; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let mut ids = Vec::new();

	for text in [
		"What did you want to be as a kid?",
		"Which song is stuck in your head?",
		"What is the best meal you have had?",
		"Where do you go to think?",
	] {
		ids.push(super::insert(&service, &super::question(text, Some("approved"))).await);
	}

	let pruned = super::question("Which app do you open first?", Some("pruned"));

	super::insert(&service, &pruned).await;

	let user_id = Uuid::new_v4();

	service
		.mark_seen(user_id, ids[0], SeenRequest { view_duration_ms: 1_200 })
		.await
		.expect("mark_seen failed.");

	for seed in [1_u32, 7, 42] {
		let response = service
			.select_next(Some(user_id), request(3, Some(seed)))
			.await
			.expect("select_next failed.");
		let picked: HashSet<Uuid> = response.question_ids.iter().copied().collect();
		let expected: HashSet<Uuid> = ids[1..].iter().copied().collect();

		assert_eq!(response.question_ids.len(), 3);
		assert_eq!(picked, expected);
		assert_eq!(response.seed, seed);
	}

	let replay_a = service
		.select_next(Some(user_id), request(3, Some(9)))
		.await
		.expect("select_next failed.");
	let replay_b = service
		.select_next(Some(user_id), request(3, Some(9)))
		.await
		.expect("select_next failed.");

	assert_eq!(replay_a.question_ids, replay_b.question_ids);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn unresolved_user_gets_an_empty_list() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping unresolved_user_gets_an_empty_list; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;

	super::insert(&service, &super::question("What are you reading?", Some("approved"))).await;

	let response = service
		.select_next(None, request(5, None))
		.await
		.expect("select_next failed.");

	assert!(response.question_ids.is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn topic_takeover_replaces_the_general_pool() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping topic_takeover_replaces_the_general_pool; set RAPPORT_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let topic = Tag {
		id: Uuid::new_v4(),
		slug: "holidays".to_string(),
		name: "Holidays".to_string(),
		prompt_description: None,
	};

	queries::insert_tag(&service.db.pool, TagTable::Topics, &topic)
		.await
		.expect("Failed to insert topic.");

	for text in [
		"What is your favorite season?",
		"Who taught you to ride a bike?",
		"What smell reminds you of home?",
		"What is a skill you want to learn?",
	] {
		super::insert(&service, &super::question(text, Some("approved"))).await;
	}

	let mut topic_ids = HashSet::new();

	for text in ["Which holiday tradition do you love?", "What is your best holiday memory?"] {
		let mut question = super::question(text, Some("approved"));

		question.topic_id = Some(topic.id);

		topic_ids.insert(super::insert(&service, &question).await);
	}

	let now = OffsetDateTime::now_utc();

	queries::insert_topic_window(
		&service.db.pool,
		Uuid::new_v4(),
		topic.id,
		now - Duration::hours(1),
		now + Duration::hours(1),
		true,
	)
	.await
	.expect("Failed to insert topic window.");

	let response = service
		.select_next(Some(Uuid::new_v4()), request(2, None))
		.await
		.expect("select_next failed.");
	let picked: HashSet<Uuid> = response.question_ids.iter().copied().collect();

	assert_eq!(picked, topic_ids);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn hidden_styles_are_excluded() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping hidden_styles_are_excluded; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let style = Tag {
		id: Uuid::new_v4(),
		slug: "deep".to_string(),
		name: "Deep".to_string(),
		prompt_description: None,
	};

	queries::insert_tag(&service.db.pool, TagTable::Styles, &style)
		.await
		.expect("Failed to insert style.");

	let mut deep = super::question("What do you fear losing most?", Some("approved"));

	deep.style_id = Some(style.id);

	let deep_id = super::insert(&service, &deep).await;
	let light_id =
		super::insert(&service, &super::question("Cats or dogs?", Some("public"))).await;
	let user_id = Uuid::new_v4();

	service.hide_style(user_id, style.id).await.expect("hide_style failed.");

	let response = service
		.select_next(Some(user_id), request(10, None))
		.await
		.expect("select_next failed.");

	assert_eq!(response.question_ids, vec![light_id]);
	assert!(!response.question_ids.contains(&deep_id));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn long_histories_still_fill_a_page() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping long_histories_still_fill_a_page; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let user_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	queries::ensure_user(&service.db.pool, user_id).await.expect("Failed to insert user.");

	let mut unseen = HashSet::new();

	for n in 0..520 {
		let text = format!("What happened on day {n} of your favorite trip?");
		let question_id = super::insert(&service, &super::question(&text, Some("approved"))).await;

		if n < 510 {
			queries::upsert_relation(&service.db.pool, user_id, question_id, "seen", 1, 0, now)
				.await
				.expect("Failed to record seen relation.");
		} else {
			unseen.insert(question_id);
		}
	}

	for seed in [3_u32, 11] {
		let response = service
			.select_next(Some(user_id), request(10, Some(seed)))
			.await
			.expect("select_next failed.");
		let picked: HashSet<Uuid> = response.question_ids.iter().copied().collect();

		assert_eq!(response.question_ids.len(), 10);
		assert_eq!(picked, unseen);
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn preference_vector_ranks_nearest_selectable_questions() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping preference_vector_ranks_nearest_selectable_questions; set the DSN.");

		return;
	};
	let mut cfg = super::test_config(test_db.dsn().to_string(), 2);

	cfg.selection.fetch_margin = 0;

	let index = Arc::new(InMemoryIndex::default());
	let service = super::build_service(cfg, index.clone()).await;
	let user_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();
	let nearest = super::insert(&service, &super::question("Who do you call first?", None)).await;
	let close = super::insert(
		&service,
		&super::question("Who would you text with good news?", Some("approved")),
	)
	.await;
	let seen = super::insert(
		&service,
		&super::question("Who knows you best?", Some("approved")),
	)
	.await;
	let pruned = super::insert(
		&service,
		&super::question("Who do you miss the most?", Some("pruned")),
	)
	.await;
	let far = super::insert(
		&service,
		&super::question("What is on your desk right now?", Some("approved")),
	)
	.await;
	let opposite = super::insert(
		&service,
		&super::question("Which chore do you secretly enjoy?", Some("public")),
	)
	.await;

	index.add(nearest, vec![1.0, 0.0]);
	index.add(seen, vec![1.0, 0.05]);
	index.add(pruned, vec![0.95, 0.1]);
	index.add(close, vec![0.9, 0.2]);
	index.add(far, vec![0.0, 1.0]);
	index.add(opposite, vec![-1.0, 0.1]);

	queries::ensure_user(&service.db.pool, user_id).await.expect("Failed to insert user.");
	queries::upsert_relation(&service.db.pool, user_id, seen, "seen", 1, 0, now)
		.await
		.expect("Failed to record seen relation.");
	queries::update_user_preference(
		&service.db.pool,
		user_id,
		Some(&vector::format_vector_text(&[1.0, 0.0])),
		now,
	)
	.await
	.expect("Failed to store preference.");

	for seed in [1_u32, 2, 3] {
		let response = service
			.select_next(Some(user_id), request(2, Some(seed)))
			.await
			.expect("select_next failed.");
		let picked: HashSet<Uuid> = response.question_ids.iter().copied().collect();

		assert_eq!(picked, HashSet::from([nearest, close]));
	}

	let fresh_user = service
		.select_next(Some(Uuid::new_v4()), request(10, Some(1)))
		.await
		.expect("select_next failed.");

	assert_eq!(fresh_user.question_ids.len(), 5);
	assert!(!fresh_user.question_ids.contains(&pruned));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn restoring_a_pruned_question_makes_it_selectable() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping restoring_a_pruned_question_makes_it_selectable; set the DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let question_id = super::insert(
		&service,
		&super::question("What would you cook for a friend?", Some("approved")),
	)
	.await;
	let prune = MetadataUpdate { status: Some(QuestionStatus::Pruned), ..Default::default() };
	let pruned =
		service.update_question_metadata(question_id, prune).await.expect("Prune failed.");

	assert!(pruned.pruned_at.is_some());

	let empty = service
		.select_next(Some(Uuid::new_v4()), request(5, None))
		.await
		.expect("select_next failed.");

	assert!(empty.question_ids.is_empty());

	let restore = MetadataUpdate { status: Some(QuestionStatus::Approved), ..Default::default() };
	let restored =
		service.update_question_metadata(question_id, restore).await.expect("Restore failed.");

	assert_eq!(restored.status.as_deref(), Some("approved"));
	assert!(restored.pruned_at.is_none());

	let response = service
		.select_next(Some(Uuid::new_v4()), request(5, None))
		.await
		.expect("select_next failed.");

	assert_eq!(response.question_ids, vec![question_id]);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
