use std::sync::Arc;

use uuid::Uuid;

use rapport_domain::relation::RelationStatus;
use rapport_service::{Error, SeenRequest};
use rapport_storage::queries;

use super::InMemoryIndex;

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn likes_survive_later_exposures() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping likes_survive_later_exposures; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let question_id =
		super::insert(&service, &super::question("What are you proud of?", Some("approved")))
			.await;
	let user_id = Uuid::new_v4();
	let seen = service
		.mark_seen(user_id, question_id, SeenRequest { view_duration_ms: 500 })
		.await
		.expect("mark_seen failed.");

	assert_eq!(seen.status, RelationStatus::Seen);

	let liked = service.toggle_like(user_id, question_id).await.expect("toggle_like failed.");

	assert_eq!(liked.status, RelationStatus::Liked);

	let again = service
		.mark_seen(user_id, question_id, SeenRequest { view_duration_ms: 300 })
		.await
		.expect("mark_seen failed.");

	assert_eq!(again.status, RelationStatus::Liked);

	let question = queries::fetch_question(&service.db.pool, question_id)
		.await
		.expect("Fetch failed.")
		.expect("Question missing.");

	assert_eq!(question.total_shows, 2);
	assert_eq!(question.total_likes, 1);

	let relation = queries::fetch_relation(&service.db.pool, user_id, question_id)
		.await
		.expect("Fetch failed.")
		.expect("Relation missing.");

	assert_eq!(relation.status, RelationStatus::Liked.as_str());
	assert_eq!(relation.seen_count, 2);

	let unliked = service.toggle_like(user_id, question_id).await.expect("toggle_like failed.");

	assert_eq!(unliked.status, RelationStatus::Seen);

	let question = queries::fetch_question(&service.db.pool, question_id)
		.await
		.expect("Fetch failed.")
		.expect("Question missing.");

	assert_eq!(question.total_likes, 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn engagement_rejects_bad_input() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping engagement_rejects_bad_input; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let question_id =
		super::insert(&service, &super::question("Tea or coffee?", Some("approved"))).await;
	let negative = service
		.mark_seen(Uuid::new_v4(), question_id, SeenRequest { view_duration_ms: -1 })
		.await;
	let missing = service.toggle_like(Uuid::new_v4(), Uuid::new_v4()).await;

	assert!(matches!(negative, Err(Error::InvalidRequest { .. })));
	assert!(matches!(missing, Err(Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
