use std::sync::Arc;

use uuid::Uuid;

use super::InMemoryIndex;

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn liked_embeddings_average_into_the_preference() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping liked_embeddings_average_into_the_preference; set RAPPORT_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let first =
		super::insert(&service, &super::question("What calms you down?", Some("approved"))).await;
	let second =
		super::insert(&service, &super::question("What wakes you up?", Some("approved"))).await;
	let user_id = Uuid::new_v4();

	super::store_embedding(&service, first, &[1.0, 0.0]).await;
	super::store_embedding(&service, second, &[0.0, 1.0]).await;

	for question_id in [first, second] {
		service.toggle_like(user_id, question_id).await.expect("toggle_like failed.");
	}

	let vector = service.recompute_preference(user_id).await.expect("Recompute failed.");

	assert_eq!(vector, vec![0.5, 0.5]);

	let stored = service.get_preference_vector(user_id).await.expect("Fetch failed.");

	assert_eq!(stored.vector, vec![0.5, 0.5]);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn likes_without_embeddings_leave_the_preference_empty() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping likes_without_embeddings; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let question_id =
		super::insert(&service, &super::question("Where is home?", Some("approved"))).await;
	let user_id = Uuid::new_v4();

	service.toggle_like(user_id, question_id).await.expect("toggle_like failed.");

	let vector = service.recompute_preference(user_id).await.expect("Recompute failed.");

	assert!(vector.is_empty());

	let stored = service.get_preference_vector(user_id).await.expect("Fetch failed.");

	assert!(stored.vector.is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn unknown_users_have_no_preference() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping unknown_users_have_no_preference; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let result = service.get_preference_vector(Uuid::new_v4()).await;

	assert!(matches!(result, Err(rapport_service::Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
