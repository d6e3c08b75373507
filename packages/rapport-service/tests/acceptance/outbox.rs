use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use rapport_service::CreateQuestionRequest;
use rapport_storage::{outbox, queries};

use super::InMemoryIndex;

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn created_questions_reach_the_index_through_the_outbox() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping created_questions_reach_the_index; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let index = Arc::new(InMemoryIndex::default());
	let service = super::build_service(cfg, index.clone()).await;
	let created = service
		.create_question(CreateQuestionRequest {
			text: "  What would you cook for a friend?  ".to_string(),
			..Default::default()
		})
		.await
		.expect("create_question failed.");

	assert_eq!(created.status.as_deref(), Some("pending"));

	let now = OffsetDateTime::now_utc() + Duration::seconds(1);
	let lease = Duration::seconds(30);
	let job = outbox::claim_next(&service.db, now, lease)
		.await
		.expect("Claim failed.")
		.expect("Index job missing.");

	assert_eq!(job.kind, "INDEX_QUESTION");
	assert_eq!(job.subject_id, created.question_id);
	assert_eq!(job.available_at, now + lease);

	let leased = outbox::claim_next(&service.db, now, lease).await.expect("Claim failed.");

	assert!(leased.is_none());

	service.handle_job(&job).await.expect("Index job failed.");
	outbox::mark_done(&service.db, job.outbox_id, now).await.expect("mark_done failed.");

	assert_eq!(index.len(), 1);

	let embedding = queries::fetch_question_embedding(&service.db.pool, created.question_id)
		.await
		.expect("Fetch failed.")
		.expect("Embedding missing.");

	assert_eq!(embedding.embedding_version, "test:test:2");

	let entry = outbox::fetch_entry(&service.db, job.outbox_id)
		.await
		.expect("Fetch failed.")
		.expect("Entry missing.");

	assert_eq!(entry.status, "DONE");

	let after_lease = outbox::claim_next(&service.db, now + lease, lease)
		.await
		.expect("Claim failed.");

	assert!(after_lease.is_none());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn failed_jobs_come_back_after_their_backoff() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping failed_jobs_come_back_after_their_backoff; set RAPPORT_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let now = OffsetDateTime::now_utc();
	let subject = uuid::Uuid::new_v4();
	let outbox_id =
		outbox::enqueue(&service.db.pool, outbox::JobKind::RecomputePreference, subject, now)
			.await
			.expect("Enqueue failed.");
	let job = outbox::claim_next(&service.db, now, Duration::seconds(30))
		.await
		.expect("Claim failed.")
		.expect("Job missing.");

	assert_eq!(job.outbox_id, outbox_id);

	outbox::mark_failed(&service.db, outbox_id, 1, "boom", now + Duration::seconds(5), now)
		.await
		.expect("mark_failed failed.");

	let early = outbox::claim_next(&service.db, now + Duration::seconds(1), Duration::seconds(30))
		.await
		.expect("Claim failed.");

	assert!(early.is_none());

	let retried = outbox::claim_next(&service.db, now + Duration::seconds(6), Duration::seconds(30))
		.await
		.expect("Claim failed.")
		.expect("Retry missing.");

	assert_eq!(retried.attempts, 1);
	assert_eq!(retried.last_error.as_deref(), Some("boom"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
