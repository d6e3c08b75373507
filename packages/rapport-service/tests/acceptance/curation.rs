use std::sync::Arc;

use time::Duration;

use rapport_domain::duplicates::DetectionStatus;
use rapport_service::{Error, ReviewDecision};
use rapport_storage::{outbox, queries};

use super::InMemoryIndex;

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn sweep_finds_a_duplicate_pair_once_and_review_keeps_the_oldest() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping sweep_finds_a_duplicate_pair_once; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let index = Arc::new(InMemoryIndex::default());
	let service = super::build_service(cfg, index.clone()).await;
	let mut older = super::question("What is your comfort food?", Some("approved"));

	older.created_at -= Duration::days(1);

	let older_id = super::insert(&service, &older).await;
	let newer_id =
		super::insert(&service, &super::question("What's your comfort food?", Some("approved")))
			.await;
	let distinct_id =
		super::insert(&service, &super::question("Where did you grow up?", Some("approved")))
			.await;

	for (question_id, vector) in [
		(older_id, vec![1.0, 0.0]),
		(newer_id, vec![0.99, 0.01]),
		(distinct_id, vec![0.0, 1.0]),
	] {
		super::store_embedding(&service, question_id, &vector).await;
		index.add(question_id, vector);
	}

	let sweep = service.start_sweep().await.expect("start_sweep failed.");

	assert_eq!(sweep.total_questions, 3);
	assert_eq!(sweep.total_batches, 1);

	let report = service.run_sweep_step(sweep.sweep_id).await.expect("run_sweep_step failed.");

	assert_eq!(report.sweep.status, "completed");
	assert_eq!(report.sweep.questions_processed, 3);
	assert_eq!(report.sweep.duplicates_found, 1);
	assert_eq!(report.detections_created, 1);

	let rerun = service.start_sweep().await.expect("start_sweep failed.");
	let rerun = service.run_sweep_step(rerun.sweep_id).await.expect("run_sweep_step failed.");

	assert_eq!(rerun.detections_created, 0);

	let detections = service
		.list_detections(Some(DetectionStatus::Pending), 10)
		.await
		.expect("list_detections failed.");

	assert_eq!(detections.len(), 1);

	let detection = &detections[0];
	let count = queries::count_detections_by_key(&service.db.pool, &detection.unique_key)
		.await
		.expect("Count failed.");

	assert_eq!(count, 1);

	let review = service
		.review_detection(detection.detection_id, ReviewDecision::Approved)
		.await
		.expect("review_detection failed.");

	assert_eq!(review.status, DetectionStatus::Approved);
	assert_eq!(review.kept_question_id, Some(older_id));
	assert_eq!(review.deleted_question_ids, vec![newer_id]);

	let deleted = queries::fetch_question(&service.db.pool, newer_id).await.expect("Fetch failed.");

	assert!(deleted.is_none());

	let job = outbox::claim_next(
		&service.db,
		time::OffsetDateTime::now_utc() + Duration::seconds(1),
		Duration::seconds(30),
	)
	.await
	.expect("Claim failed.")
	.expect("Delete job missing.");

	assert_eq!(job.kind, "DELETE_QUESTION");
	assert_eq!(job.subject_id, newer_id);

	service.handle_job(&job).await.expect("Delete job failed.");

	assert_eq!(index.len(), 2);

	let again = service.review_detection(detection.detection_id, ReviewDecision::Rejected).await;

	assert!(matches!(again, Err(Error::Conflict { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RAPPORT_PG_DSN to run."]
async fn completed_sweeps_cannot_resume() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping completed_sweeps_cannot_resume; set RAPPORT_PG_DSN to run.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let service = super::build_service(cfg, Arc::new(InMemoryIndex::default())).await;
	let sweep = service.start_sweep().await.expect("start_sweep failed.");
	let report = service.run_sweep_step(sweep.sweep_id).await.expect("run_sweep_step failed.");

	assert_eq!(report.sweep.status, "completed");
	assert!(report.sweep.finished_at.is_some());

	let idle = service.run_sweep_step(sweep.sweep_id).await.expect("run_sweep_step failed.");

	assert_eq!(idle.batches_run, 0);

	let resumed = service.resume_sweep(sweep.sweep_id).await;

	assert!(matches!(resumed, Err(Error::Conflict { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
