//! SQLite work queue tests

use fleetsched_queue_adapter_sqlite::{FailOutcome, QueueAdapterSqlite};
use fleetsched_types::error::Error;
use fleetsched_types::queue_adapter::{
	BackoffKind, QueueAdapter, RepeatableJobOptions, Retention, RetryPolicy,
};
use fleetsched_types::types::Timestamp;
use serde_json::json;
use tempfile::TempDir;

const DAY: i64 = 86400;

async fn create_test_queue() -> (QueueAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let queue = QueueAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create queue");
	(queue, temp_dir)
}

fn weekly(id: &str) -> RepeatableJobOptions {
	RepeatableJobOptions {
		id: id.into(),
		pattern: "0 9 * * 1".into(),
		timezone: "America/Bogota".into(),
		retry: RetryPolicy { attempts: 2, backoff: BackoffKind::Fixed, delay_ms: 3000 },
		retention: Retention { keep_completed: 1, keep_failed: 5 },
	}
}

fn in_days(days: i64) -> Timestamp {
	Timestamp(Timestamp::now().0 + days * DAY)
}

#[tokio::test]
async fn test_add_list_and_remove() {
	let (queue, _temp) = create_test_queue().await;
	let job = queue.add_repeatable_job("gps.sync", json!({}), &weekly("gps.sync:t1")).await.unwrap();

	assert_eq!(&*job.id, "gps.sync:t1");
	assert!(job.next_run_time.is_some_and(|next| next > Timestamp::now()));
	assert_eq!(queue.list_repeatable_jobs().await.unwrap(), vec![job.clone()]);

	assert!(queue.remove_repeatable_by_key(&job.key).await.unwrap());
	assert!(!queue.remove_repeatable_by_key(&job.key).await.unwrap());
	assert!(queue.list_repeatable_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_same_id_registers_twice() {
	let (queue, _temp) = create_test_queue().await;
	let first = queue.add_repeatable_job("gps.sync", json!({}), &weekly("gps.sync:t1")).await.unwrap();
	let second = queue.add_repeatable_job("gps.sync", json!({}), &weekly("gps.sync:t1")).await.unwrap();

	assert_ne!(first.key, second.key);
	assert_eq!(queue.list_repeatable_jobs().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_pattern_is_rejected() {
	let (queue, _temp) = create_test_queue().await;
	let opts = RepeatableJobOptions { pattern: "not a cron".into(), ..weekly("gps.sync:t1") };

	let res = queue.add_repeatable_job("gps.sync", json!({}), &opts).await;
	assert!(matches!(res, Err(Error::InvalidScheduleConfig(_))));
	assert!(queue.list_repeatable_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_due_job_becomes_claimable_run() {
	let (queue, _temp) = create_test_queue().await;
	let payload = json!({ "tenantId": "t1" });
	let job = queue.add_repeatable_job("gps.sync", payload.clone(), &weekly("gps.sync:t1")).await.unwrap();

	assert_eq!(queue.enqueue_due(Timestamp::now()).await.unwrap(), 0);
	let later = in_days(8);
	assert_eq!(queue.enqueue_due(later).await.unwrap(), 1);
	assert_eq!(queue.enqueue_due(later).await.unwrap(), 0);
	assert!(queue.next_due().await.unwrap().is_some_and(|next| next > later));

	let run = queue.claim_next(later).await.unwrap().unwrap();
	assert_eq!(run.job_key, job.key);
	assert_eq!(&*run.name, "gps.sync");
	assert_eq!(run.payload, payload);
	assert_eq!(run.attempt, 1);
	assert_eq!(Some(run.run_at), job.next_run_time);
	assert!(queue.claim_next(later).await.unwrap().is_none());

	let counts = queue.job_counts().await.unwrap();
	assert_eq!(counts.active, 1);
	assert_eq!(counts.delayed, 1);

	assert!(queue.complete(run.run_id, later).await.unwrap());
	assert!(!queue.complete(run.run_id, later).await.unwrap());
	assert_eq!(queue.job_counts().await.unwrap().completed, 1);
}

#[tokio::test]
async fn test_failed_run_is_retried_then_failed() {
	let (queue, _temp) = create_test_queue().await;
	queue.add_repeatable_job("gps.sync", json!({}), &weekly("gps.sync:t1")).await.unwrap();
	let now = in_days(8);
	queue.enqueue_due(now).await.unwrap();

	let run = queue.claim_next(now).await.unwrap().unwrap();
	let outcome = queue.fail(run.run_id, "provider timeout", now).await.unwrap();
	assert_eq!(outcome, FailOutcome::Retrying { attempt: 2, run_at: Timestamp(now.0 + 3) });
	assert!(queue.claim_next(now).await.unwrap().is_none());

	let retry = queue.claim_next(Timestamp(now.0 + 3)).await.unwrap().unwrap();
	assert_eq!(retry.run_id, run.run_id);
	assert_eq!(retry.attempt, 2);
	assert_eq!(queue.fail(retry.run_id, "provider timeout", now).await.unwrap(), FailOutcome::Failed);
	assert_eq!(queue.job_counts().await.unwrap().failed, 1);

	assert!(matches!(queue.fail(retry.run_id, "again", now).await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_completed_history_is_bounded() {
	let (queue, _temp) = create_test_queue().await;
	queue.add_repeatable_job("gps.sync", json!({}), &weekly("gps.sync:t1")).await.unwrap();

	for days in [8, 16] {
		let now = in_days(days);
		assert_eq!(queue.enqueue_due(now).await.unwrap(), 1);
		let run = queue.claim_next(now).await.unwrap().unwrap();
		queue.complete(run.run_id, now).await.unwrap();
	}
	assert_eq!(queue.job_counts().await.unwrap().completed, 1);
}

#[tokio::test]
async fn test_registrations_survive_reopen() {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let job = {
		let queue = QueueAdapterSqlite::new(temp_dir.path()).await.unwrap();
		queue.add_repeatable_job("gps.sync", json!({}), &weekly("gps.sync:t1")).await.unwrap()
	};

	let queue = QueueAdapterSqlite::new(temp_dir.path()).await.unwrap();
	assert_eq!(queue.list_repeatable_jobs().await.unwrap(), vec![job]);
}

// vim: ts=4
