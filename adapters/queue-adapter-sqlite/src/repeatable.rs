//! Repeatable job registrations

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use fleetsched_core::schedule;
use fleetsched_types::prelude::*;
use fleetsched_types::queue_adapter::{RepeatableJob, RepeatableJobOptions};

use crate::inspect;

fn row_to_job(row: &SqliteRow) -> Result<RepeatableJob, sqlx::Error> {
	let job_key: String = row.try_get("job_key")?;
	let id: String = row.try_get("id")?;
	let name: String = row.try_get("name")?;
	let pattern: String = row.try_get("pattern")?;
	let timezone: String = row.try_get("timezone")?;
	let next_run_at: Option<i64> = row.try_get("next_run_at")?;

	Ok(RepeatableJob {
		id: id.into(),
		name: name.into(),
		pattern: pattern.into(),
		timezone: timezone.into(),
		key: job_key.into(),
		next_run_time: next_run_at.map(Timestamp),
	})
}

pub(crate) async fn insert(
	db: &SqlitePool,
	name: &str,
	payload: &serde_json::Value,
	opts: &RepeatableJobOptions,
	now: Timestamp,
) -> ClResult<RepeatableJob> {
	let next_run = schedule::next_run(&opts.pattern, &opts.timezone, now)?;
	let job_key = format!("repeat:{}:{}", opts.id, Uuid::new_v4().simple());

	let row = sqlx::query(
		"INSERT INTO repeatable_jobs
			(job_key, id, name, pattern, timezone, payload, retry, retention, next_run_at)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
		RETURNING job_key, id, name, pattern, timezone, next_run_at",
	)
	.bind(&job_key)
	.bind(&*opts.id)
	.bind(name)
	.bind(&*opts.pattern)
	.bind(&*opts.timezone)
	.bind(payload.to_string())
	.bind(serde_json::to_string(&opts.retry)?)
	.bind(serde_json::to_string(&opts.retention)?)
	.bind(next_run.0)
	.fetch_one(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	row_to_job(&row).inspect_err(inspect).map_err(|_| Error::DbError)
}

pub(crate) async fn list(db: &SqlitePool) -> ClResult<Vec<RepeatableJob>> {
	let rows = sqlx::query(
		"SELECT job_key, id, name, pattern, timezone, next_run_at FROM repeatable_jobs
		ORDER BY created_at, rowid",
	)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	rows.iter()
		.map(row_to_job)
		.collect::<Result<Vec<_>, _>>()
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)
}

pub(crate) async fn delete(db: &SqlitePool, job_key: &str) -> ClResult<bool> {
	let res = sqlx::query("DELETE FROM repeatable_jobs WHERE job_key = ?")
		.bind(job_key)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected() > 0)
}

pub(crate) async fn count(db: &SqlitePool) -> ClResult<u64> {
	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM repeatable_jobs")
		.fetch_one(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(u64::try_from(count).unwrap_or_default())
}

/// Earliest pending fire time of any registration
pub(crate) async fn next_due(db: &SqlitePool) -> ClResult<Option<Timestamp>> {
	let next: Option<i64> = sqlx::query_scalar("SELECT min(next_run_at) FROM repeatable_jobs")
		.fetch_one(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(next.map(Timestamp))
}

/// Turn every registration due at `now` into a waiting run and advance it.
///
/// Fire times missed while the scheduler was down collapse into one run.
pub(crate) async fn enqueue_due(db: &SqlitePool, now: Timestamp) -> ClResult<usize> {
	enqueue_due_tx(db, now).await.inspect_err(inspect).map_err(|_| Error::DbError)
}

async fn enqueue_due_tx(db: &SqlitePool, now: Timestamp) -> Result<usize, sqlx::Error> {
	let mut tx = db.begin().await?;

	let due = sqlx::query(
		"SELECT job_key, id, name, pattern, timezone, payload, retry, retention, next_run_at
		FROM repeatable_jobs WHERE next_run_at <= ? ORDER BY next_run_at",
	)
	.bind(now.0)
	.fetch_all(&mut *tx)
	.await?;

	for row in &due {
		let job_key: String = row.try_get("job_key")?;
		let pattern: String = row.try_get("pattern")?;
		let timezone: String = row.try_get("timezone")?;
		let run_at: i64 = row.try_get("next_run_at")?;

		sqlx::query(
			"INSERT INTO job_runs (job_key, job_id, name, payload, retry, retention, run_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(&job_key)
		.bind(row.try_get::<String, _>("id")?)
		.bind(row.try_get::<String, _>("name")?)
		.bind(row.try_get::<Option<String>, _>("payload")?)
		.bind(row.try_get::<String, _>("retry")?)
		.bind(row.try_get::<String, _>("retention")?)
		.bind(run_at)
		.execute(&mut *tx)
		.await?;

		let next_run = match schedule::next_run(&pattern, &timezone, now) {
			Ok(next) => Some(next.0),
			Err(err) => {
				warn!("Repeatable job {} stops firing: {}", job_key, err);
				None
			}
		};
		sqlx::query("UPDATE repeatable_jobs SET next_run_at = ? WHERE job_key = ?")
			.bind(next_run)
			.bind(&job_key)
			.execute(&mut *tx)
			.await?;
	}

	tx.commit().await?;
	Ok(due.len())
}

// vim: ts=4
