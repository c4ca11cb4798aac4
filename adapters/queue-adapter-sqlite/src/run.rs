//! Job runs: claim, complete, fail with retry, bounded history

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use fleetsched_types::prelude::*;
use fleetsched_types::queue_adapter::{JobCounts, Retention, RetryPolicy};

use crate::inspect;

/// A single execution of a repeatable job
#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
	pub run_id: i64,
	/// Handle of the registration that produced the run
	pub job_key: Box<str>,
	pub job_id: Box<str>,
	pub name: Box<str>,
	pub payload: serde_json::Value,
	/// 1-based attempt number
	pub attempt: u16,
	pub run_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
	/// Scheduled again at `run_at`
	Retrying { attempt: u16, run_at: Timestamp },
	/// Out of attempts
	Failed,
}

fn decode<T: serde::de::DeserializeOwned>(column: &str, text: &str) -> Result<T, sqlx::Error> {
	serde_json::from_str(text)
		.map_err(|err| sqlx::Error::Decode(format!("invalid {} column: {}", column, err).into()))
}

fn row_to_run(row: &SqliteRow) -> Result<JobRun, sqlx::Error> {
	let run_id: i64 = row.try_get("run_id")?;
	let job_key: String = row.try_get("job_key")?;
	let job_id: String = row.try_get("job_id")?;
	let name: String = row.try_get("name")?;
	let payload: Option<String> = row.try_get("payload")?;
	let attempt: i64 = row.try_get("attempt")?;
	let run_at: i64 = row.try_get("run_at")?;

	Ok(JobRun {
		run_id,
		job_key: job_key.into(),
		job_id: job_id.into(),
		name: name.into(),
		payload: match payload {
			Some(payload) => decode("payload", &payload)?,
			None => serde_json::Value::Null,
		},
		attempt: u16::try_from(attempt).unwrap_or(u16::MAX),
		run_at: Timestamp(run_at),
	})
}

/// Mark the oldest waiting run due at `now` as active and return it
pub(crate) async fn claim(db: &SqlitePool, now: Timestamp) -> ClResult<Option<JobRun>> {
	let row = sqlx::query(
		"UPDATE job_runs SET status = 'A'
		WHERE run_id = (
			SELECT run_id FROM job_runs WHERE status = 'W' AND run_at <= ?
			ORDER BY run_at, run_id LIMIT 1
		)
		RETURNING run_id, job_key, job_id, name, payload, attempt, run_at",
	)
	.bind(now.0)
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	row.as_ref().map(row_to_run).transpose().inspect_err(inspect).map_err(|_| Error::DbError)
}

/// Returns false if the run is unknown or not active
pub(crate) async fn complete(db: &SqlitePool, run_id: i64, now: Timestamp) -> ClResult<bool> {
	complete_tx(db, run_id, now).await.inspect_err(inspect).map_err(|_| Error::DbError)
}

async fn complete_tx(db: &SqlitePool, run_id: i64, now: Timestamp) -> Result<bool, sqlx::Error> {
	let mut tx = db.begin().await?;
	let row = sqlx::query(
		"UPDATE job_runs SET status = 'C', finished_at = ?, error = NULL
		WHERE run_id = ? AND status = 'A'
		RETURNING job_key, retention",
	)
	.bind(now.0)
	.bind(run_id)
	.fetch_optional(&mut *tx)
	.await?;

	let Some(row) = row else {
		return Ok(false);
	};
	let job_key: String = row.try_get("job_key")?;
	let retention: Retention = decode("retention", &row.try_get::<String, _>("retention")?)?;
	prune(&mut tx, &job_key, 'C', retention.keep_completed).await?;

	tx.commit().await?;
	Ok(true)
}

pub(crate) async fn fail(
	db: &SqlitePool,
	run_id: i64,
	reason: &str,
	now: Timestamp,
) -> ClResult<FailOutcome> {
	fail_tx(db, run_id, reason, now)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?
		.ok_or(Error::NotFound)
}

async fn fail_tx(
	db: &SqlitePool,
	run_id: i64,
	reason: &str,
	now: Timestamp,
) -> Result<Option<FailOutcome>, sqlx::Error> {
	let mut tx = db.begin().await?;
	let row = sqlx::query(
		"SELECT job_key, attempt, retry, retention FROM job_runs WHERE run_id = ? AND status = 'A'",
	)
	.bind(run_id)
	.fetch_optional(&mut *tx)
	.await?;

	let Some(row) = row else {
		return Ok(None);
	};
	let job_key: String = row.try_get("job_key")?;
	let attempt = u16::try_from(row.try_get::<i64, _>("attempt")?).unwrap_or(u16::MAX);
	let retry: RetryPolicy = decode("retry", &row.try_get::<String, _>("retry")?)?;
	let retention: Retention = decode("retention", &row.try_get::<String, _>("retention")?)?;

	let outcome = if attempt < retry.attempts {
		let delay_secs = retry.delay_for(attempt).div_ceil(1000);
		let run_at = Timestamp(now.0.saturating_add(i64::try_from(delay_secs).unwrap_or(i64::MAX)));
		sqlx::query(
			"UPDATE job_runs SET status = 'W', attempt = attempt + 1, run_at = ?, error = ?
			WHERE run_id = ?",
		)
		.bind(run_at.0)
		.bind(reason)
		.bind(run_id)
		.execute(&mut *tx)
		.await?;
		FailOutcome::Retrying { attempt: attempt.saturating_add(1), run_at }
	} else {
		sqlx::query(
			"UPDATE job_runs SET status = 'F', finished_at = ?, error = ? WHERE run_id = ?",
		)
		.bind(now.0)
		.bind(reason)
		.bind(run_id)
		.execute(&mut *tx)
		.await?;
		prune(&mut tx, &job_key, 'F', retention.keep_failed).await?;
		FailOutcome::Failed
	};

	tx.commit().await?;
	Ok(Some(outcome))
}

/// Keep only the newest `keep` runs of a job in the given final status
async fn prune(
	tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
	job_key: &str,
	status: char,
	keep: u32,
) -> Result<(), sqlx::Error> {
	sqlx::query(
		"DELETE FROM job_runs WHERE job_key = ? AND status = ? AND run_id NOT IN (
			SELECT run_id FROM job_runs WHERE job_key = ? AND status = ?
			ORDER BY run_id DESC LIMIT ?
		)",
	)
	.bind(job_key)
	.bind(status.to_string())
	.bind(job_key)
	.bind(status.to_string())
	.bind(i64::from(keep))
	.execute(&mut **tx)
	.await?;
	Ok(())
}

/// Run counters. Waiting runs scheduled in the future count as delayed.
pub(crate) async fn counts(db: &SqlitePool, now: Timestamp) -> ClResult<JobCounts> {
	let row = sqlx::query(
		"SELECT
			coalesce(sum(status = 'W' AND run_at <= ?1), 0) AS waiting,
			coalesce(sum(status = 'W' AND run_at > ?1), 0) AS delayed,
			coalesce(sum(status = 'A'), 0) AS active,
			coalesce(sum(status = 'C'), 0) AS completed,
			coalesce(sum(status = 'F'), 0) AS failed
		FROM job_runs",
	)
	.bind(now.0)
	.fetch_one(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	row_to_counts(&row).inspect_err(inspect).map_err(|_| Error::DbError)
}

fn row_to_counts(row: &SqliteRow) -> Result<JobCounts, sqlx::Error> {
	let get = |column: &str| -> Result<u64, sqlx::Error> {
		Ok(u64::try_from(row.try_get::<i64, _>(column)?).unwrap_or_default())
	};
	Ok(JobCounts {
		waiting: get("waiting")?,
		active: get("active")?,
		completed: get("completed")?,
		failed: get("failed")?,
		delayed: get("delayed")?,
	})
}

// vim: ts=4
