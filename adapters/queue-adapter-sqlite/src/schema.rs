//! Database schema initialization

use sqlx::SqlitePool;

pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Repeatable jobs
	//*****************
	// next_run_at is NULL once a pattern stops producing fire times
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS repeatable_jobs (
		job_key text NOT NULL,
		id text NOT NULL,
		name text NOT NULL,
		pattern text NOT NULL,
		timezone text NOT NULL,
		payload text,
		retry text NOT NULL,
		retention text NOT NULL,
		next_run_at integer,
		created_at integer DEFAULT (unixepoch()),
		PRIMARY KEY(job_key)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_repeatable_jobs_id ON repeatable_jobs(id)")
		.execute(&mut *tx)
		.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_repeatable_jobs_next ON repeatable_jobs(next_run_at)",
	)
	.execute(&mut *tx)
	.await?;

	// Job runs
	//**********
	// status: W waiting, A active, C completed, F failed
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS job_runs (
		run_id integer PRIMARY KEY AUTOINCREMENT,
		job_key text NOT NULL,
		job_id text NOT NULL,
		name text NOT NULL,
		payload text,
		retry text NOT NULL,
		retention text NOT NULL,
		status char(1) NOT NULL DEFAULT 'W',
		attempt integer NOT NULL DEFAULT 1,
		run_at integer NOT NULL,
		finished_at integer,
		error text
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status, run_at)")
		.execute(&mut *tx)
		.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_runs_key ON job_runs(job_key, status)")
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(())
}

// vim: ts=4
