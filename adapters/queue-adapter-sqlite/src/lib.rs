//! SQLite work queue
//!
//! Repeatable jobs are registrations in `repeatable_jobs`. The scheduler loop
//! started by [`QueueAdapterSqlite::start`] turns every due registration into a
//! waiting row in `job_runs`, which workers claim and then complete or fail.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use fleetsched_types::prelude::*;
use fleetsched_types::queue_adapter::{JobCounts, QueueAdapter, RepeatableJob, RepeatableJobOptions};

mod repeatable;
mod run;
mod schema;

pub use run::{FailOutcome, JobRun};

fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

#[derive(Debug)]
pub struct QueueAdapterSqlite {
	db: SqlitePool,
	/// Wakes the scheduler loop when registrations change
	notify: Notify,
}

impl QueueAdapterSqlite {
	/// Open (or create) `queue.db` inside `dir`
	pub async fn new(dir: impl AsRef<Path>) -> ClResult<Self> {
		tokio::fs::create_dir_all(dir.as_ref()).await.map_err(|err| {
			error!("Cannot create database directory {}: {}", dir.as_ref().display(), err);
			Error::DbError
		})?;

		let opts = sqlite::SqliteConnectOptions::new()
			.filename(dir.as_ref().join("queue.db"))
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal)
			.busy_timeout(Duration::from_secs(5));
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		schema::init_db(&db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;

		Ok(Self { db, notify: Notify::new() })
	}

	/// Create waiting runs for every registration due at `now`
	pub async fn enqueue_due(&self, now: Timestamp) -> ClResult<usize> {
		repeatable::enqueue_due(&self.db, now).await
	}

	/// Earliest pending fire time of any registration
	pub async fn next_due(&self) -> ClResult<Option<Timestamp>> {
		repeatable::next_due(&self.db).await
	}

	/// Claim the oldest waiting run due at `now`
	pub async fn claim_next(&self, now: Timestamp) -> ClResult<Option<JobRun>> {
		run::claim(&self.db, now).await
	}

	pub async fn complete(&self, run_id: i64, now: Timestamp) -> ClResult<bool> {
		run::complete(&self.db, run_id, now).await
	}

	/// Record a failed attempt. The run is retried per the job's retry policy.
	pub async fn fail(&self, run_id: i64, reason: &str, now: Timestamp) -> ClResult<FailOutcome> {
		run::fail(&self.db, run_id, reason, now).await
	}

	/// Spawn the scheduler loop. It sleeps until the next fire time, at most
	/// `max_idle`, and wakes early when a job is added or removed.
	pub fn start(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
		let queue = Arc::clone(self);
		tokio::spawn(async move {
			info!("Queue scheduler started");
			loop {
				let now = Timestamp::now();
				match queue.enqueue_due(now).await {
					Ok(0) => {}
					Ok(count) => debug!("Enqueued {} due run(s)", count),
					Err(err) => warn!("Cannot enqueue due jobs: {}", err),
				}
				let sleep = match queue.next_due().await {
					Ok(Some(next)) => {
						let secs = u64::try_from(next.0.saturating_sub(now.0)).unwrap_or_default();
						Duration::from_secs(secs.max(1)).min(max_idle)
					}
					Ok(None) | Err(_) => max_idle,
				};
				tokio::select! {
					() = tokio::time::sleep(sleep) => {}
					() = queue.notify.notified() => {}
				}
			}
		})
	}
}

#[async_trait]
impl QueueAdapter for QueueAdapterSqlite {
	async fn add_repeatable_job(
		&self,
		name: &str,
		payload: serde_json::Value,
		opts: &RepeatableJobOptions,
	) -> ClResult<RepeatableJob> {
		let job = repeatable::insert(&self.db, name, &payload, opts, Timestamp::now()).await?;
		self.notify.notify_one();
		Ok(job)
	}

	async fn list_repeatable_jobs(&self) -> ClResult<Vec<RepeatableJob>> {
		repeatable::list(&self.db).await
	}

	async fn remove_repeatable_by_key(&self, key: &str) -> ClResult<bool> {
		let removed = repeatable::delete(&self.db, key).await?;
		if removed {
			self.notify.notify_one();
		}
		Ok(removed)
	}

	/// Registrations waiting for their next fire time count as delayed
	async fn job_counts(&self) -> ClResult<JobCounts> {
		let counts = run::counts(&self.db, Timestamp::now()).await?;
		let registered = repeatable::count(&self.db).await?;
		Ok(JobCounts { delayed: counts.delayed.saturating_add(registered), ..counts })
	}
}

// vim: ts=4
