//! fleetsched daemon

use std::process::ExitCode;
use std::sync::Arc;

use fleetsched_core::app::VERSION;
use fleetsched_core::memory::InMemoryQueue;
use fleetsched_core::{Engine, EngineBuilder};
use fleetsched_meta_adapter_sqlite::MetaAdapterSqlite;
use fleetsched_queue_adapter_sqlite::QueueAdapterSqlite;
use fleetsched_types::events::{BulkSyncEvent, DomainEvent};
use fleetsched_types::prelude::*;
use fleetsched_types::queue_adapter::QueueAdapter;
use tokio::task::JoinHandle;

mod config;

use config::{Config, QueueBackend, StartupSync};

async fn log_stats(engine: &Engine) {
	match engine.get_queue_stats().await {
		Ok(stats) => info!(
			"Queue: {} repeatable job(s), {} waiting, {} active, {} failed",
			stats.repeatable_job_count, stats.counts.waiting, stats.counts.active, stats.counts.failed
		),
		Err(err) => warn!("Cannot read queue stats: {}", err),
	}
	match engine.registry.jobs_by_tenant().await {
		Ok(by_tenant) => debug!("{} tenant(s) with jobs", by_tenant.len()),
		Err(err) => warn!("Cannot list jobs: {}", err),
	}
}

async fn run() -> ClResult<()> {
	let config = Config::from_env()?;
	info!("fleetsched V{}", VERSION);

	let table = config.schedule_table()?;
	let meta = Arc::new(MetaAdapterSqlite::new(&config.db_dir).await?);
	let (queue, scheduler): (Arc<dyn QueueAdapter>, Option<JoinHandle<()>>) =
		match config.queue_backend {
			QueueBackend::Sqlite => {
				let sqlite = Arc::new(QueueAdapterSqlite::new(&config.db_dir).await?);
				let scheduler = sqlite.start(config.queue_max_idle);
				let queue: Arc<dyn QueueAdapter> = sqlite;
				(queue, Some(scheduler))
			}
			QueueBackend::Memory => {
				warn!("Using the in-memory queue: jobs are not persisted and never run");
				let queue: Arc<dyn QueueAdapter> = Arc::new(InMemoryQueue::new());
				(queue, None)
			}
		};

	let engine = EngineBuilder::new()
		.config(config.engine_config())
		.schedule_table(table)
		.tenant_adapter(meta.clone())
		.settings_adapter(meta.clone())
		.queue_adapter(queue)
		.build()?;
	engine.start();

	let tenant_ids = match &config.startup_sync {
		StartupSync::None => None,
		StartupSync::All => Some(meta.list_tenant_ids(true).await?),
		StartupSync::Tenants(ids) => Some(ids.clone()),
	};
	if let Some(tenant_ids) = tenant_ids {
		info!("Requesting startup sync of {} tenant(s)", tenant_ids.len());
		engine.publish(DomainEvent::BulkSync(BulkSyncEvent { tenant_ids: Some(tenant_ids) })).await?;
	}

	let mut stats_timer = tokio::time::interval(config.stats_interval);
	loop {
		tokio::select! {
			_ = stats_timer.tick() => log_stats(&engine).await,
			res = tokio::signal::ctrl_c() => {
				res.map_err(|err| Error::Internal(format!("cannot listen for shutdown signal: {}", err)))?;
				break;
			}
		}
	}

	info!("Shutting down");
	if let Some(scheduler) = scheduler {
		scheduler.abort();
	}
	Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_target(false)
		.init();

	match run().await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("FATAL: {}", err);
			ExitCode::FAILURE
		}
	}
}

// vim: ts=4
