//! Job registry
//!
//! Keeps exactly one repeatable job per logical job key (`{jobType}:{tenantId}`)
//! in a work-queue backend that has no uniqueness constraint of its own.
//! Every upsert sweeps all jobs registered under the key before adding the new
//! one, so duplicates left behind by earlier partial failures heal themselves.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use fleetsched_types::context::TenantContext;
use fleetsched_types::queue_adapter::{JobCounts, QueueAdapter, RepeatableJob, RepeatableJobOptions};

use crate::config::EngineConfig;
use crate::prelude::*;
use crate::resolver::TenantCronConfig;

/// Owner reported for jobs whose key does not decode
pub const UNKNOWN_TENANT: &str = "unknown";

const KEY_LOCK_PRUNE_THRESHOLD: usize = 1024;

pub fn job_key(job_type: &str, tn_id: &TnId) -> String {
	format!("{}:{}", job_type, tn_id)
}

/// Tenant part of a logical job key
pub fn decode_tenant(key: &str) -> Option<&str> {
	let (job_type, tenant) = key.rsplit_once(':')?;
	if job_type.is_empty() || tenant.is_empty() { None } else { Some(tenant) }
}

pub fn tenant_of(key: &str) -> TnId {
	TnId::from(decode_tenant(key).unwrap_or(UNKNOWN_TENANT))
}

/// A repeatable job attributed to its owner tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantJob {
	pub tenant_id: TnId,
	#[serde(flatten)]
	pub job: RepeatableJob,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
	#[serde(flatten)]
	pub counts: JobCounts,
	pub repeatable_job_count: u64,
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
	/// Jobs swept from under the key
	pub removed: usize,
	/// The newly registered job, `None` when the config is disabled
	pub job: Option<RepeatableJob>,
}

/// In-process async mutex per logical job key
#[derive(Debug, Default)]
struct KeyLocks {
	locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
	async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
		let lock = {
			let mut locks = self.locks.lock();
			if locks.len() >= KEY_LOCK_PRUNE_THRESHOLD {
				// Entries only referenced by the map are neither held nor awaited
				locks.retain(|_, lock| Arc::strong_count(lock) > 1);
			}
			locks.entry(key.to_string()).or_default().clone()
		};
		lock.lock_owned().await
	}
}

#[derive(Debug)]
pub struct JobRegistry {
	queue: Arc<dyn QueueAdapter>,
	config: EngineConfig,
	locks: KeyLocks,
}

impl JobRegistry {
	pub fn new(queue: Arc<dyn QueueAdapter>, config: EngineConfig) -> Self {
		Self { queue, config, locks: KeyLocks::default() }
	}

	/// Bound a backend call by the configured timeout
	async fn call<T>(&self, op: &str, fut: impl Future<Output = ClResult<T>>) -> ClResult<T> {
		match tokio::time::timeout(self.config.backend_timeout, fut).await {
			Ok(res) => res,
			Err(_) => {
				warn!("Queue call '{}' timed out after {:?}", op, self.config.backend_timeout);
				Err(Error::BackendUnavailable(format!(
					"{} timed out after {:?}",
					op, self.config.backend_timeout
				)))
			}
		}
	}

	async fn guard(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
		if self.config.serialize_per_key { Some(self.locks.lock(key).await) } else { None }
	}

	/// Remove every job registered under `key`. Individual removal failures
	/// are logged and skipped, listing failures propagate.
	async fn sweep(&self, key: &str) -> ClResult<usize> {
		let jobs = self.call("list_repeatable_jobs", self.queue.list_repeatable_jobs()).await?;
		let mut removed = 0;
		for job in jobs.iter().filter(|job| &*job.id == key) {
			match self.call("remove_repeatable_by_key", self.queue.remove_repeatable_by_key(&job.key)).await {
				Ok(true) => removed += 1,
				Ok(false) => debug!("Job {} ({}) already gone", key, job.key),
				Err(err) => warn!("Failed to remove job {} ({}): {}", key, job.key, err),
			}
		}
		if removed > 1 {
			warn!("Removed {} duplicate jobs for {}", removed, key);
		}
		Ok(removed)
	}

	/// Make the backend hold exactly the job described by `config`
	pub async fn upsert(&self, config: &TenantCronConfig) -> ClResult<UpsertOutcome> {
		let key = config.job_key();
		if let Some(ctx) = TenantContext::current()
			&& ctx.tn_id != config.tn_id
		{
			warn!("Upserting job {} in the context of tenant {}", key, ctx.tn_id);
		}

		// Validate before touching the backend so a bad config keeps the old job
		if config.is_enabled {
			config.validate()?;
		}

		let _guard = self.guard(&key).await;
		let removed = self.sweep(&key).await?;

		if !config.is_enabled {
			info!("Job {} disabled, removed {} job(s)", key, removed);
			return Ok(UpsertOutcome { removed, job: None });
		}

		let opts = RepeatableJobOptions {
			id: key.as_str().into(),
			pattern: config.cron.clone(),
			timezone: config.timezone.clone(),
			retry: self.config.retry.clone(),
			retention: self.config.retention.clone(),
		};
		let payload = serde_json::json!({
			"tenantId": config.tn_id,
			"jobType": config.job_type,
		});
		let job = self
			.call(
				"add_repeatable_job",
				self.queue.add_repeatable_job(&config.job_type, payload, &opts),
			)
			.await?;

		info!("Job {} scheduled '{}' in {}", key, config.cron, config.timezone);
		Ok(UpsertOutcome { removed, job: Some(job) })
	}

	/// Remove every job registered for the config's key
	pub async fn remove(&self, config: &TenantCronConfig) -> ClResult<usize> {
		let key = config.job_key();
		let _guard = self.guard(&key).await;
		let removed = self.sweep(&key).await?;
		info!("Job {} removed ({} job(s))", key, removed);
		Ok(removed)
	}

	pub async fn list_all(&self) -> ClResult<Vec<TenantJob>> {
		let jobs = self.call("list_repeatable_jobs", self.queue.list_repeatable_jobs()).await?;
		Ok(jobs.into_iter().map(|job| TenantJob { tenant_id: tenant_of(&job.id), job }).collect())
	}

	pub async fn list_for_tenant(&self, tn_id: &TnId) -> ClResult<Vec<RepeatableJob>> {
		let jobs = self.call("list_repeatable_jobs", self.queue.list_repeatable_jobs()).await?;
		Ok(jobs.into_iter().filter(|job| tenant_of(&job.id) == *tn_id).collect())
	}

	/// All jobs grouped by owner tenant
	pub async fn jobs_by_tenant(&self) -> ClResult<HashMap<TnId, Vec<RepeatableJob>>> {
		let jobs = self.list_all().await?;
		Ok(jobs.into_iter().map(|tj| (tj.tenant_id, tj.job)).into_group_map())
	}

	pub async fn stats(&self) -> ClResult<QueueStats> {
		let counts = self.call("job_counts", self.queue.job_counts()).await?;
		let jobs = self.call("list_repeatable_jobs", self.queue.list_repeatable_jobs()).await?;
		Ok(QueueStats { counts, repeatable_job_count: u64::try_from(jobs.len()).unwrap_or(u64::MAX) })
	}

	/// Best-effort removal of all jobs of a tenant, returns the number removed
	pub async fn clear_tenant_jobs(&self, tn_id: &TnId) -> ClResult<usize> {
		let jobs = self.list_for_tenant(tn_id).await?;
		let mut removed = 0;
		for job in &jobs {
			let _guard = self.guard(&job.id).await;
			match self.call("remove_repeatable_by_key", self.queue.remove_repeatable_by_key(&job.key)).await {
				Ok(true) => removed += 1,
				Ok(false) => debug!("Job {} ({}) already gone", job.id, job.key),
				Err(err) => warn!("Failed to remove job {} of tenant {}: {}", job.id, tn_id, err),
			}
		}
		info!("Cleared {}/{} job(s) of tenant {}", removed, jobs.len(), tn_id);
		Ok(removed)
	}
}


// vim: ts=4
