//! In-memory adapters
//!
//! Used by tests and by the daemon with `FLEETSCHED_QUEUE=memory`. The
//! queue deliberately has no uniqueness on job ids, like real backends.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use fleetsched_types::queue_adapter::{JobCounts, QueueAdapter, RepeatableJob, RepeatableJobOptions};
use fleetsched_types::settings_adapter::{Setting, SettingScope, SettingsAdapter};
use fleetsched_types::tenant_adapter::{Tenant, TenantAdapter};

use crate::prelude::*;
use crate::schedule;

// InMemoryQueue //
//***************//
#[derive(Debug, Default)]
pub struct InMemoryQueue {
	jobs: parking_lot::Mutex<Vec<RepeatableJob>>,
	counts: parking_lot::Mutex<JobCounts>,
	unavailable: AtomicBool,
	latency: Option<Duration>,
	next_handle: AtomicU64,
}

impl InMemoryQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delay every call by `latency`
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	/// Simulate an outage: while unavailable every call fails
	pub fn set_available(&self, available: bool) {
		self.unavailable.store(!available, Ordering::SeqCst);
	}

	/// Register a job bypassing the adapter interface
	pub fn insert_raw(&self, job: RepeatableJob) {
		self.jobs.lock().push(job);
	}

	/// Run counters reported next to the repeatable job count
	pub fn set_counts(&self, counts: JobCounts) {
		*self.counts.lock() = counts;
	}

	pub fn jobs(&self) -> Vec<RepeatableJob> {
		self.jobs.lock().clone()
	}

	pub fn jobs_with_id(&self, id: &str) -> Vec<RepeatableJob> {
		self.jobs.lock().iter().filter(|job| &*job.id == id).cloned().collect()
	}

	async fn enter(&self, op: &str) -> ClResult<()> {
		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(Error::BackendUnavailable(format!("queue is down ({})", op)));
		}
		Ok(())
	}
}

#[async_trait]
impl QueueAdapter for InMemoryQueue {
	async fn add_repeatable_job(
		&self,
		name: &str,
		_payload: serde_json::Value,
		opts: &RepeatableJobOptions,
	) -> ClResult<RepeatableJob> {
		self.enter("add_repeatable_job").await?;

		let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
		let job = RepeatableJob {
			id: opts.id.clone(),
			name: name.into(),
			pattern: opts.pattern.clone(),
			timezone: opts.timezone.clone(),
			key: format!("repeat:{}:{}", opts.id, handle).into(),
			next_run_time: schedule::next_run(&opts.pattern, &opts.timezone, Timestamp::now()).ok(),
		};
		self.jobs.lock().push(job.clone());
		Ok(job)
	}

	async fn list_repeatable_jobs(&self) -> ClResult<Vec<RepeatableJob>> {
		self.enter("list_repeatable_jobs").await?;
		Ok(self.jobs())
	}

	async fn remove_repeatable_by_key(&self, key: &str) -> ClResult<bool> {
		self.enter("remove_repeatable_by_key").await?;
		let mut jobs = self.jobs.lock();
		let before = jobs.len();
		jobs.retain(|job| &*job.key != key);
		Ok(jobs.len() != before)
	}

	async fn job_counts(&self) -> ClResult<JobCounts> {
		self.enter("job_counts").await?;
		let delayed = u64::try_from(self.jobs.lock().len()).unwrap_or(u64::MAX);
		Ok(JobCounts { delayed, ..*self.counts.lock() })
	}
}

// InMemoryTenantDirectory //
//*************************//
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
	tenants: parking_lot::RwLock<HashMap<TnId, Tenant>>,
}

impl InMemoryTenantDirectory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, tenant: Tenant) {
		self.tenants.write().insert(tenant.id.clone(), tenant);
	}

	/// Returns false if the tenant is unknown
	pub fn set_enabled(&self, tn_id: &TnId, is_enabled: bool) -> bool {
		match self.tenants.write().get_mut(tn_id) {
			Some(tenant) => {
				tenant.is_enabled = is_enabled;
				true
			}
			None => false,
		}
	}
}

#[async_trait]
impl TenantAdapter for InMemoryTenantDirectory {
	async fn read_tenant(&self, tn_id: &TnId) -> ClResult<Tenant> {
		self.tenants.read().get(tn_id).cloned().ok_or(Error::NotFound)
	}
}

// InMemorySettingsStore //
//***********************//
type SettingKey = (TnId, Box<str>, SettingScope, Option<Box<str>>);

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
	settings: parking_lot::RwLock<HashMap<SettingKey, Setting>>,
}

impl InMemorySettingsStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn key(tn_id: &TnId, key: &str, scope: SettingScope, user_id: Option<&str>) -> SettingKey {
		(tn_id.clone(), key.into(), scope, user_id.map(Into::into))
	}
}

#[async_trait]
impl SettingsAdapter for InMemorySettingsStore {
	async fn read_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<Option<Setting>> {
		Ok(self.settings.read().get(&Self::key(tn_id, key, scope, user_id)).cloned())
	}

	async fn upsert_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		value: serde_json::Value,
		scope: SettingScope,
		user_id: Option<&str>,
		description: Option<&str>,
	) -> ClResult<Setting> {
		scope.check_user(user_id)?;
		let setting = Setting {
			tn_id: tn_id.clone(),
			key: key.into(),
			value,
			scope,
			user_id: user_id.map(Into::into),
			description: description.map(Into::into),
			updated_at: Timestamp::now(),
		};
		self.settings.write().insert(Self::key(tn_id, key, scope, user_id), setting.clone());
		Ok(setting)
	}

	async fn delete_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<bool> {
		Ok(self.settings.write().remove(&Self::key(tn_id, key, scope, user_id)).is_some())
	}

	async fn list_settings(
		&self,
		tn_id: &TnId,
		scope: Option<SettingScope>,
		user_id: Option<&str>,
	) -> ClResult<Vec<Setting>> {
		let mut settings: Vec<Setting> = self
			.settings
			.read()
			.values()
			.filter(|s| &s.tn_id == tn_id)
			.filter(|s| scope.is_none_or(|scope| s.scope == scope))
			.filter(|s| user_id.is_none_or(|user_id| s.user_id.as_deref() == Some(user_id)))
			.cloned()
			.collect();
		settings.sort_by(|a, b| (&a.key, &a.user_id).cmp(&(&b.key, &b.user_id)));
		Ok(settings)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fleetsched_types::queue_adapter::{Retention, RetryPolicy};

	fn opts(id: &str) -> RepeatableJobOptions {
		RepeatableJobOptions {
			id: id.into(),
			pattern: "0 */5 * * * *".into(),
			timezone: "UTC".into(),
			retry: RetryPolicy::default(),
			retention: Retention::default(),
		}
	}

	#[tokio::test]
	async fn test_queue_allows_duplicate_ids() {
		let queue = InMemoryQueue::new();
		let a = queue.add_repeatable_job("gps.sync", serde_json::Value::Null, &opts("gps.sync:t1")).await.unwrap();
		let b = queue.add_repeatable_job("gps.sync", serde_json::Value::Null, &opts("gps.sync:t1")).await.unwrap();

		assert_ne!(a.key, b.key);
		assert!(a.next_run_time.is_some());
		assert_eq!(queue.jobs_with_id("gps.sync:t1").len(), 2);
		assert_eq!(queue.job_counts().await.unwrap().delayed, 2);

		assert!(queue.remove_repeatable_by_key(&a.key).await.unwrap());
		assert!(!queue.remove_repeatable_by_key(&a.key).await.unwrap());
		assert_eq!(queue.jobs(), vec![b]);
	}

	#[tokio::test]
	async fn test_queue_outage() {
		let queue = InMemoryQueue::new();
		queue.set_available(false);
		let res = queue.list_repeatable_jobs().await;
		assert!(matches!(res, Err(Error::BackendUnavailable(_))));

		queue.set_available(true);
		assert!(queue.list_repeatable_jobs().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_settings_store_filters() {
		let store = InMemorySettingsStore::new();
		let tn = TnId::from("t1");
		store.upsert_setting(&tn, "gps.sync", serde_json::json!({}), SettingScope::Tenant, None, None).await.unwrap();
		store.upsert_setting(&tn, "gps.sync", serde_json::json!({}), SettingScope::User, Some("u1"), None).await.unwrap();
		store.upsert_setting(&tn, "gps.sync", serde_json::json!({}), SettingScope::User, Some("u2"), None).await.unwrap();
		store
			.upsert_setting(&TnId::from("t2"), "gps.sync", serde_json::json!({}), SettingScope::Tenant, None, None)
			.await
			.unwrap();

		assert_eq!(store.list_settings(&tn, None, None).await.unwrap().len(), 3);
		assert_eq!(store.list_settings(&tn, Some(SettingScope::User), None).await.unwrap().len(), 2);
		assert_eq!(store.list_settings(&tn, Some(SettingScope::User), Some("u2")).await.unwrap().len(), 1);

		assert!(store.delete_setting(&tn, "gps.sync", SettingScope::User, Some("u1")).await.unwrap());
		assert!(!store.delete_setting(&tn, "gps.sync", SettingScope::User, Some("u1")).await.unwrap());
	}
}

// vim: ts=4
