mod common;

use serde_json::json;
use std::time::Duration;

use fleetsched_core::config::EngineConfig;
use fleetsched_core::listener::SyncOutcome;
use fleetsched_core::memory::InMemoryQueue;
use fleetsched_core::registry::UNKNOWN_TENANT;
use fleetsched_core::resolver::TenantCronConfig;
use fleetsched_types::error::Error;
use fleetsched_types::events::{BulkSyncEvent, ConfigChangeEvent, DomainEvent, StatusChangeEvent};
use fleetsched_types::queue_adapter::{JobCounts, RepeatableJob};
use fleetsched_types::settings_adapter::{SettingScope, SettingsAdapter};
use fleetsched_types::types::TnId;

use common::{harness, harness_with, tenant, wait_for};

fn raw_job(id: &str, key: &str) -> RepeatableJob {
	RepeatableJob {
		id: id.into(),
		name: "gps.sync".into(),
		pattern: "0 */30 * * * *".into(),
		timezone: "UTC".into(),
		key: key.into(),
		next_run_time: None,
	}
}

fn status(tn: &str, is_enabled: bool) -> StatusChangeEvent {
	StatusChangeEvent { tenant_id: TnId::from(tn), is_enabled }
}

#[tokio::test]
async fn test_enterprise_tenant_lifecycle() {
	let h = harness();
	let tn = TnId::from("T");
	h.tenants.insert(tenant("T", "America/Bogota", Some("enterprise")));

	let config = h.engine.resolve_cron_config(&tn, "gps.sync", None).await.unwrap();
	assert_eq!(&*config.cron, "0 */5 * * * *");
	assert_eq!(&*config.timezone, "America/Bogota");
	assert!(config.is_enabled);

	h.engine.upsert_cron_job(&config).await.unwrap();
	h.engine.upsert_cron_job(&config).await.unwrap();
	let jobs = h.queue.jobs_with_id("gps.sync:T");
	assert_eq!(jobs.len(), 1);
	assert_eq!(h.queue.jobs().len(), 1);
	let original = (jobs[0].pattern.clone(), jobs[0].timezone.clone());

	h.tenants.set_enabled(&tn, false);
	let outcome = h.engine.listener.handle_status_changed(&status("T", false)).await.unwrap();
	assert_eq!(outcome, SyncOutcome::Cleared { removed: 1 });
	assert!(h.engine.get_tenant_jobs(&tn).await.unwrap().is_empty());

	h.tenants.set_enabled(&tn, true);
	let outcome = h.engine.listener.handle_status_changed(&status("T", true)).await.unwrap();
	assert_eq!(outcome, SyncOutcome::Synced { scheduled: 1 });
	let jobs = h.queue.jobs_with_id("gps.sync:T");
	assert_eq!(jobs.len(), 1);
	assert_eq!((jobs[0].pattern.clone(), jobs[0].timezone.clone()), original);
}

#[tokio::test]
async fn test_status_events_through_the_bus() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "UTC", Some("premium")));
	h.engine.start();

	h.engine.publish(DomainEvent::StatusChanged(status("t1", true))).await.unwrap();
	assert!(wait_for(|| h.queue.jobs_with_id("gps.sync:t1").len() == 1).await);

	h.tenants.set_enabled(&tn, false);
	h.engine.publish(DomainEvent::StatusChanged(status("t1", false))).await.unwrap();
	assert!(wait_for(|| h.queue.jobs().is_empty()).await);
}

#[tokio::test]
async fn test_disabled_config_removes_job() {
	let h = harness();
	h.tenants.insert(tenant("t1", "UTC", None));

	let mut config = h.engine.resolve_cron_config(&TnId::from("t1"), "gps.sync", None).await.unwrap();
	h.engine.upsert_cron_job(&config).await.unwrap();
	assert_eq!(h.queue.jobs().len(), 1);

	config.is_enabled = false;
	let outcome = h.engine.upsert_cron_job(&config).await.unwrap();
	assert_eq!(outcome.removed, 1);
	assert!(outcome.job.is_none());
	assert!(h.queue.jobs().is_empty());
}

#[tokio::test]
async fn test_remove_cron_job() {
	let h = harness();
	h.tenants.insert(tenant("t1", "UTC", None));

	let config = h.engine.resolve_cron_config(&TnId::from("t1"), "gps.sync", None).await.unwrap();
	h.engine.upsert_cron_job(&config).await.unwrap();
	assert_eq!(h.engine.remove_cron_job(&config).await.unwrap(), 1);
	assert_eq!(h.engine.remove_cron_job(&config).await.unwrap(), 0);
}

#[tokio::test]
async fn test_upsert_sweeps_duplicates() {
	let h = harness();
	h.tenants.insert(tenant("t1", "UTC", None));
	h.queue.insert_raw(raw_job("gps.sync:t1", "stale-1"));
	h.queue.insert_raw(raw_job("gps.sync:t1", "stale-2"));
	h.queue.insert_raw(raw_job("gps.sync:t2", "other"));

	let config = h.engine.resolve_cron_config(&TnId::from("t1"), "gps.sync", None).await.unwrap();
	let outcome = h.engine.upsert_cron_job(&config).await.unwrap();

	assert_eq!(outcome.removed, 2);
	assert_eq!(h.queue.jobs_with_id("gps.sync:t1").len(), 1);
	assert_eq!(h.queue.jobs_with_id("gps.sync:t2").len(), 1);
}

#[tokio::test]
async fn test_sub_minute_override_registers_nothing() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "UTC", None));
	h.store
		.upsert_setting(&tn, "gps.sync", json!({"cron": "*/30 * * * * *"}), SettingScope::Tenant, None, None)
		.await
		.unwrap();

	let res = h.engine.trigger_tenant_job_update(&tn, None).await;
	assert!(matches!(res, Err(Error::InvalidScheduleConfig(_))));
	assert!(h.queue.jobs().is_empty());
}

#[tokio::test]
async fn test_invalid_update_keeps_previous_schedule() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "UTC", Some("basic")));
	h.engine.trigger_tenant_job_update(&tn, None).await.unwrap();

	h.store
		.upsert_setting(&tn, "gps.sync", json!({"cron": "not a cron"}), SettingScope::Tenant, None, None)
		.await
		.unwrap();
	assert!(h.engine.trigger_tenant_job_update(&tn, None).await.is_err());

	// A hand-built invalid config is rejected before anything is swept
	let bad = TenantCronConfig {
		tn_id: tn.clone(),
		job_type: "gps.sync".into(),
		cron: "*/10 * * * * *".into(),
		timezone: "UTC".into(),
		is_enabled: true,
	};
	assert!(matches!(h.engine.upsert_cron_job(&bad).await, Err(Error::InvalidScheduleConfig(_))));

	let jobs = h.queue.jobs_with_id("gps.sync:t1");
	assert_eq!(jobs.len(), 1);
	assert_eq!(&*jobs[0].pattern, "0 0 * * * *");
}

#[tokio::test]
async fn test_jobs_are_attributed_by_key() {
	let h = harness();
	let uuid = "11111111-1111-1111-1111-111111111111";
	h.queue.insert_raw(raw_job(&format!("gps.sync:{}", uuid), "k1"));
	h.queue.insert_raw(raw_job("gps.sync:22222222-2222-2222-2222-222222222222", "k2"));
	h.queue.insert_raw(raw_job("legacy-cleanup", "k3"));

	let jobs = h.engine.get_tenant_jobs(&TnId::from(uuid)).await.unwrap();
	assert_eq!(jobs.len(), 1);
	assert_eq!(&*jobs[0].key, "k1");

	let all = h.engine.get_all_jobs().await.unwrap();
	assert_eq!(all.len(), 3);
	let unknown: Vec<_> = all.iter().filter(|j| j.tenant_id.as_str() == UNKNOWN_TENANT).collect();
	assert_eq!(unknown.len(), 1);
	assert_eq!(&*unknown[0].job.key, "k3");
}

#[tokio::test]
async fn test_backend_outage_is_swallowed_by_events_only() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "UTC", None));
	h.queue.set_available(false);

	let event = DomainEvent::ConfigChanged(ConfigChangeEvent {
		tenant_id: tn.clone(),
		config_key: Some("gps.sync".into()),
		user_id: None,
	});
	assert!(h.engine.listener.on_event(event).await.is_ok());

	let res = h.engine.trigger_tenant_job_update(&tn, None).await;
	assert!(matches!(res, Err(Error::BackendUnavailable(_))));

	h.queue.set_available(true);
	assert_eq!(h.engine.trigger_tenant_job_update(&tn, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
	let config = EngineConfig { backend_timeout: Duration::from_millis(20), ..EngineConfig::default() };
	let h = harness_with(config, InMemoryQueue::new().with_latency(Duration::from_millis(500)));
	h.tenants.insert(tenant("t1", "UTC", None));

	let res = h.engine.trigger_tenant_job_update(&TnId::from("t1"), None).await;
	assert!(matches!(res, Err(Error::BackendUnavailable(ref r)) if r.contains("timed out")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_leave_one_job() {
	let h = harness_with(EngineConfig::default(), InMemoryQueue::new().with_latency(Duration::from_millis(2)));
	h.tenants.insert(tenant("t1", "UTC", Some("premium")));
	let config = h.engine.resolve_cron_config(&TnId::from("t1"), "gps.sync", None).await.unwrap();

	let tasks = (0..8).map(|_| {
		let engine = h.engine.clone();
		let config = config.clone();
		tokio::spawn(async move { engine.upsert_cron_job(&config).await })
	});
	for res in futures::future::join_all(tasks).await {
		res.unwrap().unwrap();
	}

	assert_eq!(h.queue.jobs_with_id("gps.sync:t1").len(), 1);
}

#[tokio::test]
async fn test_irrelevant_config_changes_are_ignored() {
	let h = harness();
	h.tenants.insert(tenant("t1", "UTC", None));

	for key in [Some("ui.theme"), None] {
		let ev = ConfigChangeEvent { tenant_id: TnId::from("t1"), config_key: key.map(Into::into), user_id: None };
		assert_eq!(h.engine.listener.handle_config_changed(&ev).await.unwrap(), SyncOutcome::Ignored);
	}
	assert!(h.queue.jobs().is_empty());
}

#[tokio::test]
async fn test_setting_update_requires_started_engine() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "UTC", None));

	for _ in 0..300 {
		let res = tokio::time::timeout(
			Duration::from_secs(1),
			h.engine.update_setting(&tn, "gps.sync", json!("0 0 * * * *"), SettingScope::Tenant, None, None),
		)
		.await
		.expect("update_setting must not block");
		assert!(matches!(res, Err(Error::Internal(_))));
	}
	assert!(h.engine.settings.get(&tn, "gps.sync", SettingScope::Tenant, None).await.unwrap().is_none());
	assert!(matches!(
		h.engine.delete_setting(&tn, "gps.sync", SettingScope::Tenant, None).await,
		Err(Error::Internal(_))
	));
}

#[tokio::test]
async fn test_setting_update_resyncs_through_bus() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "Europe/Budapest", None));
	h.engine.start();
	h.engine.trigger_tenant_job_update(&tn, None).await.unwrap();

	h.engine
		.update_setting(&tn, "gps.sync", json!({"cron": "0 0 */6 * * *"}), SettingScope::Tenant, None, Some("every 6h"))
		.await
		.unwrap();
	assert!(
		wait_for(|| {
			let jobs = h.queue.jobs_with_id("gps.sync:t1");
			jobs.len() == 1 && &*jobs[0].pattern == "0 0 */6 * * *"
		})
		.await
	);
	let listed = h.engine.list_settings(&tn, Some(SettingScope::Tenant), None).await.unwrap();
	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].description.as_deref(), Some("every 6h"));

	assert!(h.engine.delete_setting(&tn, "gps.sync", SettingScope::Tenant, None).await.unwrap());
	assert!(
		wait_for(|| {
			let jobs = h.queue.jobs_with_id("gps.sync:t1");
			jobs.len() == 1 && &*jobs[0].pattern == "0 */30 * * * *"
		})
		.await
	);
}

#[tokio::test]
async fn test_user_override_from_event() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "UTC", None));
	h.store
		.upsert_setting(&tn, "gps.sync", json!({"cron": "0 */10 * * * *"}), SettingScope::User, Some("u1"), None)
		.await
		.unwrap();

	let ev = ConfigChangeEvent {
		tenant_id: tn.clone(),
		config_key: Some("gps.sync".into()),
		user_id: Some("u1".into()),
	};
	let outcome = h.engine.listener.handle_config_changed(&ev).await.unwrap();
	assert_eq!(outcome, SyncOutcome::Synced { scheduled: 1 });
	assert_eq!(&*h.queue.jobs_with_id("gps.sync:t1")[0].pattern, "0 */10 * * * *");
}

#[tokio::test]
async fn test_bulk_sync() {
	let h = harness();
	h.tenants.insert(tenant("a", "UTC", None));
	h.tenants.insert(tenant("b", "UTC", Some("basic")));

	let ev = BulkSyncEvent { tenant_ids: Some(vec![TnId::from("a"), TnId::from("missing"), TnId::from("b")]) };
	let outcome = h.engine.listener.handle_bulk_sync(&ev).await.unwrap();
	assert_eq!(outcome, SyncOutcome::Bulk { synced: 2, failed: 1 });
	assert_eq!(h.queue.jobs().len(), 2);

	let outcome = h.engine.listener.handle_bulk_sync(&BulkSyncEvent { tenant_ids: None }).await.unwrap();
	assert_eq!(outcome, SyncOutcome::Skipped);
	assert_eq!(h.queue.jobs().len(), 2);
}

#[tokio::test]
async fn test_sync_status_and_stats() {
	let h = harness();
	let tn = TnId::from("t1");
	h.tenants.insert(tenant("t1", "UTC", None));

	let status = h.engine.get_tenant_sync_status(&tn).await.unwrap();
	assert!(!status.has_jobs);
	assert_eq!(status.job_count, 0);

	h.engine.trigger_tenant_job_update(&tn, None).await.unwrap();
	let status = h.engine.get_tenant_sync_status(&tn).await.unwrap();
	assert!(status.has_jobs);
	assert_eq!(&*status.jobs[0].id, "gps.sync:t1");

	h.queue.set_counts(JobCounts { waiting: 2, active: 1, completed: 40, failed: 3, delayed: 0 });
	let stats = h.engine.get_queue_stats().await.unwrap();
	assert_eq!(stats.counts.completed, 40);
	assert_eq!(stats.counts.delayed, 1);
	assert_eq!(stats.repeatable_job_count, 1);
	assert_eq!(
		serde_json::to_value(stats).unwrap(),
		json!({"waiting": 2, "active": 1, "completed": 40, "failed": 3, "delayed": 1, "repeatableJobCount": 1})
	);
}

#[tokio::test]
async fn test_clear_tenant_jobs_leaves_others() {
	let h = harness();
	h.queue.insert_raw(raw_job("gps.sync:a", "k1"));
	h.queue.insert_raw(raw_job("fuel.report:a", "k2"));
	h.queue.insert_raw(raw_job("gps.sync:b", "k3"));

	assert_eq!(h.engine.clear_tenant_jobs(&TnId::from("a")).await.unwrap(), 2);
	assert_eq!(h.queue.jobs().len(), 1);
	assert_eq!(h.engine.registry.jobs_by_tenant().await.unwrap().len(), 1);
}

// vim: ts=4
