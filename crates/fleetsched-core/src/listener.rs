//! Change listener
//!
//! Turns domain events into resolve + upsert calls. Event-driven paths log and
//! swallow failures, the manual trigger reports them to its caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fleetsched_types::events::{
	BulkSyncEvent, ConfigChangeEvent, DomainEvent, StatusChangeEvent, TOPICS,
};
use fleetsched_types::queue_adapter::RepeatableJob;

use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::prelude::*;
use crate::registry::{JobRegistry, UpsertOutcome};
use crate::resolver::ConfigResolver;
use crate::settings::SettingsService;

/// What handling an event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
	/// Jobs were re-derived; `scheduled` is the number of enabled jobs registered
	Synced { scheduled: usize },
	/// Tenant disabled, its jobs removed
	Cleared { removed: usize },
	/// Per-tenant results of a bulk sync
	Bulk { synced: usize, failed: usize },
	/// Config change that cannot affect scheduling
	Ignored,
	/// Bulk sync of all tenants was requested
	Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSyncStatus {
	pub tenant_id: TnId,
	pub has_jobs: bool,
	pub job_count: usize,
	pub jobs: Vec<RepeatableJob>,
}

#[derive(Debug)]
pub struct ChangeListener {
	resolver: Arc<ConfigResolver>,
	registry: Arc<JobRegistry>,
	settings: Arc<SettingsService>,
	config: EngineConfig,
}

impl ChangeListener {
	pub fn new(
		resolver: Arc<ConfigResolver>,
		registry: Arc<JobRegistry>,
		settings: Arc<SettingsService>,
		config: EngineConfig,
	) -> Self {
		Self { resolver, registry, settings, config }
	}

	/// Register this listener on every tenant topic
	pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
		for topic in TOPICS {
			let listener = self.clone();
			bus.subscribe(topic, move |event| {
				let listener = listener.clone();
				async move { listener.on_event(event).await }
			});
		}
	}

	/// Bus entry point, never fails
	pub async fn on_event(&self, event: DomainEvent) -> ClResult<()> {
		let topic = event.topic();
		let tenant = event.tenant().map_or_else(|| "-".to_string(), ToString::to_string);

		let res = match &event {
			DomainEvent::ConfigChanged(ev) => self.handle_config_changed(ev).await,
			DomainEvent::StatusChanged(ev) => self.handle_status_changed(ev).await,
			DomainEvent::BulkSync(ev) => self.handle_bulk_sync(ev).await,
		};

		match res {
			Ok(outcome) => info!("{} [tenant {}]: {:?}", topic, tenant, outcome),
			Err(err) if err.is_backend() => {
				error!("{} [tenant {}]: backend failure, sync abandoned: {}", topic, tenant, err);
			}
			Err(err) => warn!("{} [tenant {}]: sync failed: {}", topic, tenant, err),
		}
		Ok(())
	}

	pub async fn handle_config_changed(&self, ev: &ConfigChangeEvent) -> ClResult<SyncOutcome> {
		self.settings.invalidate_tenant(&ev.tenant_id);

		let relevant = ev.config_key.as_deref().is_some_and(|key| self.config.is_relevant_key(key));
		if !relevant {
			debug!("Config key {:?} of tenant {} does not affect scheduling", ev.config_key, ev.tenant_id);
			return Ok(SyncOutcome::Ignored);
		}

		let outcomes = self.sync_tenant(&ev.tenant_id, ev.user_id.as_deref()).await?;
		Ok(SyncOutcome::Synced { scheduled: scheduled(&outcomes) })
	}

	pub async fn handle_status_changed(&self, ev: &StatusChangeEvent) -> ClResult<SyncOutcome> {
		self.settings.invalidate_tenant(&ev.tenant_id);

		if ev.is_enabled {
			let outcomes = self.sync_tenant(&ev.tenant_id, None).await?;
			Ok(SyncOutcome::Synced { scheduled: scheduled(&outcomes) })
		} else {
			let removed = self.registry.clear_tenant_jobs(&ev.tenant_id).await?;
			Ok(SyncOutcome::Cleared { removed })
		}
	}

	pub async fn handle_bulk_sync(&self, ev: &BulkSyncEvent) -> ClResult<SyncOutcome> {
		let Some(tenant_ids) = &ev.tenant_ids else {
			warn!("Bulk sync of all tenants is not supported, event ignored");
			return Ok(SyncOutcome::Skipped);
		};

		let (mut synced, mut failed) = (0, 0);
		for tn_id in tenant_ids {
			match self.sync_tenant(tn_id, None).await {
				Ok(_) => synced += 1,
				Err(err) => {
					warn!("Bulk sync of tenant {} failed: {}", tn_id, err);
					failed += 1;
				}
			}
		}
		Ok(SyncOutcome::Bulk { synced, failed })
	}

	/// Administrative resync of one tenant, errors are returned
	pub async fn trigger_tenant_job_update(
		&self,
		tn_id: &TnId,
		user_id: Option<&str>,
	) -> ClResult<Vec<UpsertOutcome>> {
		self.settings.invalidate_tenant(tn_id);
		self.sync_tenant(tn_id, user_id).await
	}

	pub async fn get_tenant_sync_status(&self, tn_id: &TnId) -> ClResult<TenantSyncStatus> {
		let jobs = self.registry.list_for_tenant(tn_id).await?;
		Ok(TenantSyncStatus {
			tenant_id: tn_id.clone(),
			has_jobs: !jobs.is_empty(),
			job_count: jobs.len(),
			jobs,
		})
	}

	/// Resolve and upsert every managed job type of a tenant. All job types
	/// are attempted, the first failure is returned.
	async fn sync_tenant(&self, tn_id: &TnId, user_id: Option<&str>) -> ClResult<Vec<UpsertOutcome>> {
		let ctx = self.resolver.tenant_context(tn_id).await?;

		ctx.clone()
			.scope(async {
				let mut outcomes = Vec::new();
				let mut first_err = None;

				for job_type in self.resolver.table().job_types() {
					let res = match self.resolver.resolve_with(&ctx, job_type, user_id).await {
						Ok(config) => self.registry.upsert(&config).await,
						Err(err) => Err(err),
					};
					match res {
						Ok(outcome) => outcomes.push(outcome),
						Err(err) => {
							warn!("Sync of {} for tenant {} failed: {}", job_type, ctx.tn_id, err);
							if first_err.is_none() {
								first_err = Some(err);
							}
						}
					}
				}

				match first_err {
					Some(err) => Err(err),
					None => Ok(outcomes),
				}
			})
			.await
	}
}

fn scheduled(outcomes: &[UpsertOutcome]) -> usize {
	outcomes.iter().filter(|outcome| outcome.job.is_some()).count()
}

// vim: ts=4
