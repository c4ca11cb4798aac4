//! Engine builder and facade

use std::sync::Arc;

use fleetsched_types::events::{ConfigChangeEvent, DomainEvent};
use fleetsched_types::queue_adapter::{QueueAdapter, RepeatableJob};
use fleetsched_types::settings_adapter::{Setting, SettingScope, SettingsAdapter};
use fleetsched_types::tenant_adapter::TenantAdapter;

use crate::bus::EventBus;
use crate::config::{EngineConfig, ScheduleTable};
use crate::listener::{ChangeListener, TenantSyncStatus};
use crate::prelude::*;
use crate::registry::{JobRegistry, QueueStats, TenantJob, UpsertOutcome};
use crate::resolver::{ConfigResolver, ProviderConfig, TenantCronConfig};
use crate::settings::SettingsService;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug)]
pub struct EngineState {
	pub config: EngineConfig,
	pub settings: Arc<SettingsService>,
	pub resolver: Arc<ConfigResolver>,
	pub registry: Arc<JobRegistry>,
	pub listener: Arc<ChangeListener>,
	pub bus: EventBus,
}

pub type Engine = Arc<EngineState>;

pub struct EngineBuilder {
	config: EngineConfig,
	table: ScheduleTable,
	tenant_adapter: Option<Arc<dyn TenantAdapter>>,
	settings_adapter: Option<Arc<dyn SettingsAdapter>>,
	queue_adapter: Option<Arc<dyn QueueAdapter>>,
}

impl EngineBuilder {
	pub fn new() -> Self {
		EngineBuilder {
			config: EngineConfig::default(),
			table: ScheduleTable::builtin(),
			tenant_adapter: None,
			settings_adapter: None,
			queue_adapter: None,
		}
	}

	// Opts
	pub fn config(&mut self, config: EngineConfig) -> &mut Self {
		self.config = config;
		self
	}
	pub fn schedule_table(&mut self, table: ScheduleTable) -> &mut Self {
		self.table = table;
		self
	}

	// Adapters
	pub fn tenant_adapter(&mut self, tenant_adapter: Arc<dyn TenantAdapter>) -> &mut Self {
		self.tenant_adapter = Some(tenant_adapter);
		self
	}
	pub fn settings_adapter(&mut self, settings_adapter: Arc<dyn SettingsAdapter>) -> &mut Self {
		self.settings_adapter = Some(settings_adapter);
		self
	}
	pub fn queue_adapter(&mut self, queue_adapter: Arc<dyn QueueAdapter>) -> &mut Self {
		self.queue_adapter = Some(queue_adapter);
		self
	}

	/// Assemble the engine and subscribe the change listener to the bus.
	/// The bus is not started, see [`EngineState::start`].
	pub fn build(&mut self) -> ClResult<Engine> {
		let Some(tenant_adapter) = self.tenant_adapter.clone() else {
			error!("FATAL: No tenant adapter configured");
			return Err(Error::ConfigError("no tenant adapter configured".into()));
		};
		let Some(settings_adapter) = self.settings_adapter.clone() else {
			error!("FATAL: No settings adapter configured");
			return Err(Error::ConfigError("no settings adapter configured".into()));
		};
		let Some(queue_adapter) = self.queue_adapter.clone() else {
			error!("FATAL: No queue adapter configured");
			return Err(Error::ConfigError("no queue adapter configured".into()));
		};
		self.table.check()?;

		let config = self.config.clone();
		let settings =
			Arc::new(SettingsService::new(settings_adapter, config.settings_cache_size));
		let resolver = Arc::new(ConfigResolver::new(
			tenant_adapter,
			settings.clone(),
			Arc::new(self.table.clone()),
		));
		let registry = Arc::new(JobRegistry::new(queue_adapter, config.clone()));
		let listener = Arc::new(ChangeListener::new(
			resolver.clone(),
			registry.clone(),
			settings.clone(),
			config.clone(),
		));
		let bus = EventBus::new(config.bus_buffer);
		listener.subscribe(&bus);

		info!(
			"Engine v{} ready, managing job types: {}",
			VERSION,
			self.table.job_types().collect::<Vec<_>>().join(", ")
		);
		Ok(Arc::new(EngineState { config, settings, resolver, registry, listener, bus }))
	}
}

impl Default for EngineBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl EngineState {
	/// Start delivering published events
	pub fn start(&self) {
		self.bus.start();
	}

	pub async fn publish(&self, event: DomainEvent) -> ClResult<()> {
		self.bus.publish(event).await
	}

	pub async fn resolve_cron_config(
		&self,
		tn_id: &TnId,
		job_type: &str,
		user_id: Option<&str>,
	) -> ClResult<TenantCronConfig> {
		self.resolver.resolve_cron_config(tn_id, job_type, user_id).await
	}

	pub async fn resolve_provider_config(
		&self,
		tn_id: &TnId,
		user_id: Option<&str>,
	) -> ClResult<ProviderConfig> {
		self.resolver.resolve_provider_config(tn_id, user_id).await
	}

	pub async fn upsert_cron_job(&self, config: &TenantCronConfig) -> ClResult<UpsertOutcome> {
		self.registry.upsert(config).await
	}

	pub async fn remove_cron_job(&self, config: &TenantCronConfig) -> ClResult<usize> {
		self.registry.remove(config).await
	}

	pub async fn get_tenant_jobs(&self, tn_id: &TnId) -> ClResult<Vec<RepeatableJob>> {
		self.registry.list_for_tenant(tn_id).await
	}

	pub async fn get_all_jobs(&self) -> ClResult<Vec<TenantJob>> {
		self.registry.list_all().await
	}

	pub async fn get_queue_stats(&self) -> ClResult<QueueStats> {
		self.registry.stats().await
	}

	pub async fn clear_tenant_jobs(&self, tn_id: &TnId) -> ClResult<usize> {
		self.registry.clear_tenant_jobs(tn_id).await
	}

	pub async fn trigger_tenant_job_update(
		&self,
		tn_id: &TnId,
		user_id: Option<&str>,
	) -> ClResult<Vec<UpsertOutcome>> {
		self.listener.trigger_tenant_job_update(tn_id, user_id).await
	}

	pub async fn get_tenant_sync_status(&self, tn_id: &TnId) -> ClResult<TenantSyncStatus> {
		self.listener.get_tenant_sync_status(tn_id).await
	}

	/// Write a setting and announce the change. Fails without writing if the
	/// engine is not started.
	pub async fn update_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		value: serde_json::Value,
		scope: SettingScope,
		user_id: Option<&str>,
		description: Option<&str>,
	) -> ClResult<Setting> {
		self.ensure_started()?;
		let setting = self.settings.set(tn_id, key, value, scope, user_id, description).await?;
		self.announce(tn_id, key, user_id).await?;
		Ok(setting)
	}

	pub async fn delete_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<bool> {
		self.ensure_started()?;
		let deleted = self.settings.delete(tn_id, key, scope, user_id).await?;
		if deleted {
			self.announce(tn_id, key, user_id).await?;
		}
		Ok(deleted)
	}

	pub async fn list_settings(
		&self,
		tn_id: &TnId,
		scope: Option<SettingScope>,
		user_id: Option<&str>,
	) -> ClResult<Vec<Setting>> {
		self.settings.list(tn_id, scope, user_id).await
	}

	fn ensure_started(&self) -> ClResult<()> {
		if self.bus.is_started() {
			Ok(())
		} else {
			Err(Error::Internal("engine is not started".into()))
		}
	}

	async fn announce(&self, tn_id: &TnId, key: &str, user_id: Option<&str>) -> ClResult<()> {
		self.bus
			.publish(DomainEvent::ConfigChanged(ConfigChangeEvent {
				tenant_id: tn_id.clone(),
				config_key: Some(key.into()),
				user_id: user_id.map(Into::into),
			}))
			.await
	}
}

// vim: ts=4
