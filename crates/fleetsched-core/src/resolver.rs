//! Config resolution
//!
//! The effective configuration of a tenant is the shallow merge of, in order:
//! job type defaults, the plan tier override, the tenant's own timezone, the
//! tenant-scoped setting and finally the user-scoped setting. Later layers only
//! replace the fields they define.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use fleetsched_types::context::TenantContext;
use fleetsched_types::settings_adapter::SettingScope;
use fleetsched_types::tenant_adapter::TenantAdapter;

use crate::config::{PROVIDER_SETTING_KEY, ScheduleTable};
use crate::prelude::*;
use crate::registry;
use crate::schedule::{self, CronSchedule};
use crate::settings::SettingsService;

/// One partial layer of a cron configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronConfigPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cron: Option<Box<str>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timezone: Option<Box<str>>,
	#[serde(alias = "enabled", skip_serializing_if = "Option::is_none")]
	pub is_enabled: Option<bool>,
}

impl CronConfigPatch {
	/// Decode a settings value. A bare string is taken as a cron expression.
	pub fn from_value(value: &Value) -> ClResult<Self> {
		match value {
			Value::String(cron) => Ok(Self { cron: Some(cron.as_str().into()), ..Self::default() }),
			Value::Null => Ok(Self::default()),
			value => serde_json::from_value(value.clone()).map_err(|err| {
				Error::InvalidScheduleConfig(format!("malformed schedule override: {}", err))
			}),
		}
	}

	pub fn merge(&mut self, layer: &CronConfigPatch) {
		if let Some(cron) = &layer.cron {
			self.cron = Some(cron.clone());
		}
		if let Some(timezone) = &layer.timezone {
			self.timezone = Some(timezone.clone());
		}
		if let Some(is_enabled) = layer.is_enabled {
			self.is_enabled = Some(is_enabled);
		}
	}
}

/// Resolved, validated scheduling configuration of one job type of one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCronConfig {
	#[serde(rename = "tenantId")]
	pub tn_id: TnId,
	pub job_type: Box<str>,
	pub cron: Box<str>,
	pub timezone: Box<str>,
	pub is_enabled: bool,
}

impl TenantCronConfig {
	pub fn job_key(&self) -> String {
		registry::job_key(&self.job_type, &self.tn_id)
	}

	pub fn validate(&self) -> ClResult<CronSchedule> {
		schedule::validate(&self.cron, &self.timezone)
	}
}

/// One partial layer of a provider configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfigPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub provider: Option<Box<str>>,
	#[serde(alias = "enabled", skip_serializing_if = "Option::is_none")]
	pub is_enabled: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub options: Option<serde_json::Map<String, Value>>,
}

impl ProviderConfigPatch {
	/// Decode a settings value. A bare string is taken as a provider name.
	pub fn from_value(value: &Value) -> ClResult<Self> {
		match value {
			Value::String(provider) => {
				Ok(Self { provider: Some(provider.as_str().into()), ..Self::default() })
			}
			Value::Null => Ok(Self::default()),
			value => serde_json::from_value(value.clone()).map_err(|err| {
				Error::InvalidProviderConfig(format!("malformed provider override: {}", err))
			}),
		}
	}

	/// Shallow merge, `options` is replaced as a whole
	pub fn merge(&mut self, layer: &ProviderConfigPatch) {
		if let Some(provider) = &layer.provider {
			self.provider = Some(provider.clone());
		}
		if let Some(is_enabled) = layer.is_enabled {
			self.is_enabled = Some(is_enabled);
		}
		if let Some(options) = &layer.options {
			self.options = Some(options.clone());
		}
	}
}

/// Resolved GPS provider configuration of a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
	#[serde(rename = "tenantId")]
	pub tn_id: TnId,
	pub provider: Box<str>,
	pub is_enabled: bool,
	pub options: serde_json::Map<String, Value>,
}

/// Computes effective configurations from the tenant record, the schedule
/// table and the settings store. Never mutates anything.
#[derive(Debug)]
pub struct ConfigResolver {
	tenants: Arc<dyn TenantAdapter>,
	settings: Arc<SettingsService>,
	table: Arc<ScheduleTable>,
}

impl ConfigResolver {
	pub fn new(
		tenants: Arc<dyn TenantAdapter>,
		settings: Arc<SettingsService>,
		table: Arc<ScheduleTable>,
	) -> Self {
		Self { tenants, settings, table }
	}

	pub fn table(&self) -> &ScheduleTable {
		&self.table
	}

	/// Context of an existing, enabled tenant
	pub async fn tenant_context(&self, tn_id: &TnId) -> ClResult<TenantContext> {
		let tenant = match self.tenants.read_tenant(tn_id).await {
			Ok(tenant) => tenant,
			Err(Error::NotFound) => return Err(Error::TenantNotFound(tn_id.as_str().into())),
			Err(err) => return Err(err),
		};
		if !tenant.is_enabled {
			debug!("Tenant {} is disabled", tn_id);
			return Err(Error::TenantNotFound(tn_id.as_str().into()));
		}
		Ok(TenantContext::from(&tenant))
	}

	pub async fn resolve_cron_config(
		&self,
		tn_id: &TnId,
		job_type: &str,
		user_id: Option<&str>,
	) -> ClResult<TenantCronConfig> {
		let ctx = self.tenant_context(tn_id).await?;
		self.resolve_with(&ctx, job_type, user_id).await
	}

	/// Resolve for an already looked-up tenant
	pub async fn resolve_with(
		&self,
		ctx: &TenantContext,
		job_type: &str,
		user_id: Option<&str>,
	) -> ClResult<TenantCronConfig> {
		let mut merged = self.table.job_defaults(job_type).cloned().ok_or_else(|| {
			Error::InvalidScheduleConfig(format!("no defaults for job type '{}'", job_type))
		})?;

		if let Some(patch) = ctx
			.plan_type
			.as_deref()
			.and_then(|plan| self.table.plan(plan))
			.and_then(|plan| plan.jobs.get(job_type))
		{
			merged.merge(patch);
		}

		if !ctx.timezone.is_empty() {
			merged.timezone = Some(ctx.timezone.clone());
		}

		if let Some(value) =
			self.settings.get_value(&ctx.tn_id, job_type, SettingScope::Tenant, None).await?
		{
			merged.merge(&CronConfigPatch::from_value(&value)?);
		}

		if let Some(user_id) = user_id
			&& let Some(value) = self
				.settings
				.get_value(&ctx.tn_id, job_type, SettingScope::User, Some(user_id))
				.await?
		{
			merged.merge(&CronConfigPatch::from_value(&value)?);
		}

		let config = TenantCronConfig {
			tn_id: ctx.tn_id.clone(),
			job_type: job_type.into(),
			cron: merged.cron.ok_or_else(|| {
				Error::InvalidScheduleConfig(format!("no cron expression for '{}'", job_type))
			})?,
			timezone: merged.timezone.unwrap_or_else(|| "UTC".into()),
			is_enabled: merged.is_enabled.unwrap_or(true),
		};
		config.validate()?;

		debug!(
			"Resolved {} for tenant {}: '{}' in {} (enabled: {})",
			job_type, ctx.tn_id, config.cron, config.timezone, config.is_enabled
		);
		Ok(config)
	}

	pub async fn resolve_provider_config(
		&self,
		tn_id: &TnId,
		user_id: Option<&str>,
	) -> ClResult<ProviderConfig> {
		let ctx = self.tenant_context(tn_id).await?;
		self.resolve_provider_with(&ctx, user_id).await
	}

	pub async fn resolve_provider_with(
		&self,
		ctx: &TenantContext,
		user_id: Option<&str>,
	) -> ClResult<ProviderConfig> {
		let mut merged = self.table.provider_defaults.clone();

		if let Some(patch) = ctx
			.plan_type
			.as_deref()
			.and_then(|plan| self.table.plan(plan))
			.and_then(|plan| plan.provider.as_ref())
		{
			merged.merge(patch);
		}

		if let Some(value) = self
			.settings
			.get_value(&ctx.tn_id, PROVIDER_SETTING_KEY, SettingScope::Tenant, None)
			.await?
		{
			merged.merge(&ProviderConfigPatch::from_value(&value)?);
		}

		if let Some(user_id) = user_id
			&& let Some(value) = self
				.settings
				.get_value(&ctx.tn_id, PROVIDER_SETTING_KEY, SettingScope::User, Some(user_id))
				.await?
		{
			merged.merge(&ProviderConfigPatch::from_value(&value)?);
		}

		let provider = merged.provider.unwrap_or_default();
		if provider.trim().is_empty() {
			return Err(Error::InvalidProviderConfig("no provider configured".into()));
		}
		if !self.table.known_providers.is_empty()
			&& !self.table.known_providers.iter().any(|known| known.as_str() == &*provider)
		{
			return Err(Error::InvalidProviderConfig(format!("unknown provider '{}'", provider)));
		}
		if merged.is_enabled == Some(false) {
			return Err(Error::ProviderDisabled(provider));
		}

		Ok(ProviderConfig {
			tn_id: ctx.tn_id.clone(),
			provider,
			is_enabled: true,
			options: merged.options.unwrap_or_default(),
		})
	}
}


// vim: ts=4
