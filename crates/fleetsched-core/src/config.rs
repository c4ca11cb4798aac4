//! Engine configuration and the schedule table (defaults and plan tiers).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use fleetsched_types::queue_adapter::{Retention, RetryPolicy};

use crate::prelude::*;
use crate::resolver::{CronConfigPatch, ProviderConfigPatch};
use crate::schedule;

/// Settings key holding provider overrides
pub const PROVIDER_SETTING_KEY: &str = "gps.provider";

/// Runtime knobs of the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Upper bound for every work-queue backend call
	pub backend_timeout: Duration,
	/// Hold an in-process lock per logical job key during upsert/remove
	pub serialize_per_key: bool,
	/// Config keys (substring match) that can affect scheduling
	pub relevant_keys: Vec<Box<str>>,
	pub retry: RetryPolicy,
	pub retention: Retention,
	pub settings_cache_size: usize,
	/// Capacity of the event bus channel, 0 for unbounded
	pub bus_buffer: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			backend_timeout: Duration::from_secs(10),
			serialize_per_key: true,
			relevant_keys: ["gps.sync", "cron", "schedule", "timezone", PROVIDER_SETTING_KEY]
				.into_iter()
				.map(Into::into)
				.collect(),
			retry: RetryPolicy::default(),
			retention: Retention::default(),
			settings_cache_size: 1000,
			bus_buffer: 256,
		}
	}
}

impl EngineConfig {
	/// Whether a changed config key can influence job scheduling
	pub fn is_relevant_key(&self, key: &str) -> bool {
		self.relevant_keys.iter().any(|k| key.contains(k.as_ref()))
	}
}

/// Overrides contributed by one plan tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanOverrides {
	/// Per job type
	pub jobs: HashMap<String, CronConfigPatch>,
	pub provider: Option<ProviderConfigPatch>,
}

/// Hard-coded defaults and plan tier overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTable {
	/// Default layer per job type; every job type listed here is managed
	pub defaults: BTreeMap<String, CronConfigPatch>,
	#[serde(default)]
	pub plans: HashMap<String, PlanOverrides>,
	#[serde(default)]
	pub provider_defaults: ProviderConfigPatch,
	/// Empty means any provider name is accepted
	#[serde(default)]
	pub known_providers: Vec<String>,
}

impl ScheduleTable {
	pub fn builtin() -> Self {
		let cron = |expr: &str| CronConfigPatch { cron: Some(expr.into()), ..Default::default() };
		let plan = |expr: &str| PlanOverrides {
			jobs: HashMap::from([("gps.sync".to_string(), cron(expr))]),
			provider: None,
		};

		Self {
			defaults: BTreeMap::from([(
				"gps.sync".to_string(),
				CronConfigPatch {
					cron: Some("0 */30 * * * *".into()),
					timezone: Some("UTC".into()),
					is_enabled: Some(true),
				},
			)]),
			plans: HashMap::from([
				("basic".to_string(), plan("0 0 * * * *")),
				("premium".to_string(), plan("0 */15 * * * *")),
				("enterprise".to_string(), plan("0 */5 * * * *")),
			]),
			provider_defaults: ProviderConfigPatch {
				provider: Some("traccar".into()),
				is_enabled: Some(true),
				options: None,
			},
			known_providers: ["traccar", "wialon", "gpsgate", "samsara"]
				.into_iter()
				.map(String::from)
				.collect(),
		}
	}

	/// Managed job types, in stable order
	pub fn job_types(&self) -> impl Iterator<Item = &str> {
		self.defaults.keys().map(String::as_str)
	}

	pub fn job_defaults(&self, job_type: &str) -> Option<&CronConfigPatch> {
		self.defaults.get(job_type)
	}

	/// Plan lookup, case-insensitive
	pub fn plan(&self, plan_type: &str) -> Option<&PlanOverrides> {
		self.plans.get(plan_type).or_else(|| self.plans.get(&plan_type.to_ascii_lowercase()))
	}

	/// Check that every default has a cron expression and all crons parse
	pub fn check(&self) -> ClResult<()> {
		if self.defaults.is_empty() {
			return Err(Error::ConfigError("schedule table defines no job types".into()));
		}
		for (job_type, patch) in &self.defaults {
			let cron = patch.cron.as_deref().ok_or_else(|| {
				Error::ConfigError(format!("job type '{}' has no default cron", job_type))
			})?;
			schedule::CronSchedule::parse(cron, patch.timezone.as_deref().unwrap_or("UTC"))
				.map_err(|e| Error::ConfigError(format!("job type '{}': {}", job_type, e)))?;
		}
		for (plan_type, overrides) in &self.plans {
			for (job_type, patch) in &overrides.jobs {
				if let Some(cron) = patch.cron.as_deref() {
					schedule::CronSchedule::parse(cron, "UTC").map_err(|e| {
						Error::ConfigError(format!("plan '{}' job '{}': {}", plan_type, job_type, e))
					})?;
				}
			}
		}
		Ok(())
	}
}

impl Default for ScheduleTable {
	fn default() -> Self {
		Self::builtin()
	}
}


// vim: ts=4
