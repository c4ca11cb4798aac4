//! Daemon configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

use fleetsched_core::config::{EngineConfig, ScheduleTable};
use fleetsched_types::prelude::*;

/// Tenants to resync at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupSync {
	None,
	/// Every enabled tenant in the directory
	All,
	Tenants(Vec<TnId>),
}

/// Work-queue backend the engine registers jobs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
	/// Durable queue in `queue.db` next to the metadata database
	Sqlite,
	/// Process-local and never executed. For trying out schedules only.
	Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub db_dir: PathBuf,
	pub backend_timeout: Duration,
	pub schedule_file: Option<PathBuf>,
	pub serialize_per_key: bool,
	pub startup_sync: StartupSync,
	pub stats_interval: Duration,
	pub queue_backend: QueueBackend,
	pub queue_max_idle: Duration,
}

fn parse_bool(name: &str, value: &str) -> ClResult<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(Error::ConfigError(format!("{}: expected a boolean, got '{}'", name, value))),
	}
}

fn parse_secs(name: &str, value: &str) -> ClResult<Duration> {
	value
		.trim()
		.parse::<u64>()
		.ok()
		.filter(|secs| *secs > 0)
		.map(Duration::from_secs)
		.ok_or_else(|| Error::ConfigError(format!("{}: expected seconds, got '{}'", name, value)))
}

fn parse_queue(value: &str) -> ClResult<QueueBackend> {
	match value.trim().to_ascii_lowercase().as_str() {
		"sqlite" => Ok(QueueBackend::Sqlite),
		"memory" => Ok(QueueBackend::Memory),
		_ => Err(Error::ConfigError(format!(
			"FLEETSCHED_QUEUE: expected 'sqlite' or 'memory', got '{}'",
			value
		))),
	}
}

fn parse_sync(value: &str) -> StartupSync {
	match value.trim() {
		"" => StartupSync::None,
		"*" => StartupSync::All,
		list => StartupSync::Tenants(
			list.split(',').map(str::trim).filter(|id| !id.is_empty()).map(TnId::from).collect(),
		),
	}
}

impl Config {
	pub fn from_env() -> ClResult<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> ClResult<Self> {
		let defaults = EngineConfig::default();
		Ok(Config {
			db_dir: PathBuf::from(get("FLEETSCHED_DB_DIR").unwrap_or_else(|| "./data".into())),
			backend_timeout: match get("FLEETSCHED_BACKEND_TIMEOUT_SECS") {
				Some(value) => parse_secs("FLEETSCHED_BACKEND_TIMEOUT_SECS", &value)?,
				None => defaults.backend_timeout,
			},
			schedule_file: get("FLEETSCHED_SCHEDULE_FILE").filter(|p| !p.is_empty()).map(PathBuf::from),
			serialize_per_key: match get("FLEETSCHED_SERIALIZE_PER_KEY") {
				Some(value) => parse_bool("FLEETSCHED_SERIALIZE_PER_KEY", &value)?,
				None => defaults.serialize_per_key,
			},
			startup_sync: get("FLEETSCHED_SYNC_TENANTS").map_or(StartupSync::None, |v| parse_sync(&v)),
			stats_interval: match get("FLEETSCHED_STATS_INTERVAL_SECS") {
				Some(value) => parse_secs("FLEETSCHED_STATS_INTERVAL_SECS", &value)?,
				None => Duration::from_secs(300),
			},
			queue_backend: match get("FLEETSCHED_QUEUE") {
				Some(value) => parse_queue(&value)?,
				None => QueueBackend::Sqlite,
			},
			queue_max_idle: match get("FLEETSCHED_QUEUE_IDLE_SECS") {
				Some(value) => parse_secs("FLEETSCHED_QUEUE_IDLE_SECS", &value)?,
				None => Duration::from_secs(60),
			},
		})
	}

	pub fn engine_config(&self) -> EngineConfig {
		EngineConfig {
			backend_timeout: self.backend_timeout,
			serialize_per_key: self.serialize_per_key,
			..EngineConfig::default()
		}
	}

	/// The YAML schedule table if configured, the builtin one otherwise
	pub fn schedule_table(&self) -> ClResult<ScheduleTable> {
		let Some(path) = &self.schedule_file else {
			return Ok(ScheduleTable::builtin());
		};
		let text = std::fs::read_to_string(path).map_err(|err| {
			Error::ConfigError(format!("cannot read {}: {}", path.display(), err))
		})?;
		let table: ScheduleTable = serde_yaml::from_str(&text).map_err(|err| {
			Error::ConfigError(format!("invalid schedule file {}: {}", path.display(), err))
		})?;
		table.check()?;
		info!("Loaded schedule table from {}", path.display());
		Ok(table)
	}
}


// vim: ts=4
