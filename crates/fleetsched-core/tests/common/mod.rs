#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fleetsched_core::config::EngineConfig;
use fleetsched_core::memory::{InMemoryQueue, InMemorySettingsStore, InMemoryTenantDirectory};
use fleetsched_core::{Engine, EngineBuilder};
use fleetsched_types::tenant_adapter::Tenant;
use fleetsched_types::types::TnId;

pub struct Harness {
	pub engine: Engine,
	pub queue: Arc<InMemoryQueue>,
	pub tenants: Arc<InMemoryTenantDirectory>,
	pub store: Arc<InMemorySettingsStore>,
}

pub fn init_logging() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn harness() -> Harness {
	harness_with(EngineConfig::default(), InMemoryQueue::new())
}

pub fn harness_with(config: EngineConfig, queue: InMemoryQueue) -> Harness {
	init_logging();
	let queue = Arc::new(queue);
	let tenants = Arc::new(InMemoryTenantDirectory::new());
	let store = Arc::new(InMemorySettingsStore::new());

	let engine = EngineBuilder::new()
		.config(config)
		.tenant_adapter(tenants.clone())
		.settings_adapter(store.clone())
		.queue_adapter(queue.clone())
		.build()
		.unwrap();

	Harness { engine, queue, tenants, store }
}

pub fn tenant(id: &str, timezone: &str, plan: Option<&str>) -> Tenant {
	Tenant {
		id: TnId::from(id),
		timezone: timezone.into(),
		plan_type: plan.map(Into::into),
		region: None,
		is_enabled: true,
	}
}

/// Poll `cond` until it holds or two seconds pass
pub async fn wait_for(cond: impl Fn() -> bool) -> bool {
	for _ in 0..100 {
		if cond() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	cond()
}

// vim: ts=4
