//! Tenant context. Per unit-of-work tenant identity.
//!
//! The engine threads a `TenantContext` explicitly through resolve/upsert calls.
//! For code that cannot take it as a parameter (job handlers, log helpers), the
//! same value can be made ambient for the duration of one future with
//! [`TenantContext::scope`]. The ambient value is task-local: it is never visible
//! to other tasks and disappears when the scoped future completes.

use serde::{Deserialize, Serialize};

use crate::prelude::*;
use crate::tenant_adapter::Tenant;

tokio::task_local! {
	static CURRENT_TENANT: TenantContext;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
	pub tn_id: TnId,
	pub timezone: Box<str>,
	pub plan_type: Option<Box<str>>,
	pub region: Option<Box<str>>,
}

impl TenantContext {
	pub fn new(tn_id: TnId, timezone: impl Into<Box<str>>) -> Self {
		Self { tn_id, timezone: timezone.into(), plan_type: None, region: None }
	}

	pub fn with_plan(mut self, plan_type: impl Into<Box<str>>) -> Self {
		self.plan_type = Some(plan_type.into());
		self
	}

	/// Run `fut` with this context as the ambient tenant
	pub async fn scope<F>(self, fut: F) -> F::Output
	where
		F: Future,
	{
		CURRENT_TENANT.scope(self, fut).await
	}

	/// The ambient context of the current task, if one was set with `scope`
	pub fn current() -> Option<TenantContext> {
		CURRENT_TENANT.try_with(Clone::clone).ok()
	}
}

impl From<&Tenant> for TenantContext {
	fn from(tenant: &Tenant) -> Self {
		Self {
			tn_id: tenant.id.clone(),
			timezone: tenant.timezone.clone(),
			plan_type: tenant.plan_type.clone(),
			region: tenant.region.clone(),
		}
	}
}


// vim: ts=4
