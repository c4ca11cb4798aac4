//! Tenant directory. Read-only lookup of tenant records used by config resolution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
	pub id: TnId,
	/// IANA zone name, e.g. "America/Bogota"
	pub timezone: Box<str>,
	pub plan_type: Option<Box<str>>,
	pub region: Option<Box<str>>,
	pub is_enabled: bool,
}

#[async_trait]
pub trait TenantAdapter: Debug + Send + Sync {
	/// Reads a tenant record
	///
	/// Returns `Error::NotFound` if the tenant does not exist. Disabled tenants are
	/// returned as-is; callers decide what a disabled tenant means for them.
	async fn read_tenant(&self, tn_id: &TnId) -> ClResult<Tenant>;
}

// vim: ts=4
