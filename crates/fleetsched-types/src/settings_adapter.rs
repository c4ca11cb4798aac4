//! Settings store. Tenant-scoped, hierarchically keyed override records.
//!
//! Keys are dotted namespaces ("gps.sync", "gps.provider"). A record is unique on
//! `(tn_id, key, scope, user_id)`, and `user_id` is present iff the scope is `User`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingScope {
	#[serde(rename = "tenant")]
	Tenant,
	#[serde(rename = "user")]
	User,
}

impl SettingScope {
	/// Enforce the scope/user invariant
	pub fn check_user(self, user_id: Option<&str>) -> ClResult<()> {
		match (self, user_id) {
			(SettingScope::Tenant, None) => Ok(()),
			(SettingScope::User, Some(user_id)) if !user_id.is_empty() => Ok(()),
			(SettingScope::Tenant, Some(_)) => Err(Error::ValidationError(
				"tenant-scoped settings must not carry a user id".into(),
			)),
			(SettingScope::User, _) => {
				Err(Error::ValidationError("user-scoped settings require a user id".into()))
			}
		}
	}

	pub fn as_char(self) -> char {
		match self {
			SettingScope::Tenant => 'T',
			SettingScope::User => 'U',
		}
	}

	pub fn from_char(c: char) -> ClResult<Self> {
		match c {
			'T' => Ok(SettingScope::Tenant),
			'U' => Ok(SettingScope::User),
			_ => Err(Error::Parse),
		}
	}
}

/// One layered override record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
	pub tn_id: TnId,
	pub key: Box<str>,
	/// Structured value, normally a JSON object
	pub value: serde_json::Value,
	pub scope: SettingScope,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<Box<str>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<Box<str>>,
	pub updated_at: Timestamp,
}

#[async_trait]
pub trait SettingsAdapter: Debug + Send + Sync {
	async fn read_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<Option<Setting>>;

	/// Create or replace a setting, returns the stored record
	async fn upsert_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		value: serde_json::Value,
		scope: SettingScope,
		user_id: Option<&str>,
		description: Option<&str>,
	) -> ClResult<Setting>;

	/// Returns whether a record was deleted
	async fn delete_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<bool>;

	async fn list_settings(
		&self,
		tn_id: &TnId,
		scope: Option<SettingScope>,
		user_id: Option<&str>,
	) -> ClResult<Vec<Setting>>;
}


// vim: ts=4
