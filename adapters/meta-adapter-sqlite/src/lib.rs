//! SQLite tenant directory and settings store

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::path::Path;

use fleetsched_types::prelude::*;
use fleetsched_types::settings_adapter::{Setting, SettingScope, SettingsAdapter};
use fleetsched_types::tenant_adapter::{Tenant, TenantAdapter};

mod schema;
mod setting;
mod tenant;

fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

#[derive(Debug)]
pub struct MetaAdapterSqlite {
	db: SqlitePool,
}

impl MetaAdapterSqlite {
	/// Open (or create) `meta.db` inside `dir`
	pub async fn new(dir: impl AsRef<Path>) -> ClResult<Self> {
		tokio::fs::create_dir_all(dir.as_ref()).await.map_err(|err| {
			error!("Cannot create database directory {}: {}", dir.as_ref().display(), err);
			Error::DbError
		})?;

		let opts = sqlite::SqliteConnectOptions::new()
			.filename(dir.as_ref().join("meta.db"))
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(inspect)
			.map_err(|_| Error::DbError)?;

		schema::init_db(&db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;

		Ok(Self { db })
	}

	pub async fn create_tenant(&self, tenant: &Tenant) -> ClResult<()> {
		tenant::upsert(&self.db, tenant).await
	}

	pub async fn set_tenant_enabled(&self, tn_id: &TnId, is_enabled: bool) -> ClResult<bool> {
		tenant::set_enabled(&self.db, tn_id, is_enabled).await
	}

	pub async fn list_tenant_ids(&self, enabled_only: bool) -> ClResult<Vec<TnId>> {
		tenant::list_ids(&self.db, enabled_only).await
	}
}

#[async_trait]
impl TenantAdapter for MetaAdapterSqlite {
	async fn read_tenant(&self, tn_id: &TnId) -> ClResult<Tenant> {
		tenant::read(&self.db, tn_id).await
	}
}

#[async_trait]
impl SettingsAdapter for MetaAdapterSqlite {
	async fn read_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<Option<Setting>> {
		setting::read(&self.db, tn_id, key, scope, user_id).await
	}

	async fn upsert_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		value: serde_json::Value,
		scope: SettingScope,
		user_id: Option<&str>,
		description: Option<&str>,
	) -> ClResult<Setting> {
		setting::upsert(&self.db, tn_id, key, &value, scope, user_id, description).await
	}

	async fn delete_setting(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<bool> {
		setting::delete(&self.db, tn_id, key, scope, user_id).await
	}

	async fn list_settings(
		&self,
		tn_id: &TnId,
		scope: Option<SettingScope>,
		user_id: Option<&str>,
	) -> ClResult<Vec<Setting>> {
		setting::list(&self.db, tn_id, scope, user_id).await
	}
}

// vim: ts=4
