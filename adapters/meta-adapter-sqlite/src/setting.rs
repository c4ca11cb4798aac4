//! Settings store
//!
//! Values are stored as JSON text. Tenant-scoped rows use an empty user id.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use fleetsched_types::prelude::*;
use fleetsched_types::settings_adapter::{Setting, SettingScope};

use crate::inspect;

fn scope_code(scope: SettingScope) -> String {
	scope.as_char().to_string()
}

fn row_to_setting(tn_id: &TnId, row: &SqliteRow) -> Result<Setting, sqlx::Error> {
	let key: String = row.try_get("key")?;
	let scope: String = row.try_get("scope")?;
	let user_id: String = row.try_get("user_id")?;
	let value: Option<String> = row.try_get("value")?;
	let description: Option<String> = row.try_get("description")?;
	let updated_at: i64 = row.try_get("updated_at")?;

	let scope = scope
		.chars()
		.next()
		.and_then(|c| SettingScope::from_char(c).ok())
		.ok_or_else(|| sqlx::Error::Decode(format!("invalid setting scope '{}'", scope).into()))?;

	let value = match value {
		Some(text) => serde_json::from_str(&text).map_err(|err| {
			sqlx::Error::Decode(format!("invalid JSON in setting '{}': {}", key, err).into())
		})?,
		None => serde_json::Value::Null,
	};

	Ok(Setting {
		tn_id: tn_id.clone(),
		value,
		key: key.into(),
		scope,
		user_id: if user_id.is_empty() { None } else { Some(user_id.into()) },
		description: description.map(Into::into),
		updated_at: Timestamp(updated_at),
	})
}

/// Read a single setting
pub(crate) async fn read(
	db: &SqlitePool,
	tn_id: &TnId,
	key: &str,
	scope: SettingScope,
	user_id: Option<&str>,
) -> ClResult<Option<Setting>> {
	let row = sqlx::query(
		"SELECT key, scope, user_id, value, description, updated_at FROM settings
		WHERE tn_id = ? AND key = ? AND scope = ? AND user_id = ?",
	)
	.bind(tn_id.as_str())
	.bind(key)
	.bind(scope_code(scope))
	.bind(user_id.unwrap_or_default())
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	row.map(|row| row_to_setting(tn_id, &row))
		.transpose()
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)
}

/// Update or create a setting
pub(crate) async fn upsert(
	db: &SqlitePool,
	tn_id: &TnId,
	key: &str,
	value: &serde_json::Value,
	scope: SettingScope,
	user_id: Option<&str>,
	description: Option<&str>,
) -> ClResult<Setting> {
	scope.check_user(user_id)?;

	let row = sqlx::query(
		"INSERT INTO settings (tn_id, key, scope, user_id, value, description, updated_at)
		VALUES (?, ?, ?, ?, ?, ?, unixepoch())
		ON CONFLICT(tn_id, key, scope, user_id) DO UPDATE SET
			value = excluded.value,
			description = coalesce(excluded.description, settings.description),
			updated_at = excluded.updated_at
		RETURNING key, scope, user_id, value, description, updated_at",
	)
	.bind(tn_id.as_str())
	.bind(key)
	.bind(scope_code(scope))
	.bind(user_id.unwrap_or_default())
	.bind(value.to_string())
	.bind(description)
	.fetch_one(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	row_to_setting(tn_id, &row).inspect_err(inspect).map_err(|_| Error::DbError)
}

pub(crate) async fn delete(
	db: &SqlitePool,
	tn_id: &TnId,
	key: &str,
	scope: SettingScope,
	user_id: Option<&str>,
) -> ClResult<bool> {
	let res = sqlx::query(
		"DELETE FROM settings WHERE tn_id = ? AND key = ? AND scope = ? AND user_id = ?",
	)
	.bind(tn_id.as_str())
	.bind(key)
	.bind(scope_code(scope))
	.bind(user_id.unwrap_or_default())
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected() > 0)
}

/// List settings of a tenant, optionally filtered by scope and user
pub(crate) async fn list(
	db: &SqlitePool,
	tn_id: &TnId,
	scope: Option<SettingScope>,
	user_id: Option<&str>,
) -> ClResult<Vec<Setting>> {
	let mut query = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
		"SELECT key, scope, user_id, value, description, updated_at FROM settings WHERE tn_id = ",
	);
	query.push_bind(tn_id.as_str());
	if let Some(scope) = scope {
		query.push(" AND scope = ").push_bind(scope_code(scope));
	}
	if let Some(user_id) = user_id {
		query.push(" AND user_id = ").push_bind(user_id);
	}
	query.push(" ORDER BY key, scope, user_id");

	let rows = query
		.build()
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	rows.iter()
		.map(|row| row_to_setting(tn_id, row))
		.collect::<Result<Vec<_>, _>>()
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)
}


// vim: ts=4
