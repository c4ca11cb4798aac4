//! Tenant directory

use sqlx::{Row, SqlitePool};

use fleetsched_types::prelude::*;
use fleetsched_types::tenant_adapter::Tenant;

use crate::inspect;

pub(crate) async fn read(db: &SqlitePool, tn_id: &TnId) -> ClResult<Tenant> {
	let res = sqlx::query("SELECT timezone, plan_type, region, enabled FROM tenants WHERE tn_id = ?")
		.bind(tn_id.as_str())
		.fetch_one(db)
		.await;

	let row = match res {
		Ok(row) => row,
		Err(sqlx::Error::RowNotFound) => return Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			return Err(Error::DbError);
		}
	};

	let timezone: String = row.try_get("timezone").inspect_err(inspect).map_err(|_| Error::DbError)?;
	let plan_type: Option<String> =
		row.try_get("plan_type").inspect_err(inspect).map_err(|_| Error::DbError)?;
	let region: Option<String> = row.try_get("region").inspect_err(inspect).map_err(|_| Error::DbError)?;
	let is_enabled: bool = row.try_get("enabled").inspect_err(inspect).map_err(|_| Error::DbError)?;

	Ok(Tenant {
		id: tn_id.clone(),
		timezone: timezone.into(),
		plan_type: plan_type.map(Into::into),
		region: region.map(Into::into),
		is_enabled,
	})
}

/// Create or replace a tenant record
pub(crate) async fn upsert(db: &SqlitePool, tenant: &Tenant) -> ClResult<()> {
	sqlx::query(
		"INSERT INTO tenants (tn_id, timezone, plan_type, region, enabled) VALUES (?, ?, ?, ?, ?)
		ON CONFLICT(tn_id) DO UPDATE SET
			timezone = excluded.timezone,
			plan_type = excluded.plan_type,
			region = excluded.region,
			enabled = excluded.enabled",
	)
	.bind(tenant.id.as_str())
	.bind(&*tenant.timezone)
	.bind(tenant.plan_type.as_deref())
	.bind(tenant.region.as_deref())
	.bind(tenant.is_enabled)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(())
}

/// Returns false if the tenant does not exist
pub(crate) async fn set_enabled(db: &SqlitePool, tn_id: &TnId, is_enabled: bool) -> ClResult<bool> {
	let res = sqlx::query("UPDATE tenants SET enabled = ? WHERE tn_id = ?")
		.bind(is_enabled)
		.bind(tn_id.as_str())
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected() > 0)
}

pub(crate) async fn list_ids(db: &SqlitePool, enabled_only: bool) -> ClResult<Vec<TnId>> {
	let rows = sqlx::query("SELECT tn_id FROM tenants WHERE enabled = 1 OR ? = 0 ORDER BY tn_id")
		.bind(enabled_only)
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	rows.iter()
		.map(|row| row.try_get::<String, _>("tn_id").map(TnId::from))
		.collect::<Result<Vec<_>, _>>()
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)
}

// vim: ts=4
