//! Database schema initialization

use sqlx::SqlitePool;

/// Initialize the database schema with all required tables and indexes
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Tenants
	//*********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS tenants (
		tn_id text NOT NULL,
		timezone text NOT NULL DEFAULT 'UTC',
		plan_type text,
		region text,
		enabled integer NOT NULL DEFAULT 1,
		created_at integer DEFAULT (unixepoch()),
		PRIMARY KEY(tn_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Settings
	//**********
	// user_id is '' for tenant-scoped rows so the primary key stays unique
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS settings (
		tn_id text NOT NULL,
		key text NOT NULL,
		scope char(1) NOT NULL,
		user_id text NOT NULL DEFAULT '',
		value text,
		description text,
		updated_at integer DEFAULT (unixepoch()),
		PRIMARY KEY(tn_id, key, scope, user_id)
	)",
	)
	.execute(&mut *tx)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_settings_user ON settings(tn_id, user_id)")
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(())
}

// vim: ts=4
