//! Settings store tests

use fleetsched_meta_adapter_sqlite::MetaAdapterSqlite;
use fleetsched_types::error::Error;
use fleetsched_types::settings_adapter::{SettingScope, SettingsAdapter};
use fleetsched_types::types::TnId;
use serde_json::json;
use tempfile::TempDir;

async fn create_test_adapter() -> (MetaAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = MetaAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	(adapter, temp_dir)
}

#[tokio::test]
async fn test_upsert_and_read_setting() {
	let (adapter, _temp) = create_test_adapter().await;
	let tn = TnId::from("11111111-1111-1111-1111-111111111111");

	assert!(adapter.read_setting(&tn, "gps.sync", SettingScope::Tenant, None).await.unwrap().is_none());

	let created = adapter
		.upsert_setting(&tn, "gps.sync", json!({"cron": "0 */10 * * * *"}), SettingScope::Tenant, None, Some("faster sync"))
		.await
		.unwrap();
	assert_eq!(created.value, json!({"cron": "0 */10 * * * *"}));
	assert_eq!(created.description.as_deref(), Some("faster sync"));
	assert!(created.user_id.is_none());

	let read = adapter.read_setting(&tn, "gps.sync", SettingScope::Tenant, None).await.unwrap().unwrap();
	assert_eq!(read, created);
}

#[tokio::test]
async fn test_upsert_replaces_value_and_keeps_description() {
	let (adapter, _temp) = create_test_adapter().await;
	let tn = TnId::from("t1");

	adapter
		.upsert_setting(&tn, "gps.sync", json!({"cron": "0 0 * * * *"}), SettingScope::Tenant, None, Some("hourly"))
		.await
		.unwrap();
	let updated = adapter
		.upsert_setting(&tn, "gps.sync", json!({"enabled": false}), SettingScope::Tenant, None, None)
		.await
		.unwrap();

	assert_eq!(updated.value, json!({"enabled": false}));
	assert_eq!(updated.description.as_deref(), Some("hourly"));
	assert_eq!(adapter.list_settings(&tn, None, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_tenant_and_user_scopes_are_distinct() {
	let (adapter, _temp) = create_test_adapter().await;
	let tn = TnId::from("t1");

	adapter.upsert_setting(&tn, "gps.sync", json!("tenant"), SettingScope::Tenant, None, None).await.unwrap();
	adapter.upsert_setting(&tn, "gps.sync", json!("alice"), SettingScope::User, Some("alice"), None).await.unwrap();
	adapter.upsert_setting(&tn, "gps.sync", json!("bob"), SettingScope::User, Some("bob"), None).await.unwrap();
	adapter
		.upsert_setting(&TnId::from("t2"), "gps.sync", json!("other"), SettingScope::Tenant, None, None)
		.await
		.unwrap();

	let alice = adapter.read_setting(&tn, "gps.sync", SettingScope::User, Some("alice")).await.unwrap().unwrap();
	assert_eq!(alice.value, json!("alice"));
	assert_eq!(alice.user_id.as_deref(), Some("alice"));

	assert_eq!(adapter.list_settings(&tn, None, None).await.unwrap().len(), 3);
	assert_eq!(adapter.list_settings(&tn, Some(SettingScope::Tenant), None).await.unwrap().len(), 1);
	assert_eq!(adapter.list_settings(&tn, Some(SettingScope::User), Some("bob")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_scope_user_invariant_is_enforced() {
	let (adapter, _temp) = create_test_adapter().await;
	let tn = TnId::from("t1");

	let res = adapter.upsert_setting(&tn, "gps.sync", json!({}), SettingScope::User, None, None).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));
	let res = adapter.upsert_setting(&tn, "gps.sync", json!({}), SettingScope::Tenant, Some("u1"), None).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn test_delete_setting() {
	let (adapter, _temp) = create_test_adapter().await;
	let tn = TnId::from("t1");

	adapter.upsert_setting(&tn, "gps.provider", json!("wialon"), SettingScope::Tenant, None, None).await.unwrap();
	assert!(adapter.delete_setting(&tn, "gps.provider", SettingScope::Tenant, None).await.unwrap());
	assert!(!adapter.delete_setting(&tn, "gps.provider", SettingScope::Tenant, None).await.unwrap());
	assert!(adapter.read_setting(&tn, "gps.provider", SettingScope::Tenant, None).await.unwrap().is_none());
}

// vim: ts=4
