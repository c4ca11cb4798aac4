//! Settings service with caching in front of the settings store

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

use fleetsched_types::settings_adapter::{Setting, SettingScope, SettingsAdapter};

use crate::prelude::*;

type CacheKey = (TnId, Box<str>, SettingScope, Option<Box<str>>);

const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(100) {
	Some(n) => n,
	None => NonZeroUsize::MIN,
};

/// LRU cache for settings lookups (misses are cached too)
pub struct SettingsCache {
	cache: parking_lot::Mutex<LruCache<CacheKey, Option<Setting>>>,
}

impl SettingsCache {
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CACHE_SIZE);
		Self { cache: parking_lot::Mutex::new(LruCache::new(capacity)) }
	}

	fn key(tn_id: &TnId, key: &str, scope: SettingScope, user_id: Option<&str>) -> CacheKey {
		(tn_id.clone(), key.into(), scope, user_id.map(Into::into))
	}

	pub fn get(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> Option<Option<Setting>> {
		self.cache.lock().get(&Self::key(tn_id, key, scope, user_id)).cloned()
	}

	pub fn put(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
		value: Option<Setting>,
	) {
		self.cache.lock().put(Self::key(tn_id, key, scope, user_id), value);
	}

	/// Drop every cached entry of a tenant, returns the number removed
	pub fn invalidate_tenant(&self, tn_id: &TnId) -> usize {
		let mut cache = self.cache.lock();
		let stale: Vec<CacheKey> =
			cache.iter().filter(|(k, _)| &k.0 == tn_id).map(|(k, _)| k.clone()).collect();
		for key in &stale {
			cache.pop(key);
		}
		stale.len()
	}

	pub fn len(&self) -> usize {
		self.cache.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.cache.lock().is_empty()
	}
}

/// Settings service - cached access to tenant and user scoped settings
pub struct SettingsService {
	cache: SettingsCache,
	store: Arc<dyn SettingsAdapter>,
}

impl std::fmt::Debug for SettingsService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SettingsService").field("cached", &self.cache.len()).finish()
	}
}

impl SettingsService {
	pub fn new(store: Arc<dyn SettingsAdapter>, cache_size: usize) -> Self {
		Self { cache: SettingsCache::new(cache_size), store }
	}

	/// Read a setting, `None` if it is not configured
	pub async fn get(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<Option<Setting>> {
		scope.check_user(user_id)?;

		if let Some(cached) = self.cache.get(tn_id, key, scope, user_id) {
			debug!("Setting cache hit: {}.{}", tn_id, key);
			return Ok(cached);
		}

		let setting = self.store.read_setting(tn_id, key, scope, user_id).await?;
		self.cache.put(tn_id, key, scope, user_id, setting.clone());
		Ok(setting)
	}

	/// Value of a setting, `None` if it is not configured
	pub async fn get_value(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<Option<serde_json::Value>> {
		Ok(self.get(tn_id, key, scope, user_id).await?.map(|s| s.value))
	}

	/// Create or replace a setting
	pub async fn set(
		&self,
		tn_id: &TnId,
		key: &str,
		value: serde_json::Value,
		scope: SettingScope,
		user_id: Option<&str>,
		description: Option<&str>,
	) -> ClResult<Setting> {
		scope.check_user(user_id)?;
		if key.is_empty() {
			return Err(Error::ValidationError("setting key must not be empty".into()));
		}

		let setting =
			self.store.upsert_setting(tn_id, key, value, scope, user_id, description).await?;
		self.cache.invalidate_tenant(tn_id);

		info!("Setting '{}' updated for tenant {} ({:?})", key, tn_id, scope);
		Ok(setting)
	}

	pub async fn delete(
		&self,
		tn_id: &TnId,
		key: &str,
		scope: SettingScope,
		user_id: Option<&str>,
	) -> ClResult<bool> {
		scope.check_user(user_id)?;
		let deleted = self.store.delete_setting(tn_id, key, scope, user_id).await?;
		self.cache.invalidate_tenant(tn_id);
		if deleted {
			info!("Setting '{}' deleted for tenant {} ({:?})", key, tn_id, scope);
		}
		Ok(deleted)
	}

	pub async fn list(
		&self,
		tn_id: &TnId,
		scope: Option<SettingScope>,
		user_id: Option<&str>,
	) -> ClResult<Vec<Setting>> {
		self.store.list_settings(tn_id, scope, user_id).await
	}

	/// Forget cached values of a tenant (after external changes)
	pub fn invalidate_tenant(&self, tn_id: &TnId) {
		let removed = self.cache.invalidate_tenant(tn_id);
		debug!("Invalidated {} cached settings of tenant {}", removed, tn_id);
	}
}


// vim: ts=4
