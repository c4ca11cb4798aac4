//! Domain events driving reactive job synchronization.
//!
//! Events travel on named topics. On the wire they are wrapped in an
//! [`EventEnvelope`] (`{id, topic, data}`) with camelCase JSON payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::prelude::*;

pub const TOPIC_CONFIG_CHANGED: &str = "tenant.config.changed";
pub const TOPIC_STATUS_CHANGED: &str = "tenant.status.changed";
pub const TOPIC_BULK_SYNC: &str = "tenant.bulk.sync";

pub const TOPICS: [&str; 3] = [TOPIC_CONFIG_CHANGED, TOPIC_STATUS_CHANGED, TOPIC_BULK_SYNC];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChangeEvent {
	pub tenant_id: TnId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub config_key: Option<Box<str>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<Box<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
	pub tenant_id: TnId,
	pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSyncEvent {
	/// `None` means "all tenants", which is not supported
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tenant_ids: Option<Vec<TnId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
	ConfigChanged(ConfigChangeEvent),
	StatusChanged(StatusChangeEvent),
	BulkSync(BulkSyncEvent),
}

impl DomainEvent {
	pub fn topic(&self) -> &'static str {
		match self {
			DomainEvent::ConfigChanged(_) => TOPIC_CONFIG_CHANGED,
			DomainEvent::StatusChanged(_) => TOPIC_STATUS_CHANGED,
			DomainEvent::BulkSync(_) => TOPIC_BULK_SYNC,
		}
	}

	/// Tenant the event is about, if it concerns a single tenant
	pub fn tenant(&self) -> Option<&TnId> {
		match self {
			DomainEvent::ConfigChanged(ev) => Some(&ev.tenant_id),
			DomainEvent::StatusChanged(ev) => Some(&ev.tenant_id),
			DomainEvent::BulkSync(_) => None,
		}
	}

	/// Decode an event payload received on `topic`
	pub fn decode(topic: &str, data: Value) -> ClResult<Self> {
		match topic {
			TOPIC_CONFIG_CHANGED => Ok(DomainEvent::ConfigChanged(serde_json::from_value(data)?)),
			TOPIC_STATUS_CHANGED => Ok(DomainEvent::StatusChanged(serde_json::from_value(data)?)),
			TOPIC_BULK_SYNC => Ok(DomainEvent::BulkSync(serde_json::from_value(data)?)),
			_ => Err(Error::ValidationError(format!("unknown event topic: {}", topic))),
		}
	}

	pub fn data(&self) -> ClResult<Value> {
		let data = match self {
			DomainEvent::ConfigChanged(ev) => serde_json::to_value(ev)?,
			DomainEvent::StatusChanged(ev) => serde_json::to_value(ev)?,
			DomainEvent::BulkSync(ev) => serde_json::to_value(ev)?,
		};
		Ok(data)
	}
}

/// Wire representation of a domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
	pub id: String,
	pub topic: String,
	pub data: Value,
}

impl EventEnvelope {
	pub fn wrap(event: &DomainEvent) -> ClResult<Self> {
		Ok(Self { id: Uuid::new_v4().to_string(), topic: event.topic().to_string(), data: event.data()? })
	}

	pub fn into_event(self) -> ClResult<DomainEvent> {
		DomainEvent::decode(&self.topic, self.data)
	}
}


// vim: ts=4
