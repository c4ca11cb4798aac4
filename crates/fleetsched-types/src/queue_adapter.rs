//! Work-queue backend. Repeatable (cron driven) jobs registered with an external queue.
//!
//! The backend has no uniqueness constraint on job ids: adding the same id twice
//! yields two live jobs, each with its own backend handle (`key`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::prelude::*;

/// A live scheduled job registered with the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatableJob {
	/// Logical job key
	pub id: Box<str>,
	/// Job name (the job type)
	pub name: Box<str>,
	/// Cron pattern
	pub pattern: Box<str>,
	pub timezone: Box<str>,
	/// Backend-assigned handle, required to delete the job
	pub key: Box<str>,
	pub next_run_time: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackoffKind {
	Fixed,
	Exponential,
}

/// Queue-level retry policy for individual runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
	pub attempts: u16,
	pub backoff: BackoffKind,
	pub delay_ms: u64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { attempts: 3, backoff: BackoffKind::Exponential, delay_ms: 2000 }
	}
}

impl RetryPolicy {
	/// Delay before the given retry attempt (1-based), in milliseconds
	pub fn delay_for(&self, attempt: u16) -> u64 {
		match self.backoff {
			BackoffKind::Fixed => self.delay_ms,
			BackoffKind::Exponential => {
				let shift = u32::from(attempt.saturating_sub(1)).min(32);
				self.delay_ms.saturating_mul(1u64 << shift)
			}
		}
	}
}

/// Bounded run history kept by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
	pub keep_completed: u32,
	pub keep_failed: u32,
}

impl Default for Retention {
	fn default() -> Self {
		Self { keep_completed: 100, keep_failed: 50 }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatableJobOptions {
	pub id: Box<str>,
	pub pattern: Box<str>,
	pub timezone: Box<str>,
	pub retry: RetryPolicy,
	pub retention: Retention,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
	pub waiting: u64,
	pub active: u64,
	pub completed: u64,
	pub failed: u64,
	pub delayed: u64,
}

#[async_trait]
pub trait QueueAdapter: Debug + Send + Sync {
	async fn add_repeatable_job(
		&self,
		name: &str,
		payload: serde_json::Value,
		opts: &RepeatableJobOptions,
	) -> ClResult<RepeatableJob>;

	async fn list_repeatable_jobs(&self) -> ClResult<Vec<RepeatableJob>>;

	/// Returns whether a job with this handle existed
	async fn remove_repeatable_by_key(&self, key: &str) -> ClResult<bool>;

	async fn job_counts(&self) -> ClResult<JobCounts>;
}


// vim: ts=4
