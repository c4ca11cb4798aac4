//! Error taxonomy shared by the engine and all adapters.

use std::fmt;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Referenced tenant does not exist or is disabled
	TenantNotFound(Box<str>),
	/// Cron, timezone or interval validation failed
	InvalidScheduleConfig(String),
	/// Provider configuration is malformed
	InvalidProviderConfig(String),
	/// The resolved provider is switched off
	ProviderDisabled(Box<str>),
	/// Work-queue backend or store I/O failure (including timeouts)
	BackendUnavailable(String),

	NotFound,
	DbError,
	ValidationError(String),
	ConfigError(String),
	Parse,
	Internal(String),
}

impl Error {
	/// True for I/O failures of an external collaborator.
	pub fn is_backend(&self) -> bool {
		matches!(self, Error::BackendUnavailable(_) | Error::DbError)
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::TenantNotFound(tn) => write!(f, "tenant not found: {}", tn),
			Error::InvalidScheduleConfig(reason) => {
				write!(f, "invalid schedule config: {}", reason)
			}
			Error::InvalidProviderConfig(reason) => {
				write!(f, "invalid provider config: {}", reason)
			}
			Error::ProviderDisabled(provider) => write!(f, "provider '{}' is disabled", provider),
			Error::BackendUnavailable(reason) => write!(f, "backend unavailable: {}", reason),
			Error::NotFound => write!(f, "not found"),
			Error::DbError => write!(f, "database error"),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::Parse => write!(f, "parse error"),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::debug!("JSON error: {}", err);
		Error::Parse
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_backend_classification() {
		assert!(Error::BackendUnavailable("redis down".into()).is_backend());
		assert!(Error::DbError.is_backend());
		assert!(!Error::InvalidScheduleConfig("bad cron".into()).is_backend());
		assert!(!Error::TenantNotFound("t1".into()).is_backend());
	}

	#[test]
	fn test_display_carries_reason() {
		let err = Error::InvalidScheduleConfig("interval too short: 30s".into());
		assert_eq!(err.to_string(), "invalid schedule config: interval too short: 30s");
	}
}

// vim: ts=4
