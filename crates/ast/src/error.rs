//! Error types for tree requests and configuration.

use thiserror::Error;

use crate::engine::ParseError;

/// Why [`crate::AstProvider::get_tree`] produced no tree.
///
/// Callers only ever see `None`; the provider keeps the distinction for logs
/// and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeUnavailable {
	/// The unit is not the active unit and the policy only serves the active one.
	#[error("unit is not the active unit")]
	NotActive,
	/// The engine reported a failure.
	#[error("parse failed: {0}")]
	ParseFailed(String),
	/// The caller's cancellation token fired.
	#[error("request cancelled")]
	Cancelled,
	/// The bounded wait for an in-flight reconciliation elapsed.
	///
	/// Correct operation is always woken by `reconciled` or an active unit
	/// change; hitting this points at a lost wakeup upstream.
	#[error("timed out waiting for reconciliation")]
	WaitTimedOut,
	/// The provider was disposed.
	#[error("provider disposed")]
	Disposed,
}

impl From<ParseError> for TreeUnavailable {
	fn from(err: ParseError) -> Self {
		match err {
			ParseError::Cancelled => Self::Cancelled,
			ParseError::Failed(msg) => Self::ParseFailed(msg),
		}
	}
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A value parsed but is out of range.
	#[error("invalid value for '{field}': {reason}")]
	Invalid {
		/// The offending key.
		field: &'static str,
		/// What is wrong with it.
		reason: String,
	},
}
