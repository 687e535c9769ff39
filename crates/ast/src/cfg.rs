use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for [`crate::AstProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AstProviderCfg {
	/// Last-resort deadline for `WaitPolicy::WaitForCurrent`, in milliseconds.
	///
	/// Waiters are normally woken by `reconciled` or an active unit change;
	/// this only bounds the damage of a lost wakeup.
	pub wait_timeout_ms: u64,
	/// How often a blocked waiter re-checks its cancellation token, in milliseconds.
	pub cancel_poll_ms: u64,
}

/// Returns the default wait deadline (30 seconds).
fn default_wait_timeout_ms() -> u64 {
	30_000
}

fn default_cancel_poll_ms() -> u64 {
	50
}

impl Default for AstProviderCfg {
	fn default() -> Self {
		Self {
			wait_timeout_ms: default_wait_timeout_ms(),
			cancel_poll_ms: default_cancel_poll_ms(),
		}
	}
}

impl AstProviderCfg {
	/// Parses and validates a TOML table such as:
	///
	/// ```toml
	/// wait_timeout_ms = 30000
	/// cancel_poll_ms = 50
	/// ```
	pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
		let cfg: Self = toml::from_str(src)?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.wait_timeout_ms == 0 {
			return Err(ConfigError::Invalid {
				field: "wait_timeout_ms",
				reason: "must be greater than zero".to_string(),
			});
		}
		if self.cancel_poll_ms == 0 {
			return Err(ConfigError::Invalid {
				field: "cancel_poll_ms",
				reason: "must be greater than zero".to_string(),
			});
		}
		Ok(())
	}

	/// Replaces out-of-range values with their defaults.
	pub fn sanitized(self) -> Self {
		let defaults = Self::default();
		Self {
			wait_timeout_ms: if self.wait_timeout_ms == 0 { defaults.wait_timeout_ms } else { self.wait_timeout_ms },
			cancel_poll_ms: if self.cancel_poll_ms == 0 { defaults.cancel_poll_ms } else { self.cancel_poll_ms },
		}
	}

	pub fn wait_timeout(&self) -> Duration {
		Duration::from_millis(self.wait_timeout_ms)
	}

	/// Slice length of an interruptible wait. Never zero, never longer than the deadline.
	pub fn cancel_poll(&self) -> Duration {
		Duration::from_millis(self.cancel_poll_ms.clamp(1, self.wait_timeout_ms.max(1)))
	}
}
