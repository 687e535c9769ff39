use std::time::Duration;

use arbor_ast::ConfigError;
use serde::{Deserialize, Serialize};

/// Tunables for [`crate::Reconciler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerCfg {
	/// Quiet period after the last edit before a parse starts, in milliseconds.
	/// Zero parses on the next scheduler tick.
	pub debounce_ms: u64,
}

impl Default for ReconcilerCfg {
	fn default() -> Self {
		Self { debounce_ms: 100 }
	}
}

impl ReconcilerCfg {
	pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(src)?)
	}

	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}
}
