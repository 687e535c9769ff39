//! Shared parse-tree cache for the active source unit.
//!
//! One [`AstProvider`] per editor association hands out a single up-to-date
//! tree for the active unit while a background reconciler recomputes it:
//!
//! - the reconciler brackets each parse with [`AstProvider::about_to_reconcile`]
//!   and [`AstProvider::reconciled`]
//! - consumers call [`AstProvider::get_tree`] with a [`WaitPolicy`]
//! - a generation counter discards completions from superseded cycles
//! - every failure is reported as `None`, never as a panic or error

mod cache;
mod cfg;
mod engine;
mod error;
mod metrics;
mod provider;
mod registry;
mod tracker;
mod types;

#[cfg(test)]
mod test_support;

pub use cfg::AstProviderCfg;
pub use engine::{ParseEngine, ParseError, TreeOf, parse_guarded};
pub use error::{ConfigError, TreeUnavailable};
pub use metrics::{AstEvent, AstMetrics, AstMetricsSnapshot, AstObserver};
pub use provider::AstProvider;
pub use types::{Generation, Tree, TreeOrigin, UnitHandle, WaitPolicy};
