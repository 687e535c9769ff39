//! Background reconciler for [`arbor_ast::AstProvider`].
//!
//! Turns a stream of edit notifications into debounced parses on tokio's
//! blocking pool and reports each result back through the provider's
//! `about_to_reconcile` / `reconciled` protocol.

mod cfg;
mod error;
mod reconciler;

pub use cfg::ReconcilerCfg;
pub use error::ReconcilerError;
pub use reconciler::Reconciler;
