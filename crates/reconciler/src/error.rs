use thiserror::Error;

/// Errors reported by [`crate::Reconciler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcilerError {
	/// The reconciler task has stopped.
	#[error("reconciler is closed")]
	Closed,
	/// The provider was disposed; no further cycles can start.
	#[error("tree provider disposed")]
	Disposed,
	/// No tokio runtime was current and the fallback runtime failed to start.
	#[error("failed to start reconciler runtime: {0}")]
	Runtime(String),
}
