use std::time::{Duration, Instant};

use parking_lot::MutexGuard;
use tokio_util::sync::CancellationToken;

use super::AstProvider;
use crate::engine::{ParseEngine, TreeOf, parse_guarded};
use crate::error::TreeUnavailable;
use crate::metrics::AstEvent;
use crate::types::{Tree, TreeOrigin, WaitPolicy};

/// Upper bound used when a configured timeout does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(24 * 60 * 60);

fn deadline_after(now: Instant, timeout: Duration) -> Instant {
	now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

impl<E: ParseEngine> AstProvider<E> {
	/// Returns the tree for `unit`, or `None` if none is available under `policy`.
	///
	/// 1. Non-active unit: direct synchronous parse, never cached
	///    (`ActiveOnly` returns `None` instead).
	/// 2. Active unit with a cached tree: returned immediately.
	/// 3. Miss: `NoWait` and `ActiveOnly` return `None`. `WaitForCurrent`
	///    blocks while a cycle for `unit` is in flight, bounded by
	///    [`crate::AstProviderCfg::wait_timeout`], then parses synchronously if
	///    the cycle left nothing behind.
	///
	/// `cancel` is checked before and after every parse and after every wake.
	/// Failures of any kind (parse errors, cancellation, timeouts, disposal)
	/// come back as `None`.
	pub fn get_tree(&self, unit: &E::Unit, policy: WaitPolicy, cancel: &CancellationToken) -> Option<TreeOf<E>> {
		match self.resolve(unit, policy, cancel) {
			Ok(tree) => tree,
			Err(err) => {
				self.note_unavailable(unit, policy, &err);
				None
			}
		}
	}

	fn resolve(&self, unit: &E::Unit, policy: WaitPolicy, cancel: &CancellationToken) -> Result<Option<TreeOf<E>>, TreeUnavailable> {
		let wait_timeout = self.cfg.wait_timeout();
		let mut deadline = deadline_after(Instant::now(), wait_timeout);
		let mut waiting = false;

		let mut state = self.state.lock();
		let mut seen_changes = state.registry.changes();
		loop {
			if state.disposed {
				return Err(TreeUnavailable::Disposed);
			}
			if cancel.is_cancelled() {
				return Err(TreeUnavailable::Cancelled);
			}

			// Active unit switched under us: the request starts over with a fresh deadline.
			let changes = state.registry.changes();
			if changes != seen_changes {
				seen_changes = changes;
				deadline = deadline_after(Instant::now(), wait_timeout);
				waiting = false;
				tracing::trace!(?unit, policy = policy.as_str(), "ast.get_tree.retry");
			}

			if !state.registry.is_active(unit) {
				if policy == WaitPolicy::ActiveOnly {
					return Err(TreeUnavailable::NotActive);
				}
				drop(state);
				return self.parse_detached(unit, cancel).map(Some);
			}

			if let Some(tree) = state.cached(unit) {
				drop(state);
				self.emit(AstEvent::CacheHit);
				tracing::trace!(?unit, policy = policy.as_str(), origin = ?tree.origin(), "ast.get_tree.hit");
				return Ok(Some(tree));
			}

			let busy = state.tracker.is_busy(unit);
			match policy {
				WaitPolicy::NoWait => {
					drop(state);
					self.emit(AstEvent::CacheMiss);
					return Ok(None);
				}
				WaitPolicy::ActiveOnly => {
					drop(state);
					self.emit(AstEvent::CacheMiss);
					if !busy {
						// Nothing cached and nothing coming; this policy still never parses.
						tracing::trace!(?unit, "ast.get_tree.active_only.idle");
					}
					return Ok(None);
				}
				WaitPolicy::WaitForCurrent => {}
			}

			if busy {
				let now = Instant::now();
				if now >= deadline {
					return Err(TreeUnavailable::WaitTimedOut);
				}
				if !waiting {
					waiting = true;
					tracing::trace!(?unit, generation = %state.tracker.generation(), "ast.get_tree.wait");
					// State may move while unlocked, so re-validate before blocking.
					MutexGuard::unlocked(&mut state, || self.emit(AstEvent::WaitEntered));
					continue;
				}
				let slice_end = deadline.min(deadline_after(now, self.cfg.cancel_poll()));
				self.reconciled_cv.wait_until(&mut state, slice_end);
				continue;
			}

			let since = state.tracker.generation();
			drop(state);
			self.emit(AstEvent::CacheMiss);

			let tree = self.parse_foreground(unit, cancel)?;

			let mut state = self.state.lock();
			if cancel.is_cancelled() {
				return Err(TreeUnavailable::Cancelled);
			}
			let installed = state.install_foreground(tree.clone(), since);
			drop(state);
			if installed {
				self.emit(AstEvent::TreeInstalled);
				tracing::trace!(?unit, "ast.get_tree.foreground.installed");
			} else {
				tracing::trace!(?unit, "ast.get_tree.foreground.superseded");
			}
			return Ok(Some(tree));
		}
	}

	/// Synchronous parse for a non-active unit. The result is never cached.
	fn parse_detached(&self, unit: &E::Unit, cancel: &CancellationToken) -> Result<TreeOf<E>, TreeUnavailable> {
		self.emit(AstEvent::DetachedParse);
		tracing::trace!(?unit, "ast.parse.detached");
		self.parse_checked(unit, TreeOrigin::Detached, cancel)
	}

	fn parse_foreground(&self, unit: &E::Unit, cancel: &CancellationToken) -> Result<TreeOf<E>, TreeUnavailable> {
		self.emit(AstEvent::ForegroundParse);
		tracing::trace!(?unit, "ast.parse.foreground");
		self.parse_checked(unit, TreeOrigin::Foreground, cancel)
	}

	fn parse_checked(&self, unit: &E::Unit, origin: TreeOrigin, cancel: &CancellationToken) -> Result<TreeOf<E>, TreeUnavailable> {
		let ast = parse_guarded(self.engine.as_ref(), unit, cancel)?;
		if cancel.is_cancelled() {
			return Err(TreeUnavailable::Cancelled);
		}
		Ok(Tree::new(unit.clone(), origin, ast))
	}

	fn note_unavailable(&self, unit: &E::Unit, policy: WaitPolicy, err: &TreeUnavailable) {
		match err {
			TreeUnavailable::WaitTimedOut => {
				self.emit(AstEvent::WaitTimedOut);
				tracing::warn!(
					?unit,
					timeout_ms = self.cfg.wait_timeout_ms,
					"ast.get_tree.wait_timed_out: no reconciled signal arrived"
				);
			}
			TreeUnavailable::ParseFailed(msg) => {
				self.emit(AstEvent::ParseFailed);
				tracing::debug!(?unit, policy = policy.as_str(), error = %msg, "ast.get_tree.parse_failed");
			}
			TreeUnavailable::Cancelled => {
				self.emit(AstEvent::Cancelled);
				tracing::trace!(?unit, policy = policy.as_str(), "ast.get_tree.cancelled");
			}
			TreeUnavailable::NotActive | TreeUnavailable::Disposed => {
				tracing::trace!(?unit, policy = policy.as_str(), %err, "ast.get_tree.unavailable");
			}
		}
	}
}
