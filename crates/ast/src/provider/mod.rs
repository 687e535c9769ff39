//! The shared tree provider.
//!
//! Active unit, reconciliation state, and the cached tree live behind one
//! mutex so their invariants hold together:
//! - a cached tree always belongs to the active unit
//! - a busy tracker always names a unit
//! - a completion only installs if its generation is still current
//!
//! `WaitForCurrent` callers block on a condvar paired with that mutex and
//! re-validate everything after each wake.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::cache::TreeCache;
use crate::cfg::AstProviderCfg;
use crate::engine::ParseEngine;
use crate::metrics::{AstEvent, AstMetrics, AstObserver};
use crate::registry::{ActiveChange, ActiveElementRegistry};
use crate::tracker::{CycleEnd, ReconciliationTracker};
use crate::types::{Generation, Tree, TreeOrigin, UnitHandle};

mod get_tree;

/// Process-wide (per editor association) parse-tree cache and reconciliation
/// protocol for the active source unit.
///
/// Construct one explicitly and share it behind an [`Arc`] with the
/// reconciler and every consumer.
pub struct AstProvider<E: ParseEngine> {
	engine: Arc<E>,
	cfg: AstProviderCfg,
	state: Mutex<State<E::Unit, E::Ast>>,
	/// Signalled on every `reconciled`, active unit change, and dispose.
	reconciled_cv: Condvar,
	metrics: AstMetrics,
	observer: Option<Arc<dyn AstObserver>>,
}

/// Everything guarded by the provider lock.
pub(super) struct State<U, A> {
	pub(super) registry: ActiveElementRegistry<U>,
	pub(super) tracker: ReconciliationTracker<U>,
	pub(super) cache: TreeCache<U, A>,
	pub(super) disposed: bool,
}

impl<U, A> Default for State<U, A> {
	fn default() -> Self {
		Self {
			registry: ActiveElementRegistry::default(),
			tracker: ReconciliationTracker::default(),
			cache: TreeCache::default(),
			disposed: false,
		}
	}
}

/// What an active unit switch did to the rest of the state.
struct Activation<U> {
	previous: Option<U>,
	evicted: bool,
	abandoned: Option<Generation>,
}

/// Outcome of a `reconciled` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Completion {
	Installed,
	/// Current cycle, but the reconciler produced no tree.
	Empty,
	/// Current cycle for a unit that is no longer active.
	Inactive,
	Stale,
	Disposed,
}

impl<U: UnitHandle, A> State<U, A> {
	fn activate(&mut self, unit: Option<U>) -> Option<Activation<U>> {
		let ActiveChange::Changed { previous } = self.registry.set(unit) else {
			return None;
		};
		let active = self.registry.get();
		let evicted = self.cache.retain_active(active);
		let abandoned = if self.tracker.is_busy_elsewhere(active) {
			self.tracker.abandon()
		} else {
			None
		};
		Some(Activation {
			previous,
			evicted,
			abandoned,
		})
	}

	fn begin(&mut self, unit: &U) -> Generation {
		let generation = self.tracker.begin(unit);
		self.cache.invalidate(unit);
		generation
	}

	fn complete(&mut self, unit: &U, generation: Generation, ast: Option<A>) -> Completion {
		if self.disposed {
			return Completion::Disposed;
		}
		if self.tracker.end(unit, generation) == CycleEnd::Stale {
			return Completion::Stale;
		}
		if !self.registry.is_active(unit) {
			return Completion::Inactive;
		}
		let Some(ast) = ast else {
			return Completion::Empty;
		};
		let tree = Tree::new(unit.clone(), TreeOrigin::Reconciled(generation), ast);
		if self.cache.put(tree, self.registry.get()) {
			Completion::Installed
		} else {
			Completion::Inactive
		}
	}

	pub(super) fn cached(&self, unit: &U) -> Option<Tree<U, A>> {
		self.cache.get(unit, self.registry.get()).cloned()
	}

	/// Installs a foreground parse if the unit is still active and no cycle
	/// ran or started since the parse began.
	pub(super) fn install_foreground(&mut self, tree: Tree<U, A>, since: Generation) -> bool {
		if self.disposed || !self.tracker.is_quiet_since(since) {
			return false;
		}
		self.cache.put(tree, self.registry.get())
	}

	fn dispose(&mut self) {
		self.disposed = true;
		self.cache.clear();
		self.tracker.abandon();
		self.registry.clear();
	}

	#[cfg(test)]
	pub(super) fn check_invariants(&self) {
		self.tracker.check_invariants();
		if let Some(unit) = self.cache.cached_unit() {
			assert_eq!(self.registry.get(), Some(unit), "cached tree must belong to the active unit");
		}
	}
}

impl<E: ParseEngine> AstProvider<E> {
	/// Out-of-range `cfg` values fall back to their defaults.
	pub fn new(engine: Arc<E>, cfg: AstProviderCfg) -> Self {
		if let Err(err) = cfg.validate() {
			tracing::warn!(error = %err, "ast.cfg.invalid: using defaults for out-of-range values");
		}
		let cfg = cfg.sanitized();
		Self {
			engine,
			cfg,
			state: Mutex::new(State::default()),
			reconciled_cv: Condvar::new(),
			metrics: AstMetrics::new(),
			observer: None,
		}
	}

	/// Forwards every event to `observer` in addition to the built-in counters.
	pub fn with_observer(mut self, observer: Arc<dyn AstObserver>) -> Self {
		self.observer = Some(observer);
		self
	}

	/// Makes `unit` the only unit the cache may serve.
	///
	/// Evicts a tree cached for another unit and abandons a reconciliation
	/// cycle running for another unit. Wakes every waiter so requests for the
	/// previous unit re-validate. Never blocks on a parse.
	pub fn set_active_unit(&self, unit: Option<E::Unit>) {
		let mut state = self.state.lock();
		if state.disposed {
			tracing::trace!(?unit, "ast.active.after_dispose");
			return;
		}
		let Some(change) = state.activate(unit) else {
			return;
		};
		let active = state.registry.get().cloned();
		drop(state);

		tracing::debug!(
			previous = ?change.previous,
			?active,
			evicted = change.evicted,
			abandoned = ?change.abandoned,
			"ast.active.changed"
		);
		self.reconciled_cv.notify_all();
	}

	/// Marks `unit` as being reconciled and drops its cached tree.
	///
	/// Returns the cycle generation to pass back to [`Self::reconciled`], or
	/// `None` once disposed. Calling it again before the cycle completes joins
	/// the running cycle and returns the same generation.
	pub fn about_to_reconcile(&self, unit: &E::Unit) -> Option<Generation> {
		let mut state = self.state.lock();
		if state.disposed {
			tracing::trace!(?unit, "ast.reconcile.after_dispose");
			return None;
		}
		let generation = state.begin(unit);
		drop(state);

		tracing::trace!(?unit, %generation, "ast.reconcile.begin");
		Some(generation)
	}

	/// Delivers the result of the reconciliation cycle `generation` for `unit`.
	///
	/// `ast` is `None` when the reconciler produced nothing (e.g. the parse
	/// was cancelled). The tree is installed only if the cycle is still
	/// current and `unit` is still active. Waiters are woken either way.
	pub fn reconciled(&self, ast: Option<E::Ast>, unit: &E::Unit, generation: Generation) {
		let completion = self.state.lock().complete(unit, generation, ast);
		self.reconciled_cv.notify_all();

		match completion {
			Completion::Installed => {
				self.emit(AstEvent::TreeInstalled);
				tracing::trace!(?unit, %generation, "ast.reconciled.installed");
			}
			Completion::Stale => {
				self.emit(AstEvent::StaleReconcileDiscarded);
				tracing::debug!(?unit, %generation, "ast.reconciled.stale");
			}
			Completion::Empty | Completion::Inactive | Completion::Disposed => {
				tracing::trace!(?unit, %generation, ?completion, "ast.reconciled.dropped");
			}
		}
	}

	/// Clears all state and wakes every waiter. Terminal.
	///
	/// Later calls are tolerated: requests return `None`, notifications are ignored.
	pub fn dispose(&self) {
		let mut state = self.state.lock();
		if state.disposed {
			return;
		}
		state.dispose();
		drop(state);

		tracing::debug!("ast.disposed");
		self.reconciled_cv.notify_all();
	}

	pub fn active_unit(&self) -> Option<E::Unit> {
		self.state.lock().registry.get().cloned()
	}

	/// Returns true while a reconciliation cycle for `unit` is in flight.
	pub fn is_reconciling(&self, unit: &E::Unit) -> bool {
		self.state.lock().tracker.is_busy(unit)
	}

	/// Unit of the in-flight reconciliation cycle, if any.
	pub fn reconciling_unit(&self) -> Option<E::Unit> {
		self.state.lock().tracker.busy_unit().cloned()
	}

	/// Latest generation handed out by [`Self::about_to_reconcile`].
	pub fn generation(&self) -> Generation {
		self.state.lock().tracker.generation()
	}

	/// Unit whose tree is currently cached.
	pub fn cached_unit(&self) -> Option<E::Unit> {
		self.state.lock().cache.cached_unit().cloned()
	}

	pub fn is_disposed(&self) -> bool {
		self.state.lock().disposed
	}

	pub fn metrics(&self) -> &AstMetrics {
		&self.metrics
	}

	pub fn engine(&self) -> &Arc<E> {
		&self.engine
	}

	pub fn cfg(&self) -> &AstProviderCfg {
		&self.cfg
	}

	fn emit(&self, event: AstEvent) {
		self.metrics.record(event);
		if let Some(observer) = &self.observer {
			observer.record(event);
		}
	}

	#[cfg(test)]
	pub(crate) fn check_invariants(&self) {
		self.state.lock().check_invariants();
	}
}

impl<E: ParseEngine> Drop for AstProvider<E> {
	fn drop(&mut self) {
		self.dispose();
	}
}

#[cfg(test)]
mod invariants;
