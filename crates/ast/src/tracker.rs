use crate::types::{Generation, UnitHandle};

/// Outcome of [`ReconciliationTracker::end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleEnd {
	/// The completion belongs to the running cycle, which is now closed.
	Current,
	/// Late or duplicate completion. Tracker state is unchanged.
	Stale,
}

/// Records which unit (if any) is being reconciled.
///
/// Invariant: `busy` implies `unit.is_some()`.
#[derive(Debug)]
pub(crate) struct ReconciliationTracker<U> {
	unit: Option<U>,
	busy: bool,
	generation: Generation,
}

impl<U> Default for ReconciliationTracker<U> {
	fn default() -> Self {
		Self {
			unit: None,
			busy: false,
			generation: Generation::default(),
		}
	}
}

impl<U: UnitHandle> ReconciliationTracker<U> {
	/// Starts a cycle for `unit`, or joins the one already running for it.
	///
	/// A cycle running for another unit is superseded; its completion will be
	/// reported as [`CycleEnd::Stale`].
	pub(crate) fn begin(&mut self, unit: &U) -> Generation {
		if self.is_busy(unit) {
			return self.generation;
		}
		self.generation = self.generation.next();
		self.unit = Some(unit.clone());
		self.busy = true;
		self.generation
	}

	/// Closes the cycle if `(unit, generation)` is still the current one.
	pub(crate) fn end(&mut self, unit: &U, generation: Generation) -> CycleEnd {
		if self.busy && self.generation == generation && self.unit.as_ref() == Some(unit) {
			self.busy = false;
			CycleEnd::Current
		} else {
			CycleEnd::Stale
		}
	}

	pub(crate) fn is_busy(&self, unit: &U) -> bool {
		self.busy && self.unit.as_ref() == Some(unit)
	}

	/// Returns true if a cycle is running for anything other than `active`.
	pub(crate) fn is_busy_elsewhere(&self, active: Option<&U>) -> bool {
		self.busy && self.unit.as_ref() != active
	}

	/// Unit of the running cycle.
	pub(crate) fn busy_unit(&self) -> Option<&U> {
		if self.busy { self.unit.as_ref() } else { None }
	}

	pub(crate) fn generation(&self) -> Generation {
		self.generation
	}

	/// Returns true if no cycle ran or started since `generation` was observed.
	pub(crate) fn is_quiet_since(&self, generation: Generation) -> bool {
		!self.busy && self.generation == generation
	}

	/// Drops the running cycle without advancing the generation.
	///
	/// Its eventual completion no longer matches and is discarded.
	pub(crate) fn abandon(&mut self) -> Option<Generation> {
		let abandoned = self.busy.then_some(self.generation);
		self.busy = false;
		self.unit = None;
		abandoned
	}

	#[cfg(test)]
	pub(crate) fn check_invariants(&self) {
		assert!(!self.busy || self.unit.is_some(), "busy tracker must name a unit");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn begin_is_idempotent_for_same_unit() {
		let mut tracker = ReconciliationTracker::default();
		let g1 = tracker.begin(&"a");
		let g2 = tracker.begin(&"a");
		assert_eq!(g1, g2);
		assert_eq!(tracker.generation(), Generation(1));
		assert!(tracker.is_busy(&"a"));
	}

	#[test]
	fn begin_for_other_unit_supersedes() {
		let mut tracker = ReconciliationTracker::default();
		let ga = tracker.begin(&"a");
		let gb = tracker.begin(&"b");
		assert!(gb > ga);
		assert!(!tracker.is_busy(&"a"));
		assert_eq!(tracker.end(&"a", ga), CycleEnd::Stale);
		assert!(tracker.is_busy(&"b"));
	}

	#[test]
	fn end_only_matches_current_cycle() {
		let mut tracker = ReconciliationTracker::default();
		let g = tracker.begin(&"a");
		assert_eq!(tracker.end(&"a", Generation(g.get() + 1)), CycleEnd::Stale);
		assert!(tracker.is_busy(&"a"));
		assert_eq!(tracker.end(&"a", g), CycleEnd::Current);
		assert!(!tracker.is_busy(&"a"));
		// duplicate completion
		assert_eq!(tracker.end(&"a", g), CycleEnd::Stale);
		tracker.check_invariants();
	}

	#[test]
	fn abandon_keeps_generation_and_drops_completion() {
		let mut tracker = ReconciliationTracker::default();
		let g = tracker.begin(&"a");
		assert_eq!(tracker.abandon(), Some(g));
		assert_eq!(tracker.generation(), g);
		assert_eq!(tracker.end(&"a", g), CycleEnd::Stale);
		assert_eq!(tracker.abandon(), None);
		tracker.check_invariants();
	}

	#[test]
	fn quiet_since_detects_new_cycles() {
		let mut tracker = ReconciliationTracker::default();
		let seen = tracker.generation();
		assert!(tracker.is_quiet_since(seen));
		let g = tracker.begin(&"a");
		assert!(!tracker.is_quiet_since(seen));
		tracker.end(&"a", g);
		assert!(!tracker.is_quiet_since(seen));
		assert!(tracker.is_quiet_since(g));
	}
}
