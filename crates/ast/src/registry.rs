use crate::types::UnitHandle;

/// Result of [`ActiveElementRegistry::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ActiveChange<U> {
	Unchanged,
	Changed { previous: Option<U> },
}

/// Tracks the unit the cache is permitted to serve.
#[derive(Debug)]
pub(crate) struct ActiveElementRegistry<U> {
	active: Option<U>,
	/// Bumped on every effective change; lets waiters notice a switch that
	/// happened while they were blocked, even if it switched back.
	changes: u64,
}

impl<U> Default for ActiveElementRegistry<U> {
	fn default() -> Self {
		Self { active: None, changes: 0 }
	}
}

impl<U: UnitHandle> ActiveElementRegistry<U> {
	pub(crate) fn set(&mut self, unit: Option<U>) -> ActiveChange<U> {
		if self.active == unit {
			return ActiveChange::Unchanged;
		}
		self.changes = self.changes.wrapping_add(1);
		let previous = std::mem::replace(&mut self.active, unit);
		ActiveChange::Changed { previous }
	}

	pub(crate) fn get(&self) -> Option<&U> {
		self.active.as_ref()
	}

	pub(crate) fn is_active(&self, unit: &U) -> bool {
		self.active.as_ref() == Some(unit)
	}

	pub(crate) fn changes(&self) -> u64 {
		self.changes
	}

	pub(crate) fn clear(&mut self) {
		if self.active.take().is_some() {
			self.changes = self.changes.wrapping_add(1);
		}
	}
}
