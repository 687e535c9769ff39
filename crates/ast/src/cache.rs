use crate::types::{Tree, UnitHandle};

/// Single-slot tree cache.
///
/// The tree carries its own unit, so the slot is the whole `{ unit, tree }`
/// entry. Both reads and writes take the active unit so the caller's lock
/// covers the check and the access together.
#[derive(Debug)]
pub(crate) struct TreeCache<U, A> {
	entry: Option<Tree<U, A>>,
}

impl<U, A> Default for TreeCache<U, A> {
	fn default() -> Self {
		Self { entry: None }
	}
}

impl<U: UnitHandle, A> TreeCache<U, A> {
	/// Returns the cached tree for `unit` if `unit` is also the active unit.
	pub(crate) fn get(&self, unit: &U, active: Option<&U>) -> Option<&Tree<U, A>> {
		if active != Some(unit) {
			return None;
		}
		self.entry.as_ref().filter(|tree| tree.unit() == unit)
	}

	/// Installs `tree` if its unit is the active unit. Returns whether it was installed.
	pub(crate) fn put(&mut self, tree: Tree<U, A>, active: Option<&U>) -> bool {
		if active != Some(tree.unit()) {
			return false;
		}
		self.entry = Some(tree);
		true
	}

	/// Drops the cached tree if it belongs to `unit`.
	pub(crate) fn invalidate(&mut self, unit: &U) -> bool {
		if self.cached_unit() == Some(unit) {
			self.entry = None;
			true
		} else {
			false
		}
	}

	/// Drops the cached tree unless it belongs to `active`.
	pub(crate) fn retain_active(&mut self, active: Option<&U>) -> bool {
		match self.cached_unit() {
			Some(unit) if Some(unit) != active => {
				self.entry = None;
				true
			}
			_ => false,
		}
	}

	pub(crate) fn clear(&mut self) {
		self.entry = None;
	}

	pub(crate) fn cached_unit(&self) -> Option<&U> {
		self.entry.as_ref().map(Tree::unit)
	}
}
