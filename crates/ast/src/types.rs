use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Identity of a source unit.
///
/// Supplied by the document layer. The provider only clones and compares
/// handles, it never looks inside them.
pub trait UnitHandle: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> UnitHandle for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Reconciliation cycle counter.
///
/// Advanced every time a cycle starts. A completion carrying an older
/// generation than the tracker's current one is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Generation(pub(crate) u64);

impl Generation {
	pub(crate) fn next(self) -> Self {
		Self(self.0.wrapping_add(1))
	}

	/// Returns the raw counter value.
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for Generation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "g{}", self.0)
	}
}

/// Urgency of a [`crate::AstProvider::get_tree`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitPolicy {
	/// Never block. A miss on the active unit returns `None`; non-active
	/// units are still parsed directly.
	NoWait,
	/// Cache hits for the active unit only. Never blocks, never parses.
	ActiveOnly,
	/// Block (bounded by the configured deadline) for the in-flight
	/// reconciliation, then fall back to a synchronous parse.
	WaitForCurrent,
}

impl WaitPolicy {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::NoWait => "no_wait",
			Self::ActiveOnly => "active_only",
			Self::WaitForCurrent => "wait_for_current",
		}
	}
}

/// Where a [`Tree`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeOrigin {
	/// Installed by the background reconciler for this cycle.
	Reconciled(Generation),
	/// Parsed synchronously for the active unit inside `get_tree`.
	Foreground,
	/// Parsed for a non-active unit. Never cached.
	Detached,
}

/// Immutable parse result for one unit at one point in time.
///
/// Clones share the same allocation. There is no mutable access to the
/// syntax tree, so holders can keep a tree after it was evicted.
pub struct Tree<U, A> {
	inner: Arc<TreeInner<U, A>>,
}

struct TreeInner<U, A> {
	unit: U,
	origin: TreeOrigin,
	ast: A,
}

impl<U, A> Tree<U, A> {
	pub(crate) fn new(unit: U, origin: TreeOrigin, ast: A) -> Self {
		Self {
			inner: Arc::new(TreeInner { unit, origin, ast }),
		}
	}

	/// Unit this tree was parsed from.
	pub fn unit(&self) -> &U {
		&self.inner.unit
	}

	pub fn origin(&self) -> TreeOrigin {
		self.inner.origin
	}

	/// The parser's output.
	pub fn ast(&self) -> &A {
		&self.inner.ast
	}

	/// Returns true if both handles point at the same parse result.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl<U, A> Clone for Tree<U, A> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<U: fmt::Debug, A: fmt::Debug> fmt::Debug for Tree<U, A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tree")
			.field("unit", &self.inner.unit)
			.field("origin", &self.inner.origin)
			.field("ast", &self.inner.ast)
			.finish()
	}
}
