//! Observability hook for the provider.
//!
//! Every notable protocol step is reported as an [`AstEvent`]. The built-in
//! [`AstMetrics`] counts them; an external [`AstObserver`] can be attached to
//! forward them to another collector.

use std::sync::atomic::{AtomicU64, Ordering};

/// A protocol step worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AstEvent {
	/// The active unit's cached tree was served.
	CacheHit,
	/// The active unit had no cached tree.
	CacheMiss,
	/// A `WaitForCurrent` caller started blocking on an in-flight cycle.
	WaitEntered,
	/// A blocked caller hit the deadline. Indicates a lost wakeup upstream.
	WaitTimedOut,
	/// A `reconciled` call arrived for a superseded cycle and was dropped.
	StaleReconcileDiscarded,
	/// A tree was installed into the cache.
	TreeInstalled,
	/// A synchronous parse ran for the active unit.
	ForegroundParse,
	/// A synchronous parse ran for a non-active unit.
	DetachedParse,
	ParseFailed,
	Cancelled,
}

impl AstEvent {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::CacheHit => "cache_hit",
			Self::CacheMiss => "cache_miss",
			Self::WaitEntered => "wait_entered",
			Self::WaitTimedOut => "wait_timed_out",
			Self::StaleReconcileDiscarded => "stale_reconcile_discarded",
			Self::TreeInstalled => "tree_installed",
			Self::ForegroundParse => "foreground_parse",
			Self::DetachedParse => "detached_parse",
			Self::ParseFailed => "parse_failed",
			Self::Cancelled => "cancelled",
		}
	}
}

/// External event sink.
///
/// Called on the thread that performed the step, never while the provider's
/// state lock is held, so implementations may query the provider. Keep them
/// cheap: they run inline on request paths.
pub trait AstObserver: Send + Sync {
	fn record(&self, event: AstEvent);
}

/// Lock-free event counters.
#[derive(Debug, Default)]
pub struct AstMetrics {
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	waits_entered: AtomicU64,
	wait_timeouts: AtomicU64,
	stale_reconciles: AtomicU64,
	trees_installed: AtomicU64,
	foreground_parses: AtomicU64,
	detached_parses: AtomicU64,
	parse_failures: AtomicU64,
	cancellations: AtomicU64,
}

/// Point-in-time copy of [`AstMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AstMetricsSnapshot {
	pub cache_hits: u64,
	pub cache_misses: u64,
	pub waits_entered: u64,
	pub wait_timeouts: u64,
	pub stale_reconciles: u64,
	pub trees_installed: u64,
	pub foreground_parses: u64,
	pub detached_parses: u64,
	pub parse_failures: u64,
	pub cancellations: u64,
}

impl AstMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	fn counter(&self, event: AstEvent) -> &AtomicU64 {
		match event {
			AstEvent::CacheHit => &self.cache_hits,
			AstEvent::CacheMiss => &self.cache_misses,
			AstEvent::WaitEntered => &self.waits_entered,
			AstEvent::WaitTimedOut => &self.wait_timeouts,
			AstEvent::StaleReconcileDiscarded => &self.stale_reconciles,
			AstEvent::TreeInstalled => &self.trees_installed,
			AstEvent::ForegroundParse => &self.foreground_parses,
			AstEvent::DetachedParse => &self.detached_parses,
			AstEvent::ParseFailed => &self.parse_failures,
			AstEvent::Cancelled => &self.cancellations,
		}
	}

	/// Returns the current count for one event kind.
	pub fn count(&self, event: AstEvent) -> u64 {
		self.counter(event).load(Ordering::Relaxed)
	}

	pub fn snapshot(&self) -> AstMetricsSnapshot {
		AstMetricsSnapshot {
			cache_hits: self.count(AstEvent::CacheHit),
			cache_misses: self.count(AstEvent::CacheMiss),
			waits_entered: self.count(AstEvent::WaitEntered),
			wait_timeouts: self.count(AstEvent::WaitTimedOut),
			stale_reconciles: self.count(AstEvent::StaleReconcileDiscarded),
			trees_installed: self.count(AstEvent::TreeInstalled),
			foreground_parses: self.count(AstEvent::ForegroundParse),
			detached_parses: self.count(AstEvent::DetachedParse),
			parse_failures: self.count(AstEvent::ParseFailed),
			cancellations: self.count(AstEvent::Cancelled),
		}
	}
}

impl AstObserver for AstMetrics {
	fn record(&self, event: AstEvent) {
		self.counter(event).fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn record_bumps_only_matching_counter() {
		let metrics = AstMetrics::new();
		metrics.record(AstEvent::CacheHit);
		metrics.record(AstEvent::CacheHit);
		metrics.record(AstEvent::WaitTimedOut);

		let snap = metrics.snapshot();
		assert_eq!(snap.cache_hits, 2);
		assert_eq!(snap.wait_timeouts, 1);
		assert_eq!(
			snap,
			AstMetricsSnapshot {
				cache_hits: 2,
				wait_timeouts: 1,
				..Default::default()
			}
		);
	}

	#[test]
	fn event_names_are_unique() {
		let all = [
			AstEvent::CacheHit,
			AstEvent::CacheMiss,
			AstEvent::WaitEntered,
			AstEvent::WaitTimedOut,
			AstEvent::StaleReconcileDiscarded,
			AstEvent::TreeInstalled,
			AstEvent::ForegroundParse,
			AstEvent::DetachedParse,
			AstEvent::ParseFailed,
			AstEvent::Cancelled,
		];
		let names: std::collections::HashSet<_> = all.iter().map(|e| e.as_str()).collect();
		assert_eq!(names.len(), all.len());
	}
}
