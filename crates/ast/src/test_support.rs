use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::cfg::AstProviderCfg;
use crate::engine::{ParseEngine, ParseError};
use crate::provider::AstProvider;

pub(crate) type Unit = &'static str;

/// Parse result stamped with the engine's call counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockAst {
	pub(crate) unit: Unit,
	pub(crate) serial: usize,
}

#[derive(Default)]
struct Gate {
	closed: bool,
	permits: usize,
	parked: usize,
}

/// Mock parsing engine that can block until explicitly released.
///
/// Gated parses park until [`MockEngine::proceed`] hands out a permit, the
/// gate is opened, or the caller's token is cancelled.
pub(crate) struct MockEngine {
	parse_count: AtomicUsize,
	gate: Mutex<Gate>,
	gate_cv: Condvar,
	failure: Mutex<Option<ParseError>>,
}

impl MockEngine {
	/// Engine whose parses complete immediately.
	pub(crate) fn new() -> Self {
		Self {
			parse_count: AtomicUsize::new(0),
			gate: Mutex::new(Gate::default()),
			gate_cv: Condvar::new(),
			failure: Mutex::new(None),
		}
	}

	/// Engine whose parses park until released.
	pub(crate) fn gated() -> Self {
		let engine = Self::new();
		engine.gate.lock().closed = true;
		engine
	}

	pub(crate) fn parse_count(&self) -> usize {
		self.parse_count.load(Ordering::SeqCst)
	}

	/// Makes subsequent parses fail with `failure` (or succeed again with `None`).
	pub(crate) fn set_failure(&self, failure: Option<ParseError>) {
		*self.failure.lock() = failure;
	}

	/// Allows one parked (or the next) parse to proceed.
	pub(crate) fn proceed(&self) {
		self.gate.lock().permits += 1;
		self.gate_cv.notify_all();
	}

	/// Lets every parse through from now on.
	pub(crate) fn open(&self) {
		self.gate.lock().closed = false;
		self.gate_cv.notify_all();
	}

	/// Blocks until `n` parses are parked at the gate, up to one second.
	pub(crate) fn wait_parked(&self, n: usize) -> bool {
		let deadline = Instant::now() + Duration::from_secs(1);
		let mut gate = self.gate.lock();
		while gate.parked < n {
			if self.gate_cv.wait_until(&mut gate, deadline).timed_out() {
				return gate.parked >= n;
			}
		}
		true
	}
}

impl ParseEngine for MockEngine {
	type Unit = Unit;
	type Ast = MockAst;

	fn parse(&self, unit: &Unit, cancel: &CancellationToken) -> Result<MockAst, ParseError> {
		let serial = self.parse_count.fetch_add(1, Ordering::SeqCst) + 1;

		let mut gate = self.gate.lock();
		gate.parked += 1;
		self.gate_cv.notify_all();
		while gate.closed && gate.permits == 0 {
			if cancel.is_cancelled() {
				gate.parked -= 1;
				return Err(ParseError::Cancelled);
			}
			self.gate_cv.wait_for(&mut gate, Duration::from_millis(5));
		}
		if gate.closed {
			gate.permits -= 1;
		}
		gate.parked -= 1;
		drop(gate);

		match self.failure.lock().clone() {
			Some(err) => Err(err),
			None => Ok(MockAst { unit: *unit, serial }),
		}
	}
}

/// RAII guard that opens the gate on drop, preventing test hangs.
pub(crate) struct EngineGuard(pub(crate) Arc<MockEngine>);

impl Drop for EngineGuard {
	fn drop(&mut self) {
		self.0.open();
	}
}

/// Provider over `engine` with a short wait deadline.
pub(crate) fn provider_with(engine: &Arc<MockEngine>, wait_timeout_ms: u64) -> Arc<AstProvider<MockEngine>> {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let cfg = AstProviderCfg {
		wait_timeout_ms,
		cancel_poll_ms: 10,
	};
	Arc::new(AstProvider::new(Arc::clone(engine), cfg))
}

/// Polls `cond` every millisecond for up to one second.
pub(crate) fn eventually(mut cond: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + Duration::from_secs(1);
	while Instant::now() < deadline {
		if cond() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(1));
	}
	cond()
}
