use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arbor_ast::{AstProvider, Generation, ParseEngine, ParseError, parse_guarded};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::cfg::ReconcilerCfg;
use crate::error::ReconcilerError;

fn runtime_handle() -> Result<Handle, ReconcilerError> {
	if let Ok(handle) = Handle::try_current() {
		return Ok(handle);
	}

	static GLOBAL_RT: OnceLock<Result<tokio::runtime::Runtime, String>> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("arbor-reconciler-global")
			.build()
			.map_err(|err| err.to_string())
	});
	match runtime {
		Ok(runtime) => Ok(runtime.handle().clone()),
		Err(msg) => Err(ReconcilerError::Runtime(msg.clone())),
	}
}

enum Command<U> {
	/// `stamp` is the value of the edit counter after this edit was noted.
	Edit { unit: U, generation: Generation, stamp: u64 },
	/// Skip the rest of the quiet period.
	Flush,
}

/// Handle to a running background reconciler.
///
/// Edits are reported with [`Self::note_edit`]. The owning task debounces
/// them, parses the unit on the blocking pool, and brackets each parse with
/// the provider's reconciliation protocol. Dropping the handle cancels the
/// task; [`Self::shutdown`] additionally waits for it.
pub struct Reconciler<E: ParseEngine> {
	provider: Arc<AstProvider<E>>,
	tx: mpsc::UnboundedSender<Command<E::Unit>>,
	cancel: CancellationToken,
	task: Option<JoinHandle<()>>,
	/// Edits noted so far. Held across joining a cycle in `note_edit` and
	/// across delivering a result in the worker, so the two never interleave.
	edits: Arc<Mutex<u64>>,
}

impl<E: ParseEngine> Reconciler<E> {
	/// Spawns the reconciler on the current tokio runtime, or on a shared
	/// fallback runtime when called outside one.
	pub fn spawn(provider: Arc<AstProvider<E>>, cfg: ReconcilerCfg) -> Result<Self, ReconcilerError> {
		let handle = runtime_handle()?;
		Ok(Self::spawn_on(&handle, provider, cfg))
	}

	pub fn spawn_on(handle: &Handle, provider: Arc<AstProvider<E>>, cfg: ReconcilerCfg) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let cancel = CancellationToken::new();
		let edits = Arc::new(Mutex::new(0));
		let (worker, done_rx) = Worker::new(Arc::clone(&provider), cfg, cancel.clone(), Arc::clone(&edits));
		let task = handle.spawn(worker.run(rx, done_rx));
		tracing::debug!("reconciler.spawned");

		Self {
			provider,
			tx,
			cancel,
			task: Some(task),
			edits,
		}
	}

	/// Reports that `unit` changed.
	///
	/// Opens (or joins) the provider's reconciliation cycle before returning,
	/// so `WaitForCurrent` requests issued afterwards wait for the new tree
	/// instead of parsing stale content. A parse already running for an
	/// earlier edit is cancelled.
	pub fn note_edit(&self, unit: E::Unit) -> Result<Generation, ReconcilerError> {
		let mut edits = self.edits.lock();
		*edits = edits.wrapping_add(1);
		let stamp = *edits;
		let Some(generation) = self.provider.about_to_reconcile(&unit) else {
			return Err(ReconcilerError::Disposed);
		};
		if let Err(mpsc::error::SendError(command)) = self.tx.send(Command::Edit { unit, generation, stamp }) {
			// Nobody will finish the cycle we just opened.
			if let Command::Edit { unit, generation, .. } = command {
				self.provider.reconciled(None, &unit, generation);
			}
			return Err(ReconcilerError::Closed);
		}
		Ok(generation)
	}

	/// Starts the pending parse now instead of after the quiet period.
	pub fn flush(&self) -> Result<(), ReconcilerError> {
		self.tx.send(Command::Flush).map_err(|_| ReconcilerError::Closed)
	}

	pub fn provider(&self) -> &Arc<AstProvider<E>> {
		&self.provider
	}

	/// Returns true once the task has been told to stop.
	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled() || self.tx.is_closed()
	}

	/// Stops the task and waits for it.
	///
	/// An open cycle is completed with no tree so blocked consumers fall back
	/// to a foreground parse.
	pub async fn shutdown(mut self) {
		self.cancel.cancel();
		if let Some(task) = self.task.take()
			&& let Err(err) = task.await
		{
			tracing::warn!(error = %err, "reconciler.join_failed");
		}
	}
}

impl<E: ParseEngine> Drop for Reconciler<E> {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Debounced edit waiting for its quiet period to elapse.
struct Pending<U> {
	unit: U,
	generation: Generation,
	stamp: u64,
	due: Instant,
}

/// Parse running on the blocking pool.
struct Inflight<U> {
	seq: u64,
	unit: U,
	generation: Generation,
	/// Edit counter value the parsed content reflects.
	stamp: u64,
	cancel: CancellationToken,
}

struct Done<U, A> {
	seq: u64,
	unit: U,
	generation: Generation,
	result: Result<A, ParseError>,
}

struct Worker<E: ParseEngine> {
	provider: Arc<AstProvider<E>>,
	cfg: ReconcilerCfg,
	cancel: CancellationToken,
	pending: Option<Pending<E::Unit>>,
	inflight: Option<Inflight<E::Unit>>,
	next_seq: u64,
	done_tx: mpsc::UnboundedSender<Done<E::Unit, E::Ast>>,
	edits: Arc<Mutex<u64>>,
}

type DoneRx<E> = mpsc::UnboundedReceiver<Done<<E as ParseEngine>::Unit, <E as ParseEngine>::Ast>>;

const FAR_FUTURE: Duration = Duration::from_secs(24 * 60 * 60);

async fn sleep_until_due(due: Option<Instant>) {
	match due {
		Some(due) => sleep_until(due).await,
		None => std::future::pending().await,
	}
}

impl<E: ParseEngine> Worker<E> {
	fn new(provider: Arc<AstProvider<E>>, cfg: ReconcilerCfg, cancel: CancellationToken, edits: Arc<Mutex<u64>>) -> (Self, DoneRx<E>) {
		let (done_tx, done_rx) = mpsc::unbounded_channel();
		let worker = Self {
			provider,
			cfg,
			cancel,
			pending: None,
			inflight: None,
			next_seq: 0,
			done_tx,
			edits,
		};
		(worker, done_rx)
	}

	async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command<E::Unit>>, mut done_rx: DoneRx<E>) {
		let cancel = self.cancel.clone();

		loop {
			let due = self.pending.as_ref().map(|pending| pending.due);
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				Some(done) = done_rx.recv() => self.finish(done),
				cmd = rx.recv() => match cmd {
					Some(Command::Edit { unit, generation, stamp }) => self.queue(unit, generation, stamp),
					Some(Command::Flush) => {
						if let Some(pending) = &mut self.pending {
							pending.due = Instant::now();
						}
					}
					None => break,
				},
				_ = sleep_until_due(due) => self.start_parse(),
			}
		}

		rx.close();
		while let Ok(cmd) = rx.try_recv() {
			if let Command::Edit { unit, generation, .. } = cmd {
				self.provider.reconciled(None, &unit, generation);
			}
		}
		self.close();
	}

	fn queue(&mut self, unit: E::Unit, generation: Generation, stamp: u64) {
		if let Some(inflight) = self.inflight.take() {
			inflight.cancel.cancel();
			tracing::trace!(unit = ?inflight.unit, seq = inflight.seq, "reconciler.parse.superseded");
		}
		tracing::trace!(?unit, %generation, debounce_ms = self.cfg.debounce_ms, "reconciler.edit.queued");
		let now = Instant::now();
		self.pending = Some(Pending {
			unit,
			generation,
			stamp,
			due: now.checked_add(self.cfg.debounce()).unwrap_or(now + FAR_FUTURE),
		});
	}

	fn start_parse(&mut self) {
		let Some(Pending { unit, generation, stamp, .. }) = self.pending.take() else {
			return;
		};
		let seq = self.next_seq;
		self.next_seq = self.next_seq.wrapping_add(1);
		let cancel = self.cancel.child_token();

		self.inflight = Some(Inflight {
			seq,
			unit: unit.clone(),
			generation,
			stamp,
			cancel: cancel.clone(),
		});
		tracing::trace!(?unit, %generation, seq, "reconciler.parse.start");

		let engine = Arc::clone(self.provider.engine());
		let done_tx = self.done_tx.clone();
		tokio::task::spawn_blocking(move || {
			let result = parse_guarded(engine.as_ref(), &unit, &cancel);
			let _ = done_tx.send(Done {
				seq,
				unit,
				generation,
				result,
			});
		});
	}

	fn finish(&mut self, done: Done<E::Unit, E::Ast>) {
		let Some(inflight) = self.inflight.take_if(|inflight| inflight.seq == done.seq) else {
			tracing::trace!(unit = ?done.unit, seq = done.seq, "reconciler.parse.dropped");
			return;
		};

		let edits = self.edits.lock();
		if *edits != inflight.stamp {
			// A later edit joined this cycle after the parse started. Its
			// command is still queued and its parse completes the cycle.
			tracing::trace!(unit = ?done.unit, generation = %done.generation, seq = done.seq, "reconciler.parse.outdated");
			return;
		}

		let ast = match done.result {
			Ok(ast) => Some(ast),
			Err(err) => {
				tracing::debug!(unit = ?done.unit, generation = %done.generation, error = %err, "reconciler.parse.failed");
				None
			}
		};
		self.provider.reconciled(ast, &done.unit, done.generation);
		drop(edits);
	}

	/// Completes whatever cycle is still open with no tree.
	fn close(&mut self) {
		if let Some(inflight) = self.inflight.take() {
			inflight.cancel.cancel();
			self.provider.reconciled(None, &inflight.unit, inflight.generation);
		}
		if let Some(pending) = self.pending.take() {
			self.provider.reconciled(None, &pending.unit, pending.generation);
		}
		tracing::debug!("reconciler.closed");
	}
}
