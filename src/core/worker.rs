// src/core/worker.rs

//! # Cancellable Workers
//!
//! A [`Worker`] wraps one OS thread running a [`Routine`] through a fixed
//! lifecycle:
//!
//! `Created → Initializing → WaitingToStart → Running → Finishing → Terminated`
//!
//! Cancellation is cooperative and deferred. [`Worker::cancel`] only raises a
//! flag (and pokes the routine through its cancel hook); the routine notices it
//! at the cancellation points it calls voluntarily, via
//! [`WorkerContext::cancel_point`], whose error is propagated with `?` to
//! unwind the main loop. `cancel()` then blocks until the worker is
//! `Terminated`.
//!
//! When the worker finishes, `on_finish` runs once and then every registered
//! finish observer runs once with the result code.

use crate::{
    CancellationToken, ExitCode,
    core::monitor::Monitor,
    models::{WorkerId, WorkerState},
};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use thiserror::Error;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker was cancelled.")]
    Cancelled,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl WorkerError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Result code a worker ending with this error reports.
    ///
    /// Cancellation is not a failure. I/O failures report the OS error code
    /// when there is one.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Cancelled => 0,
            Self::Io { source, .. } => source.raw_os_error().filter(|c| *c != 0).unwrap_or(1),
        }
    }
}

/// Called right after cancellation is requested, from the cancelling thread.
/// Routines use it to wake themselves from a monitor wait.
pub type CancelHook = Box<dyn Fn() + Send + Sync>;

/// One-shot callback receiving the worker's identity and result code.
pub type FinishObserver = Box<dyn FnOnce(WorkerId, ExitCode) + Send>;

/// The unit of work a [`Worker`] drives.
pub trait Routine: Send + 'static {
    /// Short name, used for the thread name and log lines.
    fn name(&self) -> &'static str;

    /// Runs on the worker thread right before the main loop.
    fn on_start(&mut self, _ctx: &WorkerContext) -> Result<(), WorkerError> {
        Ok(())
    }

    /// The main loop. Returning ends the worker; so does propagating the
    /// error of a cancellation point.
    fn run(&mut self, ctx: &WorkerContext) -> Result<ExitCode, WorkerError>;

    /// Runs exactly once on the worker thread, however the worker ended.
    fn on_finish(&mut self) {}

    fn cancel_hook(&self) -> Option<CancelHook> {
        None
    }
}

/// What a running routine knows about its own worker.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    id: WorkerId,
    cancel: CancellationToken,
}

impl WorkerContext {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// A cancellation point: fails with [`WorkerError::Cancelled`] once
    /// cancellation has been requested.
    pub fn cancel_point(&self) -> Result<(), WorkerError> {
        if self.is_cancelled() {
            Err(WorkerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct Lifecycle {
    state: WorkerState,
    start_requested: bool,
    result: Option<ExitCode>,
    observers: Vec<FinishObserver>,
}

struct Shared {
    id: WorkerId,
    name: &'static str,
    lifecycle: Monitor<Lifecycle>,
    cancel: CancellationToken,
    cancel_hook: Option<CancelHook>,
    poll_interval: Duration,
}

impl Shared {
    fn transition(&self, state: WorkerState) {
        let mut lifecycle = self.lifecycle.enter();
        log::debug!(
            "Worker {}-{}: {:?} -> {:?}",
            self.name,
            self.id,
            lifecycle.state,
            state
        );
        lifecycle.state = state;
        lifecycle.signal();
    }

    fn wait_for(&self, state: WorkerState) {
        let mut lifecycle = self.lifecycle.enter();
        while lifecycle.state < state {
            lifecycle = lifecycle.wait(self.poll_interval);
        }
    }
}

/// Owner's handle on a cancellable worker thread.
///
/// Dropping the handle cancels the worker: no worker outlives its owner.
pub struct Worker {
    shared: Arc<Shared>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Worker {
    /// Spawns the OS thread for `routine`. The routine does not run until
    /// [`start`](Self::start) is called.
    ///
    /// `poll_interval` bounds every internal wait, so the lifecycle keeps
    /// observing cancellation even if a wake-up is missed.
    pub fn spawn<R: Routine>(routine: R, poll_interval: Duration) -> io::Result<Self> {
        let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(Shared {
            id,
            name: routine.name(),
            lifecycle: Monitor::new(Lifecycle {
                state: WorkerState::Created,
                start_requested: false,
                result: None,
                observers: Vec::new(),
            }),
            cancel: Arc::new(AtomicBool::new(false)),
            cancel_hook: routine.cancel_hook(),
            poll_interval,
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("{}-{}", routine.name(), id))
            .spawn(move || drive(thread_shared, routine))?;

        Ok(Self {
            shared,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.shared.id
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lifecycle.enter().state
    }

    /// The result code, once the worker has reached `Finishing`.
    pub fn result_code(&self) -> Option<ExitCode> {
        self.shared.lifecycle.enter().result
    }

    /// Registers a one-shot finish observer.
    ///
    /// If the worker already finished, the observer runs immediately on the
    /// calling thread.
    pub fn on_finish(&self, observer: impl FnOnce(WorkerId, ExitCode) + Send + 'static) {
        let mut lifecycle = self.shared.lifecycle.enter();
        match lifecycle.result {
            Some(code) => {
                drop(lifecycle);
                observer(self.shared.id, code);
            }
            None => lifecycle.observers.push(Box::new(observer)),
        }
    }

    /// Lets the worker run its routine. Blocks until the thread is ready to
    /// start.
    pub fn start(&self) {
        let mut lifecycle = self.shared.lifecycle.enter();
        while lifecycle.state < WorkerState::WaitingToStart {
            lifecycle = lifecycle.wait(self.shared.poll_interval);
        }
        lifecycle.start_requested = true;
        lifecycle.signal();
    }

    /// Requests cancellation and blocks until the worker is `Terminated`.
    ///
    /// A no-op on a terminated worker. Called from the worker's own thread it
    /// only raises the flag, since waiting there could never end.
    pub fn cancel(&self) {
        if self.state() == WorkerState::Terminated {
            self.reap_thread();
            return;
        }

        log::debug!("Cancelling worker {}-{}", self.shared.name, self.shared.id);
        self.shared.cancel.store(true, Ordering::SeqCst);
        if let Some(hook) = &self.shared.cancel_hook {
            hook();
        }
        self.shared.lifecycle.signal();

        if thread::current().id() != self.thread_id {
            self.join();
        }
    }

    /// Blocks until the worker is `Terminated`, without requesting
    /// cancellation, and returns its result code.
    pub fn join(&self) -> ExitCode {
        if thread::current().id() == self.thread_id {
            return self.result_code().unwrap_or(0);
        }
        self.shared.wait_for(WorkerState::Terminated);
        self.reap_thread();
        self.result_code().unwrap_or(0)
    }

    fn reap_thread(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!(
                    "Worker {}-{} thread ended with a panic.",
                    self.shared.name,
                    self.shared.id
                );
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Body of every worker thread.
fn drive<R: Routine>(shared: Arc<Shared>, mut routine: R) {
    let ctx = WorkerContext {
        id: shared.id,
        cancel: Arc::clone(&shared.cancel),
    };

    // --- Initialization: not a cancellation point ---
    shared.transition(WorkerState::Initializing);
    shared.transition(WorkerState::WaitingToStart);

    let started = {
        let mut lifecycle = shared.lifecycle.enter();
        while !lifecycle.start_requested && !ctx.is_cancelled() {
            lifecycle = lifecycle.wait(shared.poll_interval);
        }
        !ctx.is_cancelled()
    };

    // --- Running ---
    let code = if started {
        shared.transition(WorkerState::Running);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            routine.on_start(&ctx)?;
            routine.run(&ctx)
        }));
        match outcome {
            Ok(Ok(code)) => code,
            Ok(Err(WorkerError::Cancelled)) => {
                log::debug!("Worker {}-{} observed cancellation.", shared.name, shared.id);
                0
            }
            Ok(Err(e)) => {
                log::debug!("Worker {}-{} failed: {}", shared.name, shared.id, e);
                e.exit_code()
            }
            Err(_) => {
                log::error!("Worker {}-{} panicked.", shared.name, shared.id);
                1
            }
        }
    } else {
        log::debug!(
            "Worker {}-{} cancelled before start.",
            shared.name,
            shared.id
        );
        0
    };

    // --- Finishing ---
    shared.transition(WorkerState::Finishing);
    routine.on_finish();

    let observers = {
        let mut lifecycle = shared.lifecycle.enter();
        lifecycle.result = Some(code);
        std::mem::take(&mut lifecycle.observers)
    };
    for observer in observers {
        observer(shared.id, code);
    }

    shared.transition(WorkerState::Terminated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(20);

    #[derive(Default, Clone)]
    struct Counters {
        started: Arc<AtomicUsize>,
        ran: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    }

    /// Returns `code` right away, or loops on cancellation points forever.
    struct Probe {
        counters: Counters,
        code: Option<ExitCode>,
    }

    impl Routine for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn on_start(&mut self, _ctx: &WorkerContext) -> Result<(), WorkerError> {
            self.counters.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn run(&mut self, ctx: &WorkerContext) -> Result<ExitCode, WorkerError> {
            self.counters.ran.fetch_add(1, Ordering::SeqCst);
            if let Some(code) = self.code {
                return Ok(code);
            }
            loop {
                ctx.cancel_point()?;
                thread::sleep(Duration::from_millis(5));
            }
        }

        fn on_finish(&mut self) {
            self.counters.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn probe(code: Option<ExitCode>) -> (Worker, Counters) {
        let counters = Counters::default();
        let worker = Worker::spawn(
            Probe {
                counters: counters.clone(),
                code,
            },
            INTERVAL,
        )
        .unwrap();
        (worker, counters)
    }

    #[test]
    fn test_natural_finish_reports_code_to_observers_once() {
        let (worker, counters) = probe(Some(3));
        let (tx, rx) = mpsc::channel();
        worker.on_finish(move |_, code| tx.send(code).unwrap());

        worker.start();
        assert_eq!(worker.join(), 3);

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 3);
        assert!(rx.try_recv().is_err());
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(counters.started.load(Ordering::SeqCst), 1);
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_stops_running_loop_and_blocks_until_terminated() {
        let (worker, counters) = probe(None);
        worker.start();
        while counters.ran.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        let started = Instant::now();
        worker.cancel();

        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(worker.result_code(), Some(0));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_before_start_skips_routine_but_still_finishes() {
        let (worker, counters) = probe(Some(9));
        let (tx, rx) = mpsc::channel();
        worker.on_finish(move |_, code| tx.send(code).unwrap());

        worker.cancel();

        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 0);
        assert_eq!(counters.started.load(Ordering::SeqCst), 0);
        assert_eq!(counters.ran.load(Ordering::SeqCst), 0);
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_after_termination_is_noop() {
        let (worker, counters) = probe(Some(4));
        worker.start();
        worker.join();

        worker.cancel();
        worker.cancel();

        assert_eq!(worker.result_code(), Some(4));
        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_registered_after_finish_fires_immediately() {
        let (worker, _) = probe(Some(5));
        worker.start();
        worker.join();

        let (tx, rx) = mpsc::channel();
        worker.on_finish(move |_, code| tx.send(code).unwrap());

        assert_eq!(rx.try_recv().unwrap(), 5);
    }

    #[test]
    fn test_drop_cancels_running_worker() {
        let (worker, counters) = probe(None);
        worker.start();
        while counters.ran.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        drop(worker);

        assert_eq!(counters.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_workers_get_distinct_increasing_ids() {
        let (first, _) = probe(Some(0));
        let (second, _) = probe(Some(0));
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_io_error_code_uses_os_errno() {
        let error = WorkerError::io("read", io::Error::from_raw_os_error(libc::EIO));
        assert_eq!(error.exit_code(), libc::EIO);
        assert_eq!(WorkerError::Cancelled.exit_code(), 0);
        assert_eq!(
            WorkerError::io("read", io::Error::other("boom")).exit_code(),
            1
        );
    }
}
