// src/system/shell.rs

//! # Shell Service
//!
//! Owns the command slot and the two workers, and turns the first worker to
//! finish into the session's result.
//!
//! Each worker reports its end through a one-shot finish observer that sends a
//! [`FinishEvent`] down a channel. The thread running the service receives the
//! first event, cancels both workers (cancelling a finished one is a no-op)
//! and returns that event's code. Cancellation never happens from inside a
//! worker, so the two workers never wait on each other.

use crate::{
    ExitCode,
    core::monitor::Monitor,
    core::slot::CommandSlot,
    core::worker::Worker,
    models::{FinishEvent, ShellConfig, WorkerRole},
    system::executor::ExecuteRoutine,
    system::expansion::{ShellWordExpander, WordExpander},
    system::input::{InputSource, StdinSource},
    system::reader::ReadRoutine,
    system::sys,
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Could not block SIGCHLD: {0}")]
    SignalMask(#[source] io::Error),
    #[error("Could not spawn the {role} worker: {source}")]
    Spawn {
        role: WorkerRole,
        #[source]
        source: io::Error,
    },
}

/// An interactive session: one reader, one executor and the slot between them.
#[derive(Debug)]
pub struct ShellService {
    reader: Worker,
    executor: Worker,
    events: mpsc::Receiver<FinishEvent>,
    poll_interval: Duration,
}

impl ShellService {
    /// Builds a session on the process's stdin, with shell-style word
    /// expansion.
    pub fn new(config: &ShellConfig) -> Result<Self, ShellError> {
        Self::with_parts(config, StdinSource, ShellWordExpander)
    }

    /// Builds a session with the given input source and word expander.
    ///
    /// SIGCHLD is blocked on the calling thread first, so that every thread
    /// spawned from here on inherits the block and only the executor, which
    /// unblocks it for itself, ever runs the reaper.
    pub fn with_parts<S, E>(config: &ShellConfig, source: S, expander: E) -> Result<Self, ShellError>
    where
        S: InputSource + 'static,
        E: WordExpander + 'static,
    {
        sys::block_sigchld().map_err(ShellError::SignalMask)?;

        let poll_interval = config.poll_interval();
        let slot = Arc::new(Monitor::new(CommandSlot::new(config.slot_capacity)));
        let (tx, events) = mpsc::channel();

        let executor = Worker::spawn(
            ExecuteRoutine::new(Arc::clone(&slot), expander, config),
            poll_interval,
        )
        .map_err(|e| ShellError::Spawn {
            role: WorkerRole::Executor,
            source: e,
        })?;
        let reader = Worker::spawn(ReadRoutine::new(slot, source, poll_interval), poll_interval)
            .map_err(|e| ShellError::Spawn {
                role: WorkerRole::Reader,
                source: e,
            })?;

        for (role, worker) in [(WorkerRole::Reader, &reader), (WorkerRole::Executor, &executor)] {
            let tx = tx.clone();
            worker.on_finish(move |id, code| {
                // The receiver is gone once the session already ended.
                let _ = tx.send(FinishEvent { role, id, code });
            });
        }

        Ok(Self {
            reader,
            executor,
            events,
            poll_interval,
        })
    }

    /// Starts both workers.
    pub fn start(&self) {
        self.executor.start();
        self.reader.start();
        log::debug!(
            "Shell started (reader {}, executor {})",
            self.reader.id(),
            self.executor.id()
        );
    }

    /// Blocks until one worker finishes or `stop` is raised, then shuts the
    /// other one down.
    ///
    /// Returns the event of the worker that finished first. A stop request
    /// cancels both workers, and whichever reports first is returned.
    pub fn wait(&self, stop: &AtomicBool) -> Option<FinishEvent> {
        let first = loop {
            match self.events.recv_timeout(self.poll_interval) {
                Ok(event) => break Some(event),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if stop.load(Ordering::SeqCst) {
                        log::debug!("Stop requested");
                        self.shutdown();
                        break self.events.try_recv().ok();
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break None,
            }
        };

        if let Some(event) = &first {
            log::debug!(
                "The {} worker ({}) finished first with code {}",
                event.role,
                event.id,
                event.code
            );
        }
        self.shutdown();
        first
    }

    /// Cancels both workers and waits for them to terminate.
    pub fn shutdown(&self) {
        self.executor.cancel();
        self.reader.cancel();
    }

    /// Runs a whole session and returns its exit code.
    pub fn run(self, stop: &AtomicBool) -> ExitCode {
        self.start();
        self.wait(stop).map_or(0, |event| event.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::expansion::ExpansionError;
    use crate::system::input::scripted::{ScriptedSource, ok};
    use std::time::Instant;

    /// Never launches anything: every expansion fails.
    struct NoExpansion;

    impl WordExpander for NoExpansion {
        fn expand(&self, _command_line: &str) -> Result<Vec<String>, ExpansionError> {
            Err(ExpansionError::Empty)
        }
    }

    fn config() -> ShellConfig {
        ShellConfig {
            poll_interval_ms: 20,
            ..ShellConfig::default()
        }
    }

    #[test]
    fn test_exit_ends_session_with_code_zero() {
        let source = ScriptedSource::new(vec![ok(b"exit\n")]);
        let shell = ShellService::with_parts(&config(), source, NoExpansion).unwrap();
        let stop = AtomicBool::new(false);

        shell.start();
        let event = shell.wait(&stop).unwrap();

        assert_eq!(event.role, WorkerRole::Executor);
        assert_eq!(event.code, 0);
    }

    #[test]
    fn test_reader_failure_ends_session_with_its_code() {
        let source = ScriptedSource::new(vec![Err(io::Error::from_raw_os_error(libc::EIO))]);
        let shell = ShellService::with_parts(&config(), source, NoExpansion).unwrap();
        let stop = AtomicBool::new(false);

        shell.start();
        let event = shell.wait(&stop).unwrap();

        assert_eq!(event.role, WorkerRole::Reader);
        assert_eq!(event.code, libc::EIO);
    }

    #[test]
    fn test_stop_request_cancels_both_workers() {
        let source = ScriptedSource::new(vec![ok(b"   \n")]);
        let shell = ShellService::with_parts(&config(), source, NoExpansion).unwrap();
        let stop = AtomicBool::new(true);
        let started = Instant::now();

        let code = shell.run(&stop);

        assert_eq!(code, 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
