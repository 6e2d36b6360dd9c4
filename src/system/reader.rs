// src/system/reader.rs

//! # Reader Worker
//!
//! Captures terminal input one read at a time and publishes complete command
//! lines into the shared [`CommandSlot`].
//!
//! Each read is classified by a [`LineTracker`]. Only a chunk that starts a
//! new line (the previous chunk ended with a newline) and fits in the slot is
//! handed to the executor. Chunks continuing an unterminated line are dropped,
//! so a fragment of an over-long line is never run as a command.

use crate::{
    ExitCode,
    core::monitor::{Monitor, MonitorGuard},
    core::slot::CommandSlot,
    core::worker::{CancelHook, Routine, WorkerContext, WorkerError},
    constants::DETACHED_INPUT_BACKOFF_MS,
    system::input::{InputSource, Readiness},
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Line published after a dropped line ends, so the executor prints a fresh
/// prompt.
const REPROMPT_LINE: &[u8] = b" ";

/// What to do with one chunk returned by `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAction {
    /// End of input.
    EndOfInput,
    /// Nothing usable (the chunk starts with a terminator byte).
    Ignore,
    /// A command line: hand it to the executor.
    Publish,
    /// The line does not fit in the slot: report and drop it.
    Overflow { reprompt: bool },
    /// Continuation of a line that was already dropped.
    Discard { reprompt: bool },
}

/// Remembers whether the previous chunk completed its line.
#[derive(Debug, Clone)]
pub struct LineTracker {
    capacity: usize,
    last_line_complete: bool,
}

impl LineTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            last_line_complete: true,
        }
    }

    /// Classifies `chunk` and updates the line state.
    pub fn classify(&mut self, chunk: &[u8]) -> ChunkAction {
        let Some(first) = chunk.first() else {
            return ChunkAction::EndOfInput;
        };
        if *first == 0 {
            return ChunkAction::Ignore;
        }

        let starts_line = self.last_line_complete;
        let ends_line = chunk.last() == Some(&b'\n');
        self.last_line_complete = ends_line;

        if !starts_line {
            ChunkAction::Discard { reprompt: ends_line }
        } else if chunk.len() >= self.capacity {
            ChunkAction::Overflow { reprompt: ends_line }
        } else {
            ChunkAction::Publish
        }
    }
}

/// The reader's main loop, driven by a [`Worker`](crate::core::worker::Worker).
pub struct ReadRoutine<S: InputSource> {
    slot: Arc<Monitor<CommandSlot>>,
    source: S,
    tracker: LineTracker,
    poll_interval: Duration,
}

impl<S: InputSource> std::fmt::Debug for ReadRoutine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadRoutine")
            .field("tracker", &self.tracker)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl<S: InputSource> ReadRoutine<S> {
    pub fn new(slot: Arc<Monitor<CommandSlot>>, source: S, poll_interval: Duration) -> Self {
        let capacity = slot.enter().capacity();
        Self {
            slot,
            source,
            tracker: LineTracker::new(capacity),
            poll_interval,
        }
    }

    /// Waits until input is ready, checking for cancellation between polls.
    fn wait_for_input(&mut self, ctx: &WorkerContext) -> Result<(), WorkerError> {
        loop {
            ctx.cancel_point()?;
            match self
                .source
                .poll_ready(self.poll_interval)
                .map_err(|e| WorkerError::io("polling stdin", e))?
            {
                Readiness::Ready => return Ok(()),
                Readiness::Timeout => continue,
                Readiness::Detached => {
                    log::trace!("stdin detached, retrying");
                    thread::sleep(Duration::from_millis(DETACHED_INPUT_BACKOFF_MS));
                }
            }
        }
    }

    /// Performs one read into the slot and acts on it. Returns `false` at end
    /// of input.
    fn capture(&mut self, ctx: &WorkerContext) -> Result<bool, WorkerError> {
        let mut slot = self.slot.enter();
        while slot.is_full() {
            ctx.cancel_point()?;
            slot = slot.wait(self.poll_interval);
        }
        ctx.cancel_point()?;

        let read = match self.source.read(slot.storage_mut()) {
            Ok(n) => n,
            Err(e) => {
                slot.clear();
                eprintln!(t!("reader.error.read_failed"), error = e);
                return Err(WorkerError::io("reading stdin", e));
            }
        };
        let chunk = slot.storage_mut().get(..read).unwrap_or_default();

        match self.tracker.classify(chunk) {
            ChunkAction::EndOfInput => {
                slot.clear();
                return Ok(false);
            }
            ChunkAction::Ignore => slot.clear(),
            ChunkAction::Publish => {
                slot.publish(read);
                slot.signal();
            }
            ChunkAction::Overflow { reprompt } => {
                eprintln!(t!("reader.error.too_long"));
                log::debug!("Dropped a {} byte line", read);
                Self::drop_line(&mut slot, reprompt);
            }
            ChunkAction::Discard { reprompt } => Self::drop_line(&mut slot, reprompt),
        }
        Ok(true)
    }

    fn drop_line(slot: &mut MonitorGuard<'_, CommandSlot>, reprompt: bool) {
        slot.clear();
        if reprompt {
            slot.fill(REPROMPT_LINE);
            slot.signal();
        }
    }
}

impl<S: InputSource + 'static> Routine for ReadRoutine<S> {
    fn name(&self) -> &'static str {
        "reader"
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<ExitCode, WorkerError> {
        loop {
            self.wait_for_input(ctx)?;
            if !self.capture(ctx)? {
                // End of input: back off so a closed pipe does not spin.
                thread::sleep(self.poll_interval);
            }
        }
    }

    fn cancel_hook(&self) -> Option<CancelHook> {
        let slot = Arc::clone(&self.slot);
        Some(Box::new(move || slot.signal()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::worker::Worker;
    use crate::system::input::scripted::{ScriptedSource, ok};
    use std::io;
    use std::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(20);

    /// Takes lines from the slot like the executor does, until `count` lines
    /// arrived or a second passes.
    fn drain(slot: &Monitor<CommandSlot>, count: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(1);
        let mut lines = Vec::new();
        while lines.len() < count && Instant::now() < deadline {
            let mut guard = slot.enter();
            while guard.is_empty() && Instant::now() < deadline {
                guard = guard.wait(INTERVAL);
            }
            if guard.is_full() {
                lines.push(guard.take());
                guard.signal();
            }
        }
        lines
    }

    #[test]
    fn test_tracker_publishes_complete_lines() {
        let mut tracker = LineTracker::new(8);
        assert_eq!(tracker.classify(b"ls\n"), ChunkAction::Publish);
        assert_eq!(tracker.classify(b"pwd\n"), ChunkAction::Publish);
    }

    #[test]
    fn test_tracker_overflow_then_discards_rest_of_line() {
        let mut tracker = LineTracker::new(8);

        assert_eq!(
            tracker.classify(b"12345678"),
            ChunkAction::Overflow { reprompt: false }
        );
        assert_eq!(
            tracker.classify(b"90abcdef"),
            ChunkAction::Discard { reprompt: false }
        );
        assert_eq!(
            tracker.classify(b"gh\n"),
            ChunkAction::Discard { reprompt: true }
        );
        assert_eq!(tracker.classify(b"ls\n"), ChunkAction::Publish);
    }

    #[test]
    fn test_tracker_overflow_ending_exactly_with_newline_reprompts() {
        let mut tracker = LineTracker::new(4);
        assert_eq!(
            tracker.classify(b"abc\n"),
            ChunkAction::Overflow { reprompt: true }
        );
        assert_eq!(tracker.classify(b"ls\n"), ChunkAction::Publish);
    }

    #[test]
    fn test_tracker_end_of_input_and_terminator_keep_state() {
        let mut tracker = LineTracker::new(8);
        assert_eq!(tracker.classify(b""), ChunkAction::EndOfInput);
        assert_eq!(tracker.classify(b"\0ls"), ChunkAction::Ignore);
        assert_eq!(tracker.classify(b"ls\n"), ChunkAction::Publish);
    }

    #[test]
    fn test_reader_publishes_lines_and_reprompts_after_overflow() {
        // --- Setup ---
        let slot = Arc::new(Monitor::new(CommandSlot::new(8)));
        let source = ScriptedSource::new(vec![
            ok(b"ls\n"),
            ok(b"0123456789"),
            ok(b"ab\n"),
            ok(b"pwd\n"),
        ]);
        let worker = Worker::spawn(
            ReadRoutine::new(Arc::clone(&slot), source, INTERVAL),
            INTERVAL,
        )
        .unwrap();

        // --- Execution ---
        worker.start();
        let lines = drain(&slot, 3);
        worker.cancel();

        // --- Verification ---
        assert_eq!(lines, vec!["ls\n", " ", "pwd\n"]);
        assert_eq!(worker.result_code(), Some(0));
    }

    #[test]
    fn test_reader_waits_while_slot_full() {
        let slot = Arc::new(Monitor::new(CommandSlot::new(8)));
        let source = ScriptedSource::new(vec![ok(b"a\n"), ok(b"b\n")]);
        let worker = Worker::spawn(
            ReadRoutine::new(Arc::clone(&slot), source, INTERVAL),
            INTERVAL,
        )
        .unwrap();
        worker.start();

        thread::sleep(INTERVAL * 5);
        assert_eq!(slot.enter().line(), "a\n");

        let lines = drain(&slot, 2);
        worker.cancel();

        assert_eq!(lines, vec!["a\n", "b\n"]);
    }

    #[test]
    fn test_read_error_ends_reader_with_os_code() {
        let slot = Arc::new(Monitor::new(CommandSlot::new(8)));
        let source =
            ScriptedSource::new(vec![Err(io::Error::from_raw_os_error(libc::EIO))]);
        let worker = Worker::spawn(
            ReadRoutine::new(Arc::clone(&slot), source, INTERVAL),
            INTERVAL,
        )
        .unwrap();

        worker.start();

        assert_eq!(worker.join(), libc::EIO);
        assert!(slot.enter().is_empty());
    }

    #[test]
    fn test_cancel_wakes_reader_blocked_on_full_slot() {
        let slot = Arc::new(Monitor::new(CommandSlot::new(8)));
        slot.enter().fill(b"held\n");
        let source = ScriptedSource::new(vec![ok(b"next\n")]);
        let worker = Worker::spawn(
            ReadRoutine::new(Arc::clone(&slot), source, Duration::from_secs(5)),
            Duration::from_secs(5),
        )
        .unwrap();
        worker.start();
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        worker.cancel();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(slot.enter().line(), "held\n");
    }
}
