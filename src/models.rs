// src/models.rs

use crate::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PROMPT, DEFAULT_SLOT_CAPACITY, NULL_DEVICE,
};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// --- WORKER MODELS ---

/// Unique, monotonically assigned identity of a worker. Used for thread names
/// and log lines only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a cancellable worker. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    /// The handle exists; the OS thread has not reported in yet.
    Created,
    /// The OS thread is running its setup. Cancellation is not observed here.
    Initializing,
    /// Ready; waiting for the owner to call `start()`.
    WaitingToStart,
    /// `on_start` and the main loop are executing.
    Running,
    /// The main loop returned or observed cancellation; `on_finish` and the
    /// finish observers are being run.
    Finishing,
    /// Everything has run; the result code is final.
    Terminated,
}

/// Which of the two long-lived workers produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    /// Captures terminal input into the command slot.
    Reader,
    /// Drains the command slot and runs commands.
    Executor,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Executor => write!(f, "executor"),
        }
    }
}

/// Emitted exactly once by a worker when it reaches its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishEvent {
    pub role: WorkerRole,
    pub id: WorkerId,
    pub code: i32,
}

// --- COMMAND MODELS ---

/// Direction of a redirect relative to the child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectDirection {
    /// `< file`: the file becomes the child's standard input.
    Input,
    /// `> file`: the file becomes the child's standard output.
    Output,
}

/// One `<` or `>` clause, in the order it appeared on the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub direction: RedirectDirection,
    pub target: String,
}

/// A command line broken down by the executor's grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The program token exactly as typed.
    pub program: String,
    /// Program token followed by the raw argument text; this is what gets
    /// handed to word expansion.
    pub command_line: String,
    /// Argument tokens, left to right.
    pub arguments: Vec<String>,
    /// Redirect clauses, left to right. When several share a direction, the
    /// last one wins.
    pub redirects: Vec<Redirect>,
    /// Trailing `&`: do not wait for the child.
    pub background: bool,
}

impl ParsedCommand {
    pub fn redirects_input(&self) -> bool {
        self.redirects
            .iter()
            .any(|r| r.direction == RedirectDirection::Input)
    }

    pub fn redirects_output(&self) -> bool {
        self.redirects
            .iter()
            .any(|r| r.direction == RedirectDirection::Output)
    }
}

/// What one line taken from the command slot asks the executor to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Only whitespace: print the prompt again.
    Blank,
    /// `exit`: end the executor's loop, and with it the session.
    Exit,
    /// Matches no grammar form.
    Invalid,
    /// A program to run.
    Command(ParsedCommand),
}

// --- CONFIGURATION MODELS (FOR TOML) ---

/// Settings of a shell session, as read from `config.toml`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    /// Printed before every read of a command.
    pub prompt: String,
    /// Size in bytes of the command slot. Lines of this length or longer are
    /// rejected.
    pub slot_capacity: usize,
    /// Upper bound on how long any worker goes without checking for
    /// cancellation.
    pub poll_interval_ms: u64,
    /// Where background commands read from and write to when not redirected.
    pub null_device: PathBuf,
}

impl ShellConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            null_device: PathBuf::from(NULL_DEVICE),
        }
    }
}
