//! tandem: a minimal interactive shell driven by two cooperating workers.
//!
//! A reader worker captures lines from the terminal into a single-slot buffer,
//! and an executor worker drains that slot, parses the line and runs it as a
//! child process. The [`system::shell::ShellService`] owns both workers and
//! turns the first one to finish into the session's exit code.

include!(concat!(env!("OUT_DIR"), "/messages.rs"));

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared cancellation flag, checked only at explicit cancellation points.
pub type CancellationToken = Arc<AtomicBool>;

/// Result code of a worker, a child process or the whole session.
pub type ExitCode = i32;

pub mod cli;
pub mod constants;
pub mod core;
pub mod dev_utils;
pub mod models;
pub mod system;
