//! # System Interaction Layer
//!
//! Everything that touches the operating system: terminal input, processes,
//! descriptors and signals.
//!
//! ## Modules
//!
//! - **`sys`**: the `libc` calls, wrapped into `io::Result` functions.
//! - **`input`**: readiness-polled input sources for the reader.
//! - **`reader`**: the reader worker, terminal input into the command slot.
//! - **`expansion`**: word expansion of a command's text into an argument vector.
//! - **`reaper`**: the SIGCHLD handler that collects exited children.
//! - **`executor`**: the executor worker, command slot into child processes.
//! - **`shell`**: the session owning both workers.

pub mod executor;
pub mod expansion;
pub mod input;
pub mod reader;
pub mod reaper;
pub mod shell;
pub mod sys;
