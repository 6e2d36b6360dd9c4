// src/system/executor.rs

//! # Executor Worker
//!
//! Prints the prompt, takes the next line from the [`CommandSlot`], parses it
//! and runs it as a child process.
//!
//! For every command:
//! 1. Expand the words and open the redirect files (in the order they were
//!    typed, so the last redirect of each direction wins).
//! 2. Block SIGCHLD and launch the child.
//! 3. Close our own stdin/stdout so the terminal belongs to the child.
//! 4. Foreground: suspend until the reaper reports the child's exit.
//!    Background: return immediately; the reaper collects it later.
//! 5. Unblock SIGCHLD and restore stdin/stdout from the copies saved at
//!    startup.

use crate::{
    ExitCode,
    constants::REDIRECT_FILE_MODE,
    core::monitor::Monitor,
    core::parser,
    core::slot::CommandSlot,
    core::worker::{CancelHook, Routine, WorkerContext, WorkerError},
    dev_utils::BlockTimer,
    models::{CommandLine, ParsedCommand, RedirectDirection, ShellConfig},
    system::expansion::{ExpansionError, WordExpander},
    system::reaper::Reaper,
    system::sys::{self, SigintDisposition, STDIN_FD, STDOUT_FD},
};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::RawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A command that could not be launched. The session goes on.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to expand '{line}': {source}")]
    Expansion {
        line: String,
        #[source]
        source: ExpansionError,
    },
    #[error("Failed to open '{path}' for stdout: {source}")]
    RedirectOut {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open '{path}' for stdin: {source}")]
    RedirectIn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// The one-line diagnostic shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Expansion { line, source } => {
                format!(t!("executor.error.expansion"), line = line, error = source)
            }
            Self::RedirectOut { path, source } => format!(
                t!("executor.error.redirect_out"),
                path = path.display(),
                error = source
            ),
            Self::RedirectIn { path, source } => format!(
                t!("executor.error.redirect_in"),
                path = path.display(),
                error = source
            ),
            Self::Spawn { program, source } => {
                format!(t!("executor.error.launch"), program = program, error = source)
            }
        }
    }
}

/// The executor's own stdin and stdout, duplicated at startup.
#[derive(Debug)]
struct SavedStdio {
    stdin: RawFd,
    stdout: RawFd,
}

impl SavedStdio {
    fn save() -> io::Result<Self> {
        let stdin = sys::dup_cloexec(STDIN_FD)?;
        let stdout = match sys::dup_cloexec(STDOUT_FD) {
            Ok(fd) => fd,
            Err(e) => {
                let _ = sys::close(stdin);
                return Err(e);
            }
        };
        Ok(Self { stdin, stdout })
    }

    fn restore(&self) -> io::Result<()> {
        sys::dup2(self.stdin, STDIN_FD)?;
        sys::dup2(self.stdout, STDOUT_FD)
    }
}

impl Drop for SavedStdio {
    fn drop(&mut self) {
        let _ = sys::close(self.stdin);
        let _ = sys::close(self.stdout);
    }
}

/// The executor's main loop, driven by a [`Worker`](crate::core::worker::Worker).
pub struct ExecuteRoutine<E: WordExpander> {
    slot: Arc<Monitor<CommandSlot>>,
    expander: E,
    prompt: String,
    null_device: PathBuf,
    poll_interval: Duration,
    saved: Option<SavedStdio>,
    reaper: Option<Reaper>,
}

impl<E: WordExpander> std::fmt::Debug for ExecuteRoutine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteRoutine")
            .field("prompt", &self.prompt)
            .field("null_device", &self.null_device)
            .field("saved", &self.saved)
            .finish()
    }
}

impl<E: WordExpander> ExecuteRoutine<E> {
    pub fn new(slot: Arc<Monitor<CommandSlot>>, expander: E, config: &ShellConfig) -> Self {
        Self {
            slot,
            expander,
            prompt: config.prompt.clone(),
            null_device: config.null_device.clone(),
            poll_interval: config.poll_interval(),
            saved: None,
            reaper: None,
        }
    }

    fn print_prompt(&self) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout
            .write_all(self.prompt.as_bytes())
            .and_then(|()| stdout.flush())
        {
            log::trace!("Could not print prompt: {}", e);
        }
    }

    /// Waits for the reader to publish a line and takes it. The slot is
    /// emptied and the reader woken before the line is acted upon.
    fn next_line(&self, ctx: &WorkerContext) -> Result<String, WorkerError> {
        let mut slot = self.slot.enter();
        while slot.is_empty() {
            ctx.cancel_point()?;
            slot = slot.wait(self.poll_interval);
        }
        let line = slot.take();
        slot.signal();
        Ok(line)
    }

    /// Builds the process to launch: argument vector, redirected streams and
    /// SIGINT disposition. Nothing is started yet.
    fn prepare(&self, parsed: &ParsedCommand) -> Result<Command, LaunchError> {
        // 1. Word expansion.
        let words = self
            .expander
            .expand(&parsed.command_line)
            .map_err(|e| LaunchError::Expansion {
                line: parsed.command_line.clone(),
                source: e,
            })?;
        let Some((program, args)) = words.split_first() else {
            return Err(LaunchError::Expansion {
                line: parsed.command_line.clone(),
                source: ExpansionError::Empty,
            });
        };
        let mut command = Command::new(program);
        command.args(args);

        // 2. Redirects, left to right. Every `>` target is created and
        //    truncated; the last one of each direction is kept.
        let mut stdin: Option<File> = None;
        let mut stdout: Option<File> = None;
        for redirect in &parsed.redirects {
            let path = PathBuf::from(&redirect.target);
            match redirect.direction {
                RedirectDirection::Output => stdout = Some(open_for_output(path)?),
                RedirectDirection::Input => stdin = Some(open_for_input(path)?),
            }
        }

        // 3. Background commands never touch the terminal's streams.
        if parsed.background {
            if !parsed.redirects_input() {
                stdin = Some(open_for_input(self.null_device.clone())?);
            }
            if !parsed.redirects_output() {
                stdout = Some(open_for_output_existing(self.null_device.clone())?);
            }
        }
        if let Some(file) = stdin {
            command.stdin(file);
        }
        if let Some(file) = stdout {
            command.stdout(file);
        }

        // 4. Foreground children get Ctrl+C back; background ones ignore it.
        let disposition = if parsed.background {
            SigintDisposition::Ignore
        } else {
            SigintDisposition::Default
        };
        sys::child_sigint(&mut command, disposition);

        Ok(command)
    }

    /// Runs one parsed command. Only failures that leave the executor unable to
    /// go on are returned; launch problems are reported and swallowed.
    fn execute(&mut self, parsed: &ParsedCommand) -> Result<(), WorkerError> {
        let command = match self.prepare(parsed) {
            Ok(command) => command,
            Err(e) => {
                log::debug!("{}", e);
                eprintln!("{}", e.user_message());
                return Ok(());
            }
        };

        sys::block_sigchld().map_err(|e| WorkerError::io("blocking SIGCHLD", e))?;
        {
            scopeguard::defer! {
                if let Err(e) = sys::unblock_sigchld() {
                    log::error!("Unblocking SIGCHLD failed: {}", e);
                }
            }
            self.launch(parsed, command);
        }
        self.restore_stdio()
    }

    /// Starts the child and, in the foreground, waits for it. Runs with
    /// SIGCHLD blocked and leaves our stdin/stdout closed once the child is up.
    fn launch(&self, parsed: &ParsedCommand, mut command: Command) {
        let spawned = command.spawn();
        // Drops our copies of the redirect files.
        drop(command);
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let error = LaunchError::Spawn {
                    program: parsed.program.clone(),
                    source: e,
                };
                log::debug!("{}", error);
                eprintln!("{}", error.user_message());
                return;
            }
        };
        let pid = child.id();
        // The reaper collects the exit status, never `Child::wait`.
        drop(child);

        log::debug!(
            "Launched '{}' as pid {} ({})",
            parsed.program,
            pid,
            if parsed.background { "background" } else { "foreground" }
        );

        let _ = sys::close(STDIN_FD);
        let _ = sys::close(STDOUT_FD);

        if parsed.background {
            return;
        }
        if let Some(reaper) = &self.reaper {
            let _timer = BlockTimer::new(format!("foreground '{}'", parsed.program));
            reaper.track_foreground(pid);
            let status = reaper.wait_foreground();
            log::debug!(
                "Foreground pid {} finished with code {}",
                pid,
                sys::status_code(status)
            );
        }
    }

    /// Puts our stdin/stdout back. Failing to do so ends the executor.
    fn restore_stdio(&self) -> Result<(), WorkerError> {
        let Some(saved) = &self.saved else {
            return Ok(());
        };
        saved.restore().map_err(|e| {
            eprintln!(t!("executor.error.stdio"), error = e);
            WorkerError::io("restoring stdio", e)
        })
    }
}

fn open_for_output(path: PathBuf) -> Result<File, LaunchError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(REDIRECT_FILE_MODE)
        .open(&path)
        .map_err(|e| LaunchError::RedirectOut { path, source: e })
}

/// Opens an existing sink, such as the null device, without truncating it.
fn open_for_output_existing(path: PathBuf) -> Result<File, LaunchError> {
    OpenOptions::new()
        .write(true)
        .open(&path)
        .map_err(|e| LaunchError::RedirectOut { path, source: e })
}

fn open_for_input(path: PathBuf) -> Result<File, LaunchError> {
    File::open(&path).map_err(|e| LaunchError::RedirectIn { path, source: e })
}

impl<E: WordExpander + 'static> Routine for ExecuteRoutine<E> {
    fn name(&self) -> &'static str {
        "executor"
    }

    fn on_start(&mut self, _ctx: &WorkerContext) -> Result<(), WorkerError> {
        self.saved = Some(SavedStdio::save().map_err(|e| WorkerError::io("saving stdio", e))?);
        self.reaper =
            Some(Reaper::install().map_err(|e| WorkerError::io("installing SIGCHLD handler", e))?);
        // Children are reaped on this thread only.
        sys::unblock_sigchld().map_err(|e| WorkerError::io("unblocking SIGCHLD", e))
    }

    fn run(&mut self, ctx: &WorkerContext) -> Result<ExitCode, WorkerError> {
        loop {
            self.print_prompt();
            ctx.cancel_point()?;
            let line = self.next_line(ctx)?;

            match parser::parse_line(&line) {
                CommandLine::Blank => {}
                CommandLine::Exit => {
                    log::debug!("exit requested");
                    return Ok(0);
                }
                CommandLine::Invalid => eprintln!(t!("executor.error.invalid_command")),
                CommandLine::Command(parsed) => self.execute(&parsed)?,
            }
        }
    }

    fn on_finish(&mut self) {
        let _ = sys::block_sigchld();
        self.reaper = None;
        self.saved = None;
    }

    fn cancel_hook(&self) -> Option<CancelHook> {
        let slot = Arc::clone(&self.slot);
        Some(Box::new(move || slot.signal()))
    }
}
