// src/system/sys.rs

//! Thin wrappers over the `libc` calls the shell needs: descriptor
//! duplication, readiness polling, signal masks and signal dispositions.
//!
//! Every function here turns a `-1` return into [`io::Error::last_os_error`],
//! so callers only ever see `io::Result`.
#![allow(unsafe_code)]

use std::io;
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::ptr;
use std::time::Duration;

pub const STDIN_FD: RawFd = libc::STDIN_FILENO;
pub const STDOUT_FD: RawFd = libc::STDOUT_FILENO;

fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

// --- Descriptors ---

/// Duplicates `fd` onto the lowest free descriptor, close-on-exec.
pub fn dup_cloexec(fd: RawFd) -> io::Result<RawFd> {
    // SAFETY: F_DUPFD_CLOEXEC only reads `fd` and allocates a new descriptor.
    check(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) })
}

/// Makes `target` refer to the same open file as `source`.
pub fn dup2(source: RawFd, target: RawFd) -> io::Result<()> {
    loop {
        // SAFETY: dup2 has no memory-safety preconditions.
        match check(unsafe { libc::dup2(source, target) }) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Closes `fd`. The descriptor number is free for reuse afterwards, even when
/// an error is reported.
pub fn close(fd: RawFd) -> io::Result<()> {
    // SAFETY: callers only close descriptors they own.
    check(unsafe { libc::close(fd) }).map(drop)
}

/// Outcome of waiting for a descriptor to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Data (or end of file) can be read without blocking.
    Readable,
    TimedOut,
    /// The descriptor is not open right now.
    Closed,
}

/// Waits up to `timeout` for `fd` to become readable.
pub fn poll_readable(fd: RawFd, timeout: Duration) -> io::Result<PollOutcome> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
    let ready = check(unsafe { libc::poll(&mut pfd, 1, millis) })?;
    if ready == 0 {
        Ok(PollOutcome::TimedOut)
    } else if pfd.revents & libc::POLLNVAL != 0 {
        Ok(PollOutcome::Closed)
    } else {
        Ok(PollOutcome::Readable)
    }
}

/// Reads once from `fd` into `buf`, returning the byte count (0 at end of file).
pub fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: the pointer and length describe `buf`, which outlives the call.
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        usize::try_from(n).map_err(io::Error::other)
    }
}

// --- Signals ---

fn sigchld_set() -> io::Result<libc::sigset_t> {
    // SAFETY: sigemptyset initialises the zeroed set before sigaddset reads it.
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        check(libc::sigemptyset(&mut set))?;
        check(libc::sigaddset(&mut set, libc::SIGCHLD))?;
        Ok(set)
    }
}

fn change_mask(how: libc::c_int, set: &libc::sigset_t) -> io::Result<()> {
    // SAFETY: `set` is initialised; the old mask is not requested.
    let ret = unsafe { libc::pthread_sigmask(how, set, ptr::null_mut()) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(ret))
    }
}

/// Blocks SIGCHLD for the calling thread. Threads spawned afterwards inherit
/// the mask.
pub fn block_sigchld() -> io::Result<()> {
    change_mask(libc::SIG_BLOCK, &sigchld_set()?)
}

/// Unblocks SIGCHLD for the calling thread. A pending SIGCHLD is delivered
/// before this returns.
pub fn unblock_sigchld() -> io::Result<()> {
    change_mask(libc::SIG_UNBLOCK, &sigchld_set()?)
}

/// Atomically unblocks SIGCHLD and sleeps until a signal handler has run, then
/// restores the calling thread's mask.
///
/// Call with SIGCHLD blocked, after checking the condition the handler
/// updates: a child that exits between the check and the suspend still wakes
/// the caller.
pub fn suspend_for_sigchld() {
    // SAFETY: the current mask is read into an initialised set, SIGCHLD is
    // removed from it, and sigsuspend only reads it.
    unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut mask);
        libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), &mut mask);
        libc::sigdelset(&mut mask, libc::SIGCHLD);
        // Always returns -1 with EINTR once a handler ran.
        libc::sigsuspend(&mask);
    }
}

/// Reaps one exited child without blocking.
///
/// Returns `None` when no child has exited (or there are no children left).
/// Async-signal-safe.
pub fn try_reap_child() -> Option<(libc::pid_t, libc::c_int)> {
    let mut status: libc::c_int = 0;
    // SAFETY: `status` is a valid out-pointer; WNOHANG never blocks.
    let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
    if pid > 0 { Some((pid, status)) } else { None }
}

/// Translates a wait status into a shell-style result code: the exit code, or
/// 128 plus the signal number for a killed child.
pub fn status_code(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        status
    }
}

/// How a process reacts to SIGINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigintDisposition {
    Default,
    Ignore,
}

impl SigintDisposition {
    fn handler(self) -> libc::sighandler_t {
        match self {
            Self::Default => libc::SIG_DFL,
            Self::Ignore => libc::SIG_IGN,
        }
    }
}

/// Sets the SIGINT disposition of the whole process.
pub fn set_sigint_disposition(disposition: SigintDisposition) -> io::Result<()> {
    // SAFETY: SIG_DFL and SIG_IGN are not function pointers; no handler code runs.
    let previous = unsafe { libc::signal(libc::SIGINT, disposition.handler()) };
    if previous == libc::SIG_ERR {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Makes the child spawned from `command` start with the given SIGINT
/// disposition.
pub fn child_sigint(command: &mut Command, disposition: SigintDisposition) {
    let handler = disposition.handler();
    // SAFETY: the closure runs between fork and exec and only calls
    // `signal`, which is async-signal-safe. It allocates nothing.
    unsafe {
        command.pre_exec(move || {
            if libc::signal(libc::SIGINT, handler) == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}
