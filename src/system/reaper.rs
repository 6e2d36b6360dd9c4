// src/system/reaper.rs

//! # Asynchronous Child Reaper
//!
//! A SIGCHLD handler that reaps every exited child without blocking, so
//! background commands never linger as zombies. When the reaped child is the
//! current foreground command, its status is recorded for the executor.
//!
//! The handler runs in signal context: it only calls `waitpid` and touches
//! atomics. It never allocates, locks or logs.
#![allow(unsafe_code)]

use crate::system::sys;
use signal_hook::SigId;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// No foreground child.
const NO_PID: i32 = 0;

#[derive(Debug, Default)]
struct ReapState {
    foreground_pid: AtomicI32,
    exited: AtomicBool,
    status: AtomicI32,
}

impl ReapState {
    fn reap_all(&self) {
        while let Some((pid, status)) = sys::try_reap_child() {
            if pid == self.foreground_pid.load(Ordering::SeqCst) {
                self.status.store(status, Ordering::SeqCst);
                self.foreground_pid.store(NO_PID, Ordering::SeqCst);
                self.exited.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// The installed SIGCHLD handler. Uninstalled on drop.
#[derive(Debug)]
pub struct Reaper {
    state: Arc<ReapState>,
    id: SigId,
}

impl Reaper {
    /// Installs the handler for the whole process.
    pub fn install() -> io::Result<Self> {
        let state = Arc::new(ReapState::default());
        let handler_state = Arc::clone(&state);
        // SAFETY: the action only calls `waitpid` and stores to atomics, all
        // of which are async-signal-safe.
        let id = unsafe {
            signal_hook::low_level::register(signal_hook::consts::SIGCHLD, move || {
                handler_state.reap_all();
            })
        }?;
        log::debug!("SIGCHLD reaper installed");
        Ok(Self { state, id })
    }

    /// Marks `pid` as the foreground child and clears the previous outcome.
    ///
    /// Call with SIGCHLD blocked on every thread, between launching the child
    /// and waiting for it, so its exit cannot be reaped unnoticed.
    pub fn track_foreground(&self, pid: u32) {
        self.state.exited.store(false, Ordering::SeqCst);
        self.state
            .foreground_pid
            .store(i32::try_from(pid).unwrap_or(NO_PID), Ordering::SeqCst);
    }

    pub fn foreground_exited(&self) -> bool {
        self.state.exited.load(Ordering::SeqCst)
    }

    /// Suspends the calling thread until the tracked foreground child has been
    /// reaped, and returns its wait status.
    ///
    /// Must be called with SIGCHLD blocked for the calling thread. This is not
    /// a cancellation point.
    pub fn wait_foreground(&self) -> libc::c_int {
        while !self.foreground_exited() {
            sys::suspend_for_sigchld();
        }
        self.state.status.load(Ordering::SeqCst)
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
        log::debug!("SIGCHLD reaper removed");
    }
}
