// src/core/monitor.rs

//! A monitor: mutual exclusion over a value plus a condition queue with
//! broadcast wake-ups. Every cross-thread handoff in the shell goes through one.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Guards a value of type `T` and lets holders wait for changes made by others.
///
/// Waiters always re-check their own condition after waking up: a wake-up only
/// means "something changed", never "your condition now holds".
#[derive(Debug, Default)]
pub struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    /// Creates a monitor guarding `value`.
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    /// Enters the critical section, blocking until the monitor is free.
    ///
    /// A panic in another holder does not make the monitor unusable; the value
    /// is handed over as-is.
    pub fn enter(&self) -> MonitorGuard<'_, T> {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        MonitorGuard {
            monitor: self,
            guard,
        }
    }

    /// Wakes every thread waiting on this monitor.
    pub fn signal(&self) {
        self.cond.notify_all();
    }
}

/// Proof of being inside the monitor. Leaving the scope exits the monitor.
#[derive(Debug)]
pub struct MonitorGuard<'a, T> {
    monitor: &'a Monitor<T>,
    guard: MutexGuard<'a, T>,
}

impl<'a, T> MonitorGuard<'a, T> {
    /// Exits the monitor, sleeps until a broadcast or until `timeout` elapses,
    /// then re-enters.
    ///
    /// The timeout bounds how long a waiter can go without re-checking its
    /// cancellation flag.
    pub fn wait(self, timeout: Duration) -> Self {
        let MonitorGuard { monitor, guard } = self;
        let (guard, _) = monitor
            .cond
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        MonitorGuard { monitor, guard }
    }

    /// Wakes every thread waiting on this monitor. The caller stays inside.
    pub fn signal(&self) {
        self.monitor.signal();
    }
}

impl<T> Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
