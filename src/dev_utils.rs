// src/dev_utils.rs

use std::time::Instant;

/// Logs the wall time of the enclosing scope at debug level when dropped.
/// The executor wraps every foreground wait in one.
#[derive(Debug)]
pub struct BlockTimer {
    name: String,
    start: Instant,
}

impl BlockTimer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for BlockTimer {
    fn drop(&mut self) {
        log::debug!(
            "{} took {} ms",
            self.name,
            self.start.elapsed().as_millis()
        );
    }
}
