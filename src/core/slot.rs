// src/core/slot.rs

//! The single-slot buffer handing one command line from the reader to the
//! executor.
//!
//! The slot is either empty or full. The reader fills it only when empty, the
//! executor drains it only when full, and both do so inside the slot's
//! [`Monitor`](crate::core::monitor::Monitor), so the two strictly alternate.

use std::borrow::Cow;

/// Fixed-size byte storage plus the length of the line currently held.
#[derive(Debug, Clone)]
pub struct CommandSlot {
    storage: Box<[u8]>,
    filled: usize,
}

impl CommandSlot {
    /// Creates an empty slot able to hold `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Empty means "no line waiting": nothing published, or a line whose first
    /// byte is the terminator.
    pub fn is_empty(&self) -> bool {
        self.filled == 0 || self.storage.first().is_none_or(|b| *b == 0)
    }

    pub fn is_full(&self) -> bool {
        !self.is_empty()
    }

    /// The whole storage, for reading input straight into the slot.
    ///
    /// Only meaningful while the slot is empty; the bytes become visible to the
    /// executor with [`publish`](Self::publish).
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Marks the first `len` bytes of the storage as the waiting line.
    pub fn publish(&mut self, len: usize) {
        self.filled = len.min(self.storage.len());
    }

    /// Copies `line` into the slot and publishes it. Longer input is cut to the
    /// capacity.
    pub fn fill(&mut self, line: &[u8]) {
        let mut len = 0;
        for (dst, src) in self.storage.iter_mut().zip(line) {
            *dst = *src;
            len += 1;
        }
        self.publish(len);
    }

    /// Returns the waiting line, up to the first terminator byte. Invalid UTF-8
    /// is replaced rather than rejected; the line is parsed as text anyway.
    pub fn line(&self) -> Cow<'_, str> {
        let bytes = self.storage.get(..self.filled).unwrap_or_default();
        let line = bytes.split(|b| *b == 0).next().unwrap_or_default();
        String::from_utf8_lossy(line)
    }

    /// Drains the slot, returning the line it held.
    pub fn take(&mut self) -> String {
        let line = self.line().into_owned();
        self.clear();
        line
    }

    /// Empties the slot and zeroes the storage.
    pub fn clear(&mut self) {
        self.storage.fill(0);
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::Monitor;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_slot_is_empty() {
        let slot = CommandSlot::new(8);
        assert!(slot.is_empty());
        assert!(!slot.is_full());
        assert_eq!(slot.capacity(), 8);
    }

    #[test]
    fn test_publish_then_take_empties_slot() {
        let mut slot = CommandSlot::new(16);
        slot.storage_mut()[..8].copy_from_slice(b"echo hi\n");
        slot.publish(8);

        assert!(slot.is_full());
        assert_eq!(slot.take(), "echo hi\n");
        assert!(slot.is_empty());
        assert!(slot.storage_mut().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_leading_terminator_counts_as_empty() {
        let mut slot = CommandSlot::new(8);
        slot.fill(b"\0ls\n");
        assert!(slot.is_empty());
    }

    #[test]
    fn test_line_stops_at_terminator() {
        let mut slot = CommandSlot::new(16);
        slot.fill(b"ls\0junk");
        assert_eq!(slot.line(), "ls");
    }

    #[test]
    fn test_fill_truncates_to_capacity() {
        let mut slot = CommandSlot::new(4);
        slot.fill(b"abcdef");
        assert_eq!(slot.line(), "abcd");
    }

    #[test]
    fn test_producer_and_consumer_strictly_alternate() {
        // --- Setup ---
        let monitor = Arc::new(Monitor::new(CommandSlot::new(32)));
        let lines: Vec<String> = (0..50).map(|i| format!("cmd {i}\n")).collect();
        let interval = Duration::from_millis(50);

        let producer = {
            let monitor = Arc::clone(&monitor);
            let lines = lines.clone();
            thread::spawn(move || {
                for line in lines {
                    let mut slot = monitor.enter();
                    while slot.is_full() {
                        slot = slot.wait(interval);
                    }
                    slot.fill(line.as_bytes());
                    slot.signal();
                }
            })
        };

        // --- Execution ---
        let mut received = Vec::new();
        while received.len() < lines.len() {
            let mut slot = monitor.enter();
            while slot.is_empty() {
                slot = slot.wait(interval);
            }
            received.push(slot.take());
            slot.signal();
        }
        producer.join().unwrap();

        // --- Verification ---
        assert_eq!(received, lines);
    }
}
