// src/system/input.rs

//! Where the reader gets its bytes from.
//!
//! The reader never blocks in a bare `read`: it first waits for readiness with
//! a timeout, so it can reach a cancellation point at least once per poll
//! interval.

use crate::system::sys::{self, PollOutcome};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Result of waiting for input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A `read` will not block.
    Ready,
    /// Nothing arrived within the timeout.
    Timeout,
    /// The source is temporarily gone, e.g. the executor closed standard
    /// input while a command runs. Worth retrying shortly.
    Detached,
}

/// A readiness-polled byte source.
pub trait InputSource: Send {
    /// Waits up to `timeout` for input.
    fn poll_ready(&mut self, timeout: Duration) -> io::Result<Readiness>;

    /// Reads at most `buf.len()` bytes. Only called after [`Readiness::Ready`].
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// The process's standard input, used through its raw descriptor so that no
/// userspace buffering hides lines from readiness polling.
#[derive(Debug, Default)]
pub struct StdinSource;

impl StdinSource {
    const FD: RawFd = sys::STDIN_FD;
}

impl InputSource for StdinSource {
    fn poll_ready(&mut self, timeout: Duration) -> io::Result<Readiness> {
        match sys::poll_readable(Self::FD, timeout) {
            Ok(PollOutcome::Readable) => Ok(Readiness::Ready),
            Ok(PollOutcome::TimedOut) => Ok(Readiness::Timeout),
            Ok(PollOutcome::Closed) => Ok(Readiness::Detached),
            // A signal landed on this thread; the next poll picks up where we were.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Readiness::Timeout),
            Err(e) => Err(e),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match sys::read(Self::FD, buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::EBADF) => return Ok(0),
                other => return other,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::VecDeque;
    use std::thread;

    /// Hands out scripted chunks, then times out forever.
    pub(crate) struct ScriptedSource {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                chunks: chunks.into(),
            }
        }
    }

    pub(crate) fn ok(chunk: &[u8]) -> io::Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }

    impl InputSource for ScriptedSource {
        fn poll_ready(&mut self, timeout: Duration) -> io::Result<Readiness> {
            if self.chunks.is_empty() {
                thread::sleep(timeout);
                Ok(Readiness::Timeout)
            } else {
                Ok(Readiness::Ready)
            }
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_scripted_source_truncates_to_buffer() {
        let mut source = ScriptedSource::new(vec![ok(b"abcdef")]);
        let mut buf = [0u8; 4];
        assert_eq!(source.poll_ready(Duration::ZERO).unwrap(), Readiness::Ready);
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(
            source.poll_ready(Duration::from_millis(1)).unwrap(),
            Readiness::Timeout
        );
    }
}
