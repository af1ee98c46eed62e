//! Line-based IPC over pipes.
//!
//! The reader keeps its own buffer instead of using `BufReader` so that it can
//! wait for a complete line with a deadline: data already buffered is consumed
//! first, and the descriptor is only polled when more bytes are needed.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsFd, BorrowedFd, OwnedFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

/// Bytes requested from the pipe per read.
const READ_CHUNK: usize = 8 * 1024;

/// A pipe end with EINTR-safe `Read`/`Write`.
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Wait until the pipe is readable or `timeout` passes.
    ///
    /// Returns `false` on timeout. Hang-up counts as readable so that the
    /// following read observes EOF.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let ms = remaining.as_millis().min(u16::MAX as u128) as u16;
            let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(ms)) {
                Ok(0) if remaining.is_zero() => return Ok(false),
                Ok(0) => continue,
                Ok(_) => return Ok(true),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl From<std::process::ChildStdin> for PipeFd {
    fn from(stdin: std::process::ChildStdin) -> Self {
        Self::new(OwnedFd::from(stdin))
    }
}

impl From<std::process::ChildStdout> for PipeFd {
    fn from(stdout: std::process::ChildStdout) -> Self {
        Self::new(OwnedFd::from(stdout))
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads newline-terminated lines from a pipe.
pub struct LineReader {
    fd: PipeFd,
    pending: Vec<u8>,
    eof: bool,
}

impl LineReader {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            fd,
            pending: Vec::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Read a line, blocking until one arrives. `None` on EOF.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        self.read_line_until(None)
    }

    /// Read a line, giving up with `ErrorKind::TimedOut` after `timeout`.
    pub fn read_line_timeout(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        self.read_line_until(Some(Instant::now() + timeout))
    }

    fn read_line_until(&mut self, deadline: Option<Instant>) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.eof {
                // A trailing unterminated line still counts.
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(Some(decode(rest)));
            }
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !self.fd.wait_readable(remaining)? {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "timed out waiting for a line",
                    ));
                }
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.fd.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.pending.extend_from_slice(&chunk[..n]);
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(decode(line))
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Writes newline-terminated lines to a pipe.
pub struct LineWriter {
    fd: PipeFd,
}

impl LineWriter {
    pub fn new(fd: PipeFd) -> Self {
        Self { fd }
    }

    /// Write a line, appending a newline if missing.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        if line.ends_with('\n') {
            self.fd.write_all(line.as_bytes())
        } else {
            let mut buf = Vec::with_capacity(line.len() + 1);
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
            self.fd.write_all(&buf)
        }
    }
}
