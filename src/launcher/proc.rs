//! Handle to a spawned worker process and its pipes.

use super::ipc::{LineReader, LineWriter, PipeFd};
use super::protocol::{HostMessage, WorkerMessage};
use super::signals::{TerminationReason, analyze_wait_status};
use super::types::ProcessId;
use crate::error::{Result, WardenError};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use std::io;
use std::time::{Duration, Instant};

/// Interval between exit checks while waiting for a graceful stop.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(100);

/// A worker subprocess with line IPC over its stdin/stdout.
pub struct Proc {
    pid: Pid,
    writer: LineWriter,
    reader: LineReader,
    /// Set once the process has been reaped.
    exit: Option<TerminationReason>,
    /// Whether we sent SIGKILL ourselves.
    killed: bool,
}

impl Proc {
    /// Take over a spawned `std::process::Child`, including its stdin/stdout.
    pub fn from_child(mut child: std::process::Child) -> Result<Self> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WardenError::Worker("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WardenError::Worker("Child stdout not captured".into()))?;

        Ok(Self {
            pid,
            writer: LineWriter::new(PipeFd::from(stdin)),
            reader: LineReader::new(PipeFd::from(stdout)),
            exit: None,
            killed: false,
        })
    }

    pub fn pid(&self) -> ProcessId {
        self.pid.as_raw() as ProcessId
    }

    /// Send a message to the worker.
    pub fn send(&mut self, message: &HostMessage) -> Result<()> {
        let line = message.to_line()?;
        self.writer
            .write_line(&line)
            .map_err(|e| WardenError::Worker(format!("Failed to send to worker: {}", e)))
    }

    /// Receive the next message, waiting at most `timeout`.
    ///
    /// Returns `None` if the worker closed its stdout.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WorkerMessage>> {
        match self.reader.read_line_timeout(timeout) {
            Ok(Some(line)) => {
                let message = WorkerMessage::from_line(&line)
                    .map_err(|e| WardenError::Worker(format!("Invalid worker message: {}", e)))?;
                Ok(Some(message))
            }
            Ok(None) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(WardenError::Handshake(format!(
                "no response from worker {} within {:?}",
                self.pid, timeout
            ))),
            Err(e) => Err(WardenError::Worker(format!(
                "Failed to receive from worker: {}",
                e
            ))),
        }
    }

    /// Reap the process if it has exited (non-blocking).
    pub fn try_wait(&mut self) -> Option<TerminationReason> {
        if self.exit.is_some() {
            return self.exit;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => {
                let reason = analyze_wait_status(status, self.killed)?;
                self.exit = Some(reason);
                self.exit
            }
            // Someone else reaped it.
            Err(Errno::ECHILD) => {
                self.exit = Some(TerminationReason::Unknown);
                self.exit
            }
            Err(e) => {
                tracing::debug!(pid = self.pid.as_raw(), error = %e, "waitpid failed");
                None
            }
        }
    }

    /// Block until the process exits.
    fn wait(&mut self) -> TerminationReason {
        if let Some(reason) = self.exit {
            return reason;
        }
        let reason = loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(reason) = analyze_wait_status(status, self.killed) {
                        break reason;
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(_) => break TerminationReason::Unknown,
            }
        };
        self.exit = Some(reason);
        reason
    }

    /// SIGKILL the process and reap it.
    pub fn kill(&mut self) -> TerminationReason {
        if let Some(reason) = self.exit {
            return reason;
        }
        self.killed = true;
        if let Err(e) = signal::kill(self.pid, Signal::SIGKILL) {
            tracing::debug!(pid = self.pid.as_raw(), error = %e, "SIGKILL failed");
        }
        self.wait()
    }

    /// Ask the worker to exit, escalating to SIGTERM and then SIGKILL.
    pub fn stop(&mut self, timeout: Duration) -> TerminationReason {
        if let Some(reason) = self.try_wait() {
            return reason;
        }

        let _ = self.send(&HostMessage::Exit);

        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(reason) = self.try_wait() {
                return reason;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }

        let _ = signal::kill(self.pid, Signal::SIGTERM);
        std::thread::sleep(TERM_GRACE);
        if let Some(reason) = self.try_wait() {
            return reason;
        }

        self.kill()
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if self.exit.is_none() {
            self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn spawn(program: &str, args: &[&str]) -> Proc {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn");
        Proc::from_child(child).expect("Failed to create Proc")
    }

    #[test]
    fn test_try_wait_running_then_killed() {
        let mut proc = spawn("sleep", &["60"]);
        assert_eq!(proc.try_wait(), None);

        assert_eq!(proc.kill(), TerminationReason::Killed);
        assert_eq!(proc.try_wait(), Some(TerminationReason::Killed));
    }

    #[test]
    fn test_stop_escalates_when_exit_is_ignored() {
        // `sleep` ignores stdin, so the exit message does nothing and SIGTERM ends it.
        let mut proc = spawn("sleep", &["60"]);
        let reason = proc.stop(Duration::from_millis(50));
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGTERM));
    }

    #[test]
    fn test_recv_from_echoing_process() {
        let mut proc = spawn("sh", &["-c", "echo '{\"type\":\"ready\",\"pid\":7}'; sleep 5"]);
        let message = proc.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(message, Some(WorkerMessage::Ready { pid: 7 }));
    }

    #[test]
    fn test_recv_timeout_is_handshake_error() {
        let mut proc = spawn("sleep", &["60"]);
        let err = proc.recv_timeout(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, WardenError::Handshake(_)));
    }

    #[test]
    fn test_exit_code_reported() {
        let mut proc = spawn("sh", &["-c", "exit 3"]);
        let deadline = Instant::now() + Duration::from_secs(5);
        let reason = loop {
            if let Some(reason) = proc.try_wait() {
                break reason;
            }
            assert!(Instant::now() < deadline, "process did not exit");
            std::thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(reason, TerminationReason::Exited(3));
    }
}
