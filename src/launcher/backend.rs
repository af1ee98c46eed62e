//! The OS boundary of the launcher.
//!
//! [`ServiceBackend`] creates connected workers and [`ServiceHandle`] controls
//! one of them. The launcher core only talks to these traits, which keeps every
//! blocking OS call on helper threads and lets tests substitute a scripted
//! backend.

use super::proc::Proc;
use super::protocol::{HostMessage, WorkerMessage};
use super::signals::TerminationReason;
use super::spawn::spawn_worker;
use super::types::{BindingStrength, LaunchRequest, ProcessId, WorkerClass};
use crate::config::{HostConfig, KeepAliveScores};
use crate::error::{Result, WardenError};
use std::path::PathBuf;
use std::time::Duration;

/// Creates worker connections. Called from launcher helper threads.
pub trait ServiceBackend: Send + Sync {
    /// Start a worker of `class` and wait for its handshake.
    fn connect(&self, class: WorkerClass) -> Result<Box<dyn ServiceHandle>>;
}

/// A connected worker.
pub trait ServiceHandle: Send {
    fn pid(&self) -> ProcessId;

    /// Hand the launch parameters to the worker and wait for it to accept them.
    fn setup(&mut self, request: &LaunchRequest) -> Result<()>;

    /// Apply a keep-alive strength to the process.
    fn set_keep_alive(&mut self, strength: BindingStrength);

    /// Kill the worker immediately and reap it.
    fn kill(&mut self) -> TerminationReason;

    /// Ask the worker to exit, escalating if it does not.
    fn stop(&mut self) -> TerminationReason;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> Option<TerminationReason>;
}

/// Backend that runs workers as subprocesses of the warden binary.
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    executable: PathBuf,
    handshake_timeout: Duration,
    stop_timeout: Duration,
    scores: KeepAliveScores,
}

impl SubprocessBackend {
    pub fn new(executable: PathBuf, config: &HostConfig) -> Self {
        Self {
            executable,
            handshake_timeout: config.handshake_timeout(),
            stop_timeout: config.stop_timeout(),
            scores: config.keep_alive,
        }
    }
}

impl ServiceBackend for SubprocessBackend {
    fn connect(&self, class: WorkerClass) -> Result<Box<dyn ServiceHandle>> {
        let mut proc = spawn_worker(&self.executable, class)?;
        let spawned = proc.pid();

        match proc.recv_timeout(self.handshake_timeout)? {
            Some(WorkerMessage::Ready { pid }) if pid == spawned => {}
            Some(WorkerMessage::Ready { pid }) => {
                return Err(WardenError::Handshake(format!(
                    "worker {} announced itself as pid {}",
                    spawned, pid
                )));
            }
            Some(other) => {
                return Err(WardenError::Handshake(format!(
                    "worker {} sent {:?} before ready",
                    spawned, other
                )));
            }
            None => {
                return Err(WardenError::Handshake(format!(
                    "worker {} exited before ready",
                    spawned
                )));
            }
        }

        tracing::debug!(pid = spawned, %class, "Worker connected");
        Ok(Box::new(SubprocessHandle {
            proc,
            handshake_timeout: self.handshake_timeout,
            stop_timeout: self.stop_timeout,
            scores: self.scores,
        }))
    }
}

struct SubprocessHandle {
    proc: Proc,
    handshake_timeout: Duration,
    stop_timeout: Duration,
    scores: KeepAliveScores,
}

impl ServiceHandle for SubprocessHandle {
    fn pid(&self) -> ProcessId {
        self.proc.pid()
    }

    fn setup(&mut self, request: &LaunchRequest) -> Result<()> {
        self.proc.send(&HostMessage::setup(
            request.command_line(),
            request.resources(),
        ))?;
        match self.proc.recv_timeout(self.handshake_timeout)? {
            Some(WorkerMessage::Started) => Ok(()),
            Some(WorkerMessage::Error { message }) => Err(WardenError::Handshake(message)),
            Some(other) => Err(WardenError::Handshake(format!(
                "unexpected reply to setup: {:?}",
                other
            ))),
            None => Err(WardenError::Handshake(
                "worker exited during setup".to_string(),
            )),
        }
    }

    fn set_keep_alive(&mut self, strength: BindingStrength) {
        apply_oom_score(self.proc.pid(), self.scores.score_for(strength));
    }

    fn kill(&mut self) -> TerminationReason {
        self.proc.kill()
    }

    fn stop(&mut self) -> TerminationReason {
        self.proc.stop(self.stop_timeout)
    }

    fn try_wait(&mut self) -> Option<TerminationReason> {
        self.proc.try_wait()
    }
}

/// Write `/proc/<pid>/oom_score_adj`. Best effort: lowering a score below the
/// process's current value needs privileges we usually do not have.
#[cfg(target_os = "linux")]
fn apply_oom_score(pid: ProcessId, score: i32) {
    let path = format!("/proc/{}/oom_score_adj", pid);
    if let Err(e) = std::fs::write(&path, score.to_string()) {
        tracing::debug!(pid, score, error = %e, "Could not set oom_score_adj");
    } else {
        tracing::trace!(pid, score, "Set oom_score_adj");
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_oom_score(pid: ProcessId, score: i32) {
    tracing::trace!(pid, score, "Keep-alive scores are only applied on Linux");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for a worker binary.
    fn fake_worker(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-worker");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn backend(executable: PathBuf) -> SubprocessBackend {
        let config = HostConfig {
            handshake_timeout_ms: 2_000,
            stop_timeout_ms: 100,
            ..HostConfig::default()
        };
        SubprocessBackend::new(executable, &config)
    }

    #[test]
    fn test_connect_and_setup_with_scripted_worker() {
        let dir = TempDir::new().unwrap();
        let exe = fake_worker(
            &dir,
            r#"echo "{\"type\":\"ready\",\"pid\":$$}"
read line
echo '{"type":"started"}'
read line"#,
        );
        let mut handle = backend(exe).connect(WorkerClass::Sandboxed).unwrap();
        assert!(handle.pid() > 0);

        let request = LaunchRequest::new(WorkerClass::Sandboxed, vec!["--type=test".into()]);
        handle.setup(&request).unwrap();
        assert_eq!(handle.try_wait(), None);

        // The script exits 0 once it reads the exit line.
        assert_eq!(handle.stop(), TerminationReason::Exited(0));
    }

    #[test]
    fn test_pid_mismatch_fails_handshake() {
        let dir = TempDir::new().unwrap();
        let exe = fake_worker(&dir, r#"echo '{"type":"ready","pid":1}'; sleep 5"#);
        let err = match backend(exe).connect(WorkerClass::Sandboxed) {
            Err(e) => e,
            Ok(_) => panic!("handshake should fail"),
        };
        assert!(matches!(err, WardenError::Handshake(_)));
    }

    #[test]
    fn test_worker_exiting_early_fails_handshake() {
        let dir = TempDir::new().unwrap();
        let exe = fake_worker(&dir, "exit 0");
        let err = match backend(exe).connect(WorkerClass::Privileged) {
            Err(e) => e,
            Ok(_) => panic!("handshake should fail"),
        };
        assert!(err.to_string().contains("exited before ready"));
    }

    #[test]
    fn test_setup_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let exe = fake_worker(
            &dir,
            r#"echo "{\"type\":\"ready\",\"pid\":$$}"
read line
echo '{"type":"error","message":"bad resource"}'"#,
        );
        let mut handle = backend(exe).connect(WorkerClass::Sandboxed).unwrap();
        let request = LaunchRequest::new(WorkerClass::Sandboxed, vec![]);
        let err = handle.setup(&request).unwrap_err();
        assert!(err.to_string().contains("bad resource"));
        handle.kill();
    }
}
