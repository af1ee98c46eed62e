//! Pending launch handles and the per-connection status they read.
//!
//! A connection's pid is published once and never changes; its binding level
//! and death are updated by the launcher sequence through atomics. That lets a
//! [`LaunchHandle`] answer queries from any thread without a round trip to the
//! sequence.

use super::signals::TerminationReason;
use super::types::{BindingStrength, ProcessId, TerminationInfo};
use crate::error::{Result, WardenError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Lifecycle state shared between a connection and its launch handle.
#[derive(Debug)]
pub(crate) struct ConnectionStatus {
    pid: OnceLock<ProcessId>,
    binding: AtomicU8,
    killed_by_host: AtomicBool,
    exit: OnceLock<TerminationReason>,
}

impl ConnectionStatus {
    pub(crate) fn new(binding: BindingStrength) -> Self {
        Self {
            pid: OnceLock::new(),
            binding: AtomicU8::new(binding.to_u8()),
            killed_by_host: AtomicBool::new(false),
            exit: OnceLock::new(),
        }
    }

    pub(crate) fn publish_pid(&self, pid: ProcessId) {
        let _ = self.pid.set(pid);
    }

    pub(crate) fn pid(&self) -> Option<ProcessId> {
        self.pid.get().copied()
    }

    pub(crate) fn set_binding(&self, strength: BindingStrength) {
        self.binding.store(strength.to_u8(), Ordering::Release);
    }

    pub(crate) fn binding(&self) -> BindingStrength {
        BindingStrength::from_u8(self.binding.load(Ordering::Acquire))
    }

    pub(crate) fn mark_killed(&self) {
        self.killed_by_host.store(true, Ordering::Release);
    }

    pub(crate) fn killed_by_host(&self) -> bool {
        self.killed_by_host.load(Ordering::Acquire)
    }

    pub(crate) fn mark_exited(&self, reason: TerminationReason) {
        let _ = self.exit.set(reason);
    }

    pub(crate) fn exit(&self) -> Option<TerminationReason> {
        self.exit.get().copied()
    }

    /// Binding state now, or at death once the worker is gone.
    pub(crate) fn termination_info(&self) -> TerminationInfo {
        TerminationInfo {
            binding_state: self.binding(),
            killed_by_host: self.killed_by_host(),
            reason: self.exit(),
        }
    }
}

type Outcome = std::result::Result<ProcessId, String>;

/// Launcher-side end of a launch: resolves the matching [`LaunchHandle`].
pub(crate) struct LaunchCompletion {
    status: Arc<ConnectionStatus>,
    tx: Sender<Outcome>,
}

impl LaunchCompletion {
    pub(crate) fn new() -> (Self, LaunchHandle) {
        let status = Arc::new(ConnectionStatus::new(BindingStrength::Moderate));
        let (tx, rx) = bounded(1);
        let handle = LaunchHandle {
            status: Arc::clone(&status),
            outcome: rx,
            settled: OnceLock::new(),
        };
        (Self { status, tx }, handle)
    }

    pub(crate) fn status(&self) -> &Arc<ConnectionStatus> {
        &self.status
    }

    pub(crate) fn succeed(self, pid: ProcessId) {
        self.status.publish_pid(pid);
        let _ = self.tx.send(Ok(pid));
    }

    pub(crate) fn fail(self, error: &WardenError) {
        let _ = self.tx.send(Err(error.to_string()));
    }
}

/// Caller-side handle for a launch submitted with `create_and_launch`.
///
/// Dropping it does not cancel the launch.
#[derive(Debug)]
pub struct LaunchHandle {
    status: Arc<ConnectionStatus>,
    outcome: Receiver<Outcome>,
    settled: OnceLock<Outcome>,
}

impl LaunchHandle {
    /// Block until the launch succeeds or fails.
    pub fn wait(&self) -> Result<ProcessId> {
        if let Some(outcome) = self.settled.get() {
            return Self::to_result(outcome);
        }
        match self.outcome.recv() {
            Ok(outcome) => Self::to_result(self.settled.get_or_init(|| outcome)),
            Err(_) => Err(WardenError::SequenceStopped("launcher")),
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout` with `Ok(None)`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<ProcessId>> {
        if let Some(outcome) = self.settled.get() {
            return Self::to_result(outcome).map(Some);
        }
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Self::to_result(self.settled.get_or_init(|| outcome)).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WardenError::SequenceStopped("launcher")),
        }
    }

    /// The worker's pid once the launch has succeeded.
    pub fn pid(&self) -> Option<ProcessId> {
        self.status.pid()
    }

    /// Whether the worker has been reaped.
    pub fn has_exited(&self) -> bool {
        self.status.exit().is_some()
    }

    /// Diagnostics for the worker, or `None` if it never started.
    pub fn termination_info(&self) -> Option<TerminationInfo> {
        self.status.pid()?;
        Some(self.status.termination_info())
    }

    fn to_result(outcome: &Outcome) -> Result<ProcessId> {
        outcome
            .as_ref()
            .copied()
            .map_err(|message| WardenError::LaunchFailed(message.clone()))
    }
}
