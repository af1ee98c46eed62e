//! Termination analysis for worker processes.
//!
//! Turns a reaped `WaitStatus` into a reason the host can report back through
//! termination diagnostics.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Why a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// SIGKILL sent by the host (stop or eviction).
    Killed,
    /// SIGKILL the host did not send; most likely the OOM killer.
    OutOfMemory,
    /// Fatal fault (SIGSEGV, SIGBUS, SIGILL, SIGABRT).
    Crashed(Signal),
    /// Any other signal.
    Signaled(Signal),
    /// Reaped by someone else or otherwise unknown.
    Unknown,
}

impl TerminationReason {
    /// Check if this is a clean exit.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Check if the process died from a fault or the OOM killer.
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crashed(_) | Self::OutOfMemory)
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Killed => "killed by host".to_string(),
            Self::OutOfMemory => "out of memory (SIGKILL)".to_string(),
            Self::Crashed(sig) => format!("crashed ({})", sig.as_str()),
            Self::Signaled(sig) => format!("terminated by {}", sig.as_str()),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze a `WaitStatus`.
///
/// Returns `None` while the process is still running. `killed_by_host` decides
/// whether a SIGKILL counts as our own kill or as the OOM killer.
pub fn analyze_wait_status(status: WaitStatus, killed_by_host: bool) -> Option<TerminationReason> {
    let reason = match status {
        WaitStatus::StillAlive => return None,
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, _) => match signal {
            Signal::SIGKILL if killed_by_host => TerminationReason::Killed,
            Signal::SIGKILL => TerminationReason::OutOfMemory,
            Signal::SIGSEGV | Signal::SIGBUS | Signal::SIGILL | Signal::SIGABRT => {
                TerminationReason::Crashed(signal)
            }
            _ => TerminationReason::Signaled(signal),
        },
        _ => TerminationReason::Unknown,
    };
    Some(reason)
}
