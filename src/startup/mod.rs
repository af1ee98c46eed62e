//! Two-phase startup.
//!
//! Partial startup makes worker launching possible; full startup turns on the
//! background machinery (exit polling, binding management, spare warm-up).
//! Any number of callers may request either level concurrently; each callback
//! fires exactly once.

mod orchestrator;

pub use orchestrator::{Bootstrap, PhaseCompletion, StartupCallback, StartupOrchestrator};

use serde::Serialize;
use std::fmt;

/// A startup level a caller can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupLevel {
    Partial,
    Full,
}

impl StartupLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Full => "full",
        }
    }

    fn starting(self) -> StartupState {
        match self {
            Self::Partial => StartupState::PartialStarting,
            Self::Full => StartupState::FullStarting,
        }
    }

    fn started(self) -> StartupState {
        match self {
            Self::Partial => StartupState::PartialStarted,
            Self::Full => StartupState::FullStarted,
        }
    }
}

impl fmt::Display for StartupLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where startup is. Only moves forward, except that a failed phase falls back
/// to the last level that was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StartupState {
    NotStarted = 0,
    PartialStarting = 1,
    PartialStarted = 2,
    FullStarting = 3,
    FullStarted = 4,
}

impl StartupState {
    /// Whether `level` has been reached.
    pub fn has_reached(self, level: StartupLevel) -> bool {
        self >= level.started()
    }

    /// Highest level reached so far.
    pub fn reached(self) -> Option<StartupLevel> {
        match self {
            Self::NotStarted | Self::PartialStarting => None,
            Self::PartialStarted | Self::FullStarting => Some(StartupLevel::Partial),
            Self::FullStarted => Some(StartupLevel::Full),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::PartialStarting => "partial_starting",
            Self::PartialStarted => "partial_started",
            Self::FullStarting => "full_starting",
            Self::FullStarted => "full_started",
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::PartialStarting,
            2 => Self::PartialStarted,
            3 => Self::FullStarting,
            4 => Self::FullStarted,
            _ => Self::NotStarted,
        }
    }
}

impl fmt::Display for StartupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a startup callback is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Success,
    Failure(String),
}

impl StartupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_reached() {
        assert!(!StartupState::NotStarted.has_reached(StartupLevel::Partial));
        assert!(!StartupState::PartialStarting.has_reached(StartupLevel::Partial));
        assert!(StartupState::PartialStarted.has_reached(StartupLevel::Partial));
        assert!(StartupState::FullStarting.has_reached(StartupLevel::Partial));
        assert!(!StartupState::FullStarting.has_reached(StartupLevel::Full));
        assert!(StartupState::FullStarted.has_reached(StartupLevel::Full));
    }

    #[test]
    fn test_reached_level() {
        assert_eq!(StartupState::PartialStarting.reached(), None);
        assert_eq!(
            StartupState::FullStarting.reached(),
            Some(StartupLevel::Partial)
        );
        assert_eq!(StartupState::FullStarted.reached(), Some(StartupLevel::Full));
    }

    #[test]
    fn test_state_u8_round_trip() {
        for state in [
            StartupState::NotStarted,
            StartupState::PartialStarting,
            StartupState::PartialStarted,
            StartupState::FullStarting,
            StartupState::FullStarted,
        ] {
            assert_eq!(StartupState::from_u8(state.to_u8()), state);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(StartupLevel::Full.to_string(), "full");
        assert_eq!(StartupState::PartialStarted.to_string(), "partial_started");
    }
}
