//! Wire protocol between the host and its workers.
//!
//! Messages are JSON-serialized and newline-delimited. The worker speaks first:
//! `ready` carries its pid and completes the connection handshake. The host
//! then sends `setup` exactly once and the worker answers `started` or `error`.

use super::types::{ProcessId, ResourceHandle};
use serde::{Deserialize, Serialize};

/// Message from host to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Launch parameters for the worker.
    Setup {
        command_line: Vec<String>,
        resources: Vec<ResourceHandle>,
    },
    /// Graceful shutdown request.
    Exit,
}

/// Message from worker to host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Handshake: the worker is connected and idle.
    Ready { pid: ProcessId },
    /// Setup was applied.
    Started,
    /// Setup was rejected or the worker hit a fatal error.
    Error { message: String },
}

impl HostMessage {
    pub fn setup(command_line: &[String], resources: &[ResourceHandle]) -> Self {
        Self::Setup {
            command_line: command_line.to_vec(),
            resources: resources.to_vec(),
        }
    }

    /// Serialize to a JSON line (with newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from a JSON line.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}

impl WorkerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize to a JSON line (with newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from a JSON line.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}
