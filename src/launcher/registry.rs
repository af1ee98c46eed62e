//! Process id to slot lookup for inbound requests that only carry a pid.

use super::slots::SlotKey;
use super::types::ProcessId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    by_pid: HashMap<ProcessId, SlotKey>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pid: ProcessId, key: SlotKey) {
        if let Some(previous) = self.by_pid.insert(pid, key) {
            // Pid reuse after a missed exit.
            tracing::warn!(pid, slot = %previous, "Replacing stale registry entry");
        }
    }

    pub fn unregister(&mut self, pid: ProcessId) -> Option<SlotKey> {
        self.by_pid.remove(&pid)
    }

    pub fn lookup(&self, pid: ProcessId) -> Option<SlotKey> {
        self.by_pid.get(&pid).copied()
    }

    /// Registered pids in ascending order.
    pub fn pids(&self) -> Vec<ProcessId> {
        let mut pids: Vec<_> = self.by_pid.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn len(&self) -> usize {
        self.by_pid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pid.is_empty()
    }
}
