//! Lifecycle notifications published to collaborators.

use crate::launcher::{ProcessId, TerminationInfo, WorkerClass};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex};

/// Something that happened to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A launch completed and the worker is registered.
    ProcessStarted { pid: ProcessId, class: WorkerClass },
    /// A registered worker is gone.
    ProcessExited { pid: ProcessId, info: TerminationInfo },
}

/// Fan-out of [`HostEvent`]s to any number of subscribers.
///
/// Subscribers that dropped their receiver are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<HostEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<HostEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: HostEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
