//! Scripted in-process backend for launcher and host tests.

use super::backend::{ServiceBackend, ServiceHandle};
use super::signals::TerminationReason;
use super::types::{BindingStrength, LaunchRequest, ProcessId, WorkerClass};
use crate::error::{Result, WardenError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct FakeState {
    next_pid: ProcessId,
    connects: Vec<(ProcessId, WorkerClass)>,
    alive: HashSet<ProcessId>,
    exits: HashMap<ProcessId, TerminationReason>,
    keep_alive: Vec<(ProcessId, BindingStrength)>,
    setups: Vec<(ProcessId, Vec<String>)>,
    fail_connect: bool,
    fail_setup: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_pid: 1000,
                connects: Vec::new(),
                alive: HashSet::new(),
                exits: HashMap::new(),
                keep_alive: Vec::new(),
                setups: Vec::new(),
                fail_connect: false,
                fail_setup: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn fail_connects(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    pub(crate) fn fail_setups(&self, fail: bool) {
        self.state().fail_setup = fail;
    }

    /// Make `pid` look like it died on its own.
    pub(crate) fn crash(&self, pid: ProcessId, reason: TerminationReason) {
        let mut state = self.state();
        state.alive.remove(&pid);
        state.exits.insert(pid, reason);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.state().connects.len()
    }

    pub(crate) fn is_alive(&self, pid: ProcessId) -> bool {
        self.state().alive.contains(&pid)
    }

    /// Every keep-alive strength applied to `pid`, oldest first.
    pub(crate) fn keep_alive_trace(&self, pid: ProcessId) -> Vec<BindingStrength> {
        self.state()
            .keep_alive
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, s)| *s)
            .collect()
    }

    pub(crate) fn setup_command_line(&self, pid: ProcessId) -> Option<Vec<String>> {
        self.state()
            .setups
            .iter()
            .find(|(p, _)| *p == pid)
            .map(|(_, c)| c.clone())
    }
}

impl ServiceBackend for FakeBackend {
    fn connect(&self, class: WorkerClass) -> Result<Box<dyn ServiceHandle>> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(WardenError::Handshake("scripted connect failure".to_string()));
        }
        let pid = state.next_pid;
        state.next_pid += 1;
        state.connects.push((pid, class));
        state.alive.insert(pid);
        Ok(Box::new(FakeHandle {
            pid,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeHandle {
    pid: ProcessId,
    state: Arc<Mutex<FakeState>>,
}

impl FakeHandle {
    fn finish(&self, reason: TerminationReason) -> TerminationReason {
        let mut state = self.state.lock().unwrap();
        state.alive.remove(&self.pid);
        *state.exits.entry(self.pid).or_insert(reason)
    }
}

impl ServiceHandle for FakeHandle {
    fn pid(&self) -> ProcessId {
        self.pid
    }

    fn setup(&mut self, request: &LaunchRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_setup {
            return Err(WardenError::Handshake("scripted setup failure".to_string()));
        }
        state.setups.push((self.pid, request.command_line().to_vec()));
        Ok(())
    }

    fn set_keep_alive(&mut self, strength: BindingStrength) {
        self.state.lock().unwrap().keep_alive.push((self.pid, strength));
    }

    fn kill(&mut self) -> TerminationReason {
        self.finish(TerminationReason::Killed)
    }

    fn stop(&mut self) -> TerminationReason {
        self.finish(TerminationReason::Exited(0))
    }

    fn try_wait(&mut self) -> Option<TerminationReason> {
        self.state.lock().unwrap().exits.get(&self.pid).copied()
    }
}
