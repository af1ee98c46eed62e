//! Launcher state. Lives on the launcher sequence; every method here runs on it.
//!
//! Blocking work (spawning, handshakes, setup, stopping) happens on helper
//! threads that post their result back as a follow-up task, so the sequence
//! never waits on a worker.

use super::backend::{ServiceBackend, ServiceHandle};
use super::binding::{BindingAction, BindingManager};
use super::handle::{ConnectionStatus, LaunchCompletion};
use super::ranking::ProcessRanking;
use super::registry::ProcessRegistry;
use super::signals::TerminationReason;
use super::slots::{SlotAllocator, SlotKey};
use super::spare::SpareConnectionPool;
use super::spawn::spawn_helper_thread;
use super::types::{
    BindingStrength, ByClass, ChildImportance, LaunchRequest, ProcessId, TerminationInfo,
    WorkerClass,
};
use crate::config::HostConfig;
use crate::error::{Result, WardenError};
use crate::events::{EventBus, HostEvent};
use crate::sequence::SequenceHandle;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace, warn};

/// How many dead workers' diagnostics are kept for late queries.
const EXITED_HISTORY: usize = 64;

/// Result of a helper thread's connect or setup work.
type Connected = Result<Box<dyn ServiceHandle>>;

/// A launch waiting for a slot.
pub(crate) struct PendingLaunch {
    pub(crate) request: LaunchRequest,
    pub(crate) completion: LaunchCompletion,
}

/// A worker handed to a helper thread to be stopped and reaped.
#[derive(Clone)]
struct Stopping {
    pid: Option<ProcessId>,
    status: Arc<ConnectionStatus>,
    binding: BindingStrength,
    /// Only workers that finished launching show up in diagnostics.
    reported: bool,
}

impl Stopping {
    fn info(&self, reason: Option<TerminationReason>) -> TerminationInfo {
        TerminationInfo {
            binding_state: self.binding,
            killed_by_host: true,
            reason,
        }
    }
}

/// Snapshot of one running worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub pid: ProcessId,
    pub class: WorkerClass,
    pub slot: usize,
    pub process_type: Option<String>,
    pub importance: ChildImportance,
    pub binding: BindingStrength,
    pub foreground: bool,
    pub depth: u32,
    /// Position in the eviction order of its class, 1 being the most important.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Spare connection whose handshake is in flight.
    Connecting,
    /// Connected spare waiting to be claimed.
    Spare,
    /// Setup is running on a helper thread.
    Launching,
    /// Registered, ranked and visible to callers.
    Running,
}

/// A worker occupying a slot.
struct ChildConnection {
    phase: Phase,
    /// `None` while a helper thread owns it.
    handle: Option<Box<dyn ServiceHandle>>,
    status: Arc<ConnectionStatus>,
    request: Option<LaunchRequest>,
    completion: Option<LaunchCompletion>,
    moderate_bindings: u32,
    strong_bindings: u32,
    /// Strength last applied to the process.
    binding: BindingStrength,
    /// Whether the binding manager holds one of the moderate bindings.
    managed: bool,
    importance: ChildImportance,
    foreground: bool,
    depth: u32,
}

impl ChildConnection {
    fn new(phase: Phase, status: Arc<ConnectionStatus>) -> Self {
        status.set_binding(BindingStrength::Moderate);
        Self {
            phase,
            handle: None,
            status,
            request: None,
            completion: None,
            // Every connection starts out with one moderate binding.
            moderate_bindings: 1,
            strong_bindings: 0,
            binding: BindingStrength::Moderate,
            managed: false,
            importance: ChildImportance::Moderate,
            foreground: false,
            depth: 1,
        }
    }

    fn spare() -> Self {
        Self::new(
            Phase::Connecting,
            Arc::new(ConnectionStatus::new(BindingStrength::Moderate)),
        )
    }

    fn for_launch(pending: PendingLaunch) -> Self {
        let mut conn = Self::new(Phase::Launching, Arc::clone(pending.completion.status()));
        conn.request = Some(pending.request);
        conn.completion = Some(pending.completion);
        conn
    }

    /// Give a launch back to the queue after failing to place it.
    fn into_pending(self) -> Option<PendingLaunch> {
        Some(PendingLaunch {
            request: self.request?,
            completion: self.completion?,
        })
    }

    fn pid(&self) -> Option<ProcessId> {
        self.handle.as_ref().map(|h| h.pid()).or(self.status.pid())
    }

    fn add_binding(&mut self, strength: BindingStrength) {
        match strength {
            BindingStrength::None => return,
            BindingStrength::Moderate => self.moderate_bindings += 1,
            BindingStrength::Strong => self.strong_bindings += 1,
        }
        self.sync_binding();
    }

    fn remove_binding(&mut self, strength: BindingStrength) {
        match strength {
            BindingStrength::None => return,
            BindingStrength::Moderate => {
                self.moderate_bindings = self.moderate_bindings.saturating_sub(1)
            }
            BindingStrength::Strong => {
                self.strong_bindings = self.strong_bindings.saturating_sub(1)
            }
        }
        self.sync_binding();
    }

    /// Apply the strongest held binding to the process if it changed.
    fn sync_binding(&mut self) {
        let level = if self.strong_bindings > 0 {
            BindingStrength::Strong
        } else if self.moderate_bindings > 0 {
            BindingStrength::Moderate
        } else {
            BindingStrength::None
        };
        if level == self.binding {
            return;
        }
        self.binding = level;
        self.status.set_binding(level);
        if let Some(handle) = self.handle.as_mut() {
            handle.set_keep_alive(level);
        }
    }
}

pub(crate) struct LauncherCore {
    me: SequenceHandle<LauncherCore>,
    backend: Arc<dyn ServiceBackend>,
    ignore_visibility: bool,
    slots: ByClass<SlotAllocator<ChildConnection>>,
    spares: SpareConnectionPool,
    ranking: ProcessRanking,
    registry: ProcessRegistry,
    bindings: Option<BindingManager>,
    pending: ByClass<VecDeque<PendingLaunch>>,
    exited: VecDeque<(ProcessId, TerminationInfo)>,
    events: EventBus,
}

impl LauncherCore {
    pub(crate) fn new(
        me: SequenceHandle<LauncherCore>,
        backend: Arc<dyn ServiceBackend>,
        config: &HostConfig,
        events: EventBus,
    ) -> Self {
        Self {
            me,
            backend,
            ignore_visibility: config.ignore_visibility_for_importance,
            slots: ByClass::from_fn(|class| SlotAllocator::new(class, config.capacity(class))),
            spares: SpareConnectionPool::new(),
            ranking: ProcessRanking::new(),
            registry: ProcessRegistry::new(),
            bindings: None,
            pending: ByClass::default(),
            exited: VecDeque::with_capacity(EXITED_HISTORY),
            events,
        }
    }

    /// Start a launch, or queue it behind earlier launches of its class.
    pub(crate) fn launch(&mut self, pending: PendingLaunch) {
        let class = pending.request.class();
        if !self.pending.get(class).is_empty() {
            debug!(%class, queued = self.pending.get(class).len(), "Queueing launch");
            self.pending.get_mut(class).push_back(pending);
            return;
        }
        if let Err(pending) = self.try_start(pending) {
            debug!(%class, "No slot available, queueing launch");
            self.pending.get_mut(class).push_back(pending);
        }
    }

    /// Place a launch on a spare or a fresh slot. Hands the launch back if
    /// every slot is taken and nothing can be evicted.
    fn try_start(&mut self, pending: PendingLaunch) -> std::result::Result<(), PendingLaunch> {
        let class = pending.request.class();
        if let Some(key) = self.spares.claim_if_available(class) {
            return self.adopt_spare(key, pending);
        }

        let key = match self.claim_slot(class, ChildConnection::for_launch(pending)) {
            Ok(key) => key,
            Err(conn) => {
                return match conn.into_pending() {
                    Some(pending) => Err(pending),
                    None => Ok(()),
                };
            }
        };

        let request = match self.slots.get(class).get(key).and_then(|c| c.request.clone()) {
            Some(request) => request,
            None => return Ok(()),
        };
        let backend = Arc::clone(&self.backend);
        let job = move || -> Connected {
            let mut handle = backend.connect(class)?;
            handle.set_keep_alive(BindingStrength::Moderate);
            if let Err(e) = handle.setup(&request) {
                handle.kill();
                return Err(e);
            }
            Ok(handle)
        };
        debug!(slot = %key, "Launching on new slot");
        if let Err(e) = self.run_off_sequence(key, job, Self::on_launch_finished) {
            self.abandon_launch(key, &e);
        }
        Ok(())
    }

    /// Move a launch onto the connected spare in `key`.
    fn adopt_spare(
        &mut self,
        key: SlotKey,
        pending: PendingLaunch,
    ) -> std::result::Result<(), PendingLaunch> {
        let Some(conn) = self.slots.get_mut(key.class).get_mut(key) else {
            return Err(pending);
        };
        let Some(mut handle) = conn.handle.take() else {
            return Err(pending);
        };

        conn.phase = Phase::Launching;
        conn.status = Arc::clone(pending.completion.status());
        conn.status.set_binding(conn.binding);
        let request = pending.request.clone();
        conn.request = Some(pending.request);
        conn.completion = Some(pending.completion);

        let job = move || -> Connected {
            if let Err(e) = handle.setup(&request) {
                handle.kill();
                return Err(e);
            }
            Ok(handle)
        };
        info!(slot = %key, "Launching on spare connection");
        if let Err(e) = self.run_off_sequence(key, job, Self::on_launch_finished) {
            self.abandon_launch(key, &e);
        }
        Ok(())
    }

    /// Claim a slot, evicting the lowest-ranked worker of the class if full.
    fn claim_slot(
        &mut self,
        class: WorkerClass,
        conn: ChildConnection,
    ) -> std::result::Result<SlotKey, ChildConnection> {
        let conn = match self.slots.get_mut(class).try_claim(conn) {
            Ok(key) => return Ok(key),
            Err(conn) => conn,
        };
        if !self.evict_lowest_ranked(class) {
            return Err(conn);
        }
        self.slots.get_mut(class).try_claim(conn)
    }

    fn evict_lowest_ranked(&mut self, class: WorkerClass) -> bool {
        let Some(victim) = self.ranking.lowest_ranked(class).map(|entry| entry.key) else {
            return false;
        };
        let Some(conn) = self.slots.get_mut(class).get_mut(victim) else {
            self.ranking.remove(victim);
            return self.evict_lowest_ranked(class);
        };

        conn.status.mark_killed();
        let pid = conn.pid();
        let reason = conn
            .handle
            .as_mut()
            .map(|h| h.kill())
            .unwrap_or(TerminationReason::Unknown);
        info!(?pid, slot = %victim, "Evicting lowest-ranked worker");
        self.release_connection(victim, reason);
        true
    }

    /// Run `job` on a helper thread and hand its result to `done` on the
    /// sequence. A result that arrives after shutdown is dropped, which kills
    /// the worker.
    fn run_off_sequence<F>(
        &self,
        key: SlotKey,
        job: F,
        done: fn(&mut LauncherCore, SlotKey, Connected),
    ) -> Result<()>
    where
        F: FnOnce() -> Connected + Send + 'static,
    {
        let me = self.me.clone();
        spawn_helper_thread(&format!("warden-connect-{}", key.index), move || {
            let result = job();
            if !me.post(move |core| done(core, key, result)) {
                trace!(slot = %key, "Launcher gone before connect finished");
            }
        })?;
        Ok(())
    }

    fn on_launch_finished(&mut self, key: SlotKey, result: Connected) {
        let class = key.class;
        let Some(conn) = self.slots.get_mut(class).get_mut(key) else {
            return;
        };

        match result {
            Ok(handle) => {
                let pid = handle.pid();
                conn.handle = Some(handle);
                conn.phase = Phase::Running;
                let completion = conn.completion.take();
                let process_type = conn
                    .request
                    .as_ref()
                    .and_then(|r| r.process_type())
                    .unwrap_or("unknown")
                    .to_string();

                self.registry.register(pid, key);
                self.ranking.insert(key, false, 1, ChildImportance::Moderate);
                if let Some(completion) = completion {
                    completion.succeed(pid);
                }
                info!(pid, %class, slot = key.index, %process_type, "Worker launched");
                self.events.publish(HostEvent::ProcessStarted { pid, class });
            }
            Err(e) => {
                warn!(%class, slot = %key, error = %e, "Launch failed");
                self.abandon_launch(key, &e);
                self.pump(class);
            }
        }
    }

    /// Free the slot of a launch that never started and fail its caller.
    fn abandon_launch(&mut self, key: SlotKey, error: &WardenError) {
        if let Some(mut conn) = self.slots.get_mut(key.class).release(key)
            && let Some(completion) = conn.completion.take()
        {
            completion.fail(error);
        }
    }

    /// Start queued launches of `class` while slots allow.
    fn pump(&mut self, class: WorkerClass) {
        while let Some(pending) = self.pending.get_mut(class).pop_front() {
            if let Err(pending) = self.try_start(pending) {
                self.pending.get_mut(class).push_front(pending);
                break;
            }
        }
    }

    /// Connect a spare worker for `class` ahead of demand.
    pub(crate) fn prewarm(&mut self, class: WorkerClass) {
        if self.spares.has_spare(class) || self.slots.get(class).is_full() {
            return;
        }
        let Ok(key) = self.slots.get_mut(class).try_claim(ChildConnection::spare()) else {
            return;
        };
        self.spares.begin(key);

        let backend = Arc::clone(&self.backend);
        let job = move || -> Connected {
            let mut handle = backend.connect(class)?;
            handle.set_keep_alive(BindingStrength::Moderate);
            Ok(handle)
        };
        debug!(slot = %key, "Warming up spare connection");
        if let Err(e) = self.run_off_sequence(key, job, Self::on_spare_connected) {
            warn!(%class, error = %e, "Could not start spare connection");
            self.spares.discard(key);
            self.slots.get_mut(class).release(key);
        }
    }

    fn on_spare_connected(&mut self, key: SlotKey, result: Connected) {
        let class = key.class;
        match result {
            Ok(handle) => {
                let Some(conn) = self.slots.get_mut(class).get_mut(key) else {
                    return;
                };
                let pid = handle.pid();
                conn.handle = Some(handle);
                conn.phase = Phase::Spare;
                self.spares.mark_ready(key);
                debug!(pid, slot = %key, "Spare connection ready");
                self.pump(class);
            }
            Err(e) => {
                warn!(%class, error = %e, "Spare connection failed");
                self.spares.discard(key);
                self.slots.get_mut(class).release(key);
                self.pump(class);
            }
        }
    }

    /// Apply a visibility/importance update to a running worker.
    pub(crate) fn set_importance(
        &mut self,
        pid: ProcessId,
        foreground: bool,
        depth: u32,
        importance: ChildImportance,
    ) {
        let Some(key) = self.registry.lookup(pid) else {
            trace!(pid, "Importance update for unknown pid");
            return;
        };
        let foreground = foreground && !self.ignore_visibility;
        let Some(conn) = self.slots.get_mut(key.class).get_mut(key) else {
            return;
        };
        let became_foreground = foreground && !conn.foreground;
        conn.foreground = foreground;
        conn.depth = depth;

        if became_foreground
            && key.class == WorkerClass::Sandboxed
            && let Some(bindings) = self.bindings.as_mut()
        {
            let actions = bindings.increase_recency(key);
            self.apply_binding_actions(actions);
        }

        let new = ChildImportance::effective(foreground, depth, importance);
        let Some(conn) = self.slots.get_mut(key.class).get_mut(key) else {
            return;
        };
        let old = conn.importance;
        // Add before remove so the worker never drops to a weaker level in between.
        if new != old {
            conn.add_binding(BindingStrength::for_importance(new));
        }
        self.ranking.update(key, foreground, depth, importance);
        if new != old
            && let Some(conn) = self.slots.get_mut(key.class).get_mut(key)
        {
            conn.remove_binding(BindingStrength::for_importance(old));
            conn.importance = new;
        }
        debug!(pid, foreground, depth, %importance, effective = %new, "Importance updated");
    }

    fn apply_binding_actions(&mut self, actions: Vec<BindingAction>) {
        for action in actions {
            let key = match action {
                BindingAction::Add(key) | BindingAction::Remove(key) => key,
            };
            let Some(conn) = self.slots.get_mut(key.class).get_mut(key) else {
                continue;
            };
            match action {
                BindingAction::Add(_) if !conn.managed => {
                    conn.managed = true;
                    conn.add_binding(BindingStrength::Moderate);
                }
                BindingAction::Remove(_) if conn.managed => {
                    conn.managed = false;
                    conn.remove_binding(BindingStrength::Moderate);
                }
                _ => {}
            }
        }
    }

    /// Stop a running worker. Unknown pids are ignored.
    ///
    /// The slot is freed right away; the worker is asked to exit and reaped on
    /// a helper thread, and its exit reason is filled in once that finishes.
    pub(crate) fn stop(&mut self, pid: ProcessId) {
        let Some(key) = self.registry.lookup(pid) else {
            debug!(pid, "Stop requested for unknown pid");
            return;
        };
        if self.begin_stop(key).is_none() {
            self.registry.unregister(pid);
        }
        info!(pid, slot = %key, "Stopping worker");
        self.pump(key.class);
    }

    /// Detach the connection in `key` and stop its worker off the sequence.
    /// Returns the stop thread, if one was needed.
    fn begin_stop(&mut self, key: SlotKey) -> Option<JoinHandle<()>> {
        let mut conn = self.detach_connection(key)?;
        conn.status.mark_killed();
        let stopping = Stopping {
            pid: conn.pid(),
            status: Arc::clone(&conn.status),
            binding: conn.binding,
            reported: conn.phase == Phase::Running,
        };
        // A launch still on its helper thread is killed when its result finds
        // the slot gone.
        let Some(mut handle) = conn.handle.take() else {
            self.finish_stop(stopping, TerminationReason::Unknown);
            return None;
        };
        if stopping.reported
            && let Some(pid) = stopping.pid
        {
            self.record_exit(pid, stopping.info(None));
        }

        let me = self.me.clone();
        let fallback = stopping.clone();
        let spawned = spawn_helper_thread(&format!("warden-stop-{}", handle.pid()), move || {
            let reason = handle.stop();
            let status = Arc::clone(&stopping.status);
            if !me.post(move |core| core.finish_stop(stopping, reason)) {
                status.mark_exited(reason);
            }
        });
        match spawned {
            Ok(thread) => Some(thread),
            Err(e) => {
                // The handle was dropped with the closure, which kills the worker.
                warn!(slot = %key, error = %e, "Could not start stop thread");
                self.finish_stop(fallback, TerminationReason::Killed);
                None
            }
        }
    }

    fn finish_stop(&mut self, stopping: Stopping, reason: TerminationReason) {
        stopping.status.mark_exited(reason);
        debug!(pid = ?stopping.pid, %reason, "Worker stopped");
        if stopping.reported
            && let Some(pid) = stopping.pid
        {
            self.record_exit(pid, stopping.info(Some(reason)));
        }
    }

    /// Reap workers that died on their own.
    pub(crate) fn poll_exits(&mut self) {
        let mut lost = Vec::new();
        for class in WorkerClass::ALL {
            let slots = self.slots.get_mut(class);
            for key in slots.keys() {
                if let Some(conn) = slots.get_mut(key)
                    && let Some(handle) = conn.handle.as_mut()
                    && let Some(reason) = handle.try_wait()
                {
                    lost.push((key, reason));
                }
            }
        }

        for &(key, reason) in &lost {
            if reason.is_crash() {
                warn!(slot = %key, %reason, "Worker crashed");
            } else {
                info!(slot = %key, %reason, "Worker exited");
            }
            self.release_connection(key, reason);
        }
        for class in WorkerClass::ALL {
            if lost.iter().any(|(key, _)| key.class == class) {
                self.pump(class);
            }
        }
    }

    /// Remove the connection in `key` from every launcher structure.
    fn detach_connection(&mut self, key: SlotKey) -> Option<ChildConnection> {
        let conn = self.slots.get_mut(key.class).release(key)?;
        self.ranking.remove(key);
        if let Some(bindings) = self.bindings.as_mut() {
            let _ = bindings.drop_recency(key);
        }
        self.spares.discard(key);
        if conn.phase == Phase::Running
            && let Some(pid) = conn.pid()
            && self.registry.lookup(pid) == Some(key)
        {
            self.registry.unregister(pid);
        }
        Some(conn)
    }

    /// Drop every trace of the connection in `key` and record how it ended.
    fn release_connection(
        &mut self,
        key: SlotKey,
        reason: TerminationReason,
    ) -> Option<TerminationInfo> {
        let conn = self.detach_connection(key)?;
        conn.status.mark_exited(reason);
        let info = TerminationInfo {
            binding_state: conn.binding,
            killed_by_host: conn.status.killed_by_host(),
            reason: Some(reason),
        };
        if conn.phase == Phase::Running
            && let Some(pid) = conn.pid()
        {
            self.record_exit(pid, info.clone());
        }
        Some(info)
    }

    /// Keep `info` in the exited history. An entry still waiting for its
    /// reason is completed in place. Exits with a reason are published.
    fn record_exit(&mut self, pid: ProcessId, info: TerminationInfo) {
        let waiting = self
            .exited
            .iter_mut()
            .rev()
            .find(|(p, recorded)| *p == pid && recorded.reason.is_none());
        match waiting {
            Some((_, recorded)) => *recorded = info.clone(),
            None => {
                if self.exited.len() == EXITED_HISTORY {
                    self.exited.pop_front();
                }
                self.exited.push_back((pid, info.clone()));
            }
        }
        if info.reason.is_some() {
            self.events.publish(HostEvent::ProcessExited { pid, info });
        }
    }

    /// Diagnostics for a live worker, or the most recent dead one with `pid`.
    pub(crate) fn termination_info(&self, pid: ProcessId) -> Option<TerminationInfo> {
        if let Some(key) = self.registry.lookup(pid)
            && let Some(conn) = self.slots.get(key.class).get(key)
        {
            return Some(conn.status.termination_info());
        }
        self.exited
            .iter()
            .rev()
            .find(|(p, _)| *p == pid)
            .map(|(_, info)| info.clone())
    }

    /// Running workers grouped by their `--type=` switch.
    pub(crate) fn process_ids_by_type(&self) -> BTreeMap<String, Vec<ProcessId>> {
        let mut grouped: BTreeMap<String, Vec<ProcessId>> = BTreeMap::new();
        for pid in self.registry.pids() {
            let process_type = self
                .registry
                .lookup(pid)
                .and_then(|key| self.slots.get(key.class).get(key))
                .and_then(|conn| conn.request.as_ref())
                .and_then(|request| request.process_type())
                .unwrap_or("unknown");
            grouped.entry(process_type.to_string()).or_default().push(pid);
        }
        grouped
    }

    pub(crate) fn workers(&self) -> Vec<WorkerSummary> {
        let mut workers = Vec::with_capacity(self.registry.len());
        for class in WorkerClass::ALL {
            for (position, entry) in self.ranking.iter(class).enumerate() {
                let Some(conn) = self.slots.get(class).get(entry.key) else {
                    continue;
                };
                let Some(pid) = conn.pid() else {
                    continue;
                };
                workers.push(WorkerSummary {
                    pid,
                    class,
                    slot: entry.key.index,
                    process_type: conn
                        .request
                        .as_ref()
                        .and_then(|r| r.process_type())
                        .map(str::to_string),
                    importance: conn.importance,
                    binding: conn.binding,
                    foreground: conn.foreground,
                    depth: conn.depth,
                    rank: position + 1,
                });
            }
        }
        workers
    }

    pub(crate) fn allocated(&self, class: WorkerClass) -> usize {
        self.slots.get(class).allocated_count()
    }

    pub(crate) fn queued(&self, class: WorkerClass) -> usize {
        self.pending.get(class).len()
    }

    pub(crate) fn has_spare(&self, class: WorkerClass) -> bool {
        self.spares.has_spare(class)
    }

    /// Turn on recency-based moderate bindings for sandboxed workers.
    pub(crate) fn enable_binding_management(&mut self) {
        if self.bindings.is_none() {
            let capacity = self.slots.get(WorkerClass::Sandboxed).capacity();
            debug!(capacity, "Binding management enabled");
            self.bindings = Some(BindingManager::new(capacity));
        }
    }

    pub(crate) fn on_application_background(&mut self) {
        if let Some(bindings) = self.bindings.as_mut() {
            let actions = bindings.on_sent_to_background();
            self.apply_binding_actions(actions);
        }
    }

    pub(crate) fn on_application_foreground(&mut self) {
        if let Some(bindings) = self.bindings.as_mut() {
            let actions = bindings.on_brought_to_foreground();
            self.apply_binding_actions(actions);
        }
    }

    /// Stop every worker and fail launches still waiting for a slot.
    /// Returns the threads still stopping workers.
    pub(crate) fn stop_all(&mut self) -> Vec<JoinHandle<()>> {
        let mut stopping = Vec::new();
        for class in WorkerClass::ALL {
            for pending in self.pending.get_mut(class).drain(..) {
                pending
                    .completion
                    .fail(&WardenError::LaunchFailed("launcher shutting down".to_string()));
            }
            for key in self.slots.get(class).keys() {
                if let Some(conn) = self.slots.get_mut(class).get_mut(key)
                    && let Some(completion) = conn.completion.take()
                {
                    completion.fail(&WardenError::LaunchFailed(
                        "launcher shutting down".to_string(),
                    ));
                }
                stopping.extend(self.begin_stop(key));
            }
        }
        stopping
    }
}
