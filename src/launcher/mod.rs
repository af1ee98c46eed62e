//! Out-of-process worker launching.
//!
//! The launcher owns a fixed number of slots per worker class and keeps each
//! running worker's keep-alive binding in line with how important the
//! application says it is. When a class is full, the lowest-ranked worker is
//! killed to make room; if nothing can be evicted, launches wait in FIFO order.
//!
//! # Architecture
//!
//! ```text
//!   callers ──► ProcessLauncher ──post──► launcher sequence (LauncherCore)
//!                                              │   ▲
//!                                   spawn job  │   │ result task
//!                                              ▼   │
//!                                          helper thread ──► ServiceBackend
//!                                                               │
//!                                                  ┌────────────┼────────────┐
//!                                            ┌─────▼────┐ ┌─────▼────┐ ┌─────▼────┐
//!                                            │ worker 1 │ │ worker 2 │ │ worker N │
//!                                            └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! All bookkeeping (slots, ranking, registry, bindings, spare pool) lives on the
//! launcher sequence. Workers are instances of this same binary started with the
//! hidden `worker` subcommand and driven over a JSON-lines pipe protocol.

mod backend;
mod binding;
mod handle;
mod ipc;
mod proc;
mod protocol;
mod ranking;
mod registry;
mod signals;
mod slots;
mod spare;
mod spawn;
mod state;
mod types;
mod watcher;
pub mod worker_main;

#[cfg(test)]
pub(crate) mod fake;

pub use backend::{ServiceBackend, ServiceHandle, SubprocessBackend};
pub use binding::{BindingAction, BindingManager};
pub use handle::LaunchHandle;
pub use ranking::{ProcessRanking, RankingEntry};
pub use signals::TerminationReason;
pub use slots::{SlotAllocator, SlotKey};
pub use spawn::resolve_worker_executable;
pub(crate) use spawn::spawn_helper_thread;
pub use state::WorkerSummary;
pub use types::{
    BindingStrength, ByClass, ChildImportance, LaunchRequest, ProcessId, ResourceHandle,
    TerminationInfo, WorkerClass,
};
pub use watcher::ExitWatcher;
pub use worker_main::run_worker_main;

use crate::config::HostConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::sequence::Sequence;
use handle::LaunchCompletion;
use state::{LauncherCore, PendingLaunch};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Thread-safe front end of the launcher sequence.
pub struct ProcessLauncher {
    // Declared first so the watcher stops before the sequence it posts to.
    watcher: OnceLock<ExitWatcher>,
    sequence: Sequence<LauncherCore>,
}

impl ProcessLauncher {
    pub fn new(
        config: &HostConfig,
        backend: Arc<dyn ServiceBackend>,
        events: EventBus,
    ) -> Result<Self> {
        let config = config.clone();
        let sequence = Sequence::spawn("launcher", move |me| {
            LauncherCore::new(me, backend, &config, events)
        })?;
        Ok(Self {
            watcher: OnceLock::new(),
            sequence,
        })
    }

    /// Submit a launch. The returned handle resolves once the worker has
    /// accepted its setup, or with the error that prevented it.
    pub fn launch(&self, request: LaunchRequest) -> LaunchHandle {
        let (completion, handle) = LaunchCompletion::new();
        // If the sequence is gone the completion is dropped with the task and
        // the handle reports the shutdown.
        self.sequence.post(move |core| {
            core.launch(PendingLaunch {
                request,
                completion,
            })
        });
        handle
    }

    pub fn set_importance(
        &self,
        pid: ProcessId,
        foreground: bool,
        depth: u32,
        importance: ChildImportance,
    ) {
        self.sequence
            .post(move |core| core.set_importance(pid, foreground, depth, importance));
    }

    pub fn stop(&self, pid: ProcessId) {
        self.sequence.post(move |core| core.stop(pid));
    }

    pub fn termination_info(&self, pid: ProcessId) -> Result<Option<TerminationInfo>> {
        self.sequence.call(move |core| core.termination_info(pid))
    }

    pub fn process_ids_by_type(&self) -> Result<BTreeMap<String, Vec<ProcessId>>> {
        self.sequence.call(|core| core.process_ids_by_type())
    }

    /// Running workers, most important first within each class.
    pub fn workers(&self) -> Result<Vec<WorkerSummary>> {
        self.sequence.call(|core| core.workers())
    }

    /// Start a spare connection for `class` if it has none and a slot is free.
    pub fn warm_up(&self, class: WorkerClass) {
        self.sequence.post(move |core| core.prewarm(class));
    }

    pub fn enable_binding_management(&self) {
        self.sequence.post(LauncherCore::enable_binding_management);
    }

    pub fn on_application_background(&self) {
        self.sequence.post(LauncherCore::on_application_background);
    }

    pub fn on_application_foreground(&self) {
        self.sequence.post(LauncherCore::on_application_foreground);
    }

    /// Reap dead workers now.
    pub fn poll_exits(&self) -> Result<()> {
        self.sequence.call(LauncherCore::poll_exits)
    }

    /// Start polling for worker exits every `interval`. Later calls are no-ops.
    pub fn start_exit_watcher(&self, interval: Duration) -> Result<()> {
        if self.watcher.get().is_some() {
            return Ok(());
        }
        let watcher = ExitWatcher::start(self.sequence.handle(), interval)?;
        // Losing a race here drops the extra watcher, which stops it.
        let _ = self.watcher.set(watcher);
        Ok(())
    }

    /// Stop every worker and fail queued launches. Returns once every worker
    /// has been reaped.
    pub fn stop_all(&self) -> Result<()> {
        let stopping = self.sequence.call(LauncherCore::stop_all)?;
        for thread in stopping {
            let _ = thread.join();
        }
        // Each stop thread posted its result before exiting, so this runs after them.
        self.sequence.call(|_: &mut LauncherCore| ())
    }

    pub(crate) fn allocated(&self, class: WorkerClass) -> Result<usize> {
        self.sequence.call(move |core| core.allocated(class))
    }

    pub(crate) fn queued(&self, class: WorkerClass) -> Result<usize> {
        self.sequence.call(move |core| core.queued(class))
    }

    pub(crate) fn has_spare(&self, class: WorkerClass) -> Result<bool> {
        self.sequence.call(move |core| core.has_spare(class))
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeBackend;
    use super::*;
    use crate::events::HostEvent;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    fn launcher(sandboxed: usize, privileged: usize) -> (ProcessLauncher, FakeBackend) {
        let config = HostConfig {
            sandboxed_slots: sandboxed,
            privileged_slots: privileged,
            ..HostConfig::default()
        };
        let backend = FakeBackend::new();
        let launcher =
            ProcessLauncher::new(&config, Arc::new(backend.clone()), EventBus::new()).unwrap();
        (launcher, backend)
    }

    fn renderer() -> LaunchRequest {
        LaunchRequest::new(WorkerClass::Sandboxed, vec!["--type=renderer".to_string()])
    }

    fn launch(launcher: &ProcessLauncher, request: LaunchRequest) -> ProcessId {
        launcher
            .launch(request)
            .wait_timeout(WAIT)
            .unwrap()
            .expect("launch timed out")
    }

    /// Round-trip through the sequence so posted updates have been applied.
    fn settle(launcher: &ProcessLauncher) {
        launcher.workers().unwrap();
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_launch_registers_worker() {
        let (launcher, backend) = launcher(2, 1);
        let pid = launch(&launcher, renderer());

        assert_eq!(
            backend.setup_command_line(pid),
            Some(vec!["--type=renderer".to_string()])
        );
        let by_type = launcher.process_ids_by_type().unwrap();
        assert_eq!(by_type.get("renderer"), Some(&vec![pid]));

        let info = launcher.termination_info(pid).unwrap().unwrap();
        assert_eq!(info.binding_state, BindingStrength::Moderate);
        assert!(!info.killed_by_host);
        assert_eq!(info.reason, None);
    }

    #[test]
    fn test_full_class_evicts_lowest_ranked() {
        let (launcher, backend) = launcher(2, 1);
        let r1 = launch(&launcher, renderer());
        let r2 = launch(&launcher, renderer());
        launcher.set_importance(r1, false, 1, ChildImportance::Normal);
        launcher.set_importance(r2, false, 1, ChildImportance::Normal);

        let important = renderer();
        let r3 = launch(&launcher, important);
        launcher.set_importance(r3, true, 0, ChildImportance::Important);
        settle(&launcher);

        let mut live = launcher
            .process_ids_by_type()
            .unwrap()
            .remove("renderer")
            .unwrap();
        live.sort();
        assert_eq!(live, vec![r2, r3]);
        assert!(!backend.is_alive(r1));

        let info = launcher.termination_info(r1).unwrap().unwrap();
        assert!(info.killed_by_host);
        assert_eq!(info.reason, Some(TerminationReason::Killed));
        assert_eq!(info.binding_state, BindingStrength::None);
    }

    #[test]
    fn test_importance_raise_never_drops_binding() {
        let (launcher, backend) = launcher(2, 1);
        let pid = launch(&launcher, renderer());
        launcher.set_importance(pid, false, 1, ChildImportance::Normal);
        launcher.set_importance(pid, true, 0, ChildImportance::Important);
        settle(&launcher);

        assert_eq!(
            backend.keep_alive_trace(pid),
            vec![
                BindingStrength::Moderate,
                BindingStrength::None,
                BindingStrength::Strong,
            ]
        );

        let mut before = backend.keep_alive_trace(pid).len();
        launcher.set_importance(pid, false, 1, ChildImportance::Moderate);
        settle(&launcher);
        let trace = backend.keep_alive_trace(pid);
        assert_eq!(&trace[before..], &[BindingStrength::Moderate]);

        before = trace.len();
        launcher.set_importance(pid, true, 0, ChildImportance::Normal);
        settle(&launcher);
        let trace = backend.keep_alive_trace(pid);
        assert_eq!(&trace[before..], &[BindingStrength::Strong]);
        assert!(!trace[before..].contains(&BindingStrength::None));
    }

    #[test]
    fn test_ignore_visibility_forces_background() {
        let config = HostConfig {
            ignore_visibility_for_importance: true,
            ..HostConfig::default()
        };
        let backend = FakeBackend::new();
        let launcher =
            ProcessLauncher::new(&config, Arc::new(backend.clone()), EventBus::new()).unwrap();
        let pid = launch(&launcher, renderer());

        launcher.set_importance(pid, true, 0, ChildImportance::Normal);
        let workers = launcher.workers().unwrap();
        assert!(!workers[0].foreground);
        assert_eq!(workers[0].importance, ChildImportance::Normal);
        assert_eq!(workers[0].binding, BindingStrength::None);
    }

    #[test]
    fn test_unknown_pid_updates_are_ignored() {
        let (launcher, _backend) = launcher(1, 1);
        launcher.set_importance(4242, true, 0, ChildImportance::Important);
        launcher.stop(4242);
        assert_eq!(launcher.termination_info(4242).unwrap(), None);
        assert!(launcher.workers().unwrap().is_empty());
    }

    #[test]
    fn test_failed_launch_frees_slot() {
        let (launcher, backend) = launcher(1, 1);
        let first = launch(&launcher, renderer());
        let gpu = LaunchRequest::new(WorkerClass::Privileged, vec!["--type=gpu".to_string()]);
        let gpu_pid = launch(&launcher, gpu);

        backend.fail_connects(true);
        let failing = launcher.launch(renderer());
        assert!(matches!(
            failing.wait_timeout(WAIT),
            Err(crate::error::WardenError::LaunchFailed(_))
        ));
        // The full class evicted its only worker before the connect failed.
        assert!(!backend.is_alive(first));
        assert_eq!(launcher.allocated(WorkerClass::Sandboxed).unwrap(), 0);
        // Other classes are untouched.
        assert!(backend.is_alive(gpu_pid));
    }

    #[test]
    fn test_setup_failure_kills_worker() {
        let (launcher, backend) = launcher(1, 1);
        backend.fail_setups(true);
        let handle = launcher.launch(renderer());
        assert!(handle.wait_timeout(WAIT).is_err());
        assert_eq!(backend.connect_count(), 1);
        assert!(!backend.is_alive(1000));
        assert_eq!(handle.termination_info(), None);
        assert_eq!(launcher.allocated(WorkerClass::Sandboxed).unwrap(), 0);
    }

    #[test]
    fn test_queued_launch_starts_after_stop() {
        let (launcher, backend) = launcher(1, 1);
        let first = launch(&launcher, renderer());

        // A launch in flight is not ranked yet, so it cannot be evicted and the
        // next launch of the class has to queue behind it.
        let second = launcher.launch(renderer());
        let third = launcher.launch(renderer());
        let second_pid = second.wait_timeout(WAIT).unwrap().unwrap();
        assert!(!backend.is_alive(first));

        wait_until(|| {
            third.pid().is_some() || launcher.queued(WorkerClass::Sandboxed).unwrap() > 0
        });
        if third.pid().is_none() {
            launcher.stop(second_pid);
        }
        let third_pid = third.wait_timeout(WAIT).unwrap().unwrap();
        assert_ne!(third_pid, second_pid);
        assert_eq!(launcher.queued(WorkerClass::Sandboxed).unwrap(), 0);
    }

    #[test]
    fn test_stop_reports_killed_by_host() {
        let (launcher, backend) = launcher(2, 1);
        let handle = launcher.launch(renderer());
        let pid = handle.wait_timeout(WAIT).unwrap().unwrap();

        launcher.stop(pid);
        wait_until(|| handle.has_exited());
        settle(&launcher);
        assert!(!backend.is_alive(pid));

        let info = launcher.termination_info(pid).unwrap().unwrap();
        assert!(info.killed_by_host);
        assert_eq!(info.reason, Some(TerminationReason::Exited(0)));
        assert_eq!(handle.termination_info(), Some(info));
    }

    #[test]
    fn test_stop_does_not_block_other_workers() {
        use std::os::unix::fs::PermissionsExt;

        // Acknowledges setup, then never reads its pipe again.
        let dir = tempfile::TempDir::new().unwrap();
        let exe = dir.path().join("stubborn-worker");
        std::fs::write(
            &exe,
            r#"#!/bin/sh
echo "{\"type\":\"ready\",\"pid\":$$}"
read line
echo '{"type":"started"}'
exec sleep 60
"#,
        )
        .unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = HostConfig {
            sandboxed_slots: 2,
            stop_timeout_ms: 2_000,
            ..HostConfig::default()
        };
        let backend = SubprocessBackend::new(exe, &config);
        let launcher = ProcessLauncher::new(&config, Arc::new(backend), EventBus::new()).unwrap();
        let stubborn = launch(&launcher, renderer());
        let other = launch(&launcher, renderer());

        let started = Instant::now();
        launcher.stop(stubborn);
        launcher.set_importance(other, true, 0, ChildImportance::Important);
        let workers = launcher.workers().unwrap();
        assert!(
            started.elapsed() < config.stop_timeout(),
            "launcher waited for the stop"
        );
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].pid, other);
        assert_eq!(workers[0].binding, BindingStrength::Strong);

        // Diagnostics exist straight away; the reason arrives once it is reaped.
        let info = launcher.termination_info(stubborn).unwrap().unwrap();
        assert!(info.killed_by_host);
        wait_until(|| {
            launcher
                .termination_info(stubborn)
                .unwrap()
                .is_some_and(|info| info.reason.is_some())
        });
        let info = launcher.termination_info(stubborn).unwrap().unwrap();
        assert_eq!(
            info.reason,
            Some(TerminationReason::Signaled(nix::sys::signal::Signal::SIGTERM))
        );

        launcher.stop_all().unwrap();
        assert!(
            launcher
                .termination_info(other)
                .unwrap()
                .is_some_and(|info| info.reason.is_some())
        );
    }

    #[test]
    fn test_crash_is_reaped_by_poll() {
        let (launcher, backend) = launcher(2, 1);
        let pid = launch(&launcher, renderer());
        backend.crash(pid, TerminationReason::OutOfMemory);

        launcher.poll_exits().unwrap();
        let info = launcher.termination_info(pid).unwrap().unwrap();
        assert!(!info.killed_by_host);
        assert_eq!(info.reason, Some(TerminationReason::OutOfMemory));
        assert_eq!(info.binding_state, BindingStrength::Moderate);
        assert_eq!(launcher.allocated(WorkerClass::Sandboxed).unwrap(), 0);
    }

    #[test]
    fn test_exit_watcher_reaps_in_background() {
        let (launcher, backend) = launcher(2, 1);
        launcher
            .start_exit_watcher(Duration::from_millis(10))
            .unwrap();
        let pid = launch(&launcher, renderer());
        backend.crash(pid, TerminationReason::Exited(3));

        wait_until(|| {
            launcher
                .termination_info(pid)
                .unwrap()
                .is_some_and(|info| info.reason.is_some())
        });
    }

    #[test]
    fn test_events_are_published() {
        let config = HostConfig::default();
        let backend = FakeBackend::new();
        let events = EventBus::new();
        let rx = events.subscribe();
        let launcher = ProcessLauncher::new(&config, Arc::new(backend), events).unwrap();

        let pid = launch(&launcher, renderer());
        launcher.stop(pid);
        settle(&launcher);

        assert_eq!(
            rx.recv_timeout(WAIT).unwrap(),
            HostEvent::ProcessStarted {
                pid,
                class: WorkerClass::Sandboxed
            }
        );
        match rx.recv_timeout(WAIT).unwrap() {
            HostEvent::ProcessExited { pid: exited, info } => {
                assert_eq!(exited, pid);
                assert!(info.killed_by_host);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_spare_is_used_for_next_launch() {
        let (launcher, backend) = launcher(2, 1);
        launcher.warm_up(WorkerClass::Sandboxed);
        wait_until(|| {
            backend.connect_count() == 1 && launcher.has_spare(WorkerClass::Sandboxed).unwrap()
        });

        let pid = launch(&launcher, renderer());
        assert_eq!(backend.connect_count(), 1);
        assert!(!launcher.has_spare(WorkerClass::Sandboxed).unwrap());
        assert!(backend.setup_command_line(pid).is_some());

        // A second warm-up creates a new spare instead of reusing the claimed one.
        launcher.warm_up(WorkerClass::Sandboxed);
        wait_until(|| backend.connect_count() == 2);
    }

    #[test]
    fn test_warm_up_skipped_when_full() {
        let (launcher, backend) = launcher(1, 1);
        launch(&launcher, renderer());
        launcher.warm_up(WorkerClass::Sandboxed);
        settle(&launcher);
        assert_eq!(backend.connect_count(), 1);
        assert!(!launcher.has_spare(WorkerClass::Sandboxed).unwrap());
    }

    #[test]
    fn test_binding_management_tracks_foreground_workers() {
        let (launcher, backend) = launcher(1, 1);
        launcher.enable_binding_management();
        let pid = launch(&launcher, renderer());

        launcher.set_importance(pid, true, 1, ChildImportance::Normal);
        settle(&launcher);
        // Foreground at depth 1 is moderate; the manager's binding keeps it
        // moderate even after the worker goes to the background.
        launcher.set_importance(pid, false, 1, ChildImportance::Normal);
        let workers = launcher.workers().unwrap();
        assert_eq!(workers[0].binding, BindingStrength::Moderate);

        launcher.on_application_background();
        let workers = launcher.workers().unwrap();
        assert_eq!(workers[0].binding, BindingStrength::None);

        launcher.on_application_foreground();
        let workers = launcher.workers().unwrap();
        assert_eq!(workers[0].binding, BindingStrength::Moderate);
        assert!(!backend.keep_alive_trace(pid).is_empty());
    }

    #[test]
    fn test_privileged_workers_are_not_managed() {
        let (launcher, _backend) = launcher(1, 1);
        launcher.enable_binding_management();
        let gpu = LaunchRequest::new(WorkerClass::Privileged, vec!["--type=gpu".to_string()]);
        let pid = launch(&launcher, gpu);

        launcher.set_importance(pid, true, 1, ChildImportance::Normal);
        launcher.set_importance(pid, false, 1, ChildImportance::Normal);
        let workers = launcher.workers().unwrap();
        assert_eq!(workers[0].binding, BindingStrength::None);
    }

    #[test]
    fn test_stop_all_clears_everything() {
        let (launcher, backend) = launcher(2, 2);
        let a = launch(&launcher, renderer());
        let b = launch(
            &launcher,
            LaunchRequest::new(WorkerClass::Privileged, vec!["--type=gpu".to_string()]),
        );
        launcher.stop_all().unwrap();
        assert!(!backend.is_alive(a));
        assert!(!backend.is_alive(b));
        assert!(launcher.workers().unwrap().is_empty());
    }
}
