//! The host: startup gating in front of the process launcher.
//!
//! A [`Host`] is built once per process and passed to whoever needs workers.
//! Nothing is started until someone asks: partial startup creates the launcher
//! and its exit polling, full startup turns on binding management and the
//! optional spare warm-up. Launch operations fail with [`WardenError::NotStarted`] until
//! partial startup has completed.

use crate::config::HostConfig;
use crate::error::{Result, WardenError};
use crate::events::{EventBus, HostEvent};
use crate::launcher::{
    ChildImportance, LaunchHandle, LaunchRequest, ProcessId, ProcessLauncher, ServiceBackend,
    SubprocessBackend, TerminationInfo, WorkerClass, WorkerSummary, resolve_worker_executable,
    spawn_helper_thread,
};
use crate::startup::{
    Bootstrap, PhaseCompletion, StartupLevel, StartupOrchestrator, StartupOutcome, StartupState,
};
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Runs each startup phase on a helper thread.
struct HostBootstrap {
    config: Arc<HostConfig>,
    backend: Option<Arc<dyn ServiceBackend>>,
    events: EventBus,
    launcher: Arc<OnceLock<ProcessLauncher>>,
}

impl Bootstrap for HostBootstrap {
    fn begin(&mut self, phase: StartupLevel, completion: PhaseCompletion) {
        let config = Arc::clone(&self.config);
        let backend = self.backend.clone();
        let events = self.events.clone();
        let launcher = Arc::clone(&self.launcher);

        let spawned = spawn_helper_thread(&format!("warden-bootstrap-{}", phase), move || {
            let result = match phase {
                StartupLevel::Partial => start_partial(&config, backend, events, &launcher),
                StartupLevel::Full => start_full(&config, &launcher),
            };
            completion.finish(result);
        });
        // On failure the completion was dropped with the closure and has
        // already reported it.
        if let Err(e) = spawned {
            tracing::error!(%phase, error = %e, "Could not start bootstrap thread");
        }
    }
}

fn start_partial(
    config: &HostConfig,
    backend: Option<Arc<dyn ServiceBackend>>,
    events: EventBus,
    slot: &OnceLock<ProcessLauncher>,
) -> Result<()> {
    if slot.get().is_some() {
        return Ok(());
    }
    config.validate()?;
    let backend = match backend {
        Some(backend) => backend,
        None => {
            let executable = resolve_worker_executable(config.worker_executable.as_deref())?;
            debug!(executable = %executable.display(), "Using worker executable");
            Arc::new(SubprocessBackend::new(executable, config))
        }
    };
    let launcher = ProcessLauncher::new(config, backend, events)?;
    launcher.start_exit_watcher(config.exit_poll_interval())?;
    let _ = slot.set(launcher);
    info!(
        sandboxed_slots = config.sandboxed_slots,
        privileged_slots = config.privileged_slots,
        "Launcher ready"
    );
    Ok(())
}

fn start_full(config: &HostConfig, slot: &OnceLock<ProcessLauncher>) -> Result<()> {
    let launcher = slot.get().ok_or(WardenError::NotStarted)?;
    launcher.enable_binding_management();
    if config.warm_up_on_full_start {
        launcher.warm_up(WorkerClass::Sandboxed);
    }
    Ok(())
}

pub struct Host {
    startup: StartupOrchestrator,
    launcher: Arc<OnceLock<ProcessLauncher>>,
    events: EventBus,
    config: Arc<HostConfig>,
}

impl Host {
    /// A host whose workers are subprocesses of the configured executable.
    pub fn new(config: HostConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// A host using a custom backend.
    pub fn with_backend(config: HostConfig, backend: Arc<dyn ServiceBackend>) -> Result<Self> {
        Self::build(config, Some(backend))
    }

    fn build(config: HostConfig, backend: Option<Arc<dyn ServiceBackend>>) -> Result<Self> {
        let config = Arc::new(config);
        let events = EventBus::new();
        let launcher = Arc::new(OnceLock::new());
        let startup = StartupOrchestrator::new(HostBootstrap {
            config: Arc::clone(&config),
            backend,
            events: events.clone(),
            launcher: Arc::clone(&launcher),
        })?;
        Ok(Self {
            startup,
            launcher,
            events,
            config,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Request a startup level; `callback` hears the outcome exactly once.
    pub fn ensure_started(
        &self,
        level: StartupLevel,
        callback: impl FnOnce(StartupOutcome) + Send + 'static,
    ) {
        self.startup.request_start(level, callback);
    }

    /// Block until `level` is reached.
    ///
    /// Must not be called from a startup callback.
    pub fn ensure_started_sync(&self, level: StartupLevel) -> Result<()> {
        self.startup.request_start_sync(level)
    }

    /// Be told when full startup completes, without requesting it.
    pub fn add_startup_observer(&self, callback: impl FnOnce(StartupOutcome) + Send + 'static) {
        self.startup.add_completion_observer(callback);
    }

    pub fn startup_state(&self) -> StartupState {
        self.startup.state()
    }

    pub fn is_startup_successfully_completed(&self) -> bool {
        self.startup.is_startup_successfully_completed()
    }

    fn launcher(&self) -> Result<&ProcessLauncher> {
        self.launcher.get().ok_or(WardenError::NotStarted)
    }

    pub fn create_and_launch(&self, request: LaunchRequest) -> Result<LaunchHandle> {
        Ok(self.launcher()?.launch(request))
    }

    pub fn set_importance(
        &self,
        pid: ProcessId,
        foreground: bool,
        depth: u32,
        importance: ChildImportance,
    ) -> Result<()> {
        self.launcher()?
            .set_importance(pid, foreground, depth, importance);
        Ok(())
    }

    pub fn stop(&self, pid: ProcessId) -> Result<()> {
        self.launcher()?.stop(pid);
        Ok(())
    }

    pub fn query_termination_info(&self, pid: ProcessId) -> Result<Option<TerminationInfo>> {
        self.launcher()?.termination_info(pid)
    }

    pub fn warm_up(&self, class: WorkerClass) -> Result<()> {
        self.launcher()?.warm_up(class);
        Ok(())
    }

    pub fn process_ids_by_type(&self) -> Result<BTreeMap<String, Vec<ProcessId>>> {
        self.launcher()?.process_ids_by_type()
    }

    pub fn workers(&self) -> Result<Vec<WorkerSummary>> {
        self.launcher()?.workers()
    }

    /// Reap dead workers now instead of waiting for the next poll.
    pub fn poll_exits(&self) -> Result<()> {
        self.launcher()?.poll_exits()
    }

    /// The application went to the background. Ignored before startup.
    pub fn on_application_background(&self) {
        match self.launcher.get() {
            Some(launcher) => launcher.on_application_background(),
            None => debug!("Background notification before startup"),
        }
    }

    /// The application came back to the foreground. Ignored before startup.
    pub fn on_application_foreground(&self) {
        match self.launcher.get() {
            Some(launcher) => launcher.on_application_foreground(),
            None => debug!("Foreground notification before startup"),
        }
    }

    pub fn subscribe(&self) -> Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Stop every worker. Safe to call before startup.
    pub fn shutdown(&self) -> Result<()> {
        match self.launcher.get() {
            Some(launcher) => launcher.stop_all(),
            None => Ok(()),
        }
    }
}
