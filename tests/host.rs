//! Host tests against real worker subprocesses.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use warden::{
    BindingStrength, ChildImportance, Host, HostConfig, HostEvent, LaunchRequest, ProcessId,
    StartupLevel, TerminationInfo, TerminationReason, WardenError, WorkerClass,
};

const WAIT: Duration = Duration::from_secs(10);

fn config(sandboxed_slots: usize) -> HostConfig {
    HostConfig {
        sandboxed_slots,
        worker_executable: Some(PathBuf::from(env!("CARGO_BIN_EXE_warden"))),
        exit_poll_interval_ms: 20,
        ..HostConfig::default()
    }
}

fn started_host(sandboxed_slots: usize) -> Host {
    let host = Host::new(config(sandboxed_slots)).unwrap();
    host.ensure_started_sync(StartupLevel::Full).unwrap();
    host
}

fn launch(host: &Host, process_type: &str) -> ProcessId {
    let request = LaunchRequest::new(
        WorkerClass::Sandboxed,
        vec![format!("--type={}", process_type)],
    );
    host.create_and_launch(request).unwrap().wait().unwrap()
}

fn wait_for_exit(
    events: &crossbeam_channel::Receiver<HostEvent>,
    pid: ProcessId,
) -> TerminationInfo {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining).unwrap() {
            HostEvent::ProcessExited { pid: exited, info } if exited == pid => return info,
            _ => continue,
        }
    }
}

fn pid_alive(pid: ProcessId) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[test]
fn test_launch_and_stop_real_worker() {
    let host = started_host(2);
    let events = host.subscribe();
    let pid = launch(&host, "renderer");
    assert!(pid_alive(pid));

    let by_type = host.process_ids_by_type().unwrap();
    assert_eq!(by_type.get("renderer"), Some(&vec![pid]));

    host.stop(pid).unwrap();
    // The slot is free as soon as the stop is processed.
    assert!(host.workers().unwrap().is_empty());
    let info = host.query_termination_info(pid).unwrap().unwrap();
    assert!(info.killed_by_host);

    wait_for_exit(&events, pid);
    let info = host.query_termination_info(pid).unwrap().unwrap();
    assert!(info.killed_by_host);
    assert_eq!(info.reason, Some(TerminationReason::Exited(0)));
    host.shutdown().unwrap();
}

#[test]
fn test_full_class_evicts_least_important() {
    let host = started_host(2);
    let first = launch(&host, "renderer");
    let second = launch(&host, "renderer");
    host.set_importance(first, false, 1, ChildImportance::Normal)
        .unwrap();
    host.set_importance(second, false, 1, ChildImportance::Important)
        .unwrap();

    let third = launch(&host, "renderer");

    let live: Vec<ProcessId> = host.workers().unwrap().iter().map(|w| w.pid).collect();
    assert_eq!(live.len(), 2);
    assert!(live.contains(&second));
    assert!(live.contains(&third));

    let info = host.query_termination_info(first).unwrap().unwrap();
    assert!(info.killed_by_host);
    assert_eq!(info.reason, Some(TerminationReason::Killed));
    assert_eq!(info.binding_state, BindingStrength::None);
    host.shutdown().unwrap();
}

#[test]
fn test_external_kill_is_reported_as_oom() {
    let host = started_host(2);
    let events = host.subscribe();
    let pid = launch(&host, "renderer");

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();

    let info = wait_for_exit(&events, pid);
    assert!(!info.killed_by_host);
    assert_eq!(info.reason, Some(TerminationReason::OutOfMemory));
    host.shutdown().unwrap();
}

#[test]
fn test_launch_before_startup_is_rejected() {
    let host = Host::new(config(2)).unwrap();
    let request = LaunchRequest::new(WorkerClass::Sandboxed, vec![]);
    assert!(matches!(
        host.create_and_launch(request),
        Err(WardenError::NotStarted)
    ));
}

#[test]
fn test_missing_worker_executable_fails_startup() {
    let config = HostConfig {
        worker_executable: Some(PathBuf::from("/nonexistent/warden")),
        ..HostConfig::default()
    };
    let host = Host::new(config).unwrap();
    assert!(matches!(
        host.ensure_started_sync(StartupLevel::Partial),
        Err(WardenError::StartupFailed(StartupLevel::Partial))
    ));
}

#[test]
fn test_shutdown_stops_every_worker() {
    let host = started_host(3);
    let pids: Vec<ProcessId> = (0..3).map(|_| launch(&host, "utility")).collect();
    host.shutdown().unwrap();

    for pid in pids {
        let info = host.query_termination_info(pid).unwrap().unwrap();
        assert!(info.killed_by_host);
        assert!(info.reason.is_some());
        assert!(!pid_alive(pid));
    }
}
