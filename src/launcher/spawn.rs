//! Worker subprocess spawning and helper threads.
//!
//! Workers are started with `std::process::Command` (posix_spawn where the
//! platform allows it) running the warden binary in `worker` mode.

use super::proc::Proc;
use super::types::WorkerClass;
use crate::error::{Result, WardenError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Stack size for launcher helper threads. They only block on pipes.
const HELPER_STACK_SIZE: usize = 1024 * 1024;

/// Environment variables forwarded so worker logs look like the host's.
/// `WARDEN_LOG_FILE` is left out: workers only log to the inherited stderr.
const FORWARDED_ENV: [&str; 5] = [
    "WARDEN_LOG",
    "WARDEN_LOG_LEVEL",
    "WARDEN_LOG_FORMAT",
    "RUST_LOG",
    "NO_COLOR",
];

/// Pick the executable to run workers from.
///
/// An explicitly configured path must exist; otherwise the running binary is used.
pub fn resolve_worker_executable(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(WardenError::InvalidConfig(format!(
            "worker executable {} does not exist",
            path.display()
        ))),
        None => std::env::current_exe()
            .map_err(|e| WardenError::Worker(format!("Failed to get current executable: {}", e))),
    }
}

/// Spawn a worker of `class` from `executable`.
///
/// Stdin/stdout carry the protocol; stderr is inherited so worker logs reach
/// the host's terminal.
pub fn spawn_worker(executable: &Path, class: WorkerClass) -> Result<Proc> {
    let mut cmd = Command::new(executable);
    cmd.arg("worker").arg("--class").arg(class.as_str());

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    cmd.env_clear();
    for key in FORWARDED_ENV {
        if let Some(value) = std::env::var_os(key) {
            cmd.env(key, value);
        }
    }
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }

    let child = cmd.spawn().map_err(|e| {
        WardenError::Worker(format!(
            "Failed to spawn worker {}: {}",
            executable.display(),
            e
        ))
    })?;

    Proc::from_child(child)
}

/// Spawn a named helper thread for blocking work off a sequence.
pub fn spawn_helper_thread<F, T>(name: &str, f: F) -> Result<std::thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .stack_size(HELPER_STACK_SIZE)
        .spawn(f)
        .map_err(WardenError::from)
}
