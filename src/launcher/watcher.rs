//! Periodic exit polling.
//!
//! Runs a background thread that asks the launcher sequence to reap dead
//! workers at a fixed interval. Exits of stopped or evicted workers are handled
//! inline; this catches the ones that die on their own.

use super::state::LauncherCore;
use crate::error::{Result, WardenError};
use crate::sequence::SequenceHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct ExitWatcher {
    /// Flag to stop the watcher thread.
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ExitWatcher {
    pub(crate) fn start(
        launcher: SequenceHandle<LauncherCore>,
        interval: Duration,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let thread = thread::Builder::new()
            .name("warden-exit-watcher".to_string())
            .spawn(move || watch_loop(launcher, interval, shutdown_clone))
            .map_err(WardenError::from)?;

        Ok(Self {
            shutdown,
            thread: Some(thread),
        })
    }

    /// Stop the watcher and wait for its thread.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

impl Drop for ExitWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_loop(
    launcher: SequenceHandle<LauncherCore>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    tracing::debug!(interval_ms = interval.as_millis() as u64, "Exit watcher started");

    while !shutdown.load(Ordering::Relaxed) {
        if !launcher.post(LauncherCore::poll_exits) {
            break;
        }
        // Unparked early on shutdown.
        thread::park_timeout(interval);
    }

    tracing::debug!("Exit watcher stopped");
}
