//! warden - bounded out-of-process worker launcher.
//!
//! A [`Host`] owns a fixed number of worker slots per [`WorkerClass`]. Workers
//! run as subprocesses of the same binary and are kept alive with bindings
//! whose strength follows each worker's importance; when a class is full, the
//! least important worker is evicted to make room. Launching is gated behind a
//! two-phase startup so callers can ask for exactly the level they need.
//!
//! ```no_run
//! use warden::{Host, HostConfig, LaunchRequest, StartupLevel, WorkerClass};
//!
//! # fn main() -> warden::Result<()> {
//! let host = Host::new(HostConfig::default())?;
//! host.ensure_started_sync(StartupLevel::Partial)?;
//!
//! let request = LaunchRequest::new(WorkerClass::Sandboxed, vec!["--type=renderer".into()]);
//! let pid = host.create_and_launch(request)?.wait()?;
//! host.stop(pid)?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod launcher;
pub mod logging;
pub mod output;
pub mod paths;
pub mod sequence;
pub mod startup;
pub mod theme;

pub use config::HostConfig;
pub use error::{Result, WardenError};
pub use events::{EventBus, HostEvent};
pub use host::Host;
pub use launcher::{
    BindingStrength, ChildImportance, LaunchHandle, LaunchRequest, ProcessId, ResourceHandle,
    TerminationInfo, TerminationReason, WorkerClass, WorkerSummary,
};
pub use startup::{StartupLevel, StartupOutcome, StartupState};
