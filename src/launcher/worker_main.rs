//! Worker subprocess entry point.
//!
//! Runs when `warden worker --class <class>` is invoked by the host. The worker
//! announces itself, applies the host's setup, then idles until it is told to
//! exit, its stdin closes, or it is killed.

use super::ipc::{LineReader, LineWriter, PipeFd};
use super::protocol::{HostMessage, WorkerMessage};
use super::types::{ResourceHandle, WorkerClass};
use std::io;
use std::os::unix::io::AsFd;

/// Check that every resource names a readable region of an existing file.
fn validate_resources(resources: &[ResourceHandle]) -> Result<(), String> {
    for resource in resources {
        let meta = std::fs::metadata(&resource.path)
            .map_err(|e| {
                format!(
                    "resource '{}' ({}): {}",
                    resource.id,
                    resource.path.display(),
                    e
                )
            })?;
        if !meta.is_file() {
            return Err(format!(
                "resource '{}' ({}) is not a regular file",
                resource.id,
                resource.path.display()
            ));
        }
        let end = resource.offset.saturating_add(resource.size);
        if resource.offset > meta.len() || end > meta.len() {
            return Err(format!(
                "resource '{}' region {}+{} exceeds file length {}",
                resource.id,
                resource.offset,
                resource.size,
                meta.len()
            ));
        }
    }
    Ok(())
}

fn send(writer: &mut LineWriter, message: &WorkerMessage) -> io::Result<()> {
    let line = message.to_line().map_err(io::Error::other)?;
    writer.write_line(&line)
}

/// Worker main loop. Returns the process exit code.
fn worker_loop(
    class: WorkerClass,
    reader: &mut LineReader,
    writer: &mut LineWriter,
) -> io::Result<i32> {
    let pid = std::process::id();
    send(writer, &WorkerMessage::Ready { pid })?;
    tracing::debug!(pid, %class, "Worker ready");

    let mut configured = false;
    while let Some(line) = reader.read_line()? {
        let message = match HostMessage::from_line(&line) {
            Ok(message) => message,
            Err(e) => {
                send(writer, &WorkerMessage::error(format!("Invalid message: {}", e)))?;
                continue;
            }
        };

        match message {
            HostMessage::Exit => {
                tracing::debug!(pid, "Worker exiting on request");
                return Ok(0);
            }
            HostMessage::Setup { .. } if configured => {
                send(writer, &WorkerMessage::error("setup already applied"))?;
            }
            HostMessage::Setup {
                command_line,
                resources,
            } => {
                if let Err(message) = validate_resources(&resources) {
                    tracing::warn!(pid, %message, "Rejecting setup");
                    send(writer, &WorkerMessage::error(message))?;
                    return Ok(1);
                }
                configured = true;
                tracing::info!(
                    pid,
                    %class,
                    args = command_line.len(),
                    resources = resources.len(),
                    "Worker started"
                );
                send(writer, &WorkerMessage::Started)?;
            }
        }
    }

    // Host closed the pipe.
    Ok(0)
}

/// Wrap duplicates of stdin/stdout; the protocol owns those descriptors.
fn open_stdio() -> io::Result<(LineReader, LineWriter)> {
    let stdin = io::stdin().as_fd().try_clone_to_owned()?;
    let stdout = io::stdout().as_fd().try_clone_to_owned()?;
    Ok((
        LineReader::new(PipeFd::new(stdin)),
        LineWriter::new(PipeFd::new(stdout)),
    ))
}

/// Run the worker process. Never returns.
pub fn run_worker_main(class: WorkerClass) -> ! {
    // Pipe errors surface as io::Error instead of killing us.
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigIgn,
        )
        .ok();
    }

    let result = open_stdio().and_then(|(mut reader, mut writer)| {
        worker_loop(class, &mut reader, &mut writer)
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, "Worker I/O failed");
            std::process::exit(1);
        }
    }
}
