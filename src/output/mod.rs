//! Output formatting for launch reports.

pub mod json;
pub mod plain;
pub mod table;

use crate::launcher::{BindingStrength, ProcessId, TerminationInfo, WorkerSummary};
use serde::Serialize;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Colored table output (default).
    #[default]
    Table,
    /// JSON output.
    Json,
    /// Plain text output (no colors).
    Plain,
}

/// Table display options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    /// Use ASCII borders instead of Unicode.
    pub ascii: bool,
}

/// How one worker ended, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitRecord {
    pub pid: ProcessId,
    pub binding_state: BindingStrength,
    pub killed_by_host: bool,
    /// `None` while the worker has not been reaped.
    pub reason: Option<String>,
    pub crashed: bool,
}

impl ExitRecord {
    pub fn new(pid: ProcessId, info: &TerminationInfo) -> Self {
        Self {
            pid,
            binding_state: info.binding_state,
            killed_by_host: info.killed_by_host,
            reason: info.reason.map(|reason| reason.to_string()),
            crashed: info.reason.is_some_and(|reason| reason.is_crash()),
        }
    }
}

/// Everything the launch command reports: the workers it started, then how
/// they ended once the host shut down.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LaunchReport {
    pub workers: Vec<WorkerSummary>,
    pub exits: Vec<ExitRecord>,
}

/// Format and print a launch report.
pub fn print_report(report: &LaunchReport, format: OutputFormat, options: TableOptions) {
    let rendered = match format {
        OutputFormat::Table => table::render_table(report, options),
        OutputFormat::Json => json::render_json(report),
        OutputFormat::Plain => plain::render_plain(report),
    };
    print!("{}", rendered);
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::launcher::{ChildImportance, TerminationReason, WorkerClass};

    pub fn report() -> LaunchReport {
        LaunchReport {
            workers: vec![
                WorkerSummary {
                    pid: 4101,
                    class: WorkerClass::Sandboxed,
                    slot: 0,
                    process_type: Some("renderer".to_string()),
                    importance: ChildImportance::Important,
                    binding: BindingStrength::Strong,
                    foreground: true,
                    depth: 0,
                    rank: 1,
                },
                WorkerSummary {
                    pid: 4102,
                    class: WorkerClass::Sandboxed,
                    slot: 1,
                    process_type: None,
                    importance: ChildImportance::Normal,
                    binding: BindingStrength::None,
                    foreground: false,
                    depth: 1,
                    rank: 2,
                },
            ],
            exits: vec![
                ExitRecord::new(
                    4101,
                    &TerminationInfo {
                        binding_state: BindingStrength::Strong,
                        killed_by_host: true,
                        reason: Some(TerminationReason::Exited(0)),
                    },
                ),
                ExitRecord::new(
                    4102,
                    &TerminationInfo {
                        binding_state: BindingStrength::None,
                        killed_by_host: false,
                        reason: Some(TerminationReason::OutOfMemory),
                    },
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::TerminationReason;

    #[test]
    fn test_exit_record_flags_crashes() {
        let crashed = ExitRecord::new(
            7,
            &TerminationInfo {
                binding_state: BindingStrength::Moderate,
                killed_by_host: false,
                reason: Some(TerminationReason::Crashed(nix::sys::signal::Signal::SIGSEGV)),
            },
        );
        assert!(crashed.crashed);
        assert!(crashed.reason.is_some());

        let pending = ExitRecord::new(
            8,
            &TerminationInfo {
                binding_state: BindingStrength::Moderate,
                killed_by_host: false,
                reason: None,
            },
        );
        assert!(!pending.crashed);
        assert_eq!(pending.reason, None);
    }

    #[test]
    fn test_print_report_all_formats() {
        let report = fixtures::report();
        for format in [OutputFormat::Table, OutputFormat::Json, OutputFormat::Plain] {
            print_report(&report, format, TableOptions::default());
        }
    }
}
