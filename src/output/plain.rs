//! Plain text output for launch reports.

use crate::output::LaunchReport;
use std::fmt::Write;

/// Render a launch report as plain text (tab-separated, no colors).
///
/// Workers and exits are separate blocks, each with its own header line.
pub fn render_plain(report: &LaunchReport) -> String {
    let mut out = String::new();

    if report.workers.is_empty() {
        out.push_str("No workers running.\n");
    } else {
        out.push_str("PID\tCLASS\tSLOT\tTYPE\tIMPORTANCE\tBINDING\tVISIBLE\tRANK\n");
        for worker in &report.workers {
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                worker.pid,
                worker.class,
                worker.slot,
                worker.process_type.as_deref().unwrap_or("-"),
                worker.importance,
                worker.binding,
                if worker.foreground { "yes" } else { "no" },
                worker.rank
            );
        }
    }

    if !report.exits.is_empty() {
        out.push('\n');
        out.push_str("PID\tBINDING\tKILLED_BY_HOST\tREASON\n");
        for exit in &report.exits {
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}",
                exit.pid,
                exit.binding_state,
                exit.killed_by_host,
                exit.reason.as_deref().unwrap_or("running")
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures;

    #[test]
    fn test_render_plain_empty() {
        assert_eq!(render_plain(&LaunchReport::default()), "No workers running.\n");
    }

    #[test]
    fn test_render_plain_with_results() {
        let rendered = render_plain(&fixtures::report());
        let lines: Vec<&str> = rendered.lines().collect();

        assert!(lines[0].starts_with("PID\tCLASS"));
        assert_eq!(
            lines[1],
            "4101\tsandboxed\t0\trenderer\timportant\tstrong\tyes\t1"
        );
        assert_eq!(lines[2], "4102\tsandboxed\t1\t-\tnormal\tnone\tno\t2");
        assert_eq!(lines[3], "");
        assert!(lines[4].starts_with("PID\tBINDING"));
        assert_eq!(lines[5], "4101\tstrong\ttrue\texited with code 0");
        assert!(!rendered.contains("\x1b["));
    }
}
