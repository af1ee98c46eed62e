//! Colored table output for launch reports.

use crate::launcher::WorkerSummary;
use crate::output::{ExitRecord, LaunchReport, TableOptions};
use crate::theme::{Semantic, ThemedCell};
use comfy_table::{
    Cell, ContentArrangement, Table,
    presets::{ASCII_FULL, UTF8_FULL},
};

fn new_table(options: TableOptions) -> Table {
    let mut table = Table::new();

    // Choose preset based on ASCII option
    if options.ascii {
        table.load_preset(ASCII_FULL);
    } else {
        table.load_preset(UTF8_FULL);
    }

    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn workers_table(workers: &[WorkerSummary], options: TableOptions) -> Table {
    let mut table = new_table(options);
    table.set_header(vec![
        "PID",
        "Class",
        "Slot",
        "Type",
        "Importance",
        "Binding",
        "Visible",
        "Rank",
    ]);

    for worker in workers {
        let visible = if worker.foreground {
            format!("yes (depth {})", worker.depth)
        } else {
            "no".to_string()
        };
        table.add_row(vec![
            Cell::new(worker.pid).themed(Semantic::Pid),
            Cell::new(worker.class).themed(Semantic::Class),
            Cell::new(worker.slot),
            Cell::new(worker.process_type.as_deref().unwrap_or("-")),
            Cell::new(worker.importance).themed(Semantic::for_importance(worker.importance)),
            Cell::new(worker.binding).themed(Semantic::for_binding(worker.binding)),
            Cell::new(visible).themed(Semantic::Muted),
            Cell::new(worker.rank),
        ]);
    }
    table
}

fn exits_table(exits: &[ExitRecord], options: TableOptions) -> Table {
    let mut table = new_table(options);
    table.set_header(vec!["PID", "Binding", "Killed By Host", "Reason"]);

    for exit in exits {
        let reason = match &exit.reason {
            Some(reason) if exit.crashed => Cell::new(reason).themed(Semantic::Crash),
            Some(reason) => Cell::new(reason).themed(Semantic::Clean),
            None => Cell::new("running").themed(Semantic::Muted),
        };
        table.add_row(vec![
            Cell::new(exit.pid).themed(Semantic::Pid),
            Cell::new(exit.binding_state).themed(Semantic::for_binding(exit.binding_state)),
            Cell::new(if exit.killed_by_host { "yes" } else { "no" }),
            reason,
        ]);
    }
    table
}

/// Render a launch report as colored tables.
pub fn render_table(report: &LaunchReport, options: TableOptions) -> String {
    let mut out = String::new();

    if report.workers.is_empty() {
        out.push_str("No workers running.\n");
    } else {
        out.push_str(&format!("{}\n", workers_table(&report.workers, options)));
    }

    if !report.exits.is_empty() {
        out.push_str(&format!("{}\n", exits_table(&report.exits, options)));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures;

    #[test]
    fn test_render_table_empty() {
        assert_eq!(
            render_table(&LaunchReport::default(), TableOptions::default()),
            "No workers running.\n"
        );
    }

    #[test]
    fn test_render_table_with_results() {
        let rendered = render_table(&fixtures::report(), TableOptions::default());
        assert!(rendered.contains("4101"));
        assert!(rendered.contains("renderer"));
        assert!(rendered.contains("out of memory"));
        assert!(rendered.contains("Killed By Host"));
    }

    #[test]
    fn test_render_table_ascii() {
        let rendered = render_table(&fixtures::report(), TableOptions { ascii: true });
        assert!(!rendered.contains('│'));
    }
}
