//! JSON output for launch reports.

use crate::output::LaunchReport;

/// Render a launch report as pretty-printed JSON.
pub fn render_json(report: &LaunchReport) -> String {
    let json = serde_json::to_string_pretty(report)
        .unwrap_or_else(|_| r#"{"workers":[],"exits":[]}"#.to_string());
    format!("{}\n", json)
}
