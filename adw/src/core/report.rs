//! Fixed-layout failure report shown at the process boundary.

use crate::core::types::FailureAnalysis;

const RULE_WIDTH: usize = 80;

/// Render the human-readable report for a workflow that ran out of iterations.
pub fn render_failure_report(workflow: &str, analysis: &FailureAnalysis) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let logs = analysis.logs_location.as_deref().unwrap_or("<unknown>");

    let mut buf = String::new();
    buf.push_str(&format!("\n{rule}\n"));
    buf.push_str("AI DEVELOPER WORKFLOW FAILURE REPORT\n");
    buf.push_str(&format!("{rule}\n"));
    buf.push_str(&format!(
        "The workflow '{workflow}' did not complete successfully.\n"
    ));
    push_section(&mut buf, "ROOT CAUSES", &analysis.root_causes);
    push_section(&mut buf, "AFFECTED FILES", &analysis.affected_files);
    push_section(&mut buf, "SUGGESTED FIXES", &analysis.suggested_fixes);
    buf.push_str("\nNEXT STEPS:\n");
    buf.push_str(&format!("  - Review the log file at: {logs}\n"));
    buf.push_str("  - Make the suggested changes manually\n");
    buf.push_str("  - Or run the workflow again with modifications\n");
    buf.push_str(&format!("{rule}\n"));
    buf.push_str("To open the log file in your editor:\n");
    buf.push_str(&format!("  $EDITOR {logs}\n"));
    buf.push_str(&rule);
    buf
}

fn push_section(buf: &mut String, title: &str, items: &[String]) {
    buf.push_str(&format!("\n{title}:\n"));
    if items.is_empty() {
        buf.push_str("  - (none reported)\n");
        return;
    }
    for item in items {
        buf.push_str(&format!("  - {item}\n"));
    }
}
