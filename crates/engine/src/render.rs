// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic markdown rendering of a report.
//!
//! REPORT.md is derived: it carries exactly the information in
//! REPORT.json, truncated to the configured byte cap.

use relais_core::Report;

/// Render the report as markdown, truncated to `byte_cap` bytes.
pub fn render_markdown(report: &Report, byte_cap: usize) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Tick {}\n\n", report.run_id));
    md.push_str(&format!(
        "- **Verdict**: {} ({})\n",
        report.verdict, report.code
    ));
    if let Some(reason) = &report.reason {
        md.push_str(&format!("- **Reason**: {reason}\n"));
    }
    if let Some(summary) = &report.task_summary {
        md.push_str(&format!("- **Task**: {summary}\n"));
    }
    md.push_str(&format!("- **Duration**: {} ms\n", report.duration_ms));
    if let Some(base) = &report.base_commit {
        md.push_str(&format!("- **Base commit**: `{base}`\n"));
    }
    if let Some(head) = &report.head_commit {
        md.push_str(&format!("- **Head commit**: `{head}`\n"));
    }

    md.push_str(&format!(
        "\n## Blast radius\n\n{} files touched, +{} / -{} lines, {} new files\n",
        report.blast_radius.files_touched,
        report.blast_radius.lines_added,
        report.blast_radius.lines_deleted,
        report.blast_radius.new_files
    ));

    if !report.scope.ok {
        md.push_str("\n## Scope violations\n\n");
        for violation in &report.scope.violations {
            md.push_str(&format!("- `{}`: {}\n", violation.path, violation.kind));
        }
    }

    if !report.diff.files_changed.is_empty() {
        md.push_str("\n## Files changed\n\n");
        for file in &report.diff.files_changed {
            md.push_str(&format!("- `{file}`\n"));
        }
    }

    md.push_str(&format!(
        "\n## Verification ({})\n\n",
        report.verification.exec_mode
    ));
    if report.verification.runs.is_empty() {
        md.push_str("No templates executed.\n");
    } else {
        for run in &report.verification.runs {
            let status = if run.passed() {
                "PASS"
            } else if run.timed_out {
                "TIMEOUT"
            } else {
                "FAIL"
            };
            md.push_str(&format!(
                "- `{}` [{}] {} (exit {:?}, {} ms)\n",
                run.template_id, run.phase, status, run.exit_code, run.duration_ms
            ));
        }
    }
    if let Some(log) = &report.verification.log_path {
        md.push_str(&format!("\nLog: `{log}`\n"));
    }

    md.push_str(&format!(
        "\n## Budgets\n\n\
         - ticks: {}/{}\n\
         - orchestrator calls: {}/{}\n\
         - builder calls: {}/{}\n\
         - verify runs: {}/{}\n",
        report.budgets.counts.ticks,
        report.budgets.caps.max_ticks,
        report.budgets.counts.orchestrator_calls,
        report.budgets.caps.max_orchestrator_calls,
        report.budgets.counts.builder_calls,
        report.budgets.caps.max_builder_calls,
        report.budgets.counts.verify_runs,
        report.budgets.caps.max_verify_runs,
    ));
    if report.budgets.warning {
        md.push_str("\n**Budget warning active.**\n");
    }

    if let Some(error) = &report.reviewer_error {
        md.push_str(&format!("\n## Reviewer error\n\n{error}\n"));
    }

    truncate_to_bytes(md, byte_cap)
}

fn truncate_to_bytes(mut text: String, byte_cap: usize) -> String {
    if text.len() <= byte_cap {
        return text;
    }
    let marker = "\n\n[truncated]\n";
    let mut end = byte_cap.saturating_sub(marker.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str(marker);
    text
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
