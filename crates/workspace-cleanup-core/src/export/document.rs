use std::fmt::Write;

use crate::report::Report;
use crate::risk::RiskCategory;

pub const DEFAULT_TITLE: &str = "Workspace Cleanup Report";

/// Upper bound on rows in the high-risk table.
const TOP_HIGH_RISK: usize = 20;

const RECOMMENDATIONS: [&str; 5] = [
    "Review all Critical and High risk users immediately",
    "Contact managers for confirmation on flagged users",
    "Consider reducing access for users inactive 90+ days",
    "Schedule regular quarterly access reviews",
    "Document all access changes for compliance",
];

/// Render the report as a Markdown document.
pub fn render_document(report: &Report, title: &str) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_document(&mut out, report, title);
    out
}

fn write_document(out: &mut String, report: &Report, title: &str) -> std::fmt::Result {
    let summary = report.summary();
    let total = report.len();

    writeln!(out, "# {title}")?;
    writeln!(out)?;
    writeln!(
        out,
        "_Generated: {}_",
        report.generated_at.format("%B %d, %Y at %H:%M UTC")
    )?;
    writeln!(out)?;

    writeln!(out, "## Executive Summary")?;
    writeln!(out)?;
    writeln!(out, "- Total Users Analyzed: {total}")?;
    if total > 0 {
        writeln!(out, "- Average Risk Score: {:.1}", summary.risk.average_score)?;
        writeln!(out, "- High Risk Users: {}", summary.risk.high)?;
        writeln!(out, "- Critical Risk Users: {}", summary.risk.critical)?;
        writeln!(out, "- Users Inactive 90+ Days: {}", summary.inactive_users)?;
    }
    writeln!(out)?;

    if total > 0 {
        writeln!(out, "## Risk Distribution")?;
        writeln!(out)?;
        writeln!(out, "| Category | Range | Users | Share |")?;
        writeln!(out, "|---|---|---:|---:|")?;
        for category in RiskCategory::ALL {
            writeln!(
                out,
                "| {} | {} | {} | {:.1}% |",
                category.label(),
                category.range_label(),
                summary.risk.count(category),
                summary.risk.percentage(category)
            )?;
        }
        writeln!(out)?;
    }

    let mut high_risk: Vec<_> = report.high_risk_rows().collect();
    if !high_risk.is_empty() {
        high_risk.sort_by(|a, b| b.risk.score.cmp(&a.risk.score));
        writeln!(out, "## High Risk Users (Top {TOP_HIGH_RISK})")?;
        writeln!(out)?;
        writeln!(out, "| Name | Email | Risk Score | Last Login (days) |")?;
        writeln!(out, "|---|---|---:|---:|")?;
        for row in high_risk.into_iter().take(TOP_HIGH_RISK) {
            writeln!(
                out,
                "| {} | {} | {} | {} |",
                escape_cell(&row.user.name),
                escape_cell(&row.user.email),
                row.risk.score,
                row.user.last_login_days
            )?;
        }
        writeln!(out)?;
    }

    if report.ai_enabled {
        writeln!(out, "## AI Classification")?;
        writeln!(out)?;
        for entry in &summary.dispositions {
            writeln!(out, "- {}: {}", entry.disposition, entry.count)?;
        }
        let failed = report.failed_batches().count();
        if failed > 0 {
            writeln!(
                out,
                "- Failed batches: {failed} of {}",
                report.batches.len()
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Recommendations")?;
    writeln!(out)?;
    for (idx, recommendation) in RECOMMENDATIONS.iter().enumerate() {
        writeln!(out, "{}. {recommendation}", idx + 1)?;
    }
    writeln!(out)?;

    writeln!(out, "---")?;
    writeln!(out)?;
    writeln!(out, "_This report was generated by Workspace Cleanup Planner._")?;
    writeln!(
        out,
        "_All recommendations should be reviewed by IT administrators before implementation._"
    )?;
    Ok(())
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|")
}
