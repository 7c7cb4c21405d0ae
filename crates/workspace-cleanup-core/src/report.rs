use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::BatchOutcome;
use crate::loader::DefaultApplied;
use crate::model::{AccessLevel, Classification, Disposition, UserRecord};
use crate::risk::{round1, RiskAssessment, RiskCategory, RiskSummary};

/// Days without login after which a user counts as inactive in summaries.
pub const INACTIVE_AFTER_DAYS: u32 = 90;

/// One user with their score and AI classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub user: UserRecord,
    pub risk: RiskAssessment,
    pub classification: Classification,
}

/// Result of one generate action: every input user exactly once, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub ai_enabled: bool,
    pub rows: Vec<ReportRow>,
    pub batches: Vec<BatchOutcome>,
    pub defaults: Vec<DefaultApplied>,
}

impl Report {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|batch| batch.is_failure())
    }

    /// True when AI was attempted and not a single batch came back.
    pub fn all_batches_failed(&self) -> bool {
        self.ai_enabled && !self.batches.is_empty() && self.batches.iter().all(BatchOutcome::is_failure)
    }

    /// Rows scoring strictly above the Medium band.
    pub fn high_risk_rows(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(|row| row.risk.category.is_high_risk())
    }

    /// Rows at or above `category`.
    pub fn rows_at_least(&self, category: RiskCategory) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(move |row| row.risk.category >= category)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_rows(&self.rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionCount {
    pub disposition: Disposition,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCount {
    pub access_level: AccessLevel,
    pub count: usize,
}

/// Headline statistics shown in exports and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub risk: RiskSummary,
    pub dispositions: Vec<DispositionCount>,
    pub average_last_login_days: f64,
    pub inactive_users: usize,
    /// Access levels in order of first appearance.
    pub access_levels: Vec<AccessCount>,
}

impl ReportSummary {
    pub fn from_rows(rows: &[ReportRow]) -> Self {
        let risk = RiskSummary::from_assessments(rows.iter().map(|row| &row.risk));

        let dispositions = Disposition::ALL
            .into_iter()
            .map(|disposition| DispositionCount {
                disposition,
                count: rows
                    .iter()
                    .filter(|row| row.classification.disposition == disposition)
                    .count(),
            })
            .collect();

        let mut access_levels: Vec<AccessCount> = Vec::new();
        for row in rows {
            match access_levels
                .iter_mut()
                .find(|entry| entry.access_level == row.user.access_level)
            {
                Some(entry) => entry.count += 1,
                None => access_levels.push(AccessCount {
                    access_level: row.user.access_level,
                    count: 1,
                }),
            }
        }

        let total_days: u64 = rows.iter().map(|row| u64::from(row.user.last_login_days)).sum();
        let average_last_login_days = if rows.is_empty() {
            0.0
        } else {
            round1(total_days as f64 / rows.len() as f64)
        };

        Self {
            risk,
            dispositions,
            average_last_login_days,
            inactive_users: rows
                .iter()
                .filter(|row| row.user.last_login_days > INACTIVE_AFTER_DAYS)
                .count(),
            access_levels,
        }
    }

    pub fn disposition_count(&self, disposition: Disposition) -> usize {
        self.dispositions
            .iter()
            .find(|entry| entry.disposition == disposition)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }
}

/// Format styles supported by [`render_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Produce a report string using the desired format.
pub fn render_report(report: &Report, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonReport::from(report))?),
    }
}

fn render_human(report: &Report) -> anyhow::Result<String> {
    let summary = report.summary();
    let mut out = String::new();
    writeln!(
        out,
        "Cleanup plan for {} user(s) generated {}",
        report.len(),
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    )?;
    writeln!(
        out,
        "Average risk score: {:.1} • max {} • high-risk users: {}",
        summary.risk.average_score,
        summary.risk.max_score,
        summary.risk.high_risk_total()
    )?;
    writeln!(out)?;

    writeln!(out, "Users:")?;
    for row in &report.rows {
        writeln!(
            out,
            "  - {email:<32} {score:>3} {category:<8} {disposition}",
            email = row.user.email,
            score = row.risk.score,
            category = row.risk.category.label(),
            disposition = row.classification.disposition,
        )?;
        if let Some(rationale) = &row.classification.rationale {
            writeln!(out, "      {}", sanitize(rationale))?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Risk distribution:")?;
    for category in RiskCategory::ALL {
        writeln!(
            out,
            "  - {label:>8} ({range}): {count}",
            label = category.label(),
            range = category.range_label(),
            count = summary.risk.count(category)
        )?;
    }

    if report.ai_enabled {
        writeln!(out)?;
        writeln!(out, "AI classification:")?;
        for entry in &summary.dispositions {
            writeln!(out, "  - {}: {}", entry.disposition, entry.count)?;
        }
        for batch in report.failed_batches() {
            writeln!(
                out,
                "  ! batch {} (rows {}..{}) failed: {}",
                batch.index,
                batch.rows.start + 1,
                batch.rows.end,
                batch.failure.as_deref().unwrap_or_default()
            )?;
        }
    }

    if !report.defaults.is_empty() {
        writeln!(out)?;
        writeln!(out, "Defaults applied:")?;
        for applied in &report.defaults {
            writeln!(out, "  - {applied}")?;
        }
    }

    Ok(out)
}

fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    ai_enabled: bool,
    summary: ReportSummary,
    rows: &'a [ReportRow],
    batches: &'a [BatchOutcome],
    defaults: &'a [DefaultApplied],
}

impl<'a> From<&'a Report> for JsonReport<'a> {
    fn from(report: &'a Report) -> Self {
        Self {
            generated_at: report.generated_at,
            ai_enabled: report.ai_enabled,
            summary: report.summary(),
            rows: &report.rows,
            batches: &report.batches,
            defaults: &report.defaults,
        }
    }
}
