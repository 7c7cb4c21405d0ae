//! Read-only exports of a [`Report`]. Each format succeeds or fails on its own.

mod csv;
mod document;
mod xlsx;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use crate::report::{render_report, OutputFormat, Report};
use crate::risk::RiskCategory;

pub use self::csv::{to_csv_string, write_csv, CsvRow};
pub use self::document::{render_document, DEFAULT_TITLE};
pub use self::xlsx::{
    sheet_names, workbook_bytes, write_workbook, ALL_USERS_SHEET, HIGH_RISK_SHEET, SUMMARY_SHEET,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
    #[error("JSON error: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Markdown,
    Json,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Csv,
        ExportFormat::Xlsx,
        ExportFormat::Markdown,
        ExportFormat::Json,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }

    pub fn file_name(self, stem: &str) -> String {
        format!("{stem}.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            "md" | "markdown" | "doc" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown export format `{other}` (expected csv, xlsx, md or json)"
            )),
        }
    }
}

/// Outcome of writing one format.
#[derive(Debug)]
pub struct ExportOutcome {
    pub format: ExportFormat,
    pub result: Result<PathBuf, ExportError>,
}

/// Write every requested format to `dir/<stem>.<ext>`.
pub fn export_all(
    report: &Report,
    dir: &Path,
    stem: &str,
    formats: &[ExportFormat],
) -> Vec<ExportOutcome> {
    formats
        .iter()
        .map(|&format| {
            let path = dir.join(format.file_name(stem));
            let result = export_one(report, format, &path).map(|()| path);
            match &result {
                Ok(path) => info!(%format, path = %path.display(), "export written"),
                Err(err) => warn!(%format, error = %err, "export failed"),
            }
            ExportOutcome { format, result }
        })
        .collect()
}

pub fn export_one(report: &Report, format: ExportFormat, path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    match format {
        ExportFormat::Csv => {
            let file = std::fs::File::create(path)?;
            write_csv(report, file)
        }
        ExportFormat::Xlsx => write_workbook(report, path),
        ExportFormat::Markdown => {
            std::fs::write(path, render_document(report, DEFAULT_TITLE))?;
            Ok(())
        }
        ExportFormat::Json => {
            let json = render_report(report, OutputFormat::Json)
                .map_err(|err| ExportError::Json(err.to_string()))?;
            std::fs::write(path, json)?;
            Ok(())
        }
    }
}

/// A summary metric value as shown in the spreadsheet and document.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Count(usize),
    Number(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Number(number) => write!(f, "{number:.1}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Metric/value pairs for the summary sheet.
pub fn summary_metrics(report: &Report) -> Vec<(String, MetricValue)> {
    let summary = report.summary();
    let mut metrics = vec![
        ("Total Users".to_string(), MetricValue::Count(report.len())),
        (
            "Average Risk Score".to_string(),
            MetricValue::Number(summary.risk.average_score),
        ),
        (
            "Max Risk Score".to_string(),
            MetricValue::Count(summary.risk.max_score as usize),
        ),
    ];
    for category in RiskCategory::ALL {
        metrics.push((
            format!("{} Risk Users ({})", category.label(), category.range_label()),
            MetricValue::Count(summary.risk.count(category)),
        ));
    }
    metrics.push((
        "Average Last Login (days)".to_string(),
        MetricValue::Number(summary.average_last_login_days),
    ));
    metrics.push((
        "Users Inactive 90+ Days".to_string(),
        MetricValue::Count(summary.inactive_users),
    ));
    for entry in &summary.access_levels {
        metrics.push((
            format!("Users with {} Access", entry.access_level),
            MetricValue::Count(entry.count),
        ));
    }
    if report.ai_enabled {
        for entry in &summary.dispositions {
            metrics.push((
                format!("AI: {}", entry.disposition),
                MetricValue::Count(entry.count),
            ));
        }
    }
    metrics.push((
        "Report Generated".to_string(),
        MetricValue::Text(report.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
    ));
    metrics
}
