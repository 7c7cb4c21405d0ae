use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::{summary_metrics, ExportError, MetricValue};
use crate::report::{Report, ReportRow};

pub const ALL_USERS_SHEET: &str = "All Users";
pub const HIGH_RISK_SHEET: &str = "High Risk Users";
pub const SUMMARY_SHEET: &str = "Summary";

const USER_COLUMNS: [(&str, f64); 9] = [
    ("Name", 24.0),
    ("Email", 32.0),
    ("Role", 20.0),
    ("LastLoginDays", 14.0),
    ("AccessLevel", 13.0),
    ("RiskScore", 10.0),
    ("RiskCategory", 13.0),
    ("Classification", 28.0),
    ("Rationale", 60.0),
];

/// Sheet names in workbook order; the high-risk sheet only exists when it has rows.
pub fn sheet_names(report: &Report) -> Vec<&'static str> {
    let mut names = vec![ALL_USERS_SHEET];
    if report.high_risk_rows().next().is_some() {
        names.push(HIGH_RISK_SHEET);
    }
    names.push(SUMMARY_SHEET);
    names
}

pub fn write_workbook(report: &Report, path: &Path) -> Result<(), ExportError> {
    let mut workbook = build_workbook(report)?;
    workbook.save(path)?;
    Ok(())
}

pub fn workbook_bytes(report: &Report) -> Result<Vec<u8>, ExportError> {
    let mut workbook = build_workbook(report)?;
    Ok(workbook.save_to_buffer()?)
}

fn build_workbook(report: &Report) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for name in sheet_names(report) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        match name {
            ALL_USERS_SHEET => write_users(sheet, report.rows.iter(), &header)?,
            HIGH_RISK_SHEET => write_users(sheet, report.high_risk_rows(), &header)?,
            _ => write_summary(sheet, report, &header)?,
        }
    }
    Ok(workbook)
}

fn write_users<'a>(
    sheet: &mut Worksheet,
    rows: impl Iterator<Item = &'a ReportRow>,
    header: &Format,
) -> Result<(), XlsxError> {
    for (col, (title, width)) in (0u16..).zip(USER_COLUMNS) {
        sheet.write_string_with_format(0, col, title, header)?;
        sheet.set_column_width(col, width)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (row_idx, row) in (1u32..).zip(rows) {
        sheet.write_string(row_idx, 0, &row.user.name)?;
        sheet.write_string(row_idx, 1, &row.user.email)?;
        sheet.write_string(row_idx, 2, &row.user.role)?;
        sheet.write_number(row_idx, 3, f64::from(row.user.last_login_days))?;
        sheet.write_string(row_idx, 4, row.user.access_level.as_str())?;
        sheet.write_number(row_idx, 5, f64::from(row.risk.score))?;
        sheet.write_string(row_idx, 6, row.risk.category.label())?;
        sheet.write_string(row_idx, 7, row.classification.disposition.label())?;
        sheet.write_string(
            row_idx,
            8,
            row.classification.rationale.as_deref().unwrap_or_default(),
        )?;
    }
    Ok(())
}

fn write_summary(sheet: &mut Worksheet, report: &Report, header: &Format) -> Result<(), XlsxError> {
    sheet.write_string_with_format(0, 0, "Metric", header)?;
    sheet.write_string_with_format(0, 1, "Value", header)?;
    sheet.set_column_width(0, 36)?;
    sheet.set_column_width(1, 22)?;

    for (row_idx, (metric, value)) in (1u32..).zip(summary_metrics(report)) {
        sheet.write_string(row_idx, 0, &metric)?;
        match value {
            MetricValue::Count(count) => sheet.write_number(row_idx, 1, count as f64)?,
            MetricValue::Number(number) => sheet.write_number(row_idx, 1, number)?,
            MetricValue::Text(text) => sheet.write_string(row_idx, 1, &text)?,
        };
    }
    Ok(())
}
