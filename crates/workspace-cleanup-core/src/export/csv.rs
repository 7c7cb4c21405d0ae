use std::io;

use serde::{Deserialize, Serialize};

use super::ExportError;
use crate::report::{Report, ReportRow};

/// Flat export row. The first five columns match the loader schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CsvRow {
    pub name: String,
    pub email: String,
    pub role: String,
    pub last_login_days: u32,
    pub access_level: String,
    pub risk_score: u32,
    pub risk_category: String,
    pub classification: String,
    pub rationale: String,
}

impl From<&ReportRow> for CsvRow {
    fn from(row: &ReportRow) -> Self {
        Self {
            name: row.user.name.clone(),
            email: row.user.email.clone(),
            role: row.user.role.clone(),
            last_login_days: row.user.last_login_days,
            access_level: row.user.access_level.to_string(),
            risk_score: row.risk.score,
            risk_category: row.risk.category.to_string(),
            classification: row.classification.disposition.label().to_string(),
            rationale: row.classification.rationale.clone().unwrap_or_default(),
        }
    }
}

pub fn write_csv<W: io::Write>(report: &Report, writer: W) -> Result<(), ExportError> {
    let mut csv_writer = ::csv::Writer::from_writer(writer);
    for row in &report.rows {
        csv_writer.serialize(CsvRow::from(row))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv_string(report: &Report) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_csv(report, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|err| ExportError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_users;
    use crate::report::tests::sample_report;
    use crate::risk::RiskCalculator;

    #[test]
    fn header_and_rows_follow_report_order() {
        let csv = to_csv_string(&sample_report()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Name,Email,Role,LastLoginDays,AccessLevel,RiskScore,RiskCategory,Classification,Rationale")
        );
        assert_eq!(
            lines.next(),
            Some("Ada Active,ada@example.com,Engineer,3,Editor,40,Medium,Safe to keep,Logged in this week")
        );
        assert_eq!(csv.lines().count(), 4);
    }

    #[test]
    fn exported_csv_reloads_with_same_scores() {
        let report = sample_report();
        let csv = to_csv_string(&report).unwrap();
        let dataset = load_users(csv.as_bytes()).unwrap();
        let calculator = RiskCalculator::default();

        let exported: Vec<_> = report
            .rows
            .iter()
            .map(|row| (row.user.email.clone(), row.risk.score))
            .collect();
        let reloaded: Vec<_> = dataset
            .users
            .iter()
            .map(|user| (user.email.clone(), calculator.score(user).score))
            .collect();
        assert_eq!(exported, reloaded);
    }
}
