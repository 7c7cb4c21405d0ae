use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::{AccessLevel, UserRecord};

pub const COLUMN_NAME: &str = "Name";
pub const COLUMN_EMAIL: &str = "Email";
pub const COLUMN_ROLE: &str = "Role";
pub const COLUMN_LAST_LOGIN: &str = "LastLoginDays";
pub const COLUMN_ACCESS: &str = "AccessLevel";

/// Columns every user export must carry. Order in the file is irrelevant.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    COLUMN_NAME,
    COLUMN_EMAIL,
    COLUMN_ROLE,
    COLUMN_LAST_LOGIN,
    COLUMN_ACCESS,
];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid"));

/// Fatal problems that stop a dataset from loading before any scoring happens.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read user export: {0}")]
    Io(#[from] io::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("user export contains no data rows")]
    Empty,
    #[error("user export failed schema validation ({} violation(s)): {}", violations.len(), summarize(violations))]
    Schema { violations: Vec<SchemaViolation> },
}

fn summarize(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single structural problem found while validating the export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaViolation {
    MissingColumn { column: String },
    InvalidEmail { row: usize, value: String },
    DuplicateEmail { row: usize, email: String, first_row: usize },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn { column } => write!(f, "missing required column `{column}`"),
            Self::InvalidEmail { row, value } => {
                write!(f, "row {row}: Email `{value}` is not a valid address")
            }
            Self::DuplicateEmail {
                row,
                email,
                first_row,
            } => write!(f, "row {row}: Email `{email}` already used on row {first_row}"),
        }
    }
}

/// Field that fell back to a default while loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultedField {
    Name,
    LastLoginDays,
    AccessLevel,
    Role,
}

/// Non-fatal record that a field was missing or out of range and a default was used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultApplied {
    pub row: usize,
    pub email: String,
    pub field: DefaultedField,
    pub raw: String,
    pub applied: String,
}

impl fmt::Display for DefaultApplied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} ({}): {:?} `{}` replaced with `{}`",
            self.row, self.email, self.field, self.raw, self.applied
        )
    }
}

/// Validated users in file order, plus every default that had to be applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub users: Vec<UserRecord>,
    pub defaults: Vec<DefaultApplied>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Load and validate a user export from disk.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_users_from_path(path: impl AsRef<Path>) -> Result<Dataset, LoadError> {
    let file = std::fs::File::open(path.as_ref())?;
    load_users(file)
}

/// Load and validate a user export from any reader.
pub fn load_users<R: io::Read>(reader: R) -> Result<Dataset, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let columns = ColumnIndex::resolve(&headers)?;

    let mut users = Vec::new();
    let mut defaults = Vec::new();
    let mut violations = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (idx, result) in csv_reader.records().enumerate() {
        let record = result?;
        let row = idx + 1;
        let field = |col: usize| record.get(col).unwrap_or("").trim();

        let email = field(columns.email);
        if !EMAIL_RE.is_match(email) {
            violations.push(SchemaViolation::InvalidEmail {
                row,
                value: email.to_string(),
            });
        } else if let Some(first_row) = seen.get(&email.to_ascii_lowercase()) {
            violations.push(SchemaViolation::DuplicateEmail {
                row,
                email: email.to_string(),
                first_row: *first_row,
            });
        } else {
            seen.insert(email.to_ascii_lowercase(), row);
        }

        let mut name = field(columns.name).to_string();
        if name.is_empty() {
            defaults.push(DefaultApplied {
                row,
                email: email.to_string(),
                field: DefaultedField::Name,
                raw: String::new(),
                applied: email.to_string(),
            });
            name = email.to_string();
        }

        let role = field(columns.role);
        if role.is_empty() {
            defaults.push(DefaultApplied {
                row,
                email: email.to_string(),
                field: DefaultedField::Role,
                raw: String::new(),
                applied: "no role bonus".into(),
            });
        }

        let raw_days = field(columns.last_login);
        let last_login_days = match parse_days(raw_days) {
            Some(days) => days,
            None => {
                defaults.push(DefaultApplied {
                    row,
                    email: email.to_string(),
                    field: DefaultedField::LastLoginDays,
                    raw: raw_days.to_string(),
                    applied: "0".into(),
                });
                0
            }
        };

        let raw_access = field(columns.access);
        let access_level = match raw_access.parse::<AccessLevel>() {
            Ok(level) => level,
            Err(_) => {
                defaults.push(DefaultApplied {
                    row,
                    email: email.to_string(),
                    field: DefaultedField::AccessLevel,
                    raw: raw_access.to_string(),
                    applied: AccessLevel::LOWEST.to_string(),
                });
                AccessLevel::LOWEST
            }
        };

        users.push(UserRecord {
            name,
            email: email.to_string(),
            role: role.to_string(),
            last_login_days,
            access_level,
        });
    }

    if !violations.is_empty() {
        return Err(LoadError::Schema { violations });
    }
    if users.is_empty() {
        return Err(LoadError::Empty);
    }
    for applied in &defaults {
        warn!(row = applied.row, email = %applied.email, field = ?applied.field, raw = %applied.raw, "default applied");
    }
    debug!(users = users.len(), defaults = defaults.len(), "user export loaded");
    Ok(Dataset { users, defaults })
}

/// Whole, non-negative day counts. Spreadsheet exports sometimes write `42.0`.
fn parse_days(raw: &str) -> Option<u32> {
    if let Ok(days) = raw.parse::<u32>() {
        return Some(days);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Some(value as u32)
    } else {
        None
    }
}

struct ColumnIndex {
    name: usize,
    email: usize,
    role: usize,
    last_login: usize,
    access: usize,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let position = |column: &str| headers.iter().position(|h| h.trim() == column);
        let missing: Vec<SchemaViolation> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| position(column).is_none())
            .map(|column| SchemaViolation::MissingColumn {
                column: (*column).to_string(),
            })
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::Schema {
                violations: missing,
            });
        }
        let index = |column: &str| position(column).unwrap_or_default();
        Ok(Self {
            name: index(COLUMN_NAME),
            email: index(COLUMN_EMAIL),
            role: index(COLUMN_ROLE),
            last_login: index(COLUMN_LAST_LOGIN),
            access: index(COLUMN_ACCESS),
        })
    }
}
