use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::model::UserRecord;

/// Marker replaced with the rendered user table.
pub const USERS_PLACEHOLDER: &str = "{{users}}";

const DEFAULT_TEMPLATE: &str = include_str!("../../prompts/cleanup_prompt.txt");
const HEADERS: [&str; 5] = ["Name", "Email", "Role", "LastLoginDays", "AccessLevel"];

/// Instruction text wrapped around each batch of users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt template {}", path.display()))?;
        Ok(Self::new(text))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitute the user table; templates without the placeholder get it appended.
    pub fn render(&self, users: &[UserRecord]) -> String {
        let table = render_table(users);
        if self.text.contains(USERS_PLACEHOLDER) {
            self.text.replace(USERS_PLACEHOLDER, &table)
        } else {
            format!("{}\n\nUser Data:\n{}", self.text.trim_end(), table)
        }
    }
}

/// Fixed-width plain-text table, one line per user.
pub fn render_table(users: &[UserRecord]) -> String {
    let rows: Vec<[String; 5]> = users
        .iter()
        .map(|user| {
            [
                user.name.clone(),
                user.email.clone(),
                user.role.clone(),
                user.last_login_days.to_string(),
                user.access_level.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, HEADERS.iter().copied(), &widths);
    for row in &rows {
        push_line(&mut out, row.iter().map(String::as_str), &widths);
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let line = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccessLevel;

    fn users() -> Vec<UserRecord> {
        vec![
            UserRecord {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                role: "Engineer".into(),
                last_login_days: 4,
                access_level: AccessLevel::Editor,
            },
            UserRecord {
                name: "Bartholomew".into(),
                email: "bart@example.com".into(),
                role: "Contractor".into(),
                last_login_days: 400,
                access_level: AccessLevel::Owner,
            },
        ]
    }

    #[test]
    fn table_aligns_columns() {
        let table = render_table(&users());
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Name         Email"));
        assert!(lines[1].starts_with("Ada          ada@example.com"));
        assert!(lines[2].ends_with("Owner"));
    }

    #[test]
    fn placeholder_is_substituted() {
        let template = PromptTemplate::new("Classify:\n{{users}}\nThanks");
        let prompt = template.render(&users());
        assert!(prompt.starts_with("Classify:\nName"));
        assert!(prompt.contains("bart@example.com"));
        assert!(prompt.ends_with("\nThanks"));
        assert!(!prompt.contains(USERS_PLACEHOLDER));
    }

    #[test]
    fn table_is_appended_without_placeholder() {
        let template = PromptTemplate::new("Classify these users.\n");
        let prompt = template.render(&users());
        assert!(prompt.starts_with("Classify these users.\n\nUser Data:\nName"));
    }

    #[test]
    fn default_template_carries_placeholder() {
        assert!(PromptTemplate::default().text().contains(USERS_PLACEHOLDER));
    }
}
