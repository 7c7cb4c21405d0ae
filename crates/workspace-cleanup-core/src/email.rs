//! Plain-text notification emails built from report rows.

use std::fmt::{self, Write};
use std::str::FromStr;

use chrono::NaiveDate;

use crate::report::ReportRow;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const DEFAULT_MANAGER: &str = "Manager";
const DEADLINE_PLACEHOLDER: &str = "[INSERT DEADLINE]";
pub const DEFAULT_REMINDER_DEADLINE: &str = "end of this week";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Individual,
    Bulk,
    Reminder,
}

impl EmailKind {
    pub const ALL: [EmailKind; 3] = [EmailKind::Individual, EmailKind::Bulk, EmailKind::Reminder];

    pub fn title(self) -> &'static str {
        match self {
            Self::Individual => "Individual Manager Notification",
            Self::Bulk => "Bulk Manager Notification",
            Self::Reminder => "Review Reminder",
        }
    }
}

impl fmt::Display for EmailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for EmailKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Self::Individual),
            "bulk" => Ok(Self::Bulk),
            "reminder" => Ok(Self::Reminder),
            other => Err(format!(
                "unknown email kind `{other}` (expected individual, bulk or reminder)"
            )),
        }
    }
}

/// Values shared by every template. The date is supplied by the caller.
#[derive(Debug, Clone)]
pub struct EmailContext {
    pub manager: String,
    pub deadline: Option<String>,
    pub today: NaiveDate,
}

impl EmailContext {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            manager: DEFAULT_MANAGER.to_string(),
            deadline: None,
            today,
        }
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> Self {
        let manager = manager.into();
        if !manager.trim().is_empty() {
            self.manager = manager;
        }
        self
    }

    pub fn with_deadline(mut self, deadline: Option<String>) -> Self {
        self.deadline = deadline.filter(|value| !value.trim().is_empty());
        self
    }

    fn deadline_or(&self, fallback: &'static str) -> &str {
        self.deadline.as_deref().unwrap_or(fallback)
    }

    fn date(&self) -> String {
        self.today.format("%B %d, %Y").to_string()
    }
}

fn section(out: &mut String, heading: &str) -> fmt::Result {
    writeln!(out, "{RULE}")?;
    writeln!(out, "{heading}")?;
    writeln!(out, "{RULE}")?;
    writeln!(out)
}

/// Notification asking a manager to review a single account.
pub fn manager_notification(row: &ReportRow, ctx: &EmailContext) -> String {
    let mut out = String::new();
    let _ = write_manager_notification(&mut out, row, ctx);
    out
}

fn write_manager_notification(out: &mut String, row: &ReportRow, ctx: &EmailContext) -> fmt::Result {
    let user = &row.user;
    writeln!(out, "Subject: Action Required: Review Access for {}", user.name)?;
    writeln!(out)?;
    writeln!(out, "Dear {},", ctx.manager)?;
    writeln!(out)?;
    writeln!(
        out,
        "This is an automated notification from the Google Workspace Cleanup Planner regarding a user account that requires your review."
    )?;
    writeln!(out)?;
    section(out, "USER DETAILS")?;
    writeln!(out, "• Name: {}", user.name)?;
    writeln!(out, "• Email: {}", user.email)?;
    writeln!(out, "• Current Access Level: {}", user.access_level)?;
    writeln!(out, "• Last Login: {} days ago", user.last_login_days)?;
    writeln!(out, "• Risk Category: {}", row.risk.category)?;
    if !row.classification.is_unclassified() {
        writeln!(out, "• AI Recommendation: {}", row.classification.disposition)?;
    }
    writeln!(out)?;
    section(out, "ACTION REQUESTED")?;
    writeln!(out, "Please review this user's access and confirm one of the following:")?;
    writeln!(out)?;
    writeln!(out, "[ ] KEEP ACCESS - User still requires current access level")?;
    writeln!(out, "[ ] REDUCE ACCESS - User should have reduced permissions")?;
    writeln!(out, "[ ] REMOVE ACCESS - User no longer needs access")?;
    writeln!(out, "[ ] TRANSFER OWNERSHIP - Transfer files to another user before removal")?;
    writeln!(out)?;
    writeln!(
        out,
        "Please respond to this email with your decision by {}.",
        ctx.deadline_or(DEADLINE_PLACEHOLDER)
    )?;
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out)?;
    writeln!(out, "This notification was generated on {}.", ctx.date())?;
    writeln!(out, "For questions, please contact your IT administrator.")?;
    sign_off(out)
}

/// One email covering several flagged accounts.
pub fn bulk_notification(rows: &[&ReportRow], ctx: &EmailContext) -> String {
    let mut out = String::new();
    let _ = write_bulk_notification(&mut out, rows, ctx);
    out
}

fn write_bulk_notification(out: &mut String, rows: &[&ReportRow], ctx: &EmailContext) -> fmt::Result {
    let count = rows.len();
    writeln!(out, "Subject: Action Required: {count} Users Need Access Review")?;
    writeln!(out)?;
    writeln!(out, "Dear {},", ctx.manager)?;
    writeln!(out)?;
    writeln!(
        out,
        "The Google Workspace Cleanup Planner has identified {count} user(s) that require your review."
    )?;
    writeln!(out)?;
    section(out, "USERS REQUIRING REVIEW")?;
    for row in rows {
        writeln!(
            out,
            "• {} ({}) - {} - Last login: {} days ago",
            row.user.name, row.user.email, row.risk.category, row.user.last_login_days
        )?;
    }
    writeln!(out)?;
    section(out, "NEXT STEPS")?;
    writeln!(out, "1. Review each user's current access requirements")?;
    writeln!(out, "2. Determine if access should be kept, reduced, or removed")?;
    writeln!(out, "3. Reply to this email with your decisions")?;
    writeln!(out, "4. IT will implement approved changes")?;
    writeln!(out)?;
    writeln!(out, "Please respond by {}.", ctx.deadline_or(DEADLINE_PLACEHOLDER))?;
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out)?;
    writeln!(out, "Generated on {}", ctx.date())?;
    writeln!(out, "For questions, contact your IT administrator.")?;
    sign_off(out)
}

/// Reminder that `pending` reviews are still open.
pub fn review_reminder(pending: usize, ctx: &EmailContext) -> String {
    let mut out = String::new();
    let _ = write_review_reminder(&mut out, pending, ctx);
    out
}

fn write_review_reminder(out: &mut String, pending: usize, ctx: &EmailContext) -> fmt::Result {
    writeln!(out, "Subject: Reminder: {pending} User Access Reviews Pending")?;
    writeln!(out)?;
    writeln!(out, "Dear Team,")?;
    writeln!(out)?;
    writeln!(
        out,
        "This is a friendly reminder that you have {pending} user access review(s) pending."
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "Please complete your reviews by {} to ensure compliance with our security policies.",
        ctx.deadline_or(DEFAULT_REMINDER_DEADLINE)
    )?;
    writeln!(out)?;
    section(out, "QUICK ACTIONS")?;
    writeln!(out, "1. Run the cleanup planner against the latest user export")?;
    writeln!(out, "2. Review flagged users in the generated cleanup plan")?;
    writeln!(out, "3. Make your decisions and export the results")?;
    writeln!(out, "4. Forward approved changes to IT for implementation")?;
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out)?;
    writeln!(out, "Thank you for helping keep our workspace secure!")?;
    sign_off(out)
}

fn sign_off(out: &mut String) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "Best regards,")?;
    writeln!(out, "IT Security Team")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    fn ctx() -> EmailContext {
        EmailContext::new(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
    }

    #[test]
    fn individual_notification_lists_user_details() {
        let report = sample_report();
        let email = manager_notification(&report.rows[1], &ctx().with_manager("Grace"));
        assert!(email.starts_with("Subject: Action Required: Review Access for Cole Contractor\n"));
        assert!(email.contains("Dear Grace,"));
        assert!(email.contains("• Last Login: 400 days ago"));
        assert!(email.contains("• Risk Category: Critical"));
        assert!(email.contains("• AI Recommendation: Likely inactive"));
        assert!(email.contains("by [INSERT DEADLINE]."));
        assert!(email.contains("generated on March 02, 2026."));
        assert!(email.ends_with("Best regards,\nIT Security Team\n"));
    }

    #[test]
    fn unclassified_users_have_no_recommendation_line() {
        let report = sample_report();
        let email = manager_notification(&report.rows[2], &ctx());
        assert!(email.contains("Dear Manager,"));
        assert!(!email.contains("AI Recommendation"));
    }

    #[test]
    fn bulk_notification_has_one_line_per_user() {
        let report = sample_report();
        let rows: Vec<_> = report.high_risk_rows().collect();
        let email = bulk_notification(&rows, &ctx().with_deadline(Some("Friday".into())));
        assert!(email.starts_with("Subject: Action Required: 2 Users Need Access Review\n"));
        assert!(email.contains(
            "• Cole Contractor (cole@example.com) - Critical - Last login: 400 days ago"
        ));
        assert!(email.contains("• Ivy Intern (ivy@example.com)"));
        assert!(email.contains("Please respond by Friday."));
        assert!(email.contains("Generated on March 02, 2026"));
    }

    #[test]
    fn reminder_defaults_deadline() {
        let email = review_reminder(4, &ctx());
        assert!(email.starts_with("Subject: Reminder: 4 User Access Reviews Pending\n"));
        assert!(email.contains("by end of this week to ensure"));
        let custom = review_reminder(1, &ctx().with_deadline(Some("  ".into())));
        assert!(custom.contains("by end of this week"));
    }

    #[test]
    fn kinds_parse_and_describe_themselves() {
        assert_eq!("Bulk".parse::<EmailKind>(), Ok(EmailKind::Bulk));
        assert!("memo".parse::<EmailKind>().is_err());
        let titles: Vec<_> = EmailKind::ALL.iter().map(|kind| kind.title()).collect();
        assert_eq!(
            titles,
            ["Individual Manager Notification", "Bulk Manager Notification", "Review Reminder"]
        );
    }
}
