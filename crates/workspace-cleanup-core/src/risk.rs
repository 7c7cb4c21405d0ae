use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{AccessLevel, UserRecord};

/// Roles that earn the role bonus unless the caller configures its own list.
pub const DEFAULT_FLAGGED_ROLES: [&str; 4] = ["Former Employee", "Contractor", "Intern", "Temporary"];
pub const ROLE_BONUS: u32 = 20;
/// Upper bound when clamping is enabled.
pub const MAX_DISPLAY_SCORE: u32 = 100;

/// Inclusive upper bounds of the Low, Medium and High bands.
pub const LOW_MAX: u32 = 30;
pub const MEDIUM_MAX: u32 = 60;
pub const HIGH_MAX: u32 = 80;

/// Qualitative bucket derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Low,
        RiskCategory::Medium,
        RiskCategory::High,
        RiskCategory::Critical,
    ];

    pub fn from_score(score: u32) -> Self {
        if score <= LOW_MAX {
            Self::Low
        } else if score <= MEDIUM_MAX {
            Self::Medium
        } else if score <= HIGH_MAX {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    /// Band description as shown in exported summaries.
    pub fn range_label(self) -> &'static str {
        match self {
            Self::Low => "0-30",
            Self::Medium => "31-60",
            Self::High => "61-80",
            Self::Critical => "81+",
        }
    }

    pub fn is_high_risk(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for RiskCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown risk category `{value}`"))
    }
}

/// Per-component points that add up to the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub activity: u32,
    pub access: u32,
    pub role_bonus: u32,
}

impl ScoreBreakdown {
    pub fn raw_total(&self) -> u32 {
        self.activity + self.access + self.role_bonus
    }
}

/// Score attached to a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub category: RiskCategory,
    pub breakdown: ScoreBreakdown,
}

/// Points for time since last login.
pub fn activity_points(last_login_days: u32) -> u32 {
    match last_login_days {
        0..=30 => 0,
        31..=90 => 25,
        91..=180 => 50,
        181..=365 => 75,
        _ => 100,
    }
}

/// Points for the granted sharing tier.
pub fn access_points(level: AccessLevel) -> u32 {
    match level {
        AccessLevel::Viewer => 10,
        AccessLevel::Commenter => 20,
        AccessLevel::Editor => 40,
        AccessLevel::Owner => 60,
    }
}

/// Deterministic scorer. Flagged roles match case-insensitively anywhere in the role text.
#[derive(Debug, Clone)]
pub struct RiskCalculator {
    flagged_roles: Vec<String>,
    matcher: Option<AhoCorasick>,
    clamp: bool,
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_FLAGGED_ROLES.iter().map(|role| role.to_string()), false)
            .unwrap_or_else(|_| Self::without_roles(false))
    }
}

impl RiskCalculator {
    pub fn new(flagged_roles: impl IntoIterator<Item = String>, clamp: bool) -> Result<Self> {
        let flagged_roles: Vec<String> = flagged_roles
            .into_iter()
            .map(|role| role.trim().to_string())
            .filter(|role| !role.is_empty())
            .collect();
        if flagged_roles.is_empty() {
            return Ok(Self::without_roles(clamp));
        }
        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(&flagged_roles)
            .context("failed to build flagged role matcher")?;
        Ok(Self {
            flagged_roles,
            matcher: Some(matcher),
            clamp,
        })
    }

    fn without_roles(clamp: bool) -> Self {
        Self {
            flagged_roles: Vec::new(),
            matcher: None,
            clamp,
        }
    }

    pub fn flagged_roles(&self) -> &[String] {
        &self.flagged_roles
    }

    pub fn clamps(&self) -> bool {
        self.clamp
    }

    pub fn role_bonus(&self, role: &str) -> u32 {
        match &self.matcher {
            Some(matcher) if matcher.is_match(role) => ROLE_BONUS,
            _ => 0,
        }
    }

    pub fn breakdown(&self, user: &UserRecord) -> ScoreBreakdown {
        ScoreBreakdown {
            activity: activity_points(user.last_login_days),
            access: access_points(user.access_level),
            role_bonus: self.role_bonus(&user.role),
        }
    }

    /// Score a user. Without clamping the total can reach 180.
    pub fn score(&self, user: &UserRecord) -> RiskAssessment {
        let breakdown = self.breakdown(user);
        let raw = breakdown.raw_total();
        let score = if self.clamp {
            raw.min(MAX_DISPLAY_SCORE)
        } else {
            raw
        };
        RiskAssessment {
            score,
            category: RiskCategory::from_score(score),
            breakdown,
        }
    }
}

/// Aggregate counts over a set of scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RiskSummary {
    pub total_users: usize,
    pub average_score: f64,
    pub max_score: u32,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl RiskSummary {
    pub fn from_assessments<'a>(assessments: impl IntoIterator<Item = &'a RiskAssessment>) -> Self {
        let mut summary = Self::default();
        let mut total: u64 = 0;
        for assessment in assessments {
            summary.total_users += 1;
            total += u64::from(assessment.score);
            summary.max_score = summary.max_score.max(assessment.score);
            match assessment.category {
                RiskCategory::Low => summary.low += 1,
                RiskCategory::Medium => summary.medium += 1,
                RiskCategory::High => summary.high += 1,
                RiskCategory::Critical => summary.critical += 1,
            }
        }
        if summary.total_users > 0 {
            summary.average_score = round1(total as f64 / summary.total_users as f64);
        }
        summary
    }

    pub fn count(&self, category: RiskCategory) -> usize {
        match category {
            RiskCategory::Low => self.low,
            RiskCategory::Medium => self.medium,
            RiskCategory::High => self.high,
            RiskCategory::Critical => self.critical,
        }
    }

    pub fn high_risk_total(&self) -> usize {
        self.high + self.critical
    }

    /// Share of users in `category`, as a percentage with one decimal.
    pub fn percentage(&self, category: RiskCategory) -> f64 {
        if self.total_users == 0 {
            return 0.0;
        }
        round1(self.count(category) as f64 / self.total_users as f64 * 100.0)
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(days: u32, access: AccessLevel, role: &str) -> UserRecord {
        UserRecord {
            name: "Test User".into(),
            email: "test@example.com".into(),
            role: role.into(),
            last_login_days: days,
            access_level: access,
        }
    }

    #[test]
    fn activity_buckets_match_boundaries() {
        assert_eq!(activity_points(0), 0);
        assert_eq!(activity_points(30), 0);
        assert_eq!(activity_points(31), 25);
        assert_eq!(activity_points(90), 25);
        assert_eq!(activity_points(91), 50);
        assert_eq!(activity_points(180), 50);
        assert_eq!(activity_points(181), 75);
        assert_eq!(activity_points(365), 75);
        assert_eq!(activity_points(366), 100);
    }

    #[test]
    fn category_boundaries_are_exact() {
        assert_eq!(RiskCategory::from_score(30), RiskCategory::Low);
        assert_eq!(RiskCategory::from_score(31), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(60), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_score(61), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(80), RiskCategory::High);
        assert_eq!(RiskCategory::from_score(81), RiskCategory::Critical);
    }

    #[test]
    fn worst_case_is_uncapped_by_default() {
        let calculator = RiskCalculator::default();
        let assessment = calculator.score(&user(400, AccessLevel::Owner, "Contractor"));
        assert_eq!(
            assessment.breakdown,
            ScoreBreakdown {
                activity: 100,
                access: 60,
                role_bonus: 20
            }
        );
        assert_eq!(assessment.score, 180);
        assert_eq!(assessment.category, RiskCategory::Critical);
    }

    #[test]
    fn clamping_caps_score_but_keeps_breakdown() {
        let calculator = RiskCalculator::new(vec!["Contractor".to_string()], true).unwrap();
        let assessment = calculator.score(&user(400, AccessLevel::Owner, "contractor"));
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.breakdown.raw_total(), 180);
        assert_eq!(assessment.category, RiskCategory::Critical);
    }

    #[test]
    fn role_match_is_case_insensitive_substring() {
        let calculator = RiskCalculator::default();
        assert_eq!(calculator.role_bonus("former employee (Sales)"), ROLE_BONUS);
        assert_eq!(calculator.role_bonus("Summer INTERN"), ROLE_BONUS);
        assert_eq!(calculator.role_bonus("Engineer"), 0);
        assert_eq!(calculator.role_bonus(""), 0);
    }

    #[test]
    fn empty_role_list_never_grants_bonus() {
        let calculator = RiskCalculator::new(Vec::new(), false).unwrap();
        assert_eq!(calculator.role_bonus("Contractor"), 0);
    }

    #[test]
    fn summary_counts_categories() {
        let calculator = RiskCalculator::default();
        let assessments: Vec<_> = [
            user(5, AccessLevel::Viewer, "Engineer"),
            user(45, AccessLevel::Viewer, "Engineer"),
            user(45, AccessLevel::Editor, "Engineer"),
            user(400, AccessLevel::Owner, "Intern"),
        ]
        .iter()
        .map(|u| calculator.score(u))
        .collect();
        let summary = RiskSummary::from_assessments(&assessments);
        assert_eq!(summary.total_users, 4);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.medium, 1);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.max_score, 180);
        // (10 + 35 + 65 + 180) / 4
        assert!((summary.average_score - 72.5).abs() < f64::EPSILON);
        assert_eq!(summary.high_risk_total(), 2);
        assert!((summary.percentage(RiskCategory::Low) - 25.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn scoring_is_deterministic(days in 0u32..2000, level in 0usize..4, flagged in any::<bool>()) {
            let calculator = RiskCalculator::default();
            let role = if flagged { "Temporary staff" } else { "Engineer" };
            let record = user(days, AccessLevel::ALL[level], role);
            let first = calculator.score(&record);
            let second = calculator.score(&record);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.score, first.breakdown.raw_total());
            prop_assert!(first.score <= 180);
        }

        #[test]
        fn clamped_scores_stay_in_display_range(days in 0u32..2000, level in 0usize..4) {
            let calculator = RiskCalculator::new(vec!["Intern".to_string()], true).unwrap();
            let assessment = calculator.score(&user(days, AccessLevel::ALL[level], "Intern"));
            prop_assert!(assessment.score <= MAX_DISPLAY_SCORE);
        }
    }
}
