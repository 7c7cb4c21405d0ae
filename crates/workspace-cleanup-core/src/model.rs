use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sharing tier granted to a Workspace user, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    Viewer,
    Commenter,
    Editor,
    Owner,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 4] = [
        AccessLevel::Viewer,
        AccessLevel::Commenter,
        AccessLevel::Editor,
        AccessLevel::Owner,
    ];

    /// Tier applied when the export leaves the column blank or unrecognised.
    pub const LOWEST: AccessLevel = AccessLevel::Viewer;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "Viewer",
            Self::Commenter => "Commenter",
            Self::Editor => "Editor",
            Self::Owner => "Owner",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown access level `{trimmed}`"))
    }
}

/// One row of a Google Workspace user export. Identity is the email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    pub role: String,
    pub last_login_days: u32,
    pub access_level: AccessLevel,
}

/// AI-assigned recommendation for what should happen to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    SafeToKeep,
    NeedsManagerConfirmation,
    LikelyInactive,
    /// No usable answer came back for this user.
    Unclassified,
}

impl Disposition {
    pub const ALL: [Disposition; 4] = [
        Disposition::SafeToKeep,
        Disposition::NeedsManagerConfirmation,
        Disposition::LikelyInactive,
        Disposition::Unclassified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::SafeToKeep => "Safe to keep",
            Self::NeedsManagerConfirmation => "Needs manager confirmation",
            Self::LikelyInactive => "Likely inactive",
            Self::Unclassified => "Unclassified",
        }
    }

    /// Lenient match for labels written by a model: case, spacing and punctuation are ignored.
    pub fn parse_label(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "safetokeep" | "keep" | "safe" | "active" => Some(Self::SafeToKeep),
            "needsmanagerconfirmation" | "managerconfirmation" | "needsconfirmation"
            | "confirmwithmanager" | "needsreview" | "review" => {
                Some(Self::NeedsManagerConfirmation)
            }
            "likelyinactive" | "inactive" | "removeaccess" | "remove" => {
                Some(Self::LikelyInactive)
            }
            "unclassified" => Some(Self::Unclassified),
            _ => None,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Disposition plus whatever rationale the model offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub disposition: Disposition,
    pub rationale: Option<String>,
}

impl Classification {
    pub fn new(disposition: Disposition, rationale: Option<String>) -> Self {
        Self {
            disposition,
            rationale: rationale.filter(|text| !text.trim().is_empty()),
        }
    }

    pub fn unclassified(reason: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Unclassified,
            rationale: Some(reason.into()),
        }
    }

    pub fn is_unclassified(&self) -> bool {
        self.disposition == Disposition::Unclassified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_level_parses_case_insensitively() {
        assert_eq!("owner".parse::<AccessLevel>(), Ok(AccessLevel::Owner));
        assert_eq!(" Editor ".parse::<AccessLevel>(), Ok(AccessLevel::Editor));
        assert!("admin".parse::<AccessLevel>().is_err());
    }

    #[test]
    fn disposition_labels_are_normalised() {
        assert_eq!(
            Disposition::parse_label("SAFE_TO_KEEP"),
            Some(Disposition::SafeToKeep)
        );
        assert_eq!(
            Disposition::parse_label("Needs Manager Confirmation"),
            Some(Disposition::NeedsManagerConfirmation)
        );
        assert_eq!(
            Disposition::parse_label("likely-inactive"),
            Some(Disposition::LikelyInactive)
        );
        assert_eq!(Disposition::parse_label("delete now"), None);
    }

    #[test]
    fn blank_rationale_is_dropped() {
        let classification = Classification::new(Disposition::SafeToKeep, Some("  ".into()));
        assert!(classification.rationale.is_none());
    }
}
