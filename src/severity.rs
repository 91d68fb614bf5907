//! Severity levels for audit findings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal urgency of a finding
///
/// Variants are declared lowest first so the derived ordering gives
/// `Critical > Important > NiceToHave > Strength`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// Something the project already does well
    Strength,
    /// Optional improvement
    #[default]
    NiceToHave,
    /// Should be fixed soon
    Important,
    /// Must be fixed
    Critical,
}

impl Severity {
    /// All severities, most urgent first
    pub const DESCENDING: [Severity; 4] = [
        Severity::Critical,
        Severity::Important,
        Severity::NiceToHave,
        Severity::Strength,
    ];

    /// Section heading used by the human-readable report
    pub fn heading(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Important => "Important",
            Severity::NiceToHave => "Nice-to-have",
            Severity::Strength => "Strengths",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Important => write!(f, "important"),
            Severity::NiceToHave => write!(f, "niceToHave"),
            Severity::Strength => write!(f, "strength"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "critical" | "crit" => Ok(Severity::Critical),
            "important" | "high" => Ok(Severity::Important),
            "nicetohave" | "nice" | "low" => Ok(Severity::NiceToHave),
            "strength" | "strengths" => Ok(Severity::Strength),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}
