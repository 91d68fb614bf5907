//! Finding types for audit results

use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observation backing a finding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Evidence {
    /// File path relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Line number (1-based) for regex matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// JSON pointer for config observations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// What was seen (matched text, config value, tool version)
    #[serde(default)]
    pub observed: String,
    /// Tool name for version observations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl Evidence {
    pub fn file(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            line: None,
            pointer: None,
            observed: String::new(),
            tool: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_pointer(mut self, pointer: &str) -> Self {
        self.pointer = Some(pointer.to_string());
        self
    }

    pub fn observed(mut self, observed: impl Into<String>) -> Self {
        self.observed = observed.into();
        self
    }

    pub fn tool(tool: &str, version: &str) -> Self {
        Self {
            path: None,
            line: None,
            pointer: None,
            observed: version.to_string(),
            tool: Some(tool.to_string()),
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(tool) = &self.tool {
            write!(f, "{} {}", tool, self.observed)?;
            return Ok(());
        }
        if let Some(path) = &self.path {
            write!(f, "{}", path)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
            wrote = true;
        }
        if let Some(pointer) = &self.pointer {
            write!(f, "{}{}", if wrote { " " } else { "" }, pointer)?;
            wrote = true;
        }
        if !self.observed.is_empty() {
            if wrote {
                write!(f, " = ")?;
            }
            write!(f, "{}", self.observed)?;
        }
        Ok(())
    }
}

/// Lifecycle state of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    #[default]
    Active,
    /// Replaced by a finding whose rule declares `supersedes`
    Superseded,
    /// Lost a `conflicts_with` resolution
    Suppressed,
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingStatus::Active => write!(f, "active"),
            FindingStatus::Superseded => write!(f, "superseded"),
            FindingStatus::Suppressed => write!(f, "suppressed"),
        }
    }
}

/// A fired rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Rule that produced this finding
    pub rule_id: String,
    pub domain: String,
    pub severity: Severity,
    /// Rendered message
    pub message: String,
    /// Rendered remediation
    #[serde(default)]
    pub remediation: String,
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub status: FindingStatus,
    /// Rule id that caused a status change, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// Declaration index of the rule in its catalog
    #[serde(skip)]
    pub order: usize,
    /// Documentation URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
}

impl Finding {
    /// Create a new active finding
    pub fn new(rule_id: &str, domain: &str, severity: Severity, message: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            domain: domain.to_string(),
            severity,
            message: message.to_string(),
            remediation: String::new(),
            evidence: Vec::new(),
            status: FindingStatus::Active,
            resolved_by: None,
            order: 0,
            docs: None,
        }
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = remediation.to_string();
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == FindingStatus::Active
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// Move an active finding to `status`
    ///
    /// Transitions are one-way: a finding that already left `Active` keeps
    /// its status. Returns whether the transition happened.
    pub fn transition(&mut self, status: FindingStatus, by: &str) -> bool {
        if self.status != FindingStatus::Active || status == FindingStatus::Active {
            return false;
        }
        self.status = status;
        self.resolved_by = Some(by.to_string());
        true
    }
}
