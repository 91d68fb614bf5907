//! Detection rule definitions

use crate::predicate::Predicate;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// A declarative audit rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRule {
    /// Unique rule identifier within its catalog (e.g., "unpinned-base-image")
    pub id: String,

    /// Domain the rule belongs to; filled from the catalog when omitted
    #[serde(default)]
    pub domain: String,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Detailed description
    #[serde(default)]
    pub description: Option<String>,

    /// Severity reported when the rule fires
    #[serde(default)]
    pub severity: Severity,

    /// Files the rule inspects (globs relative to the project root)
    #[serde(default, alias = "targetPatterns")]
    pub target_patterns: Vec<String>,

    /// Condition that makes the rule fire
    pub predicate: Predicate,

    /// Message template (supports `{path}`, `{line}`, `{match}`, `{pointer}`,
    /// `{value}`, `{tool}`, `{version}`, `{rule}`, `{domain}`)
    pub message: String,

    /// Remediation text (same placeholders as `message`)
    #[serde(default)]
    pub remediation: String,

    /// Rules that must never be reported together with this one
    #[serde(default, alias = "conflictsWith")]
    pub conflicts_with: BTreeSet<String>,

    /// Rules this one replaces when both apply
    #[serde(default)]
    pub supersedes: BTreeSet<String>,

    /// Tags used by decision-tree leaves to narrow the catalog
    #[serde(default)]
    pub tags: Vec<String>,

    /// Documentation URL
    #[serde(default)]
    pub docs: Option<String>,

    /// Whether this rule is enabled by default
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl DetectionRule {
    /// Create a new rule with minimal required fields
    pub fn new(id: &str, predicate: Predicate, message: &str) -> Self {
        Self {
            id: id.to_string(),
            domain: String::new(),
            name: None,
            description: None,
            severity: Severity::default(),
            target_patterns: Vec::new(),
            predicate,
            message: message.to_string(),
            remediation: String::new(),
            conflicts_with: BTreeSet::new(),
            supersedes: BTreeSet::new(),
            tags: Vec::new(),
            docs: None,
            enabled: true,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = remediation.to_string();
        self
    }

    pub fn with_target(mut self, pattern: &str) -> Self {
        self.target_patterns.push(pattern.to_string());
        self
    }

    pub fn conflicts_with(mut self, rule_id: &str) -> Self {
        self.conflicts_with.insert(rule_id.to_string());
        self
    }

    pub fn supersedes(mut self, rule_id: &str) -> Self {
        self.supersedes.insert(rule_id.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn has_any_tag(&self, tags: &HashSet<String>) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }

    /// Globs the collector must resolve for this rule: declared targets
    /// followed by any leaf path not already covered
    pub fn signal_patterns(&self) -> Vec<String> {
        let mut patterns = self.target_patterns.clone();
        for path in self.predicate.referenced_paths() {
            if !patterns.iter().any(|p| p == path) {
                patterns.push(path.to_string());
            }
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_creation() {
        let rule = DetectionRule::new(
            "missing-dockerignore",
            Predicate::path_exists("Dockerfile"),
            "No .dockerignore",
        );

        assert_eq!(rule.id, "missing-dockerignore");
        assert_eq!(rule.severity, Severity::NiceToHave);
        assert!(rule.enabled);
        assert!(rule.conflicts_with.is_empty());
    }

    #[test]
    fn test_rule_builder() {
        let rule = DetectionRule::new("use-proxy-ts", Predicate::path_exists("middleware.ts"), "m")
            .with_domain("nextjs")
            .with_severity(Severity::Critical)
            .conflicts_with("middleware-deprecated-warning")
            .supersedes("middleware-deprecated-warning")
            .with_tag("migration");

        assert_eq!(rule.domain, "nextjs");
        assert_eq!(rule.severity, Severity::Critical);
        assert!(rule.conflicts_with.contains("middleware-deprecated-warning"));
        assert!(rule.supersedes.contains("middleware-deprecated-warning"));
        assert!(rule.has_tag("migration"));

        let mut tags = HashSet::new();
        tags.insert("fresh-install".to_string());
        assert!(!rule.has_any_tag(&tags));
    }

    #[test]
    fn test_signal_patterns_merge_leaf_paths() {
        let rule = DetectionRule::new(
            "r",
            Predicate::All(vec![
                Predicate::path_exists("Dockerfile"),
                Predicate::not(Predicate::path_exists(".dockerignore")),
            ]),
            "m",
        )
        .with_target("Dockerfile");

        assert_eq!(rule.signal_patterns(), vec!["Dockerfile", ".dockerignore"]);
    }

    #[test]
    fn test_rule_deserialize_camel_case_aliases() {
        let yaml = r#"
id: use-proxy-ts
severity: critical
targetPatterns: ["middleware.ts"]
predicate:
  path_exists: middleware.ts
message: "Rename middleware.ts to proxy.ts"
conflictsWith: [middleware-deprecated-warning]
"#;
        let value: serde_json::Value = serde_yaml::from_str(yaml).unwrap();
        let rule: DetectionRule = serde_json::from_value(value).unwrap();
        assert_eq!(rule.severity, Severity::Critical);
        assert_eq!(rule.target_patterns, vec!["middleware.ts"]);
        assert!(rule.conflicts_with.contains("middleware-deprecated-warning"));
    }
}
