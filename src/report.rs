//! Audit report model

use crate::evaluator::RuleTiming;
use crate::finding::{Finding, FindingStatus};
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How one domain took part in the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSummary {
    pub domain: String,
    pub version: String,
    /// Decision-tree leaf reached (empty without a tree)
    #[serde(default)]
    pub leaf: String,
    #[serde(default)]
    pub label: String,
    /// Rules left active after narrowing
    pub active_rules: usize,
    /// Whether the decision tree disabled the domain
    #[serde(default)]
    pub disabled: bool,
}

/// A signal the collector could not capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableSignal {
    pub signal: String,
    pub reason: String,
}

/// Finding counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub critical: usize,
    pub important: usize,
    pub nice_to_have: usize,
    pub strengths: usize,
    pub suppressed: usize,
    pub superseded: usize,
    /// Active findings hidden by the severity threshold
    pub below_threshold: usize,
}

impl Summary {
    pub fn active(&self) -> usize {
        self.critical + self.important + self.nice_to_have + self.strengths
    }
}

/// Findings of one severity, for rendering
#[derive(Debug)]
pub struct ReportSection<'a> {
    pub severity: Severity,
    pub heading: &'static str,
    pub findings: Vec<&'a Finding>,
}

/// Result of one audit run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub target_root: String,
    pub generated_at: DateTime<Utc>,
    pub domains: Vec<DomainSummary>,
    /// Active findings at or above the threshold, in report order
    pub findings: Vec<Finding>,
    /// Suppressed and superseded findings
    pub inactive: Vec<Finding>,
    pub unavailable_signals: Vec<UnavailableSignal>,
    pub next_steps: Vec<String>,
    pub summary: Summary,
    #[serde(skip)]
    pub timings: Vec<RuleTiming>,
}

impl AuditReport {
    /// Assemble a report from aggregated findings
    ///
    /// `findings` must already be ordered. Active findings below
    /// `severity_min` are dropped and counted as below threshold.
    pub fn build(
        target_root: &str,
        domains: Vec<DomainSummary>,
        findings: Vec<Finding>,
        unavailable: Vec<(String, String)>,
        severity_min: Option<Severity>,
    ) -> Self {
        let mut summary = Summary::default();
        let mut shown = Vec::new();
        let mut inactive = Vec::new();

        for finding in findings {
            match finding.status {
                FindingStatus::Suppressed => {
                    summary.suppressed += 1;
                    inactive.push(finding);
                }
                FindingStatus::Superseded => {
                    summary.superseded += 1;
                    inactive.push(finding);
                }
                FindingStatus::Active => {
                    if severity_min.is_some_and(|min| finding.severity < min) {
                        summary.below_threshold += 1;
                        continue;
                    }
                    match finding.severity {
                        Severity::Critical => summary.critical += 1,
                        Severity::Important => summary.important += 1,
                        Severity::NiceToHave => summary.nice_to_have += 1,
                        Severity::Strength => summary.strengths += 1,
                    }
                    shown.push(finding);
                }
            }
        }

        let unavailable_signals: Vec<UnavailableSignal> = unavailable
            .into_iter()
            .map(|(signal, reason)| UnavailableSignal { signal, reason })
            .collect();
        let next_steps = next_steps(&shown, unavailable_signals.len());

        Self {
            target_root: target_root.to_string(),
            generated_at: Utc::now(),
            domains,
            findings: shown,
            inactive,
            unavailable_signals,
            next_steps,
            summary,
            timings: Vec::new(),
        }
    }

    /// Active findings grouped by severity, highest first; empty groups omitted
    pub fn sections(&self) -> Vec<ReportSection<'_>> {
        Severity::DESCENDING
            .iter()
            .map(|&severity| ReportSection {
                severity,
                heading: severity.heading(),
                findings: self
                    .findings
                    .iter()
                    .filter(|f| f.severity == severity)
                    .collect(),
            })
            .filter(|section| !section.findings.is_empty())
            .collect()
    }

    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.is_active() && f.is_critical())
    }

    /// 0 = no active critical finding, 1 = at least one
    pub fn exit_code(&self) -> i32 {
        if self.has_critical() {
            1
        } else {
            0
        }
    }
}

/// Remediation steps for critical and important findings, in report order
fn next_steps(findings: &[Finding], unavailable: usize) -> Vec<String> {
    let mut steps: Vec<String> = findings
        .iter()
        .filter(|f| f.severity >= Severity::Important && !f.remediation.is_empty())
        .map(|f| format!("[{}] {}", f.rule_id, f.remediation))
        .collect();
    if unavailable > 0 {
        steps.push(format!(
            "Restore access to {} unavailable signal{} and re-run the audit",
            unavailable,
            if unavailable == 1 { "" } else { "s" }
        ));
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(id: &str, severity: Severity) -> Finding {
        Finding::new(id, "docker", severity, "m").with_remediation("fix it")
    }

    #[test]
    fn test_build_counts_and_threshold() {
        let mut suppressed = finding("s", Severity::Important);
        suppressed.transition(FindingStatus::Suppressed, "c");
        let findings = vec![
            finding("c", Severity::Critical),
            suppressed,
            finding("n", Severity::NiceToHave),
            finding("g", Severity::Strength),
        ];

        let report = AuditReport::build("/p", vec![], findings, vec![], Some(Severity::Important));
        assert_eq!(report.summary.critical, 1);
        assert_eq!(report.summary.suppressed, 1);
        assert_eq!(report.summary.below_threshold, 2);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.inactive.len(), 1);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_sections_and_next_steps() {
        let findings = vec![
            finding("i", Severity::Important),
            finding("n", Severity::NiceToHave),
            finding("g", Severity::Strength).with_remediation(""),
        ];
        let unavailable = vec![("config biome.json".to_string(), "parse failed".to_string())];

        let report = AuditReport::build("/p", vec![], findings, unavailable, None);
        let headings: Vec<&str> = report.sections().iter().map(|s| s.heading).collect();
        assert_eq!(headings, vec!["Important", "Nice-to-have", "Strengths"]);
        assert_eq!(report.next_steps.len(), 2);
        assert_eq!(report.next_steps[0], "[i] fix it");
        assert!(report.next_steps[1].contains("1 unavailable signal "));
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_report_serializes() {
        let report = AuditReport::build("/p", vec![], vec![], vec![], None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["targetRoot"], "/p");
        assert!(json.get("timings").is_none());
        assert_eq!(json["summary"]["belowThreshold"], 0);
    }
}
