//! Human-readable terminal output formatter

use super::{RenderError, ReportFormatter};
use crate::finding::Finding;
use crate::report::AuditReport;
use crate::severity::Severity;
use colored::*;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show evidence lines under each finding
    pub show_evidence: bool,

    /// Show remediation text
    pub show_remediation: bool,

    /// Show suppressed and superseded findings
    pub show_inactive: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_evidence: true,
            show_remediation: true,
            show_inactive: false,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    pub fn with_inactive(mut self) -> Self {
        self.show_inactive = true;
        self
    }

    fn paint(&self, text: &str, severity: Severity) -> String {
        if !self.colored {
            return text.to_string();
        }
        match severity {
            Severity::Critical => text.red().bold().to_string(),
            Severity::Important => text.yellow().bold().to_string(),
            Severity::NiceToHave => text.blue().to_string(),
            Severity::Strength => text.green().to_string(),
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.colored {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn format_finding(&self, finding: &Finding) -> String {
        let mut output = format!(
            "  {}[{}]: {}\n",
            self.paint(&finding.severity.to_string(), finding.severity),
            if self.colored {
                finding.rule_id.cyan().to_string()
            } else {
                finding.rule_id.clone()
            },
            finding.message
        );

        if self.show_evidence {
            for evidence in &finding.evidence {
                output.push_str(&format!("     {} {}\n", self.dim("-->"), evidence));
            }
        }
        if self.show_remediation && !finding.remediation.is_empty() {
            output.push_str(&format!(
                "      {} fix: {}\n",
                if self.colored {
                    "=".green().to_string()
                } else {
                    "=".to_string()
                },
                finding.remediation
            ));
        }
        if let Some(docs) = &finding.docs {
            output.push_str(&format!("      = docs: {}\n", docs));
        }
        output
    }
}

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &AuditReport) -> Result<String, RenderError> {
        let mut output = String::new();

        let title = format!("Audit of {}", report.target_root);
        output.push_str(&if self.colored {
            title.bold().underline().to_string()
        } else {
            title
        });
        output.push('\n');

        for domain in &report.domains {
            let state = if domain.disabled {
                "disabled".to_string()
            } else {
                format!("{} rules", domain.active_rules)
            };
            let label = if domain.label.is_empty() {
                String::new()
            } else {
                format!(" ({})", domain.label)
            };
            output.push_str(&self.dim(&format!("  {} v{}: {}{}", domain.domain, domain.version, state, label)));
            output.push('\n');
        }
        output.push('\n');

        for section in report.sections() {
            let heading = format!("{} ({})", section.heading, section.findings.len());
            output.push_str(&self.paint(&heading, section.severity));
            output.push('\n');
            for finding in section.findings {
                output.push_str(&self.format_finding(finding));
            }
            output.push('\n');
        }

        if self.show_inactive && !report.inactive.is_empty() {
            output.push_str(&self.dim("Resolved"));
            output.push('\n');
            for finding in &report.inactive {
                output.push_str(&self.dim(&format!(
                    "  {} {} by {}",
                    finding.rule_id,
                    finding.status,
                    finding.resolved_by.as_deref().unwrap_or("-")
                )));
                output.push('\n');
            }
            output.push('\n');
        }

        if !report.next_steps.is_empty() {
            output.push_str("Next steps\n");
            for (i, step) in report.next_steps.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
            output.push('\n');
        }

        if !report.unavailable_signals.is_empty() {
            let heading = "Unavailable signals";
            output.push_str(&if self.colored {
                heading.yellow().to_string()
            } else {
                heading.to_string()
            });
            output.push('\n');
            for signal in &report.unavailable_signals {
                output.push_str(&format!("  {}: {}\n", signal.signal, signal.reason));
            }
            output.push('\n');
        }

        let summary = &report.summary;
        let mut counts = Vec::new();
        for (count, label, severity) in [
            (summary.critical, "critical", Severity::Critical),
            (summary.important, "important", Severity::Important),
            (summary.nice_to_have, "nice-to-have", Severity::NiceToHave),
            (summary.strengths, "strengths", Severity::Strength),
        ] {
            if count > 0 {
                counts.push(self.paint(&format!("{} {}", count, label), severity));
            }
        }
        if counts.is_empty() {
            output.push_str("No findings");
        } else {
            output.push_str(&counts.join(", "));
        }
        let hidden = summary.suppressed + summary.superseded + summary.below_threshold;
        if hidden > 0 {
            output.push_str(&self.dim(&format!(" ({} hidden)", hidden)));
        }
        output.push('\n');

        Ok(output)
    }
}
