//! Markdown output formatter

use super::{RenderError, ReportFormatter};
use crate::finding::Finding;
use crate::report::AuditReport;

/// Sectioned markdown report, also used as the human-readable rendering
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn finding(out: &mut String, finding: &Finding) {
        out.push_str(&format!(
            "- **{}** `{}`: {}\n",
            finding.domain, finding.rule_id, finding.message
        ));
        for evidence in &finding.evidence {
            out.push_str(&format!("  - evidence: `{}`\n", evidence));
        }
        if !finding.remediation.is_empty() {
            out.push_str(&format!("  - fix: {}\n", finding.remediation));
        }
        if let Some(docs) = &finding.docs {
            out.push_str(&format!("  - docs: <{}>\n", docs));
        }
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &AuditReport) -> Result<String, RenderError> {
        let mut out = String::new();
        out.push_str(&format!("# Configuration audit: {}\n\n", report.target_root));
        out.push_str(&format!(
            "Generated {}\n\n",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        if !report.domains.is_empty() {
            out.push_str("| Domain | Version | Path | Active rules |\n");
            out.push_str("|---|---|---|---|\n");
            for domain in &report.domains {
                let path = if domain.disabled {
                    format!("{} (disabled)", domain.label)
                } else {
                    domain.label.clone()
                };
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    domain.domain, domain.version, path, domain.active_rules
                ));
            }
            out.push('\n');
        }

        let sections = report.sections();
        if sections.is_empty() {
            out.push_str("No findings.\n\n");
        }
        for section in sections {
            out.push_str(&format!(
                "## {} ({})\n\n",
                section.heading,
                section.findings.len()
            ));
            for finding in section.findings {
                Self::finding(&mut out, finding);
            }
            out.push('\n');
        }

        if !report.next_steps.is_empty() {
            out.push_str("## Next steps\n\n");
            for (i, step) in report.next_steps.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, step));
            }
            out.push('\n');
        }

        if !report.unavailable_signals.is_empty() {
            out.push_str("## Unavailable signals\n\n");
            for signal in &report.unavailable_signals {
                out.push_str(&format!("- {}: {}\n", signal.signal, signal.reason));
            }
            out.push('\n');
        }

        let summary = &report.summary;
        out.push_str(&format!(
            "_{} critical, {} important, {} nice-to-have, {} strengths; {} suppressed, {} superseded, {} below threshold_\n",
            summary.critical,
            summary.important,
            summary.nice_to_have,
            summary.strengths,
            summary.suppressed,
            summary.superseded,
            summary.below_threshold
        ));
        Ok(out)
    }
}
