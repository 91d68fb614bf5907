//! JSON output formatter

use super::{RenderError, ReportFormatter};
use crate::finding::Finding;
use crate::report::AuditReport;
use serde::Serialize;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'a> {
    report: &'a AuditReport,
    /// Flat record list for consumers that only want findings
    records: &'a [Finding],
    exit_code: i32,
}

impl ReportFormatter for JsonFormatter {
    fn format(&self, report: &AuditReport) -> Result<String, RenderError> {
        let output = JsonOutput {
            report,
            records: &report.findings,
            exit_code: report.exit_code(),
        };

        Ok(if self.pretty {
            serde_json::to_string_pretty(&output)?
        } else {
            serde_json::to_string(&output)?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Evidence;
    use crate::severity::Severity;

    fn report() -> AuditReport {
        let finding = Finding::new(
            "unpinned-base-image",
            "docker",
            Severity::Critical,
            "Base image is not pinned",
        )
        .with_evidence(Evidence::file("Dockerfile").at_line(1).observed("FROM node:latest"));
        AuditReport::build("/project", vec![], vec![finding], vec![], None)
    }

    #[test]
    fn test_json_format_report() {
        let output = JsonFormatter::new().format(&report()).unwrap();
        assert!(output.contains("\"ruleId\":\"unpinned-base-image\""));
        assert!(output.contains("\"severity\":\"critical\""));
        assert!(output.contains("\"line\":1"));
        assert!(output.contains("\"exitCode\":1"));
    }

    #[test]
    fn test_json_pretty() {
        let output = JsonFormatter::new().pretty().format(&report()).unwrap();
        assert!(output.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["records"][0]["domain"], "docker");
    }
}
