//! Output formatters for audit reports

mod json;
mod markdown;
mod text;

pub use json::JsonFormatter;
pub use markdown::MarkdownFormatter;
pub use text::TextFormatter;

use crate::report::AuditReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rendering failed
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "human" => Ok(OutputFormat::Text),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Report formatter trait
pub trait ReportFormatter: Send + Sync {
    /// Format the entire report
    fn format(&self, report: &AuditReport) -> Result<String, RenderError>;
}

/// Formatter for a format
pub fn formatter(format: OutputFormat, colored: bool) -> Box<dyn ReportFormatter> {
    match format {
        OutputFormat::Text => {
            let text = TextFormatter::new();
            Box::new(if colored { text } else { text.without_color() })
        }
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
    }
}

/// Both renderings of a report
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// Sectioned human-readable text (markdown)
    pub human_text: String,
    /// Ordered finding records
    pub structured: serde_json::Value,
}

/// Render a report without side effects
pub fn render(report: &AuditReport) -> Result<Rendered, RenderError> {
    Ok(Rendered {
        human_text: MarkdownFormatter.format(report)?,
        structured: serde_json::to_value(&report.findings)?,
    })
}
