//! confaudit - Configuration Audit Engine
//!
//! Audits a project's tool configuration (linters, test runners, frameworks,
//! container and language tooling) against declarative, per-domain rule
//! catalogs and produces a prioritized, deduplicated report.
//!
//! # Architecture
//!
//! ```text
//! DecisionTreeWalker -> RuleCatalog (narrowed) -> ProjectStateCollector
//!     -> RuleEvaluator -> FindingAggregator -> AuditReport -> output
//! ```
//!
//! Rules are data, not code: each one pairs a closed predicate tree with a
//! severity and message templates. Predicates evaluate to true, false or
//! indeterminate, and a rule only fires on true, so a file that could not be
//! read never produces a finding by itself.
//!
//! # Domain packs
//!
//! A pack is one YAML or JSON document:
//!
//! ```yaml
//! domain: docker
//! decision:
//!   root: has-dockerfile
//!   nodes:
//!     - id: has-dockerfile
//!       question: { signal: { path_exists: "**/Dockerfile" } }
//!       yes: audit
//!       no: skip
//!   leaves:
//!     - id: audit
//!     - id: skip
//!       disable_domain: true
//! rules:
//!   - id: unpinned-base-image
//!     severity: critical
//!     predicate:
//!       regex_present:
//!         path: "**/Dockerfile"
//!         pattern: '(?m)^FROM\s+[^:\s]+(:latest)?\s*$'
//!     message: "Base image in `{match}` is not pinned"
//! ```

pub mod aggregator;
pub mod catalog;
pub mod collector;
pub mod config;
pub mod decision;
pub mod engine;
pub mod evaluator;
pub mod finding;
pub mod output;
pub mod packs;
pub mod predicate;
pub mod report;
pub mod rule;
pub mod severity;
pub mod signal;

// Re-export main types
pub use aggregator::FindingAggregator;
pub use catalog::{CatalogError, DomainPack, RuleCatalog, ToolSource, ToolSpec};
pub use collector::{CollectionError, CollectorOptions, ProjectStateCollector, SignalPlan};
pub use config::{Config, ConfigError};
pub use decision::{DecisionTree, DecisionTreeWalker, Intent, Selection};
pub use engine::{run_audit, AuditError, Auditor, CancellationToken};
pub use evaluator::{EvaluationError, Outcome, RuleEvaluator, RuleTiming};
pub use finding::{Evidence, Finding, FindingStatus};
pub use output::{render, OutputFormat, RenderError, Rendered, ReportFormatter};
pub use packs::PackSet;
pub use predicate::{Predicate, Truth, Version};
pub use report::{AuditReport, Summary};
pub use rule::DetectionRule;
pub use severity::Severity;
pub use signal::{ProjectSignal, Signal};
