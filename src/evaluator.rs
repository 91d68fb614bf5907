//! Rule evaluation
//!
//! Evaluation is a pure function of a catalog and a project snapshot. Every
//! predicate resolves to a three-valued [`Truth`]; a rule fires only when its
//! predicate is definitely true, so a signal that could not be read can never
//! produce a finding on its own.

use crate::catalog::{CompiledPatterns, RuleCatalog};
use crate::finding::{Evidence, Finding};
use crate::predicate::{Predicate, Truth, Version};
use crate::rule::DetectionRule;
use crate::severity::Severity;
use crate::signal::{ProjectSignal, RegexProbe, Signal};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Placeholder value when a template field has no evidence
const UNKNOWN: &str = "(unknown)";

/// A rule could not be evaluated against a validated catalog
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("glob '{0}' was not compiled with the catalog")]
    MissingGlob(String),

    #[error("regex '{0}' was not compiled with the catalog")]
    MissingRegex(String),
}

/// Result of evaluating one predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub truth: Truth,
    /// Observations supporting the outcome
    pub evidence: Vec<Evidence>,
}

impl Outcome {
    fn new(truth: Truth, evidence: Vec<Evidence>) -> Self {
        Self { truth, evidence }
    }

    fn indeterminate() -> Self {
        Self::new(Truth::Indeterminate, Vec::new())
    }
}

/// Evaluate a predicate against a snapshot
pub fn evaluate_predicate(
    predicate: &Predicate,
    signal: &ProjectSignal,
    patterns: &CompiledPatterns,
) -> Result<Outcome, EvaluationError> {
    match predicate {
        Predicate::All(children) => {
            let mut truth = Truth::True;
            let mut evidence = Vec::new();
            for child in children {
                let outcome = evaluate_predicate(child, signal, patterns)?;
                truth = truth.and(outcome.truth);
                evidence.extend(outcome.evidence);
            }
            if !truth.is_true() {
                evidence.clear();
            }
            Ok(Outcome::new(truth, evidence))
        }
        Predicate::Any(children) => {
            let mut truth = Truth::False;
            let mut evidence = Vec::new();
            for child in children {
                let outcome = evaluate_predicate(child, signal, patterns)?;
                truth = truth.or(outcome.truth);
                if outcome.truth.is_true() {
                    evidence.extend(outcome.evidence);
                }
            }
            Ok(Outcome::new(truth, evidence))
        }
        Predicate::Not(inner) => {
            let outcome = evaluate_predicate(inner, signal, patterns)?;
            Ok(Outcome::new(outcome.truth.negate(), outcome.evidence))
        }
        Predicate::PathExists(path) => {
            let glob = patterns
                .glob(path)
                .ok_or_else(|| EvaluationError::MissingGlob(path.clone()))?;
            let matched: Vec<Evidence> = signal
                .files
                .entries
                .iter()
                .filter(|entry| glob.is_match(entry.as_str()))
                .map(|entry| Evidence::file(entry))
                .collect();

            if !matched.is_empty() {
                Ok(Outcome::new(Truth::True, matched))
            } else if signal.files.may_hide(path) {
                Ok(Outcome::indeterminate())
            } else {
                Ok(Outcome::new(Truth::False, Vec::new()))
            }
        }
        Predicate::ConfigKeyEquals {
            path,
            pointer,
            value,
        } => {
            let glob = patterns
                .glob(path)
                .ok_or_else(|| EvaluationError::MissingGlob(path.clone()))?;
            let mut seen_any = false;
            let mut unavailable = false;
            let mut hits = Vec::new();
            let mut misses = Vec::new();

            for (doc_path, doc) in &signal.documents {
                if !glob.is_match(doc_path.as_str()) {
                    continue;
                }
                seen_any = true;
                match doc {
                    Signal::Available(document) => {
                        let observed = document.pointer(pointer);
                        let evidence = Evidence::file(doc_path)
                            .with_pointer(pointer)
                            .observed(observed.map_or("(missing)".to_string(), render_value));
                        if observed == Some(value) {
                            hits.push(evidence);
                        } else {
                            misses.push(evidence);
                        }
                    }
                    Signal::Unavailable(_) => unavailable = true,
                }
            }

            if !hits.is_empty() {
                Ok(Outcome::new(Truth::True, hits))
            } else if !seen_any || unavailable || signal.files.may_hide(path) {
                Ok(Outcome::indeterminate())
            } else {
                Ok(Outcome::new(Truth::False, misses))
            }
        }
        Predicate::RegexPresent { path, pattern } => {
            if patterns.regex(pattern).is_none() {
                return Err(EvaluationError::MissingRegex(pattern.clone()));
            }
            let Some(files) = signal.regex_matches.get(&RegexProbe::new(path, pattern)) else {
                return Ok(Outcome::indeterminate());
            };

            let mut unavailable = false;
            let mut evidence = Vec::new();
            for (file, spans) in files {
                match spans {
                    Signal::Available(spans) => {
                        evidence.extend(spans.iter().map(|span| {
                            Evidence::file(file)
                                .at_line(span.line)
                                .observed(span.text.clone())
                        }));
                    }
                    Signal::Unavailable(_) => unavailable = true,
                }
            }

            if !evidence.is_empty() {
                Ok(Outcome::new(Truth::True, evidence))
            } else if files.is_empty() || unavailable || signal.files.may_hide(path) {
                Ok(Outcome::indeterminate())
            } else {
                Ok(Outcome::new(Truth::False, Vec::new()))
            }
        }
        Predicate::VersionLessThan { tool, version } => {
            Ok(compare_version(signal, tool, version, |found, wanted| found < wanted))
        }
        Predicate::VersionAtLeast { tool, version } => {
            Ok(compare_version(signal, tool, version, |found, wanted| found >= wanted))
        }
    }
}

fn compare_version(
    signal: &ProjectSignal,
    tool: &str,
    wanted: &str,
    holds: impl Fn(&Version, &Version) -> bool,
) -> Outcome {
    let Some(Signal::Available(raw)) = signal.tools.get(tool) else {
        return Outcome::indeterminate();
    };
    match (Version::parse(raw), Version::parse(wanted)) {
        (Some(found), Some(wanted)) => Outcome::new(
            Truth::from_bool(holds(&found, &wanted)),
            vec![Evidence::tool(tool, raw)],
        ),
        _ => {
            log::debug!("Unparseable version '{}' for tool '{}'", raw, tool);
            Outcome::indeterminate()
        }
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fill a message template from the first evidence item
pub fn format_message(template: &str, rule: &DetectionRule, evidence: &[Evidence]) -> String {
    let first = evidence.first();
    let field = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_string());
    let observed = first
        .map(|e| e.observed.clone())
        .filter(|observed| !observed.is_empty());

    let replacements = [
        ("{path}", field(first.and_then(|e| e.path.clone()))),
        ("{line}", field(first.and_then(|e| e.line).map(|l| l.to_string()))),
        (
            "{match}",
            field(first.filter(|e| e.line.is_some()).and(observed.clone())),
        ),
        ("{pointer}", field(first.and_then(|e| e.pointer.clone()))),
        ("{value}", field(observed.clone())),
        ("{tool}", field(first.and_then(|e| e.tool.clone()))),
        (
            "{version}",
            field(first.filter(|e| e.tool.is_some()).and(observed)),
        ),
        ("{rule}", rule.id.clone()),
        ("{domain}", rule.domain.clone()),
    ];

    let mut result = template.to_string();
    for (placeholder, value) in &replacements {
        if result.contains(placeholder) {
            result = result.replace(placeholder, value);
        }
    }
    result
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTiming {
    pub rule_id: String,
    /// Total time spent on this rule
    pub total_time: Duration,
    /// Number of times the rule was evaluated
    pub evaluation_count: usize,
    /// Number of times it fired
    pub match_count: usize,
}

impl RuleTiming {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }

    pub fn merge(&mut self, other: &RuleTiming) {
        self.total_time += other.total_time;
        self.evaluation_count += other.evaluation_count;
        self.match_count += other.match_count;
    }
}

/// Format timing statistics as a table, slowest rule first
pub fn format_timings(timings: &[RuleTiming]) -> String {
    if timings.is_empty() {
        return "No timing data available".to_string();
    }

    let mut sorted: Vec<&RuleTiming> = timings.iter().collect();
    sorted.sort_by(|a, b| {
        b.total_time
            .cmp(&a.total_time)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });

    let mut output = String::new();
    output.push_str("Rule Timing Statistics:\n");
    output.push_str(&format!(
        "{:<40} {:>12} {:>12} {:>10} {:>12}\n",
        "Rule ID", "Total", "Avg", "Evals", "Fired"
    ));
    output.push_str(&"-".repeat(90));
    output.push('\n');

    for timing in sorted {
        let total_ms = timing.total_time.as_secs_f64() * 1000.0;
        let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;
        output.push_str(&format!(
            "{:<40} {:>10.2}ms {:>10.2}µs {:>10} {:>12}\n",
            timing.rule_id, total_ms, avg_us, timing.evaluation_count, timing.match_count
        ));
    }
    output
}

/// Findings produced by one evaluation pass
#[derive(Debug, Default)]
pub struct Evaluation {
    /// One active finding per fired rule, in declaration order
    pub findings: Vec<Finding>,
    pub timings: Vec<RuleTiming>,
    /// Rules skipped because of an evaluation defect
    pub skipped: Vec<String>,
}

/// Evaluates every active rule of a catalog
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    /// Severity overrides from configuration (rule id -> severity)
    severity_overrides: HashMap<String, Severity>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_severity_overrides(mut self, overrides: HashMap<String, Severity>) -> Self {
        self.severity_overrides = overrides;
        self
    }

    pub fn evaluate(&self, catalog: &RuleCatalog, signal: &ProjectSignal) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let mut timings: BTreeMap<&str, RuleTiming> = BTreeMap::new();

        for rule in catalog.rules() {
            let start = Instant::now();
            let outcome = evaluate_predicate(&rule.predicate, signal, catalog.patterns());
            let timing = timings
                .entry(rule.id.as_str())
                .or_insert_with(|| RuleTiming::new(&rule.id));
            timing.total_time += start.elapsed();
            timing.evaluation_count += 1;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Skipping rule '{}' in '{}': {}", rule.id, catalog.domain(), e);
                    evaluation.skipped.push(rule.id.clone());
                    continue;
                }
            };
            log::debug!("Rule '{}' evaluated {}", rule.id, outcome.truth);
            if !outcome.truth.is_true() {
                continue;
            }
            timing.match_count += 1;
            evaluation
                .findings
                .push(self.finding(rule, catalog.declaration_index(&rule.id), outcome.evidence));
        }

        evaluation.timings = timings.into_values().collect();
        evaluation
    }

    fn finding(&self, rule: &DetectionRule, order: usize, mut evidence: Vec<Evidence>) -> Finding {
        evidence.sort();
        evidence.dedup();

        let severity = self
            .severity_overrides
            .get(&rule.id)
            .copied()
            .unwrap_or(rule.severity);
        let message = format_message(&rule.message, rule, &evidence);
        let remediation = format_message(&rule.remediation, rule, &evidence);

        let mut finding = Finding::new(&rule.id, &rule.domain, severity, &message)
            .with_remediation(&remediation)
            .with_order(order);
        finding.evidence = evidence;
        finding.docs = rule.docs.clone();
        finding
    }
}
