//! Audit pipeline
//!
//! ```text
//! ProjectStateCollector -> DecisionTreeWalker -> RuleCatalog::narrow
//!     -> RuleEvaluator -> FindingAggregator -> AuditReport
//! ```
//!
//! Each root is audited independently. Packs are shared read-only between
//! concurrent runs.

use crate::aggregator::FindingAggregator;
use crate::catalog::{CatalogError, DomainPack, RuleCatalog};
use crate::collector::{CollectionError, ProjectStateCollector, SignalPlan};
use crate::config::Config;
use crate::decision::{DecisionTreeWalker, Intent, Selection};
use crate::evaluator::{evaluate_predicate, RuleEvaluator, RuleTiming};
use crate::output::RenderError;
use crate::predicate::{Predicate, Truth};
use crate::report::{AuditReport, DomainSummary};
use crate::signal::ProjectSignal;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Exit code for fatal errors
pub const EXIT_FATAL: i32 = 2;

/// Fatal audit error
#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Audit of {0} was cancelled")]
    Cancelled(PathBuf),
}

impl AuditError {
    pub fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }
}

/// Cooperative cancellation, checked between pipeline stages
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs audits against a fixed set of packs
pub struct Auditor {
    packs: Vec<Arc<DomainPack>>,
    config: Config,
    intent: Intent,
    cancel: CancellationToken,
}

impl Auditor {
    pub fn new(packs: Vec<DomainPack>) -> Self {
        Self {
            packs: packs.into_iter().map(Arc::new).collect(),
            config: Config::default(),
            intent: Intent::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn packs(&self) -> &[Arc<DomainPack>] {
        &self.packs
    }

    fn check_cancelled(&self, root: &Path) -> Result<(), AuditError> {
        if self.cancel.is_cancelled() {
            log::debug!("Audit of {} cancelled", root.display());
            return Err(AuditError::Cancelled(root.to_path_buf()));
        }
        Ok(())
    }

    /// Audit one project root
    ///
    /// The project is read once: the snapshot covers every wanted pack's
    /// decision questions and full catalog, and both the tree walk and the
    /// evaluation run against it.
    pub fn audit(&self, root: &Path) -> Result<AuditReport, AuditError> {
        let start = Instant::now();
        self.check_cancelled(root)?;

        let packs: Vec<&DomainPack> = self
            .packs
            .iter()
            .map(|pack| pack.as_ref())
            .filter(|pack| self.intent.wants_domain(pack.domain()))
            .collect();

        let collector = ProjectStateCollector::new(self.config.collector_options());
        let signal = collector.collect_plan(root, &Self::plan(&packs))?;
        self.check_cancelled(root)?;

        let mut catalogs = Vec::new();
        let mut domains = Vec::new();
        for pack in &packs {
            let selection = Self::select(pack, &signal, &self.intent);
            let catalog = self.narrow(&pack.catalog, &selection);
            domains.push(DomainSummary {
                domain: pack.domain().to_string(),
                version: pack.catalog.version().to_string(),
                leaf: selection.leaf.clone(),
                label: selection.label.clone(),
                active_rules: catalog.len(),
                disabled: selection.disable_domain,
            });
            catalogs.push(catalog);
        }
        self.check_cancelled(root)?;

        let evaluator = RuleEvaluator::new().with_severity_overrides(self.config.rules.severity.clone());
        let mut findings = Vec::new();
        let mut timings = Vec::new();
        for catalog in &catalogs {
            let evaluation = evaluator.evaluate(catalog, &signal);
            findings.extend(evaluation.findings);
            timings.extend(evaluation.timings);
        }
        self.check_cancelled(root)?;

        let findings = FindingAggregator::new(&catalogs).aggregate(findings);
        let mut report = AuditReport::build(
            &root.display().to_string(),
            domains,
            findings,
            signal.unavailable_signals(),
            self.config.output.severity_min,
        );
        report.timings = timings;

        log::debug!(
            "Audited {} in {:.2}s: {} active findings",
            root.display(),
            start.elapsed().as_secs_f64(),
            report.findings.len()
        );
        Ok(report)
    }

    /// Everything the tree walks and the evaluation of these packs may read
    fn plan(packs: &[&DomainPack]) -> SignalPlan {
        let mut plan = SignalPlan::default();
        for pack in packs {
            plan.merge(SignalPlan::for_catalogs(std::slice::from_ref(&pack.catalog)));
            if let Some(tree) = &pack.decision {
                plan.merge(SignalPlan::for_predicates(
                    tree.signal_questions().into_iter().map(|(_, predicate)| predicate),
                    pack.catalog.tools(),
                ));
            }
        }
        plan
    }

    /// Audit several roots concurrently; results keep the input order
    pub fn audit_many(&self, roots: &[PathBuf]) -> Vec<(PathBuf, Result<AuditReport, AuditError>)> {
        let run = |root: &PathBuf| (root.clone(), self.audit(root));
        let workers = self.config.worker_count();
        if workers <= 1 || roots.len() <= 1 {
            return roots.iter().map(run).collect();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| roots.par_iter().map(run).collect()),
            Err(e) => {
                log::warn!("Falling back to sequential audits: {}", e);
                roots.iter().map(run).collect()
            }
        }
    }

    /// Walk the pack's decision tree against the captured snapshot
    fn select(pack: &DomainPack, signal: &ProjectSignal, intent: &Intent) -> Selection {
        let Some(tree) = &pack.decision else {
            return Selection::everything();
        };

        let patterns = pack.catalog.patterns();
        let answer = |predicate: &Predicate| match evaluate_predicate(predicate, signal, patterns) {
            Ok(outcome) => outcome.truth,
            Err(e) => {
                log::error!("Decision question in '{}' failed: {}", pack.domain(), e);
                Truth::Indeterminate
            }
        };
        let selection = DecisionTreeWalker::new(intent, &answer).walk(tree);
        log::debug!(
            "Domain '{}' selected leaf '{}' via {:?}",
            pack.domain(),
            selection.leaf,
            selection.path
        );
        selection
    }

    /// Apply the selection and the configured rule filters
    fn narrow(&self, catalog: &RuleCatalog, selection: &Selection) -> RuleCatalog {
        let narrowed = catalog.narrow(selection);
        let disabled: Vec<String> = narrowed
            .rules()
            .iter()
            .filter(|rule| !self.config.is_rule_enabled(&rule.id))
            .map(|rule| rule.id.clone())
            .collect();
        narrowed.without(&disabled)
    }
}

/// Audit one root with default configuration
pub fn run_audit(
    root: &Path,
    packs: &[DomainPack],
    intent: &Intent,
) -> Result<AuditReport, AuditError> {
    Auditor::new(packs.to_vec())
        .with_intent(intent.clone())
        .audit(root)
}

/// Combined exit code: the highest of all runs
pub fn combined_exit_code<'a>(
    results: impl IntoIterator<Item = &'a Result<AuditReport, AuditError>>,
) -> i32 {
    results
        .into_iter()
        .map(|result| match result {
            Ok(report) => report.exit_code(),
            Err(e) => e.exit_code(),
        })
        .max()
        .unwrap_or(0)
}

/// Sum timings of the same rule across runs
pub fn merge_timings<'a>(reports: impl IntoIterator<Item = &'a AuditReport>) -> Vec<RuleTiming> {
    let mut merged: BTreeMap<String, RuleTiming> = BTreeMap::new();
    for report in reports {
        for timing in &report.timings {
            merged
                .entry(timing.rule_id.clone())
                .or_insert_with(|| RuleTiming::new(&timing.rule_id))
                .merge(timing);
        }
    }
    merged.into_values().collect()
}
