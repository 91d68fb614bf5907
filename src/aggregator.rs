//! Conflict resolution and ordering of fired rules
//!
//! Rules that declare `conflicts_with` each other form connected components.
//! Each component keeps exactly one active finding; the rest stay in the
//! result with a non-active status so the report can show the audit trail.

use crate::catalog::RuleCatalog;
use crate::finding::{Finding, FindingStatus};
use crate::rule::DetectionRule;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashSet};

/// Resolves conflicts, supersession and duplicates among findings
pub struct FindingAggregator<'a> {
    catalogs: &'a [RuleCatalog],
}

impl<'a> FindingAggregator<'a> {
    /// `catalogs` supply the rule relations for every finding's domain
    pub fn new(catalogs: &'a [RuleCatalog]) -> Self {
        Self { catalogs }
    }

    /// Resolve and order findings
    ///
    /// Returns every finding, active and inactive, sorted by severity
    /// (descending), then domain, then catalog declaration order.
    pub fn aggregate(&self, findings: Vec<Finding>) -> Vec<Finding> {
        let mut findings = dedup(findings);
        findings.sort_by(rank);

        let mut by_domain: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, finding) in findings.iter().enumerate() {
            by_domain
                .entry(finding.domain.clone())
                .or_default()
                .push(index);
        }

        for (domain, indices) in &by_domain {
            self.resolve_conflicts(domain, indices, &mut findings);
            self.apply_supersedes(domain, indices, &mut findings);
        }

        let suppressed = findings.iter().filter(|f| !f.is_active()).count();
        log::debug!(
            "Aggregated {} findings ({} inactive)",
            findings.len(),
            suppressed
        );
        findings
    }

    fn rule(&self, domain: &str, id: &str) -> Option<&DetectionRule> {
        self.catalogs
            .iter()
            .filter(|c| c.domain() == domain)
            .find_map(|c| c.rule(id))
    }

    fn resolve_conflicts(&self, domain: &str, indices: &[usize], findings: &mut [Finding]) {
        // Union-find over the findings of this domain
        let mut parent: Vec<usize> = (0..indices.len()).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for (a, &ia) in indices.iter().enumerate() {
            let Some(rule) = self.rule(domain, &findings[ia].rule_id) else {
                continue;
            };
            for (b, &ib) in indices.iter().enumerate() {
                let other = &findings[ib].rule_id;
                let reverse = self
                    .rule(domain, other)
                    .is_some_and(|r| r.conflicts_with.contains(&findings[ia].rule_id));
                if a != b && (rule.conflicts_with.contains(other) || reverse) {
                    let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                    if ra != rb {
                        parent[ra] = rb;
                    }
                }
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (local, &index) in indices.iter().enumerate() {
            components
                .entry(find(&mut parent, local))
                .or_default()
                .push(index);
        }

        for members in components.values().filter(|m| m.len() > 1) {
            let winner = self.pick_winner(domain, members, findings);
            let winner_id = findings[winner].rule_id.clone();
            let winner_supersedes = self
                .rule(domain, &winner_id)
                .map(|r| r.supersedes.clone())
                .unwrap_or_default();

            for &loser in members.iter().filter(|&&m| m != winner) {
                let status = if winner_supersedes.contains(&findings[loser].rule_id) {
                    FindingStatus::Superseded
                } else {
                    FindingStatus::Suppressed
                };
                if findings[loser].transition(status, &winner_id) {
                    log::debug!(
                        "{} '{}' in favour of '{}'",
                        status,
                        findings[loser].rule_id,
                        winner_id
                    );
                }
            }
        }
    }

    /// Highest severity wins; ties go to a rule that supersedes the others,
    /// then to the earliest declaration
    fn pick_winner(&self, domain: &str, members: &[usize], findings: &[Finding]) -> usize {
        let top = members
            .iter()
            .map(|&m| findings[m].severity)
            .max()
            .unwrap_or_default();
        let tied: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&m| findings[m].severity == top)
            .collect();

        let superseded_count = |m: usize| {
            tied.iter()
                .filter(|&&other| other != m)
                .filter(|&&other| {
                    self.rule(domain, &findings[other].rule_id)
                        .is_some_and(|r| r.supersedes.contains(&findings[m].rule_id))
                })
                .count()
        };

        tied.iter()
            .copied()
            .min_by_key(|&m| (superseded_count(m), findings[m].order, findings[m].rule_id.clone()))
            .unwrap_or(members[0])
    }

    /// An active finding whose rule is replaced by another active finding's
    /// rule becomes superseded. Higher-ranked findings act first.
    fn apply_supersedes(&self, domain: &str, indices: &[usize], findings: &mut [Finding]) {
        for &i in indices {
            if !findings[i].is_active() {
                continue;
            }
            let Some(rule) = self.rule(domain, &findings[i].rule_id) else {
                continue;
            };
            let by = rule.id.clone();
            for &j in indices {
                if i != j && findings[j].is_active() && rule.supersedes.contains(&findings[j].rule_id)
                {
                    findings[j].transition(FindingStatus::Superseded, &by);
                }
            }
        }
    }
}

/// Drop repeated `(domain, rule, evidence)` findings, keeping the first
fn dedup(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert((f.domain.clone(), f.rule_id.clone(), f.evidence.clone())))
        .collect()
}

fn rank(a: &Finding, b: &Finding) -> Ordering {
    (Reverse(a.severity), &a.domain, a.order, &a.rule_id).cmp(&(
        Reverse(b.severity),
        &b.domain,
        b.order,
        &b.rule_id,
    ))
}
