//! Decision trees that narrow a catalog before evaluation
//!
//! Each pack may declare a finite yes/no tree. Internal nodes ask about the
//! caller's declared intent or about the captured project snapshot; leaves
//! select which slice of the catalog stays active. The walk is single-pass:
//! an unanswerable question takes the node's declared fallback branch.

use crate::predicate::{Predicate, Truth};
use crate::rule::DetectionRule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// What the caller told us about the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    /// `Some(true)` for a fresh project, `Some(false)` for an existing one
    #[serde(default)]
    pub new_project: Option<bool>,

    /// Domains explicitly requested (empty = no preference)
    #[serde(default)]
    pub requested_domains: Vec<String>,

    /// Free-form yes/no answers keyed by question name
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl Intent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_project(mut self, value: bool) -> Self {
        self.new_project = Some(value);
        self
    }

    pub fn request(mut self, domain: &str) -> Self {
        self.requested_domains.push(domain.to_string());
        self
    }

    pub fn with_flag(mut self, key: &str, value: bool) -> Self {
        self.flags.insert(key.to_string(), value);
        self
    }

    /// Answer an intent question
    ///
    /// `new_project` and `requested:<domain>` are built in; anything else is
    /// looked up in `flags`. `None` means the caller did not say.
    pub fn answer(&self, key: &str) -> Option<bool> {
        if key == "new_project" {
            return self.new_project;
        }
        if let Some(domain) = key.strip_prefix("requested:") {
            if self.requested_domains.is_empty() {
                return None;
            }
            return Some(self.requested_domains.iter().any(|d| d == domain));
        }
        self.flags.get(key).copied()
    }

    /// Whether a pack should run at all under this intent
    pub fn wants_domain(&self, domain: &str) -> bool {
        self.requested_domains.is_empty() || self.requested_domains.iter().any(|d| d == domain)
    }
}

/// Which branch an unanswerable question takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Yes,
    #[default]
    No,
}

/// A yes/no question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Question {
    /// Answered by the caller's intent
    Intent(String),
    /// Answered by evaluating a predicate against the project snapshot
    Signal(Predicate),
}

/// Internal node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionNode {
    pub id: String,
    pub question: Question,
    /// Node or leaf id taken on "yes"
    pub yes: String,
    /// Node or leaf id taken on "no"
    pub no: String,
    #[serde(default)]
    pub fallback: Branch,
}

/// Leaf: the action set selected for the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLeaf {
    pub id: String,

    #[serde(default)]
    pub label: String,

    /// Keep only rules carrying one of these tags (empty = keep all)
    #[serde(default)]
    pub include_tags: Vec<String>,

    /// Drop rules carrying any of these tags
    #[serde(default)]
    pub exclude_tags: Vec<String>,

    /// Disable the entire domain for this run
    #[serde(default)]
    pub disable_domain: bool,
}

/// A finite decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub root: String,
    #[serde(default)]
    pub nodes: Vec<DecisionNode>,
    pub leaves: Vec<DecisionLeaf>,
}

impl DecisionTree {
    /// Check references and that the structure is a tree reachable from the root
    pub fn validate(&self) -> Result<(), String> {
        let nodes: HashMap<&str, &DecisionNode> =
            self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let leaves: HashSet<&str> = self.leaves.iter().map(|l| l.id.as_str()).collect();

        if nodes.len() != self.nodes.len() || leaves.len() != self.leaves.len() {
            return Err("duplicate node or leaf id".to_string());
        }
        if let Some(id) = nodes.keys().find(|id| leaves.contains(*id)) {
            return Err(format!("'{}' is both a node and a leaf", id));
        }
        if !nodes.contains_key(self.root.as_str()) && !leaves.contains(self.root.as_str()) {
            return Err(format!("root '{}' is not defined", self.root));
        }

        // Every id must be reached at most once from the root
        let mut seen = HashSet::new();
        let mut stack = vec![self.root.as_str()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(format!("'{}' is reachable more than once", id));
            }
            if let Some(node) = nodes.get(id) {
                for next in [node.yes.as_str(), node.no.as_str()] {
                    if !nodes.contains_key(next) && !leaves.contains(next) {
                        return Err(format!("node '{}' points to unknown '{}'", id, next));
                    }
                    stack.push(next);
                }
            }
        }
        Ok(())
    }

    /// Predicates asked by signal questions, keyed by node id
    pub fn signal_questions(&self) -> Vec<(&str, &Predicate)> {
        self.nodes
            .iter()
            .filter_map(|node| match &node.question {
                Question::Signal(predicate) => Some((node.id.as_str(), predicate)),
                Question::Intent(_) => None,
            })
            .collect()
    }

    fn leaf(&self, id: &str) -> Option<&DecisionLeaf> {
        self.leaves.iter().find(|l| l.id == id)
    }

    fn node(&self, id: &str) -> Option<&DecisionNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Outcome of walking a tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Leaf that was reached (empty when the pack has no tree)
    pub leaf: String,
    pub label: String,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub disable_domain: bool,
    /// Node ids visited, with the branch taken
    pub path: Vec<(String, Branch)>,
}

impl Selection {
    /// Selection that keeps the whole catalog
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selection that disables the domain
    pub fn nothing(label: &str) -> Self {
        Self {
            label: label.to_string(),
            disable_domain: true,
            ..Self::default()
        }
    }

    /// Whether a rule survives this selection
    pub fn admits(&self, rule: &DetectionRule) -> bool {
        if self.disable_domain {
            return false;
        }
        if rule.tags.iter().any(|t| self.exclude_tags.contains(t)) {
            return false;
        }
        self.include_tags.is_empty() || rule.tags.iter().any(|t| self.include_tags.contains(t))
    }
}

/// Walks a decision tree
pub struct DecisionTreeWalker<'a> {
    intent: &'a Intent,
    /// Answers a signal question; `Indeterminate` takes the fallback branch
    signal: &'a dyn Fn(&Predicate) -> Truth,
}

impl<'a> DecisionTreeWalker<'a> {
    pub fn new(intent: &'a Intent, signal: &'a dyn Fn(&Predicate) -> Truth) -> Self {
        Self { intent, signal }
    }

    /// Walk from the root to a leaf
    ///
    /// The tree is validated at load, so every step reaches a defined id and
    /// the walk visits each node at most once.
    pub fn walk(&self, tree: &DecisionTree) -> Selection {
        let mut path = Vec::new();
        let mut current = tree.root.as_str();

        for _ in 0..=tree.nodes.len() {
            if let Some(leaf) = tree.leaf(current) {
                log::debug!("Decision tree reached leaf '{}'", leaf.id);
                return Selection {
                    leaf: leaf.id.clone(),
                    label: leaf.label.clone(),
                    include_tags: leaf.include_tags.clone(),
                    exclude_tags: leaf.exclude_tags.clone(),
                    disable_domain: leaf.disable_domain,
                    path,
                };
            }
            let Some(node) = tree.node(current) else {
                break;
            };

            let answer = match &node.question {
                Question::Intent(key) => self.intent.answer(key),
                Question::Signal(predicate) => match (self.signal)(predicate) {
                    Truth::True => Some(true),
                    Truth::False => Some(false),
                    Truth::Indeterminate => None,
                },
            };
            let branch = match answer {
                Some(true) => Branch::Yes,
                Some(false) => Branch::No,
                None => {
                    log::debug!(
                        "Question '{}' unanswerable, taking fallback {:?}",
                        node.id,
                        node.fallback
                    );
                    node.fallback
                }
            };
            path.push((node.id.clone(), branch));
            current = match branch {
                Branch::Yes => node.yes.as_str(),
                Branch::No => node.no.as_str(),
            };
        }

        log::error!("Decision tree rooted at '{}' did not reach a leaf", tree.root);
        Selection {
            path,
            ..Selection::everything()
        }
    }
}
