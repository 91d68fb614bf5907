//! Rule catalogs and domain packs
//!
//! A domain pack is one declarative document (YAML or JSON) holding the rule
//! catalog for a single tool, the tool version sources its rules read, and an
//! optional decision tree. Loading validates the whole document and compiles
//! every glob and regex up front; a single bad rule rejects the catalog.

use crate::decision::{DecisionTree, Selection};
use crate::predicate::Predicate;
use crate::rule::DetectionRule;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error loading or validating a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("Invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("Duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("Rule '{rule}' lists unknown rule '{target}' in {field}")]
    UnknownReference {
        rule: String,
        field: &'static str,
        target: String,
    },

    #[error("Invalid pattern '{pattern}' in '{owner}': {message}")]
    InvalidPattern {
        owner: String,
        pattern: String,
        message: String,
    },

    #[error("'{owner}' references undeclared tool '{tool}'")]
    UnknownTool { owner: String, tool: String },

    #[error("Invalid tool '{tool}': {message}")]
    InvalidTool { tool: String, message: String },

    #[error("Invalid decision tree: {0}")]
    InvalidDecisionTree(String),
}

/// Where a tool version can be read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSource {
    /// File glob relative to the project root (e.g., "package.json")
    pub file: String,

    /// JSON pointer into the parsed document
    #[serde(default)]
    pub pointer: Option<String>,

    /// Regex over the raw file text; capture group 1 (or the whole match) is the version
    #[serde(default)]
    pub pattern: Option<String>,
}

/// A tool whose version rules can compare against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,

    /// Sources tried in order; the first available one wins
    pub sources: Vec<ToolSource>,
}

/// On-disk pack document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackDocument {
    pub domain: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tools: Vec<ToolSpec>,

    #[serde(default)]
    pub decision: Option<DecisionTree>,

    pub rules: Vec<DetectionRule>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Globs and regexes compiled once per catalog
#[derive(Debug, Default)]
pub struct CompiledPatterns {
    globs: HashMap<String, GlobMatcher>,
    regexes: HashMap<String, Regex>,
}

impl CompiledPatterns {
    pub fn glob(&self, pattern: &str) -> Option<&GlobMatcher> {
        self.globs.get(pattern)
    }

    pub fn regex(&self, pattern: &str) -> Option<&Regex> {
        self.regexes.get(pattern)
    }

    fn add_glob(&mut self, owner: &str, pattern: &str) -> Result<(), CatalogError> {
        if self.globs.contains_key(pattern) {
            return Ok(());
        }
        let matcher = compile_glob(pattern).map_err(|e| CatalogError::InvalidPattern {
            owner: owner.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.globs.insert(pattern.to_string(), matcher);
        Ok(())
    }

    fn add_regex(&mut self, owner: &str, pattern: &str) -> Result<(), CatalogError> {
        if self.regexes.contains_key(pattern) {
            return Ok(());
        }
        let regex = Regex::new(pattern).map_err(|e| CatalogError::InvalidPattern {
            owner: owner.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.regexes.insert(pattern.to_string(), regex);
        Ok(())
    }

    /// Compile every glob and regex a predicate references
    fn add_predicate(&mut self, owner: &str, predicate: &Predicate) -> Result<(), CatalogError> {
        let mut result = Ok(());
        predicate.for_each_leaf(&mut |leaf| {
            if result.is_err() {
                return;
            }
            result = match leaf {
                Predicate::PathExists(path) | Predicate::ConfigKeyEquals { path, .. } => {
                    self.add_glob(owner, path)
                }
                Predicate::RegexPresent { path, pattern } => self
                    .add_glob(owner, path)
                    .and_then(|_| self.add_regex(owner, pattern)),
                _ => Ok(()),
            };
        });
        result
    }
}

/// Compile a path glob; `*` never crosses a `/`, `**` does
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Immutable set of detection rules for one domain
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    domain: String,
    version: String,
    description: String,
    tools: Arc<Vec<ToolSpec>>,
    rules: Vec<DetectionRule>,
    /// Declaration index of every rule in the full (un-narrowed) catalog
    order: Arc<HashMap<String, usize>>,
    patterns: Arc<CompiledPatterns>,
}

impl RuleCatalog {
    /// Build and validate a catalog from rules
    pub fn new(
        domain: &str,
        rules: Vec<DetectionRule>,
        tools: Vec<ToolSpec>,
    ) -> Result<Self, CatalogError> {
        let mut patterns = CompiledPatterns::default();
        let catalog = Self::build(domain, "1.0.0", "", rules, tools, &mut patterns)?;
        Ok(Self {
            patterns: Arc::new(patterns),
            ..catalog
        })
    }

    fn build(
        domain: &str,
        version: &str,
        description: &str,
        mut rules: Vec<DetectionRule>,
        tools: Vec<ToolSpec>,
        patterns: &mut CompiledPatterns,
    ) -> Result<Self, CatalogError> {
        let mut tool_names = HashSet::new();
        for tool in &tools {
            validate_tool(tool, patterns)?;
            tool_names.insert(tool.name.clone());
        }

        let mut order = HashMap::new();
        for (index, rule) in rules.iter_mut().enumerate() {
            if order.insert(rule.id.clone(), index).is_some() {
                return Err(CatalogError::DuplicateRule(rule.id.clone()));
            }
            if rule.domain.is_empty() {
                rule.domain = domain.to_string();
            }
            if rule.target_patterns.is_empty() {
                rule.target_patterns = rule
                    .predicate
                    .referenced_paths()
                    .into_iter()
                    .map(String::from)
                    .collect();
            }
        }

        for rule in &rules {
            validate_rule(rule, &order, &tool_names, patterns)?;
        }

        Ok(Self {
            domain: domain.to_string(),
            version: version.to_string(),
            description: description.to_string(),
            tools: Arc::new(tools),
            rules,
            order: Arc::new(order),
            patterns: Arc::new(CompiledPatterns::default()),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Active rules in declaration order
    pub fn rules(&self) -> &[DetectionRule] {
        &self.rules
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn patterns(&self) -> &CompiledPatterns {
        &self.patterns
    }

    pub fn rule(&self, id: &str) -> Option<&DetectionRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Position of a rule in the original catalog declaration
    pub fn declaration_index(&self, id: &str) -> usize {
        self.order.get(id).copied().unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Subset of this catalog selected by a decision-tree leaf
    pub fn narrow(&self, selection: &Selection) -> RuleCatalog {
        let rules = if selection.disable_domain {
            Vec::new()
        } else {
            self.rules
                .iter()
                .filter(|rule| selection.admits(rule))
                .cloned()
                .collect()
        };
        RuleCatalog {
            rules,
            ..self.clone()
        }
    }

    /// Drop rules by id (configuration `rules.disabled`) and rules disabled by default
    pub fn without(&self, disabled: &[String]) -> RuleCatalog {
        let rules = self
            .rules
            .iter()
            .filter(|rule| rule.enabled && !disabled.iter().any(|d| d == &rule.id))
            .cloned()
            .collect();
        RuleCatalog {
            rules,
            ..self.clone()
        }
    }
}

fn validate_tool(tool: &ToolSpec, patterns: &mut CompiledPatterns) -> Result<(), CatalogError> {
    let invalid = |message: &str| CatalogError::InvalidTool {
        tool: tool.name.clone(),
        message: message.to_string(),
    };
    if tool.name.trim().is_empty() {
        return Err(invalid("tool name must not be empty"));
    }
    if tool.sources.is_empty() {
        return Err(invalid("at least one source is required"));
    }
    for source in &tool.sources {
        match (&source.pointer, &source.pattern) {
            (Some(pointer), None) => {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(invalid("pointer must start with '/'"));
                }
            }
            (None, Some(pattern)) => patterns.add_regex(&tool.name, pattern)?,
            _ => return Err(invalid("each source needs exactly one of pointer or pattern")),
        }
        patterns.add_glob(&tool.name, &source.file)?;
    }
    Ok(())
}

fn validate_rule(
    rule: &DetectionRule,
    order: &HashMap<String, usize>,
    tools: &HashSet<String>,
    patterns: &mut CompiledPatterns,
) -> Result<(), CatalogError> {
    if rule.id.trim().is_empty() {
        return Err(CatalogError::InvalidRule {
            rule: rule.id.clone(),
            message: "rule id must not be empty".to_string(),
        });
    }

    rule.predicate
        .check_shape()
        .map_err(|message| CatalogError::InvalidRule {
            rule: rule.id.clone(),
            message,
        })?;

    for (field, targets) in [
        ("conflicts_with", &rule.conflicts_with),
        ("supersedes", &rule.supersedes),
    ] {
        for target in targets {
            if target == &rule.id || !order.contains_key(target) {
                return Err(CatalogError::UnknownReference {
                    rule: rule.id.clone(),
                    field,
                    target: target.clone(),
                });
            }
        }
    }

    for tool in rule.predicate.referenced_tools() {
        if !tools.contains(tool) {
            return Err(CatalogError::UnknownTool {
                owner: rule.id.clone(),
                tool: tool.to_string(),
            });
        }
    }

    for target in &rule.target_patterns {
        patterns.add_glob(&rule.id, target)?;
    }
    patterns.add_predicate(&rule.id, &rule.predicate)
}

/// A domain pack: one catalog plus its decision tree
#[derive(Debug, Clone)]
pub struct DomainPack {
    pub catalog: RuleCatalog,
    pub decision: Option<DecisionTree>,
}

impl DomainPack {
    /// Parse and validate a pack from YAML or JSON text
    ///
    /// YAML is decoded into a JSON value first so both formats share one
    /// typed decoding path.
    pub fn parse(content: &str, source_name: &str) -> Result<Self, CatalogError> {
        let parse_err = |message: String| CatalogError::Parse {
            source_name: source_name.to_string(),
            message,
        };
        let trimmed = content.trim_start();
        let value: serde_json::Value = if trimmed.starts_with('{') {
            serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?
        } else {
            serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?
        };
        let document: PackDocument =
            serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?;
        Self::from_document(document)
    }

    /// Load a pack from a `.yaml`, `.yml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_document(document: PackDocument) -> Result<Self, CatalogError> {
        let mut patterns = CompiledPatterns::default();
        let catalog = RuleCatalog::build(
            &document.domain,
            &document.version,
            &document.description,
            document.rules,
            document.tools,
            &mut patterns,
        )?;

        if let Some(tree) = &document.decision {
            tree.validate().map_err(CatalogError::InvalidDecisionTree)?;
            let tool_names: HashSet<&str> =
                catalog.tools.iter().map(|t| t.name.as_str()).collect();
            for (node_id, predicate) in tree.signal_questions() {
                predicate
                    .check_shape()
                    .map_err(|m| CatalogError::InvalidDecisionTree(format!("{}: {}", node_id, m)))?;
                for tool in predicate.referenced_tools() {
                    if !tool_names.contains(tool) {
                        return Err(CatalogError::UnknownTool {
                            owner: node_id.to_string(),
                            tool: tool.to_string(),
                        });
                    }
                }
                patterns.add_predicate(node_id, predicate)?;
            }
        }

        log::debug!(
            "Loaded catalog '{}' v{} with {} rules",
            catalog.domain,
            catalog.version,
            catalog.rules.len()
        );

        Ok(Self {
            catalog: RuleCatalog {
                patterns: Arc::new(patterns),
                ..catalog
            },
            decision: document.decision,
        })
    }

    pub fn domain(&self) -> &str {
        self.catalog.domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;
    use tempfile::TempDir;

    const NEXT_PACK: &str = r#"
domain: nextjs
version: "1.0.0"
tools:
  - name: next
    sources:
      - file: package.json
        pointer: /dependencies/next
rules:
  - id: use-proxy-ts
    severity: critical
    predicate:
      path_exists: middleware.ts
    message: "Rename middleware.ts to proxy.ts"
    conflicts_with: [middleware-deprecated-warning]
  - id: middleware-deprecated-warning
    severity: important
    predicate:
      path_exists: middleware.ts
    message: "middleware.ts is deprecated"
    conflicts_with: [use-proxy-ts]
  - id: next-outdated
    severity: important
    predicate:
      version_less_than:
        tool: next
        version: "15.0.0"
    message: "Next.js {version} is outdated"
"#;

    #[test]
    fn test_parse_yaml_pack() {
        let pack = DomainPack::parse(NEXT_PACK, "nextjs.yaml").unwrap();
        let catalog = &pack.catalog;

        assert_eq!(catalog.domain(), "nextjs");
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.rule("use-proxy-ts").unwrap().severity, Severity::Critical);
        assert_eq!(catalog.rule("use-proxy-ts").unwrap().domain, "nextjs");
        assert_eq!(catalog.declaration_index("next-outdated"), 2);
        // Targets default to the leaf paths
        assert_eq!(
            catalog.rule("use-proxy-ts").unwrap().target_patterns,
            vec!["middleware.ts"]
        );
        assert!(catalog.patterns().glob("middleware.ts").is_some());
    }

    #[test]
    fn test_parse_json_pack() {
        let json = r#"{
            "domain": "go",
            "rules": [
                {"id": "missing-go-sum", "predicate": {"path_exists": "go.mod"}, "message": "m"}
            ]
        }"#;
        let pack = DomainPack::parse(json, "go.json").unwrap();
        assert_eq!(pack.catalog.version(), "1.0.0");
        assert_eq!(pack.catalog.len(), 1);
    }

    #[test]
    fn test_unknown_leaf_kind_rejects_catalog() {
        let yaml = r#"
domain: bad
rules:
  - id: ok
    predicate: { path_exists: a }
    message: m
  - id: shell
    predicate: { run_shell: "grep foo" }
    message: m
"#;
        let err = DomainPack::parse(yaml, "bad.yaml").unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }

    #[test]
    fn test_unknown_conflict_reference_rejected() {
        let rules = vec![DetectionRule::new("a", Predicate::path_exists("x"), "m")
            .conflicts_with("missing")];
        let err = RuleCatalog::new("d", rules, vec![]).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownReference { field: "conflicts_with", .. }
        ));
    }

    #[test]
    fn test_self_supersede_rejected() {
        let rules = vec![DetectionRule::new("a", Predicate::path_exists("x"), "m").supersedes("a")];
        assert!(RuleCatalog::new("d", rules, vec![]).is_err());
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let rules = vec![
            DetectionRule::new("a", Predicate::path_exists("x"), "m"),
            DetectionRule::new("a", Predicate::path_exists("y"), "m"),
        ];
        let err = RuleCatalog::new("d", rules, vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateRule(id) if id == "a"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let rules = vec![DetectionRule::new(
            "a",
            Predicate::regex_present("Dockerfile", "FROM ("),
            "m",
        )];
        let err = RuleCatalog::new("d", rules, vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPattern { .. }));
    }

    #[test]
    fn test_undeclared_tool_rejected() {
        let rules = vec![DetectionRule::new(
            "a",
            Predicate::version_less_than("biome", "2.0.0"),
            "m",
        )];
        let err = RuleCatalog::new("d", rules, vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownTool { .. }));
    }

    #[test]
    fn test_tool_source_needs_one_locator() {
        let tool = ToolSpec {
            name: "go".to_string(),
            sources: vec![ToolSource {
                file: "go.mod".to_string(),
                pointer: Some("/go".to_string()),
                pattern: Some("go (.*)".to_string()),
            }],
        };
        let err = RuleCatalog::new("go", vec![], vec![tool]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTool { .. }));
    }

    #[test]
    fn test_without_disabled_rules() {
        let pack = DomainPack::parse(NEXT_PACK, "nextjs.yaml").unwrap();
        let narrowed = pack.catalog.without(&["next-outdated".to_string()]);
        assert_eq!(narrowed.len(), 2);
        // Declaration order survives narrowing
        assert_eq!(narrowed.declaration_index("next-outdated"), 2);
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nextjs.yaml");
        std::fs::write(&path, NEXT_PACK).unwrap();

        let pack = DomainPack::load(&path).unwrap();
        assert_eq!(pack.domain(), "nextjs");
    }
}
