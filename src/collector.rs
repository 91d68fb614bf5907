//! Project state collection
//!
//! The collector walks the project once and captures only what the active
//! rules reference: matching paths, parsed config documents, tool versions
//! and regex matches. It never writes to the project. Any single signal that
//! fails (unreadable, too large, timed out, unparseable) is recorded as
//! unavailable; only an unreadable root aborts the collection.

use crate::catalog::{compile_glob, RuleCatalog, ToolSpec};
use crate::predicate::Predicate;
use crate::signal::{ProjectSignal, RegexProbe, Signal, Span};
use globset::{GlobSet, GlobSetBuilder};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

/// Maximum spans recorded per file and probe
const MAX_SPANS_PER_FILE: usize = 20;

/// Maximum length of a recorded span text
const MAX_SPAN_TEXT: usize = 120;

/// Directories never descended into
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    ".git",
    "dist",
    "build",
    ".next",
    "vendor",
    ".venv",
    "__pycache__",
    "coverage",
];

/// Collection error
///
/// `RootUnreadable` is fatal; every other variant describes one unavailable
/// signal and is absorbed into the snapshot.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Cannot read project root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed: {0}")]
    Read(String),

    #[error("read timed out after {0} ms")]
    Timeout(u128),

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("invalid pattern: {0}")]
    Pattern(String),
}

impl CollectionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectionError::RootUnreadable { .. })
    }
}

/// Collector settings
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Per-signal read timeout
    pub signal_timeout: Duration,
    /// Files above this size are not read
    pub max_file_size: u64,
    /// Additional excludes: bare names prune matching directories,
    /// anything with `/` or a wildcard is a glob over relative paths
    pub exclude: Vec<String>,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            signal_timeout: Duration::from_millis(2000),
            max_file_size: 1024 * 1024,
            exclude: Vec::new(),
        }
    }
}

/// What a collection run must capture
#[derive(Debug, Clone, Default)]
pub struct SignalPlan {
    /// Globs whose matches are listed
    pub globs: BTreeSet<String>,
    /// Globs whose matching files are parsed as config documents
    pub documents: BTreeSet<String>,
    /// Regex probes run over matching files
    pub probes: BTreeSet<RegexProbe>,
    /// Tool versions to resolve
    pub tools: Vec<ToolSpec>,
}

impl SignalPlan {
    /// Plan covering every rule of the given catalogs
    pub fn for_catalogs(catalogs: &[RuleCatalog]) -> Self {
        let mut plan = Self::default();
        for catalog in catalogs {
            let mut needed_tools = BTreeSet::new();
            for rule in catalog.rules() {
                plan.globs.extend(rule.signal_patterns());
                plan.add_predicate(&rule.predicate);
                needed_tools.extend(rule.predicate.referenced_tools());
            }
            plan.add_tools(catalog.tools(), &needed_tools);
        }
        plan
    }

    /// Plan covering standalone predicates (decision-tree questions)
    pub fn for_predicates<'a>(
        predicates: impl IntoIterator<Item = &'a Predicate>,
        tools: &[ToolSpec],
    ) -> Self {
        let mut plan = Self::default();
        let mut needed_tools = BTreeSet::new();
        for predicate in predicates {
            plan.globs
                .extend(predicate.referenced_paths().into_iter().map(String::from));
            plan.add_predicate(predicate);
            needed_tools.extend(predicate.referenced_tools());
        }
        plan.add_tools(tools, &needed_tools);
        plan
    }

    /// Add everything another plan captures
    pub fn merge(&mut self, other: SignalPlan) {
        self.globs.extend(other.globs);
        self.documents.extend(other.documents);
        self.probes.extend(other.probes);
        for tool in other.tools {
            if !self.tools.iter().any(|t| t.name == tool.name) {
                self.tools.push(tool);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty() && self.tools.is_empty()
    }

    fn add_predicate(&mut self, predicate: &Predicate) {
        predicate.for_each_leaf(&mut |leaf| match leaf {
            Predicate::ConfigKeyEquals { path, .. } => {
                self.documents.insert(path.clone());
            }
            Predicate::RegexPresent { path, pattern } => {
                self.probes.insert(RegexProbe::new(path, pattern));
            }
            _ => {}
        });
    }

    fn add_tools(&mut self, tools: &[ToolSpec], needed: &BTreeSet<&str>) {
        for tool in tools {
            if !needed.contains(tool.name.as_str()) || self.tools.iter().any(|t| t.name == tool.name)
            {
                continue;
            }
            for source in &tool.sources {
                self.globs.insert(source.file.clone());
            }
            self.tools.push(tool.clone());
        }
    }
}

/// Reads project state for a set of active rules
pub struct ProjectStateCollector {
    options: CollectorOptions,
}

impl Default for ProjectStateCollector {
    fn default() -> Self {
        Self::new(CollectorOptions::default())
    }
}

impl ProjectStateCollector {
    pub fn new(options: CollectorOptions) -> Self {
        Self { options }
    }

    /// Capture the signals referenced by the active rules of `catalogs`
    pub fn collect(
        &self,
        root: &Path,
        catalogs: &[RuleCatalog],
    ) -> Result<ProjectSignal, CollectionError> {
        self.collect_plan(root, &SignalPlan::for_catalogs(catalogs))
    }

    /// Capture the signals named by a plan
    pub fn collect_plan(
        &self,
        root: &Path,
        plan: &SignalPlan,
    ) -> Result<ProjectSignal, CollectionError> {
        std::fs::read_dir(root).map_err(|source| CollectionError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let mut signal = ProjectSignal::new(root.to_path_buf());
        if plan.is_empty() {
            return Ok(signal);
        }

        let files = self.walk(root, plan, &mut signal);
        let mut reader = FileReader {
            root,
            options: &self.options,
            texts: HashMap::new(),
        };

        for doc_glob in &plan.documents {
            for path in matching(&files, doc_glob) {
                if !signal.documents.contains_key(path) {
                    let parsed = reader.document(path);
                    signal.documents.insert(path.to_string(), into_signal(parsed));
                }
            }
        }

        for probe in &plan.probes {
            let regex = match Regex::new(&probe.pattern) {
                Ok(regex) => regex,
                Err(e) => {
                    log::warn!("Skipping probe '{}': {}", probe.pattern, e);
                    continue;
                }
            };
            let mut per_file = std::collections::BTreeMap::new();
            for path in matching(&files, &probe.path) {
                let spans = reader.text(path).map(|text| find_spans(&regex, &text));
                per_file.insert(path.to_string(), into_signal(spans));
            }
            signal.regex_matches.insert(probe.clone(), per_file);
        }

        for tool in &plan.tools {
            if let Some(version) = self.resolve_tool(tool, &files, &mut reader, &mut signal) {
                signal.tools.insert(tool.name.clone(), version);
            }
        }

        log::debug!(
            "Collected {} paths, {} documents, {} probes, {} tools from {}",
            signal.files.entries.len(),
            signal.documents.len(),
            signal.regex_matches.len(),
            signal.tools.len(),
            root.display()
        );
        Ok(signal)
    }

    /// Walk the tree, recording matched entries and unreadable directories.
    /// Returns the matched regular files.
    fn walk(&self, root: &Path, plan: &SignalPlan, signal: &mut ProjectSignal) -> Vec<String> {
        let wanted = build_globset(plan.globs.iter());
        let (excluded_names, excluded_globs) = self.excludes();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let rel = relative(root, entry.path());
                if entry.file_type().is_dir() {
                    let name = entry.file_name().to_string_lossy();
                    if excluded_names.iter().any(|n| n == name.as_ref()) {
                        return false;
                    }
                }
                !excluded_globs.is_match(&rel)
            });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let rel = relative(root, entry.path());
                    if wanted.is_match(&rel) {
                        // Special files are read too, so a stuck read surfaces as a timeout
                        if !entry.file_type().is_dir() {
                            files.push(rel.clone());
                        }
                        signal.files.entries.insert(rel);
                    }
                }
                Err(e) => {
                    let dir = e
                        .path()
                        .map(|p| relative(root, p))
                        .unwrap_or_else(|| ".".to_string());
                    log::warn!("Cannot list {}: {}", dir, e);
                    signal.files.unreadable.insert(dir, e.to_string());
                }
            }
        }
        files
    }

    fn excludes(&self) -> (Vec<String>, GlobSet) {
        let mut names: Vec<String> = DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect();
        let mut globs = Vec::new();
        for pattern in &self.options.exclude {
            if pattern.contains('/') || pattern.contains('*') {
                globs.push(pattern.clone());
            } else {
                names.push(pattern.clone());
            }
        }
        (names, build_globset(globs.iter()))
    }

    fn resolve_tool(
        &self,
        tool: &ToolSpec,
        files: &[String],
        reader: &mut FileReader<'_>,
        signal: &mut ProjectSignal,
    ) -> Option<Signal<String>> {
        let mut failure = None;
        for source in &tool.sources {
            for path in matching(files, &source.file) {
                let found = if let Some(pointer) = &source.pointer {
                    let doc = signal
                        .documents
                        .entry(path.to_string())
                        .or_insert_with(|| into_signal(reader.document(path)));
                    match doc {
                        Signal::Available(value) => Ok(value.pointer(pointer).and_then(scalar)),
                        Signal::Unavailable(reason) => Err(reason.clone()),
                    }
                } else if let Some(pattern) = &source.pattern {
                    match (reader.text(path), Regex::new(pattern)) {
                        (Ok(text), Ok(regex)) => Ok(regex.captures(&text).map(|caps| {
                            caps.get(1)
                                .or_else(|| caps.get(0))
                                .map_or(String::new(), |m| m.as_str().trim().to_string())
                        })),
                        (Err(e), _) => Err(e.to_string()),
                        (_, Err(e)) => Err(CollectionError::Pattern(e.to_string()).to_string()),
                    }
                } else {
                    Ok(None)
                };

                match found {
                    Ok(Some(version)) if !version.is_empty() => {
                        return Some(Signal::Available(version));
                    }
                    Ok(_) => {}
                    Err(reason) => {
                        failure.get_or_insert(format!("{}: {}", path, reason));
                    }
                }
            }
        }
        failure.map(Signal::Unavailable)
    }
}

/// Reads files under the per-signal limits, caching text per path
struct FileReader<'a> {
    root: &'a Path,
    options: &'a CollectorOptions,
    texts: HashMap<String, Result<String, String>>,
}

impl FileReader<'_> {
    fn text(&mut self, rel: &str) -> Result<String, CollectionError> {
        if let Some(cached) = self.texts.get(rel) {
            return cached.clone().map_err(CollectionError::Read);
        }
        let result = read_with_limits(&self.root.join(rel), self.options);
        if let Err(e) = &result {
            log::warn!("Signal unavailable for {}: {}", rel, e);
        }
        self.texts
            .insert(rel.to_string(), result.as_ref().map(Clone::clone).map_err(|e| e.to_string()));
        result
    }

    fn document(&mut self, rel: &str) -> Result<serde_json::Value, CollectionError> {
        let text = self.text(rel)?;
        parse_document(rel, &text).map_err(|e| {
            log::warn!("Config {} unavailable: {}", rel, e);
            e
        })
    }
}

/// Read a file without letting a slow filesystem stall the run
fn read_with_limits(path: &Path, options: &CollectorOptions) -> Result<String, CollectionError> {
    let meta = std::fs::metadata(path).map_err(|e| CollectionError::Read(e.to_string()))?;
    if meta.len() > options.max_file_size {
        return Err(CollectionError::TooLarge {
            size: meta.len(),
            limit: options.max_file_size,
        });
    }

    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    thread::spawn(move || {
        let _ = tx.send(std::fs::read_to_string(&owned));
    });

    match rx.recv_timeout(options.signal_timeout) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(CollectionError::Read(e.to_string())),
        Err(_) => Err(CollectionError::Timeout(options.signal_timeout.as_millis())),
    }
}

/// Parse a config document by extension into a JSON value
pub fn parse_document(path: &str, text: &str) -> Result<serde_json::Value, CollectionError> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => {
            serde_yaml::from_str(text).map_err(|e| CollectionError::Parse(e.to_string()))
        }
        "toml" => {
            let value: toml::Value =
                toml::from_str(text).map_err(|e| CollectionError::Parse(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| CollectionError::Parse(e.to_string()))
        }
        _ => serde_json::from_str(text).or_else(|strict| {
            // tsconfig.json, biome.jsonc and friends allow comments
            serde_json::from_str(&strip_json_comments(text))
                .map_err(|_| CollectionError::Parse(strict.to_string()))
        }),
    }
}

/// Remove `//` and `/* */` comments outside of string literals
pub fn strip_json_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        out.push('\n');
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn find_spans(regex: &Regex, text: &str) -> Vec<Span> {
    regex
        .find_iter(text)
        .take(MAX_SPANS_PER_FILE)
        .map(|m| {
            let before = &text[..m.start()];
            let line = before.matches('\n').count() + 1;
            let column = m.start() - before.rfind('\n').map_or(0, |i| i + 1) + 1;
            let first_line = m.as_str().lines().next().unwrap_or("").trim();
            Span {
                line,
                column,
                text: first_line.chars().take(MAX_SPAN_TEXT).collect(),
            }
        })
        .collect()
}

/// Render a scalar JSON value as a version string
fn scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn into_signal<T>(result: Result<T, CollectionError>) -> Signal<T> {
    match result {
        Ok(value) => Signal::Available(value),
        Err(e) => Signal::Unavailable(e.to_string()),
    }
}

fn matching<'f>(files: &'f [String], glob: &str) -> Vec<&'f str> {
    match compile_glob(glob) {
        Ok(matcher) => files
            .iter()
            .filter(|f| matcher.is_match(f.as_str()))
            .map(String::as_str)
            .collect(),
        Err(e) => {
            log::warn!("Ignoring invalid glob '{}': {}", glob, e);
            Vec::new()
        }
    }
}

fn build_globset<'a>(patterns: impl Iterator<Item = &'a String>) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match globset::GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => log::warn!("Ignoring invalid glob '{}': {}", pattern, e),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Relative, `/`-separated path
fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolSource;
    use crate::rule::DetectionRule;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn catalog(rules: Vec<DetectionRule>, tools: Vec<ToolSpec>) -> RuleCatalog {
        RuleCatalog::new("test", rules, tools).unwrap()
    }

    #[test]
    fn test_collect_only_referenced_paths() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "biome.json", "{}");
        write(temp.path(), "README.md", "# hi");

        let cat = catalog(
            vec![DetectionRule::new("r", Predicate::path_exists("biome.json"), "m")],
            vec![],
        );
        let signal = ProjectStateCollector::default()
            .collect(temp.path(), &[cat])
            .unwrap();

        assert!(signal.files.entries.contains("biome.json"));
        assert!(!signal.files.entries.contains("README.md"));
    }

    #[test]
    fn test_excludes_dependency_dirs() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "node_modules/pkg/Dockerfile", "FROM node");
        write(temp.path(), "svc/Dockerfile", "FROM node");

        let cat = catalog(
            vec![DetectionRule::new("r", Predicate::path_exists("**/Dockerfile"), "m")],
            vec![],
        );
        let signal = ProjectStateCollector::default()
            .collect(temp.path(), &[cat])
            .unwrap();

        assert!(signal.files.entries.contains("svc/Dockerfile"));
        assert!(!signal.files.entries.contains("node_modules/pkg/Dockerfile"));
    }

    #[test]
    fn test_documents_and_regex_probes() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "biome.json",
            r#"{ "linter": { "enabled": true } }"#,
        );
        write(temp.path(), "Dockerfile", "# base\nFROM node:latest\n");

        let cat = catalog(
            vec![
                DetectionRule::new(
                    "a",
                    Predicate::config_key_equals("biome.json", "/linter/enabled", json!(true)),
                    "m",
                ),
                DetectionRule::new("b", Predicate::regex_present("Dockerfile", "FROM \\S+"), "m"),
            ],
            vec![],
        );
        let signal = ProjectStateCollector::default()
            .collect(temp.path(), &[cat])
            .unwrap();

        let doc = signal.documents["biome.json"].available().unwrap();
        assert_eq!(doc.pointer("/linter/enabled"), Some(&json!(true)));

        let probe = RegexProbe::new("Dockerfile", "FROM \\S+");
        let spans = signal.regex_matches[&probe]["Dockerfile"].available().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].line, 2);
        assert_eq!(spans[0].column, 1);
        assert_eq!(spans[0].text, "FROM node:latest");
    }

    #[test]
    fn test_unparseable_document_is_unavailable() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "biome.json", "{ not json");

        let cat = catalog(
            vec![DetectionRule::new(
                "a",
                Predicate::config_key_equals("biome.json", "/x", json!(1)),
                "m",
            )],
            vec![],
        );
        let signal = ProjectStateCollector::default()
            .collect(temp.path(), &[cat])
            .unwrap();

        assert!(!signal.documents["biome.json"].is_available());
        assert_eq!(signal.unavailable_signals().len(), 1);
    }

    #[test]
    fn test_oversized_file_is_unavailable() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "Dockerfile", &"x".repeat(64));

        let cat = catalog(
            vec![DetectionRule::new("b", Predicate::regex_present("Dockerfile", "x"), "m")],
            vec![],
        );
        let collector = ProjectStateCollector::new(CollectorOptions {
            max_file_size: 16,
            ..CollectorOptions::default()
        });
        let signal = collector.collect(temp.path(), &[cat]).unwrap();

        let probe = RegexProbe::new("Dockerfile", "x");
        let reason = signal.regex_matches[&probe]["Dockerfile"].reason().unwrap();
        assert!(reason.contains("limit is 16"));
    }

    #[cfg(unix)]
    #[test]
    fn test_stalled_read_times_out() {
        let temp = TempDir::new().unwrap();
        let fifo = temp.path().join("Dockerfile");
        let created = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !created {
            eprintln!("mkfifo unavailable, skipping");
            return;
        }

        let cat = catalog(
            vec![DetectionRule::new("b", Predicate::regex_present("Dockerfile", "FROM"), "m")],
            vec![],
        );
        let collector = ProjectStateCollector::new(CollectorOptions {
            signal_timeout: Duration::from_millis(50),
            ..CollectorOptions::default()
        });
        let signal = collector.collect(temp.path(), &[cat]).unwrap();

        let probe = RegexProbe::new("Dockerfile", "FROM");
        let spans = &signal.regex_matches[&probe]["Dockerfile"];
        assert!(!spans.is_available());
        assert!(spans.reason().unwrap().contains("timed out"));
        assert_eq!(signal.unavailable_signals().len(), 1);

        // Release the blocked reader thread
        drop(std::fs::OpenOptions::new().write(true).open(&fifo));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_recorded() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        write(temp.path(), "Dockerfile", "FROM node:22\n");
        write(temp.path(), "locked/Dockerfile", "FROM node\n");
        let locked = temp.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not stop root
        if std::fs::read_dir(&locked).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("running with elevated permissions, skipping");
            return;
        }

        let cat = catalog(
            vec![DetectionRule::new("r", Predicate::path_exists("**/Dockerfile"), "m")],
            vec![],
        );
        let result = ProjectStateCollector::default().collect(temp.path(), &[cat]);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        let signal = result.unwrap();

        assert!(signal.files.entries.contains("Dockerfile"));
        assert!(signal.files.unreadable.contains_key("locked"));
        assert!(signal.files.may_hide("**/Dockerfile"));
        assert!(!signal.files.may_hide("Dockerfile"));
        assert!(signal
            .unavailable_signals()
            .iter()
            .any(|(name, _)| name == "directory locked"));
    }

    #[test]
    fn test_tool_versions() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{ "devDependencies": { "@biomejs/biome": "^1.9.4" } }"#,
        );
        write(temp.path(), "go.mod", "module example.com/x\n\ngo 1.21\n");

        let tools = vec![
            ToolSpec {
                name: "biome".to_string(),
                sources: vec![ToolSource {
                    file: "package.json".to_string(),
                    pointer: Some("/devDependencies/@biomejs~1biome".to_string()),
                    pattern: None,
                }],
            },
            ToolSpec {
                name: "go".to_string(),
                sources: vec![ToolSource {
                    file: "go.mod".to_string(),
                    pointer: None,
                    pattern: Some(r"(?m)^go\s+(\S+)".to_string()),
                }],
            },
        ];
        let cat = catalog(
            vec![
                DetectionRule::new("a", Predicate::version_less_than("biome", "2.0.0"), "m"),
                DetectionRule::new("b", Predicate::version_less_than("go", "1.22"), "m"),
            ],
            tools,
        );
        let signal = ProjectStateCollector::default()
            .collect(temp.path(), &[cat])
            .unwrap();

        assert_eq!(signal.tools["biome"], Signal::Available("^1.9.4".to_string()));
        assert_eq!(signal.tools["go"], Signal::Available("1.21".to_string()));
    }

    #[test]
    fn test_unreadable_root() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("does-not-exist");

        let err = ProjectStateCollector::default()
            .collect(&missing, &[])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_parse_document_formats() {
        assert_eq!(
            parse_document("a.yaml", "key: 1").unwrap(),
            json!({"key": 1})
        );
        assert_eq!(
            parse_document("a.toml", "[tool]\nname = \"x\"").unwrap(),
            json!({"tool": {"name": "x"}})
        );
        assert_eq!(
            parse_document("tsconfig.json", "{\n // comment\n \"a\": \"//not\" /* c */ }").unwrap(),
            json!({"a": "//not"})
        );
        assert!(parse_document("a.json", "{").is_err());
    }

    #[test]
    fn test_plan_for_predicates() {
        let predicate = Predicate::Any(vec![
            Predicate::path_exists("Dockerfile"),
            Predicate::regex_present("compose.yaml", "services"),
        ]);
        let plan = SignalPlan::for_predicates([&predicate], &[]);
        assert!(plan.globs.contains("Dockerfile"));
        assert!(plan.globs.contains("compose.yaml"));
        assert_eq!(plan.probes.len(), 1);
        assert!(plan.tools.is_empty());
    }
}
