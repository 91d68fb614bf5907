//! Project signal snapshot
//!
//! A `ProjectSignal` is captured once per run and never updated. Each entry
//! is either available or explicitly unavailable with a reason, so the
//! evaluator can tell "absent" from "could not be read".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// One observed piece of project state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "value")]
pub enum Signal<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Signal<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Signal::Unavailable(reason.into())
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Signal::Available(value) => Some(value),
            Signal::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Signal::Available(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Signal::Available(_) => None,
            Signal::Unavailable(reason) => Some(reason),
        }
    }
}

/// One regex match inside a file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Matched text (trimmed to a single line)
    pub text: String,
}

/// Key of the regex match table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegexProbe {
    /// Path glob the pattern is applied to
    pub path: String,
    pub pattern: String,
}

impl RegexProbe {
    pub fn new(path: &str, pattern: &str) -> Self {
        Self {
            path: path.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Listing of the paths the active rules care about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileTree {
    /// Relative, `/`-separated paths of matched files and directories
    pub entries: BTreeSet<String>,
    /// Directories that could not be listed, with the reason
    pub unreadable: BTreeMap<String, String>,
}

impl FileTree {
    /// Whether an unreadable directory could hide a path matching `pattern`
    ///
    /// Compares the literal prefix of the glob (up to its first wildcard)
    /// with each unreadable directory.
    pub fn may_hide(&self, pattern: &str) -> bool {
        let prefix: &str = pattern
            .find(['*', '?', '[', '{'])
            .map_or(pattern, |idx| &pattern[..idx]);
        self.unreadable.keys().any(|dir| {
            let dir = format!("{}/", dir.trim_end_matches('/'));
            prefix.is_empty() || prefix.starts_with(&dir) || dir.starts_with(prefix)
        })
    }
}

/// Everything the evaluator may look at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectSignal {
    /// Audited root
    pub root: PathBuf,

    pub files: FileTree,

    /// Parsed config documents (relative path -> structured value)
    pub documents: BTreeMap<String, Signal<serde_json::Value>>,

    /// Detected tool versions (tool -> raw version string)
    pub tools: BTreeMap<String, Signal<String>>,

    /// Regex matches per probe, per matched file
    pub regex_matches: BTreeMap<RegexProbe, BTreeMap<String, Signal<Vec<Span>>>>,
}

impl ProjectSignal {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Add a present file (and its parent directories)
    pub fn with_file(mut self, path: &str) -> Self {
        self.add_entry(path);
        self
    }

    pub fn with_document(mut self, path: &str, value: serde_json::Value) -> Self {
        self.add_entry(path);
        self.documents
            .insert(path.to_string(), Signal::Available(value));
        self
    }

    pub fn with_tool(mut self, tool: &str, version: &str) -> Self {
        self.tools
            .insert(tool.to_string(), Signal::Available(version.to_string()));
        self
    }

    /// Record a file's matches for a probe
    pub fn with_matches(mut self, probe: RegexProbe, path: &str, spans: Vec<Span>) -> Self {
        self.add_entry(path);
        self.regex_matches
            .entry(probe)
            .or_default()
            .insert(path.to_string(), Signal::Available(spans));
        self
    }

    pub fn add_entry(&mut self, path: &str) {
        let mut current = path.trim_matches('/');
        self.files.entries.insert(current.to_string());
        while let Some(idx) = current.rfind('/') {
            current = &current[..idx];
            self.files.entries.insert(current.to_string());
        }
    }

    /// Every signal that could not be captured, as `(what, reason)` pairs
    pub fn unavailable_signals(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (dir, reason) in &self.files.unreadable {
            out.push((format!("directory {}", dir), reason.clone()));
        }
        for (path, doc) in &self.documents {
            if let Some(reason) = doc.reason() {
                out.push((format!("config {}", path), reason.to_string()));
            }
        }
        for (tool, version) in &self.tools {
            if let Some(reason) = version.reason() {
                out.push((format!("tool version {}", tool), reason.to_string()));
            }
        }
        let mut unreadable_texts = BTreeSet::new();
        for files in self.regex_matches.values() {
            for (path, spans) in files {
                if let Some(reason) = spans.reason() {
                    unreadable_texts.insert((format!("file {}", path), reason.to_string()));
                }
            }
        }
        out.extend(unreadable_texts);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_entry_records_parents() {
        let signal = ProjectSignal::new(PathBuf::from("/p")).with_file("src/app/page.tsx");
        assert!(signal.files.entries.contains("src"));
        assert!(signal.files.entries.contains("src/app"));
        assert!(signal.files.entries.contains("src/app/page.tsx"));
    }

    #[test]
    fn test_may_hide() {
        let mut tree = FileTree::default();
        tree.unreadable
            .insert("secret".to_string(), "permission denied".to_string());

        assert!(tree.may_hide("**/Dockerfile"));
        assert!(tree.may_hide("secret/config.json"));
        assert!(tree.may_hide("sec*"));
        assert!(!tree.may_hide("biome.json"));
        assert!(!tree.may_hide("app/**/page.tsx"));
    }

    #[test]
    fn test_unavailable_signals_listed() {
        let mut signal = ProjectSignal::new(PathBuf::from("/p"));
        signal
            .documents
            .insert("biome.json".to_string(), Signal::unavailable("parse error"));
        signal
            .tools
            .insert("biome".to_string(), Signal::unavailable("timed out"));

        let listed = signal.unavailable_signals();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "config biome.json");
        assert_eq!(listed[1].1, "timed out");
    }

    #[test]
    fn test_signal_accessors() {
        let available: Signal<u8> = Signal::Available(1);
        let missing: Signal<u8> = Signal::unavailable("gone");
        assert_eq!(available.available(), Some(&1));
        assert!(missing.available().is_none());
        assert_eq!(missing.reason(), Some("gone"));
    }
}
