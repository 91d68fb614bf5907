//! Predicate trees for detection rules
//!
//! Predicates are a closed, declarative AST. Combinators (`all`, `any`, `not`)
//! wrap a fixed set of leaves that observe the project snapshot. Nothing in a
//! predicate is executable; every leaf is validated when the catalog loads.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A condition tree evaluated against a project snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// All children must hold (AND)
    #[serde(alias = "and")]
    All(Vec<Predicate>),

    /// At least one child must hold (OR)
    #[serde(alias = "or")]
    Any(Vec<Predicate>),

    /// Child must not hold (NOT)
    Not(Box<Predicate>),

    /// A file or directory matching the glob exists: `path_exists: "biome.json"`
    PathExists(String),

    /// The parsed config document has `value` at the JSON pointer
    ConfigKeyEquals {
        path: String,
        pointer: String,
        value: serde_json::Value,
    },

    /// The regex matches somewhere in a file matching the glob
    RegexPresent { path: String, pattern: String },

    /// The detected tool version is lower than `version`
    VersionLessThan { tool: String, version: String },

    /// The detected tool version is `version` or newer
    VersionAtLeast { tool: String, version: String },
}

impl Predicate {
    pub fn path_exists(path: &str) -> Self {
        Predicate::PathExists(path.to_string())
    }

    pub fn config_key_equals(path: &str, pointer: &str, value: serde_json::Value) -> Self {
        Predicate::ConfigKeyEquals {
            path: path.to_string(),
            pointer: pointer.to_string(),
            value,
        }
    }

    pub fn regex_present(path: &str, pattern: &str) -> Self {
        Predicate::RegexPresent {
            path: path.to_string(),
            pattern: pattern.to_string(),
        }
    }

    pub fn version_less_than(tool: &str, version: &str) -> Self {
        Predicate::VersionLessThan {
            tool: tool.to_string(),
            version: version.to_string(),
        }
    }

    pub fn version_at_least(tool: &str, version: &str) -> Self {
        Predicate::VersionAtLeast {
            tool: tool.to_string(),
            version: version.to_string(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    /// Visit every leaf, depth-first, left to right
    pub fn for_each_leaf<'a>(&'a self, visit: &mut impl FnMut(&'a Predicate)) {
        match self {
            Predicate::All(children) | Predicate::Any(children) => {
                for child in children {
                    child.for_each_leaf(visit);
                }
            }
            Predicate::Not(inner) => inner.for_each_leaf(visit),
            leaf => visit(leaf),
        }
    }

    /// Path globs referenced by the leaves of this tree
    pub fn referenced_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.for_each_leaf(&mut |leaf| match leaf {
            Predicate::PathExists(path)
            | Predicate::ConfigKeyEquals { path, .. }
            | Predicate::RegexPresent { path, .. } => paths.push(path.as_str()),
            _ => {}
        });
        paths
    }

    /// Tool names referenced by version leaves
    pub fn referenced_tools(&self) -> Vec<&str> {
        let mut tools = Vec::new();
        self.for_each_leaf(&mut |leaf| match leaf {
            Predicate::VersionLessThan { tool, .. } | Predicate::VersionAtLeast { tool, .. } => {
                tools.push(tool.as_str())
            }
            _ => {}
        });
        tools
    }

    /// Structural checks that do not need compiled patterns
    pub fn check_shape(&self) -> Result<(), String> {
        match self {
            Predicate::All(children) | Predicate::Any(children) => {
                if children.is_empty() {
                    return Err("empty all/any combinator".to_string());
                }
                children.iter().try_for_each(Predicate::check_shape)
            }
            Predicate::Not(inner) => inner.check_shape(),
            Predicate::PathExists(path) => non_empty("path_exists", path),
            Predicate::ConfigKeyEquals { path, pointer, .. } => {
                non_empty("config_key_equals.path", path)?;
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(format!(
                        "JSON pointer '{}' must be empty or start with '/'",
                        pointer
                    ));
                }
                Ok(())
            }
            Predicate::RegexPresent { path, pattern } => {
                non_empty("regex_present.path", path)?;
                non_empty("regex_present.pattern", pattern)
            }
            Predicate::VersionLessThan { tool, version }
            | Predicate::VersionAtLeast { tool, version } => {
                non_empty("version.tool", tool)?;
                if Version::parse(version).is_none() {
                    return Err(format!("invalid version literal '{}'", version));
                }
                Ok(())
            }
        }
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} must not be empty", field))
    } else {
        Ok(())
    }
}

/// Ternary truth value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truth {
    True,
    False,
    Indeterminate,
}

impl Truth {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }

    /// Kleene conjunction: `false` dominates, then `indeterminate`
    pub fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Indeterminate,
        }
    }

    /// Kleene disjunction: `true` dominates, then `indeterminate`
    pub fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Indeterminate,
        }
    }

    pub fn negate(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Indeterminate => Truth::Indeterminate,
        }
    }

    pub fn is_true(self) -> bool {
        self == Truth::True
    }
}

impl fmt::Display for Truth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Truth::True => write!(f, "true"),
            Truth::False => write!(f, "false"),
            Truth::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Dotted numeric version, compared component-wise with missing parts as 0
#[derive(Debug, Clone)]
pub struct Version(Vec<u64>);

impl Version {
    /// Parse a version, tolerating range prefixes (`^1.2`, `~1.2.3`, `>=2`, `v1.22`)
    /// and trailing qualifiers (`22-slim`, `1.0.0-beta.1`)
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw
            .trim()
            .trim_start_matches(|c: char| matches!(c, '^' | '~' | '>' | '<' | '=' | 'v' | 'V' | ' '));
        let numeric: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let parts: Vec<u64> = numeric
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().ok())
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            None
        } else {
            Some(Version(parts))
        }
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in 0..self.0.len().max(other.0.len()) {
            let a = self.0.get(i).unwrap_or(&0);
            let b = other.0.get(i).unwrap_or(&0);
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truth_and() {
        assert_eq!(Truth::Indeterminate.and(Truth::False), Truth::False);
        assert_eq!(Truth::False.and(Truth::Indeterminate), Truth::False);
        assert_eq!(Truth::Indeterminate.and(Truth::True), Truth::Indeterminate);
        assert_eq!(Truth::True.and(Truth::True), Truth::True);
    }

    #[test]
    fn test_truth_or() {
        assert_eq!(Truth::Indeterminate.or(Truth::True), Truth::True);
        assert_eq!(Truth::True.or(Truth::Indeterminate), Truth::True);
        assert_eq!(Truth::Indeterminate.or(Truth::False), Truth::Indeterminate);
        assert_eq!(Truth::False.or(Truth::False), Truth::False);
    }

    #[test]
    fn test_truth_negate() {
        assert_eq!(Truth::True.negate(), Truth::False);
        assert_eq!(Truth::Indeterminate.negate(), Truth::Indeterminate);
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(Version::parse("^1.9.4").unwrap().components(), &[1, 9, 4]);
        assert_eq!(Version::parse("~2.0").unwrap().components(), &[2, 0]);
        assert_eq!(Version::parse(">=18").unwrap().components(), &[18]);
        assert_eq!(Version::parse("v1.22.3").unwrap().components(), &[1, 22, 3]);
        assert_eq!(Version::parse("22-slim").unwrap().components(), &[22]);
        assert!(Version::parse("latest").is_none());
        assert!(Version::parse("workspace:*").is_none());
    }

    #[test]
    fn test_version_compare() {
        let v = |s| Version::parse(s).unwrap();
        assert!(v("1.9.4") < v("2.0.0"));
        assert_eq!(v("1.22"), v("1.22.0"));
        assert_eq!(v("2"), v("2.0.0"));
        assert_ne!(v("1.22"), v("1.22.1"));
        assert!(v("1.10") > v("1.9"));
    }

    #[test]
    fn test_predicate_deserialize_map_form() {
        let value = json!({
            "all": [
                {"path_exists": ".eslintrc*"},
                {"not": {"path_exists": "biome.json"}},
                {"version_less_than": {"tool": "biome", "version": "2.0.0"}}
            ]
        });
        let predicate: Predicate = serde_json::from_value(value).unwrap();
        assert_eq!(
            predicate,
            Predicate::All(vec![
                Predicate::path_exists(".eslintrc*"),
                Predicate::not(Predicate::path_exists("biome.json")),
                Predicate::version_less_than("biome", "2.0.0"),
            ])
        );
    }

    #[test]
    fn test_predicate_and_alias() {
        let value = json!({"and": [{"path_exists": "a"}]});
        let predicate: Predicate = serde_json::from_value(value).unwrap();
        assert!(matches!(predicate, Predicate::All(_)));
    }

    #[test]
    fn test_unknown_leaf_rejected() {
        let value = json!({"shell_command": "grep -r foo ."});
        assert!(serde_json::from_value::<Predicate>(value).is_err());
    }

    #[test]
    fn test_check_shape() {
        assert!(Predicate::All(vec![]).check_shape().is_err());
        assert!(Predicate::config_key_equals("biome.json", "linter", json!(true))
            .check_shape()
            .is_err());
        assert!(Predicate::version_at_least("next", "latest")
            .check_shape()
            .is_err());
        assert!(Predicate::config_key_equals("biome.json", "", json!({}))
            .check_shape()
            .is_ok());
    }

    #[test]
    fn test_referenced_paths_and_tools() {
        let predicate = Predicate::Any(vec![
            Predicate::path_exists("Dockerfile"),
            Predicate::not(Predicate::regex_present("Dockerfile", "FROM")),
            Predicate::version_at_least("node", "20"),
        ]);
        assert_eq!(predicate.referenced_paths(), vec!["Dockerfile", "Dockerfile"]);
        assert_eq!(predicate.referenced_tools(), vec!["node"]);
    }
}
