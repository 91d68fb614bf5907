//! Configuration for audit runs
//!
//! Reads configuration from:
//! - `--config <file>`
//! - `.auditrc.yaml` / `.auditrc.yml` / `.auditrc.json` in the working directory
//! - the same names in the home directory

use crate::collector::CollectorOptions;
use crate::output::OutputFormat;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file names, in lookup order
pub const CONFIG_NAMES: &[&str] = &[".auditrc.yaml", ".auditrc.yml", ".auditrc.json"];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Audit several roots in parallel
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,

    /// Per-signal read timeout in milliseconds
    pub signal_timeout_ms: u64,

    /// Files larger than this many bytes are reported unavailable
    pub max_file_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
            signal_timeout_ms: 2000,
            max_file_size: 1024 * 1024,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    pub color: ColorMode,

    /// Hide active findings below this severity
    pub severity_min: Option<Severity>,

    /// Verbose logging
    pub verbose: bool,

    /// Print per-rule timing
    pub timing: bool,
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// File handling settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Extra excludes on top of the built-in dependency and build directories
    pub exclude: Vec<String>,
}

/// Rule configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rule ids
    pub disabled: Vec<String>,

    /// Ignore rules by prefix (e.g., "docker-" ignores all docker-* rules)
    pub ignore: Vec<String>,

    /// Severity overrides (rule_id -> severity)
    pub severity: HashMap<String, Severity>,
}

/// Where extra domain packs are discovered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacksConfig {
    /// Directories scanned for `*.yaml`, `*.yml` and `*.json` packs
    pub search_paths: Vec<PathBuf>,

    /// Load the packs compiled into the binary
    pub builtin: bool,
}

impl Default for PacksConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from(".confaudit/packs")],
            builtin: true,
        }
    }
}

/// Default answers for decision-tree intent questions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    pub new_project: Option<bool>,
    pub flags: HashMap<String, bool>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Other configuration files to load first (relative to this file)
    pub extends: Vec<String>,

    pub engine: EngineConfig,

    pub output: OutputConfig,

    pub files: FilesConfig,

    pub rules: RulesConfig,

    pub packs: PacksConfig,

    pub intent: IntentConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_depth(path, 0)
    }

    /// Load with recursion depth limit (to prevent infinite loops)
    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };
        config.validate()?;

        if !config.extends.is_empty() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            let mut base_config = Self::default();

            for extend in &config.extends.clone() {
                let extend_path = if Path::new(extend).is_absolute() {
                    PathBuf::from(extend)
                } else {
                    base_dir.join(extend)
                };
                base_config.merge(Self::load_with_depth(&extend_path, depth + 1)?);
            }

            base_config.merge(config);
            config = base_config;
        }

        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.signal_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.signal_timeout_ms must be positive".to_string(),
            ));
        }
        if self.engine.max_file_size == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_file_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        let defaults = EngineConfig::default();
        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        self.engine.parallel = other.engine.parallel;
        if other.engine.signal_timeout_ms != defaults.signal_timeout_ms {
            self.engine.signal_timeout_ms = other.engine.signal_timeout_ms;
        }
        if other.engine.max_file_size != defaults.max_file_size {
            self.engine.max_file_size = other.engine.max_file_size;
        }

        if other.output.format != OutputFormat::Text {
            self.output.format = other.output.format;
        }
        if other.output.color != ColorMode::Auto {
            self.output.color = other.output.color;
        }
        if other.output.severity_min.is_some() {
            self.output.severity_min = other.output.severity_min;
        }
        self.output.verbose |= other.output.verbose;
        self.output.timing |= other.output.timing;

        self.files.exclude.extend(other.files.exclude);

        self.rules.disabled.extend(other.rules.disabled);
        self.rules.ignore.extend(other.rules.ignore);
        self.rules.severity.extend(other.rules.severity);

        for path in other.packs.search_paths {
            if !self.packs.search_paths.contains(&path) {
                self.packs.search_paths.push(path);
            }
        }
        self.packs.builtin = other.packs.builtin;

        if other.intent.new_project.is_some() {
            self.intent.new_project = other.intent.new_project;
        }
        self.intent.flags.extend(other.intent.flags);
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        for name in CONFIG_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            for name in CONFIG_NAMES {
                let path = home.join(name);
                if path.exists() {
                    return Self::load(&path);
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        format: Option<OutputFormat>,
        severity_min: Option<Severity>,
        verbose: Option<bool>,
        jobs: Option<usize>,
        no_color: bool,
    ) {
        if let Some(f) = format {
            self.output.format = f;
        }
        if let Some(min) = severity_min {
            self.output.severity_min = Some(min);
        }
        if let Some(v) = verbose {
            self.output.verbose = v;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
        }
        if no_color {
            self.output.color = ColorMode::Never;
        }
    }

    /// Check if a rule is enabled
    pub fn is_rule_enabled(&self, rule_id: &str) -> bool {
        if self.rules.disabled.iter().any(|d| d == rule_id) {
            return false;
        }

        // Prefixes match case-insensitively
        let rule_lower = rule_id.to_lowercase();
        !self
            .rules
            .ignore
            .iter()
            .any(|prefix| rule_lower.starts_with(&prefix.to_lowercase()))
    }

    /// Get severity override for a rule
    pub fn get_severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.rules.severity.get(rule_id).copied()
    }

    /// Number of worker threads for multi-root runs
    pub fn worker_count(&self) -> usize {
        if !self.engine.parallel {
            1
        } else if self.engine.jobs > 0 {
            self.engine.jobs
        } else {
            num_cpus::get()
        }
    }

    /// Whether terminal output should be colored
    pub fn use_color(&self, is_terminal: bool) -> bool {
        match self.output.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => is_terminal,
        }
    }

    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            signal_timeout: Duration::from_millis(self.engine.signal_timeout_ms),
            max_file_size: self.engine.max_file_size,
            exclude: self.files.exclude.clone(),
        }
    }
}
