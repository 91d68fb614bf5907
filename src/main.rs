//! confaudit CLI - Configuration Audit Engine
//!
//! Audits project tool configuration against declarative domain packs.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use confaudit::catalog::DomainPack;
use confaudit::config::Config;
use confaudit::decision::Intent;
use confaudit::engine::{combined_exit_code, merge_timings, Auditor, EXIT_FATAL};
use confaudit::evaluator::format_timings;
use confaudit::output::{formatter, OutputFormat};
use confaudit::packs::{self, PackSet};
use confaudit::rule::DetectionRule;
use confaudit::severity::Severity;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "confaudit",
    version,
    about = "Configuration Audit Engine",
    long_about = "Audits linter, test runner, framework, container and language tooling \
                  configuration against declarative rule packs."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit one or more project roots
    Audit(AuditArgs),

    /// List rules of the loaded packs
    ListRules {
        /// Only list rules of this domain
        #[arg(long)]
        domain: Option<String>,

        /// Additional pack files
        #[arg(long = "catalog")]
        catalogs: Vec<PathBuf>,
    },

    /// Show details for one rule
    Explain {
        /// Rule ID, optionally qualified as domain/rule
        rule_id: String,

        /// Additional pack files
        #[arg(long = "catalog")]
        catalogs: Vec<PathBuf>,
    },

    /// List loaded domain packs
    Packs {
        /// Additional pack files
        #[arg(long = "catalog")]
        catalogs: Vec<PathBuf>,
    },
}

#[derive(clap::Args)]
struct AuditArgs {
    /// Project roots to audit
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Only audit these domains (comma-separated)
    #[arg(long, value_delimiter = ',')]
    domain: Vec<String>,

    /// Additional pack files
    #[arg(long = "catalog")]
    catalogs: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Minimum severity to report
    #[arg(long, value_enum)]
    severity_min: Option<MinSeverity>,

    /// Treat the project as newly created
    #[arg(long, conflicts_with = "existing_project")]
    new_project: bool,

    /// Treat the project as an existing one
    #[arg(long)]
    existing_project: bool,

    /// Answer an intent question (key=true|false)
    #[arg(long = "intent", value_parser = parse_intent)]
    intents: Vec<(String, bool)>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Show per-rule timing statistics
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Markdown,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::Markdown => OutputFormat::Markdown,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MinSeverity {
    Critical,
    Important,
    #[value(name = "niceToHave", alias = "nice-to-have")]
    NiceToHave,
    Strength,
}

impl From<MinSeverity> for Severity {
    fn from(s: MinSeverity) -> Self {
        match s {
            MinSeverity::Critical => Severity::Critical,
            MinSeverity::Important => Severity::Important,
            MinSeverity::NiceToHave => Severity::NiceToHave,
            MinSeverity::Strength => Severity::Strength,
        }
    }
}

fn parse_intent(raw: &str) -> Result<(String, bool), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=bool, got '{}'", raw))?;
    let value = match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        other => return Err(format!("'{}' is not a boolean", other)),
    };
    Ok((key.trim().to_string(), value))
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Audit(args) => run_audit_command(args),
        Commands::ListRules { domain, catalogs } => load_config(None)
            .and_then(|config| list_rules(&init_logging(config), &catalogs, domain.as_deref())),
        Commands::Explain { rule_id, catalogs } => load_config(None)
            .and_then(|config| explain_rule(&init_logging(config), &catalogs, &rule_id)),
        Commands::Packs { catalogs } => {
            load_config(None).and_then(|config| list_packs(&init_logging(config), &catalogs))
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

/// Log filter for the configured verbosity; `RUST_LOG` still wins
fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

/// Start logging once the effective configuration is known
fn init_logging(config: Config) -> Config {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(config.output.verbose)),
    )
    .init();
    config
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Config::load_default().context("Failed to load config"),
    }
}

fn load_packs(config: &Config, catalogs: &[PathBuf]) -> anyhow::Result<PackSet> {
    let mut set = PackSet::new();
    if config.packs.builtin {
        set = set.with_builtin().context("Failed to load bundled packs")?;
    }

    let mut search_paths = config.packs.search_paths.clone();
    for path in packs::default_search_paths() {
        if !search_paths.contains(&path) {
            search_paths.push(path);
        }
    }
    set = set
        .with_search_paths(&search_paths)
        .context("Failed to load discovered packs")?;
    set.with_files(catalogs).context("Failed to load catalog")
}

fn run_audit_command(args: AuditArgs) -> anyhow::Result<i32> {
    let mut config = load_config(args.config.as_ref())?;
    config.merge_cli(
        args.format.map(Into::into),
        args.severity_min.map(Into::into),
        args.verbose.then_some(true),
        args.jobs,
        args.no_color,
    );
    let config = init_logging(config);
    if args.no_color {
        colored::control::set_override(false);
    }

    let pack_set = load_packs(&config, &args.catalogs)?;
    for domain in &args.domain {
        if pack_set.get(domain).is_none() {
            bail!(
                "Unknown domain '{}' (available: {})",
                domain,
                pack_set.domains().join(", ")
            );
        }
    }

    let mut intent = Intent::new();
    if let Some(new_project) = config.intent.new_project {
        intent = intent.new_project(new_project);
    }
    for (key, value) in &config.intent.flags {
        intent = intent.with_flag(key, *value);
    }
    if args.new_project {
        intent = intent.new_project(true);
    } else if args.existing_project {
        intent = intent.new_project(false);
    }
    for (key, value) in &args.intents {
        intent = intent.with_flag(key, *value);
    }
    for domain in &args.domain {
        intent = intent.request(domain);
    }

    let use_color = config.use_color(std::io::stdout().is_terminal());
    let format = config.output.format;
    let timing = args.timing || config.output.timing;

    let auditor = Auditor::new(pack_set.into_packs())
        .with_config(config)
        .with_intent(intent);
    let results = auditor.audit_many(&args.paths);

    let output = formatter(format, use_color);
    let mut documents = Vec::new();
    for (root, result) in &results {
        match result {
            Ok(report) => {
                let rendered = output
                    .format(report)
                    .with_context(|| format!("Failed to render report for {}", root.display()))?;
                documents.push(rendered);
            }
            Err(e) => {
                eprintln!("{}: {}: {}", "error".red().bold(), root.display(), e);
            }
        }
    }

    if format == OutputFormat::Json && documents.len() > 1 {
        let values = documents
            .iter()
            .map(|doc| serde_json::from_str::<serde_json::Value>(doc))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to combine JSON reports")?;
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        for doc in &documents {
            println!("{}", doc.trim_end());
        }
    }

    if timing {
        let reports = results.iter().filter_map(|(_, r)| r.as_ref().ok());
        eprintln!("\n{}", format_timings(&merge_timings(reports)));
    }

    Ok(combined_exit_code(results.iter().map(|(_, r)| r)))
}

fn list_rules(config: &Config, catalogs: &[PathBuf], domain: Option<&str>) -> anyhow::Result<i32> {
    let pack_set = load_packs(config, catalogs)?;
    let packs: Vec<&DomainPack> = match domain {
        Some(name) => match pack_set.get(name) {
            Some(pack) => vec![pack],
            None => bail!("Unknown domain '{}'", name),
        },
        None => pack_set.domains().iter().filter_map(|d| pack_set.get(d)).collect(),
    };

    println!(
        "{:<12} {:<34} {:<12} {}",
        "DOMAIN".bold(),
        "ID".bold(),
        "SEVERITY".bold(),
        "MESSAGE".bold()
    );
    println!("{}", "-".repeat(100));

    let mut count = 0;
    for pack in packs {
        for rule in pack.catalog.rules() {
            print_rule(pack.domain(), rule);
            count += 1;
        }
    }

    println!();
    println!("Total: {} rules", count);
    Ok(0)
}

fn print_rule(domain: &str, rule: &DetectionRule) {
    let severity = rule.severity.to_string();
    let severity_colored = match rule.severity {
        Severity::Critical => severity.red(),
        Severity::Important => severity.yellow(),
        Severity::NiceToHave => severity.blue(),
        Severity::Strength => severity.green(),
    };
    let message = if rule.message.len() > 48 {
        let cut = rule
            .message
            .char_indices()
            .take_while(|(i, _)| *i < 45)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &rule.message[..cut])
    } else {
        rule.message.clone()
    };

    println!(
        "{:<12} {:<34} {:<12} {}",
        domain,
        rule.id.cyan(),
        severity_colored,
        message
    );
}

fn explain_rule(config: &Config, catalogs: &[PathBuf], rule_id: &str) -> anyhow::Result<i32> {
    let pack_set = load_packs(config, catalogs)?;
    let (domain_filter, id) = match rule_id.split_once('/') {
        Some((domain, id)) => (Some(domain), id),
        None => (None, rule_id),
    };

    let mut found = Vec::new();
    for domain in pack_set.domains() {
        if domain_filter.is_some_and(|d| d != domain) {
            continue;
        }
        if let Some(rule) = pack_set.get(domain).and_then(|p| p.catalog.rule(id)) {
            found.push(rule);
        }
    }

    if found.is_empty() {
        bail!("Rule '{}' not found", rule_id);
    }

    for rule in found {
        println!("{}: {}", "Rule".bold(), rule.id.cyan());
        println!("{}: {}", "Domain".bold(), rule.domain);
        println!("{}: {}", "Severity".bold(), rule.severity);
        if let Some(name) = &rule.name {
            println!("{}: {}", "Name".bold(), name);
        }
        println!();
        println!("{}", "Message:".bold());
        println!("  {}", rule.message);
        if let Some(description) = &rule.description {
            println!();
            println!("{}", "Description:".bold());
            println!("  {}", description);
        }
        if !rule.remediation.is_empty() {
            println!();
            println!("{}", "Remediation:".bold());
            println!("  {}", rule.remediation);
        }
        println!();
        println!("{}", "Predicate:".bold());
        let predicate = serde_yaml::to_string(&rule.predicate)
            .context("Failed to serialize predicate")?;
        for line in predicate.lines() {
            println!("  {}", line);
        }
        if !rule.conflicts_with.is_empty() {
            println!();
            println!(
                "{}: {}",
                "Conflicts with".bold(),
                rule.conflicts_with.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        if !rule.supersedes.is_empty() {
            println!(
                "{}: {}",
                "Supersedes".bold(),
                rule.supersedes.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        if !rule.tags.is_empty() {
            println!("{}: {}", "Tags".bold(), rule.tags.join(", "));
        }
        if let Some(docs) = &rule.docs {
            println!("{}: {}", "Docs".bold(), docs);
        }
        println!();
    }
    Ok(0)
}

fn list_packs(config: &Config, catalogs: &[PathBuf]) -> anyhow::Result<i32> {
    let pack_set = load_packs(config, catalogs)?;
    println!("{}", "Domain packs:".bold());
    for domain in pack_set.domains() {
        if let Some(pack) = pack_set.get(domain) {
            let tree = if pack.decision.is_some() {
                "decision tree"
            } else {
                "no decision tree"
            };
            println!(
                "  {} v{} - {} rules, {}",
                domain.cyan(),
                pack.catalog.version(),
                pack.catalog.len(),
                tree
            );
            if !pack.catalog.description().is_empty() {
                println!("    {}", pack.catalog.description());
            }
        }
    }
    Ok(0)
}
