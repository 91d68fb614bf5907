//! Integration tests for confaudit

use confaudit::{
    collector::ProjectStateCollector,
    config::Config,
    engine::{combined_exit_code, run_audit, AuditError, Auditor, EXIT_FATAL},
    evaluator::RuleEvaluator,
    finding::FindingStatus,
    output::{formatter, render, OutputFormat},
    packs, AuditReport, DomainPack, Intent, Severity,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

fn builtin(domain: &str) -> DomainPack {
    packs::builtin(domain).unwrap().unwrap()
}

fn project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (path, content) in files {
        let full = temp.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
    temp
}

fn audit(root: &Path, domain: &str) -> AuditReport {
    run_audit(root, &[builtin(domain)], &Intent::new()).unwrap()
}

fn active_ids(report: &AuditReport) -> Vec<&str> {
    report.findings.iter().map(|f| f.rule_id.as_str()).collect()
}

#[test]
fn test_eslint_only_project_recommends_biome() {
    let temp = project(&[(".eslintrc.json", r#"{ "extends": "eslint:recommended" }"#)]);
    let report = audit(temp.path(), "biome");

    assert_eq!(active_ids(&report), vec!["recommend-biome-migration"]);
    assert_eq!(report.findings[0].severity, Severity::Important);
    assert_eq!(
        report.findings[0].message,
        "ESLint configuration .eslintrc.json found without Biome"
    );
    assert_eq!(report.domains[0].leaf, "adoption");
    assert!(!report
        .inactive
        .iter()
        .any(|f| f.rule_id == "biome-version-pin"));
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_version_pin_indeterminate_without_biome_json() {
    // Full catalog, no decision tree narrowing
    let pack = builtin("biome");
    let temp = project(&[(".eslintrc.json", "{}")]);

    let signal = ProjectStateCollector::default()
        .collect(temp.path(), std::slice::from_ref(&pack.catalog))
        .unwrap();
    let evaluation = RuleEvaluator::new().evaluate(&pack.catalog, &signal);

    let fired: Vec<&str> = evaluation.findings.iter().map(|f| f.rule_id.as_str()).collect();
    assert_eq!(fired, vec!["recommend-biome-migration"]);
    assert!(evaluation.skipped.is_empty());
}

#[test]
fn test_unsafe_fix_remediation_cites_pointer() {
    let temp = project(&[(
        "biome.json",
        r#"{
  "$schema": "https://biomejs.dev/schemas/2.1.0/schema.json",
  "linter": {
    "rules": {
      "correctness": {
        "noUnusedImports": { "level": "error", "fix": "unsafe" }
      }
    }
  }
}
"#,
    )]);
    let report = audit(temp.path(), "biome");

    assert_eq!(active_ids(&report), vec!["unsafe-fix-not-promoted"]);
    let finding = &report.findings[0];
    assert_eq!(finding.severity, Severity::NiceToHave);
    assert_eq!(
        finding.remediation,
        "Set /linter/rules/correctness/noUnusedImports/fix to \"safe\" in biome.json"
    );
    assert!(finding.message.starts_with("noUnusedImports fix is unsafe"));
    assert_eq!(report.domains[0].leaf, "configured");
}

#[test]
fn test_safe_fix_is_not_reported() {
    let temp = project(&[(
        "biome.json",
        r#"{
  "$schema": "https://biomejs.dev/schemas/2.1.0/schema.json",
  "linter": {
    "rules": {
      "recommended": true,
      "correctness": { "noUnusedImports": { "level": "error", "fix": "safe" } }
    }
  }
}
"#,
    )]);
    let report = audit(temp.path(), "biome");

    assert_eq!(active_ids(&report), vec!["biome-recommended-rules"]);
    assert_eq!(report.findings[0].severity, Severity::Strength);
}

#[test]
fn test_unpinned_base_image_is_critical() {
    let temp = project(&[("Dockerfile", "FROM node:latest\nCMD [\"node\", \"index.js\"]\n")]);
    let report = audit(temp.path(), "docker");

    assert_eq!(
        active_ids(&report),
        vec![
            "unpinned-base-image",
            "missing-dockerignore",
            "runs-as-root",
            "missing-healthcheck",
        ]
    );
    let critical = &report.findings[0];
    assert_eq!(critical.severity, Severity::Critical);
    assert_eq!(critical.evidence[0].path.as_deref(), Some("Dockerfile"));
    assert_eq!(critical.evidence[0].line, Some(1));
    assert_eq!(report.exit_code(), 1);

    // The :latest rule conflicts with the unpinned rule and loses on severity
    let latest = report
        .inactive
        .iter()
        .find(|f| f.rule_id == "base-image-latest-tag")
        .unwrap();
    assert_eq!(latest.status, FindingStatus::Suppressed);
    assert_eq!(latest.resolved_by.as_deref(), Some("unpinned-base-image"));
}

#[test]
fn test_pinned_base_image_is_clean() {
    let temp = project(&[("Dockerfile", "FROM node:22-slim\nUSER node\n")]);
    let report = audit(temp.path(), "docker");

    assert_eq!(
        active_ids(&report),
        vec!["missing-dockerignore", "missing-healthcheck"]
    );
    assert!(report.inactive.is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_no_dockerfile_needed_disables_domain() {
    let temp = project(&[("README.md", "# app\n")]);
    let report = audit(temp.path(), "docker");

    assert!(report.domains[0].disabled);
    assert_eq!(report.domains[0].label, "No Dockerfile needed");
    assert!(report.findings.is_empty());
    assert!(report.inactive.is_empty());
}

#[test]
fn test_requested_docker_without_dockerfile() {
    let temp = project(&[("README.md", "# app\n")]);
    let intent = Intent::new().request("docker");
    let report = run_audit(temp.path(), &[builtin("docker")], &intent).unwrap();

    assert_eq!(report.domains[0].leaf, "fresh-install");
    assert_eq!(active_ids(&report), vec!["dockerfile-missing"]);
}

#[test]
fn test_proxy_rule_retained_over_middleware_warning() {
    let temp = project(&[(
        "middleware.ts",
        "export function middleware() {}\n",
    )]);
    let report = audit(temp.path(), "nextjs");

    assert!(active_ids(&report).contains(&"use-proxy-ts"));
    assert!(!active_ids(&report).contains(&"middleware-deprecated-warning"));

    let warning = report
        .inactive
        .iter()
        .find(|f| f.rule_id == "middleware-deprecated-warning")
        .unwrap();
    assert_eq!(warning.status, FindingStatus::Suppressed);
    assert_eq!(warning.resolved_by.as_deref(), Some("use-proxy-ts"));
    assert_eq!(
        report.findings[0].remediation,
        "Rename middleware.ts to proxy.ts and its exported `middleware` function to `proxy` \
         (`npx @next/codemod@canary middleware-to-proxy .`)"
    );
}

#[test]
fn test_unavailable_signal_never_fires() {
    let pack = DomainPack::parse(
        r#"
domain: settings
rules:
  - id: strict-disabled
    severity: critical
    predicate:
      not:
        config_key_equals:
          path: settings.json
          pointer: /strict
          value: true
    message: "strict mode is off"
  - id: settings-present
    severity: strength
    predicate:
      path_exists: settings.json
    message: "{path} found"
"#,
        "settings.yaml",
    )
    .unwrap();
    let temp = project(&[("settings.json", "{ \"strict\": ")]);

    let report = run_audit(temp.path(), &[pack], &Intent::new()).unwrap();

    assert_eq!(active_ids(&report), vec!["settings-present"]);
    assert_eq!(report.findings[0].message, "settings.json found");
    assert_eq!(report.unavailable_signals.len(), 1);
    assert_eq!(report.unavailable_signals[0].signal, "config settings.json");
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_unreadable_root_produces_no_report() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("does-not-exist");

    let err = run_audit(&missing, &[builtin("docker")], &Intent::new()).unwrap_err();
    assert!(matches!(err, AuditError::Collection(_)));
    assert_eq!(err.exit_code(), EXIT_FATAL);
}

#[test]
fn test_audit_is_deterministic() {
    let temp = project(&[
        ("Dockerfile", "FROM node:latest AS build\nFROM nginx\n"),
        ("compose.yaml", "version: \"3\"\nservices: {}\n"),
        ("middleware.ts", "export {}\n"),
        (".eslintrc.json", "{}"),
        ("package.json", r#"{ "devDependencies": { "vitest": "2.1.0" } }"#),
    ]);
    let packs = packs::builtin_packs().unwrap();

    let first = run_audit(temp.path(), &packs, &Intent::new()).unwrap();
    let second = run_audit(temp.path(), &packs, &Intent::new()).unwrap();

    let records = |report: &AuditReport| {
        serde_json::to_value((&report.domains, &report.findings, &report.inactive)).unwrap()
    };
    assert_eq!(records(&first), records(&second));
    assert_eq!(render(&first).unwrap().structured, render(&second).unwrap().structured);
}

#[test]
fn test_conflicting_findings_never_both_active() {
    let temp = project(&[
        ("Dockerfile", "FROM node:latest\n"),
        ("middleware.ts", "export {}\n"),
        ("src/middleware.ts", "export {}\n"),
    ]);
    let packs = packs::builtin_packs().unwrap();
    let report = run_audit(temp.path(), &packs, &Intent::new()).unwrap();

    for pack in &packs {
        for rule in pack.catalog.rules() {
            for other in &rule.conflicts_with {
                let both = report
                    .findings
                    .iter()
                    .filter(|f| f.domain == pack.domain())
                    .filter(|f| &f.rule_id == other || f.rule_id == rule.id)
                    .map(|f| f.rule_id.as_str())
                    .collect::<std::collections::BTreeSet<_>>();
                assert!(both.len() < 2, "{} and {} both active", rule.id, other);
            }
        }
    }
}

#[test]
fn test_severity_threshold_hides_findings() {
    let temp = project(&[("Dockerfile", "FROM node:latest\n")]);
    let mut config = Config::default();
    config.output.severity_min = Some(Severity::Important);

    let report = Auditor::new(vec![builtin("docker")])
        .with_config(config)
        .audit(temp.path())
        .unwrap();

    assert!(report
        .findings
        .iter()
        .all(|f| f.severity >= Severity::Important));
    assert_eq!(report.summary.below_threshold, 1);
    assert_eq!(report.summary.critical, 1);
}

#[test]
fn test_json_output_and_combined_exit_code() {
    let latest = project(&[("Dockerfile", "FROM node:latest\n")]);
    let pinned = project(&[("Dockerfile", "FROM node:22-slim\n")]);
    let roots = vec![pinned.path().to_path_buf(), latest.path().to_path_buf()];

    let results = Auditor::new(vec![builtin("docker")]).audit_many(&roots);
    assert_eq!(combined_exit_code(results.iter().map(|(_, r)| r)), 1);

    let report = results[1].1.as_ref().unwrap();
    let json = formatter(OutputFormat::Json, false).format(report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["exitCode"], 1);
    assert_eq!(value["records"][0]["ruleId"], "unpinned-base-image");
    assert_eq!(value["records"][0]["severity"], "critical");
}

#[test]
fn test_markdown_report_sections() {
    let temp = project(&[("Dockerfile", "FROM node:latest\n")]);
    let report = audit(temp.path(), "docker");
    let rendered = render(&report).unwrap();

    let critical = rendered.human_text.find("Critical").unwrap();
    let important = rendered.human_text.find("Important").unwrap();
    assert!(critical < important);
    assert!(rendered.human_text.contains("unpinned-base-image"));
    assert_eq!(rendered.structured.as_array().unwrap().len(), report.findings.len());
}
