#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn nwave(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nwave-copilot").unwrap();
    cmd.current_dir(dir.path())
        .env("NWAVE_ROOT", dir.path())
        .env("HOME", dir.path().join("home"))
        .env("DES_AUDIT_LOG_DIR", dir.path().join("audit"))
        .env_remove("NWAVE_FRAMEWORK_DIR")
        .env_remove("DES_TDD_SCHEMA_PATH");
    cmd
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// A minimal nWave framework tree under `<dir>/framework`.
fn framework(dir: &TempDir) -> std::path::PathBuf {
    let root = dir.path().join("framework");
    write(
        &root.join("nWave/agents/nw-software-crafter.md"),
        "---\nname: nw-software-crafter\ndescription: Builds things\nmodel: inherit\ntools: Read, Bash, AskUserQuestion\n---\nAsk with AskUserQuestion.\n",
    );
    write(&root.join("nWave/skills/software-crafter/tdd-methodology.md"), "# TDD\n");
    write(
        &root.join("nWave/tasks/nw/deliver.md"),
        "---\ndescription: Deliver a feature\nargument-hint: '[feature]'\n---\n# Deliver\n",
    );
    root
}

const FULL_CYCLE: &[&str] = &["PREPARE", "RED_ACCEPTANCE", "RED_UNIT", "GREEN", "COMMIT"];

const ROADMAP: &str = r#"
roadmap:
  project_id: auth
  created_at: "2026-02-02T10:00:00Z"
  total_steps: 2
  phases: 1
phases:
  - id: "01"
    name: Foundation
    steps:
      - {id: "01-01", name: Token model, criteria: tokens expire}
      - {id: "01-02", name: Token store, criteria: persisted, deps: ["01-01"]}
implementation_scope:
  source_directories: [src/auth/]
"#;

fn feature_dir(dir: &TempDir) -> std::path::PathBuf {
    let feature = dir.path().join("docs/feature/auth");
    write(
        &feature.join("execution-log.yaml"),
        "project_id: auth\nschema_version: '3.0'\nevents: []\n",
    );
    feature
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

#[test]
fn version_prints_binary_version() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("nwave-copilot "));
}

// ---------------------------------------------------------------------------
// install / uninstall
// ---------------------------------------------------------------------------

#[test]
fn install_converts_agents_and_skills() {
    let dir = TempDir::new().unwrap();
    let source = framework(&dir);
    nwave(&dir)
        .args(["install", "--source"])
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ agents: Agents installed (1 files)"))
        .stdout(predicate::str::contains("✓ skills: Skills installed (1 files)"));

    let agent = std::fs::read_to_string(
        dir.path().join("home/.copilot/agents/nw-software-crafter.agent.md"),
    )
    .unwrap();
    assert!(agent.contains("tools:\n  - read\n  - execute\n"));
    assert!(agent.contains("Ask with conversational questioning."));
    assert!(!agent.contains("model:"));
    assert!(dir
        .path()
        .join("home/.copilot/skills/nw-tdd-methodology/SKILL.md")
        .is_file());

    nwave(&dir)
        .arg("uninstall")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 agent files"))
        .stdout(predicate::str::contains("Removed 1 skill directories"));
    assert!(!dir
        .path()
        .join("home/.copilot/agents/nw-software-crafter.agent.md")
        .exists());
}

#[test]
fn install_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let source = framework(&dir);
    nwave(&dir)
        .args(["install", "--dry-run", "--source"])
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN] nwave-copilot install"));
    assert!(!dir.path().join("home/.copilot").exists());
}

#[test]
fn install_without_framework_fails() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["install", "--source"])
        .arg(dir.path().join("nowhere"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nWave framework source not found"));
}

// ---------------------------------------------------------------------------
// init / deinit / status
// ---------------------------------------------------------------------------

#[test]
fn init_writes_hooks_and_prompts() {
    let dir = TempDir::new().unwrap();
    let source = framework(&dir);
    nwave(&dir)
        .args(["init", "--program", "nwave-copilot", "--source"])
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ hooks: Hook configs written (3 files)"))
        .stdout(predicate::str::contains("✓ prompts: Prompt files written (1 files)"));

    let pre: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(".github/hooks/nw-pre-tool-use.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        pre["hooks"]["preToolUse"][0]["command"],
        "nwave-copilot hook --protocol copilot pre-tool-use"
    );
    let prompt =
        std::fs::read_to_string(dir.path().join(".github/prompts/nw-deliver.prompt.md")).unwrap();
    assert_eq!(prompt, "---\ndescription: Deliver a feature\n---\n# Deliver\n");

    nwave(&dir)
        .arg("deinit")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 3 hook config files"))
        .stdout(predicate::str::contains("Removed 1 prompt files"));
    assert!(!dir.path().join(".github/hooks/nw-pre-tool-use.json").exists());
}

#[test]
fn status_reports_missing_components() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("✗ agents"))
        .stderr(predicate::str::contains("✗ hooks"));
}

#[test]
fn init_json_lists_written_files() {
    let dir = TempDir::new().unwrap();
    let source = framework(&dir);
    let out = nwave(&dir)
        .args(["--json", "init", "--dry-run", "--source"])
        .arg(&source)
        .output()
        .unwrap();
    assert!(out.status.success());
    let body: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["plugins"][0]["plugin"], "hooks");
    assert_eq!(body["plugins"][0]["files"].as_array().unwrap().len(), 3);
    assert!(!dir.path().join(".github").exists());
}

// ---------------------------------------------------------------------------
// build-plugin
// ---------------------------------------------------------------------------

#[test]
fn build_plugin_writes_manifest() {
    let dir = TempDir::new().unwrap();
    let source = framework(&dir);
    let out = dir.path().join("dist");
    nwave(&dir)
        .args(["build-plugin", "--source"])
        .arg(&source)
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 agents written"));

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("plugin.json")).unwrap()).unwrap();
    assert_eq!(manifest["name"], "nwave");
    assert_eq!(manifest["agents"], "agents/");
    assert!(out.join("hooks.json").is_file());
    assert!(out.join("agents/nw-software-crafter.agent.md").is_file());
}

// ---------------------------------------------------------------------------
// hook
// ---------------------------------------------------------------------------

#[test]
fn claude_hook_allows_empty_input() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["hook", "--protocol", "claude", "pre-tool-use"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""decision":"allow""#));
}

#[test]
fn claude_hook_rejects_unknown_action() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["hook", "--protocol", "claude", "frobnicate"])
        .write_stdin("{}")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unknown command: frobnicate"));
}

#[test]
fn copilot_hook_approves_empty_input() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["hook", "--protocol", "copilot", "pre-tool-use"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""permissionDecision":"approve""#));
}

#[test]
fn copilot_hook_unknown_action_uses_stderr() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["hook", "--protocol", "copilot", "pre-write"])
        .write_stdin("{}")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown command: pre-write"));
}

// ---------------------------------------------------------------------------
// log-phase
// ---------------------------------------------------------------------------

#[test]
fn log_phase_appends_event() {
    let dir = TempDir::new().unwrap();
    let feature = feature_dir(&dir);
    nwave(&dir)
        .args(["log-phase", "--project-dir"])
        .arg(&feature)
        .args([
            "--step-id", "01-01", "--phase", "PREPARE", "--status", "EXECUTED", "--data", "PASS",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "sid=01-01 p=PREPARE s=EXECUTED d=PASS t=",
        ));

    let log = std::fs::read_to_string(feature.join("execution-log.yaml")).unwrap();
    assert!(log.contains("PREPARE"));
}

#[test]
fn log_phase_rejects_unknown_phase() {
    let dir = TempDir::new().unwrap();
    let feature = feature_dir(&dir);
    nwave(&dir)
        .args(["log-phase", "--project-dir"])
        .arg(&feature)
        .args([
            "--step-id", "01-01", "--phase", "REFACTOR", "--status", "EXECUTED", "--data", "PASS",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown phase 'REFACTOR'"));
}

#[test]
fn log_phase_requires_existing_log() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["log-phase", "--project-dir"])
        .arg(dir.path().join("docs/feature/none"))
        .args([
            "--step-id", "01-01", "--phase", "PREPARE", "--status", "EXECUTED", "--data", "PASS",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Execution log not found"));
}

// ---------------------------------------------------------------------------
// roadmap
// ---------------------------------------------------------------------------

#[test]
fn roadmap_init_then_validate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roadmap.yaml");
    nwave(&dir)
        .args(["roadmap", "init", "--project-id", "auth", "--steps", "01:2,02:1", "--output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Roadmap skeleton written to"));

    nwave(&dir)
        .args(["roadmap", "validate"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("VALID: 2 phases, 3 steps"));
}

#[test]
fn roadmap_init_rejects_bad_steps_spec() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["roadmap", "init", "--project-id", "auth", "--steps", "01-2"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid steps spec"));
}

#[test]
fn roadmap_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roadmap.yaml");
    write(&path, "phases:\n  - id: '1'\n    steps: []\n");
    nwave(&dir)
        .args(["roadmap", "validate"])
        .arg(&path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("INVALID:"))
        .stdout(predicate::str::contains("ERROR [MISSING_REQUIRED_FIELD]"));
}

#[test]
fn roadmap_validate_missing_file_exits_two() {
    let dir = TempDir::new().unwrap();
    nwave(&dir)
        .args(["roadmap", "validate", "missing.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("file not found"));
}

// ---------------------------------------------------------------------------
// verify-deliver
// ---------------------------------------------------------------------------

#[test]
fn verify_deliver_passes_complete_traces() {
    let dir = TempDir::new().unwrap();
    let feature = feature_dir(&dir);
    write(&feature.join("roadmap.yaml"), ROADMAP);
    for step in ["01-01", "01-02"] {
        for &phase in FULL_CYCLE {
            nwave(&dir)
                .args(["log-phase", "--project-dir"])
                .arg(&feature)
                .args(["--step-id", step, "--phase", phase, "--status", "EXECUTED", "--data", "PASS"])
                .assert()
                .success();
        }
    }
    nwave(&dir)
        .arg("verify-deliver")
        .arg(&feature)
        .assert()
        .success()
        .stdout(predicate::str::contains("All 2 steps have complete DES traces"));
}

#[test]
fn verify_deliver_reports_untraced_steps() {
    let dir = TempDir::new().unwrap();
    let feature = feature_dir(&dir);
    write(&feature.join("roadmap.yaml"), ROADMAP);
    nwave(&dir)
        .arg("verify-deliver")
        .arg(&feature)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("INTEGRITY VIOLATIONS"))
        .stdout(predicate::str::contains("01-02"));
}

#[test]
fn verify_deliver_missing_roadmap_exits_two() {
    let dir = TempDir::new().unwrap();
    let feature = feature_dir(&dir);
    nwave(&dir)
        .arg("verify-deliver")
        .arg(&feature)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("roadmap.yaml not found"));
}
