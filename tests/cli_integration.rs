//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

const WORKFLOW_FILE: &str = r#"
version: "1.0"
states: [To Do, Specified, Planned, In Implementation]
workflows:
  specify:
    command: /flow:specify
    agents: [product-requirements-manager]
    input_states: [To Do]
    output_state: Specified
  research:
    command: /flow:research
  plan:
    command: /flow:plan
    output_state: Planned
  implement:
    command: /flow:implement
    agents: [backend-engineer]
    output_state: In Implementation
custom_workflows:
  quick_build:
    name: Quick Build
    description: Lightweight path for small changes
    mode: vibing
    steps:
      - workflow: specify
      - workflow: research
        condition: "complexity >= 7"
      - workflow: implement
    rigor: &rigor
      log_decisions: true
      log_events: true
      backlog_integration: true
      memory_tracking: true
      follow_constitution: true
  reviewed_build:
    mode: spec-ing
    steps:
      - workflow: specify
      - workflow: plan
        checkpoint: "Approve the plan?"
      - workflow: implement
    rigor: *rigor
"#;

/// Get the binary to test, isolated from the caller's configuration.
fn flowspec(temp: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("flowspec").unwrap();
    cmd.current_dir(temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join("xdg"))
        .env_remove("FLOWSPEC_WORKFLOW_FILE")
        .env_remove("FLOWSPEC_LOGS_ROOT")
        .env_remove("RUST_LOG");
    cmd
}

/// Temp project with the default workflow file.
fn project() -> assert_fs::TempDir {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("flowspec_workflow.yml").write_str(WORKFLOW_FILE).unwrap();
    temp
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    let temp = assert_fs::TempDir::new().unwrap();
    flowspec(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Workflow orchestrator"));
}

#[test]
fn test_version_flag() {
    let temp = assert_fs::TempDir::new().unwrap();
    flowspec(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_completions_bash() {
    let temp = assert_fs::TempDir::new().unwrap();
    flowspec(&temp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("flowspec"));
}

// ============================================================================
// List & Validate Tests
// ============================================================================

#[test]
fn test_list_text() {
    let temp = project();
    flowspec(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("quick_build - Quick Build (vibing, 3 steps)"))
        .stdout(predicate::str::contains("reviewed_build"))
        .stdout(predicate::str::contains("Total: 2 custom workflows"));
}

#[test]
fn test_list_json() {
    let temp = project();
    let output = flowspec(&temp).args(["list", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<_> = listed.as_array().unwrap().iter().map(|w| w["name"].clone()).collect();
    assert_eq!(names, vec!["quick_build", "reviewed_build"]);
    assert_eq!(listed[1]["mode"], "spec-ing");
}

#[test]
fn test_validate_ok() {
    let temp = project();
    flowspec(&temp)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 custom workflows, 4 built-in workflows"));
}

#[test]
fn test_validate_missing_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    flowspec(&temp).arg("validate").assert().code(1).stderr(predicate::str::contains("IoError"));
}

#[test]
fn test_validate_rigor_violation() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("lax.yml")
        .write_str(&WORKFLOW_FILE.replace("log_decisions: true", "log_decisions: false"))
        .unwrap();

    flowspec(&temp)
        .args(["validate", "--file", "lax.yml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("RigorViolationError"))
        .stderr(predicate::str::contains("custom_workflows.quick_build.rigor.log_decisions"));
}

#[test]
fn test_workflow_file_from_env() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("defs/workflow.yml").write_str(WORKFLOW_FILE).unwrap();

    flowspec(&temp)
        .arg("validate")
        .env("FLOWSPEC_WORKFLOW_FILE", temp.path().join("defs/workflow.yml"))
        .assert()
        .success();
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_run_skips_false_condition() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=5", "--session", "cli-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"))
        .stdout(predicate::str::contains("Executed: 2, skipped: 1"));

    temp.child(".logs/decisions/session-cli-1.jsonl").assert(predicate::path::exists());
    temp.child(".logs/events/session-cli-1.jsonl")
        .assert(predicate::str::contains("workflow_completed"));
}

#[test]
fn test_run_json_output() {
    let temp = project();
    let output = flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=9", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["steps_executed"], 3);
    assert_eq!(result["success"], true);
}

#[test]
fn test_run_unbound_variable_exits_two() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "quick_build"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("UnboundVariableError"))
        .stderr(predicate::str::contains("research"));
}

#[test]
fn test_run_unknown_custom_workflow() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "nightly"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("NotFoundError"))
        .stderr(predicate::str::contains("quick_build"));
}

#[test]
fn test_run_rejects_bad_session_id() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=1", "--session", "../escape"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("InvalidSessionId"));
}

#[test]
fn test_run_refuses_reused_session() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=1", "--session", "dup"])
        .assert()
        .success();

    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=1", "--session", "dup"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SessionInUse"));
}

#[test]
fn test_run_logs_root_override() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=1", "--session", "s1", "--logs-root", "audit"])
        .assert()
        .success();

    temp.child("audit/events/session-s1.jsonl").assert(predicate::path::exists());
    temp.child(".logs").assert(predicate::path::missing());
}

// ============================================================================
// Checkpoint & Resume Tests
// ============================================================================

#[test]
fn test_checkpoint_halt_and_resume() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "reviewed_build", "--session", "review-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Approve the plan?"))
        .stdout(predicate::str::contains("flowspec resume review-1"));

    temp.child(".logs/sessions/session-review-1.json").assert(predicate::path::exists());

    flowspec(&temp)
        .args(["resume", "review-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Executed: 3, skipped: 0"));

    temp.child(".logs/sessions/session-review-1.json").assert(predicate::path::missing());
    temp.child(".logs/events/session-review-1.jsonl")
        .assert(predicate::str::contains("checkpoint_approved"));
}

#[test]
fn test_resume_unknown_session() {
    let temp = project();
    flowspec(&temp)
        .args(["resume", "nobody"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("SessionNotFound"));
}

// ============================================================================
// Log Command Tests
// ============================================================================

#[test]
fn test_log_prints_records() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=3", "--session", "audit-1"])
        .assert()
        .success();

    flowspec(&temp)
        .args(["log", "audit-1", "--kind", "decisions"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skip step research"))
        .stdout(predicate::str::contains("\"schema_version\":1"));
}

// ============================================================================
// Config & Executor Tests
// ============================================================================

#[test]
fn test_config_local_file() {
    let temp = project();
    temp.child(".flowspec.toml").write_str("[general]\nlogs_root = \"audit\"\n").unwrap();

    flowspec(&temp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("logs_root = \"audit\""));

    flowspec(&temp)
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".flowspec.toml"));
}

#[test]
fn test_exec_without_executor_command() {
    let temp = project();
    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=1", "--exec"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[executor]"));
}

#[cfg(unix)]
#[test]
fn test_exec_failure_halts_run() {
    let temp = project();
    temp.child(".flowspec.toml")
        .write_str("[executor]\ncommand = \"test {{ workflow }} != implement\"\n")
        .unwrap();

    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=9", "--exec", "--session", "exec-1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("DispatchFailure"));

    temp.child(".logs/events/session-exec-1.jsonl").assert(predicate::str::contains("step_failed"));
}

#[cfg(unix)]
#[test]
fn test_task_tracker_command() {
    let temp = project();
    temp.child(".flowspec.toml")
        .write_str("[tracker]\ncommand = \"echo {{ task_id }}={{ status }} >> tracker.log\"\n")
        .unwrap();

    flowspec(&temp)
        .args(["run", "quick_build", "-c", "complexity=1", "--task", "task-42"])
        .assert()
        .success();

    temp.child("tracker.log")
        .assert("task-42=Specified\ntask-42=In Implementation\n");
}
