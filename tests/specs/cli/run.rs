// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use assert_cmd::Command;

/// Build a command with isolated state and lock directories.
fn polka(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("polka").unwrap();
    cmd.env("POLKA_STATE_DIR", dir.path().join("state"))
        .env("POLKA_LOCK_DIR", dir.path().join("locks"))
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn no_mode_flag_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    polka(&dir).assert().failure().code(2);
}

#[test]
fn goal_and_continuous_conflict() {
    let dir = tempfile::tempdir().unwrap();
    polka(&dir).args(["--goal", "x", "--continuous"]).assert().failure().code(2);
}

#[test]
fn unknown_approval_level_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    polka(&dir)
        .args(["--goal", "x", "--approval", "everything"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn missing_workflow_command_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    polka(&dir).args(["--goal", "do things"]).assert().failure().code(2);
}

#[test]
fn invalid_config_file_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("polka.toml");
    std::fs::write(&config, "no_such_key = true\n").unwrap();

    polka(&dir)
        .args(["--goal", "x", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .code(2);
}

#[test]
fn oversized_session_id_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    polka(&dir)
        .args(["--goal", "x", "--workflow-cmd", "true", "--session-id"])
        .arg("x".repeat(60))
        .assert()
        .failure()
        .code(2);
}

#[test]
fn goal_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();

    // The workflow command serves the decomposition for `plan` and reports
    // success for everything else.
    let plan_payload = serde_json::json!({
        "requirements": ["make it pass"],
        "highLevelPlan": "one task",
        "tasks": [{
            "title": "Touch things up",
            "type": "docs",
            "priority": "low",
            "complexity": "low",
            "estimatedTime": 5,
        }],
    });
    std::fs::write(dir.path().join("plan.json"), plan_payload.to_string()).unwrap();
    let workflow_cmd = format!(
        "if [ \"$POLKA_WORKFLOW\" = plan ]; then cat {}; else echo '{{}}'; fi",
        dir.path().join("plan.json").display()
    );

    polka(&dir)
        .args(["--goal", "polish the docs", "--approval", "none", "--auto-approve-safe"])
        .arg("--project-dir")
        .arg(&project)
        .arg("--workflow-cmd")
        .arg(&workflow_cmd)
        .assert()
        .success();

    // State was persisted and the machine came back to idle.
    let state_text =
        std::fs::read_to_string(dir.path().join("state").join("state.json")).unwrap();
    let state: serde_json::Value = serde_json::from_str(&state_text).unwrap();
    assert_eq!(state["mode"], "idle");
    assert_eq!(state["completed_tasks"].as_array().unwrap().len(), 1);

    // Orderly exit removed the lockfile.
    let locks: Vec<_> = std::fs::read_dir(dir.path().join("locks"))
        .map(|entries| entries.flatten().collect())
        .unwrap_or_default();
    assert!(locks.is_empty(), "lockfile should be removed on orderly exit");
}

#[test]
fn goal_run_writes_working_space_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    let working = dir.path().join("working");
    std::fs::create_dir_all(&project).unwrap();

    let plan_payload = serde_json::json!({
        "requirements": ["r"],
        "highLevelPlan": "p",
        "tasks": [{
            "title": "Mirrored work",
            "type": "docs",
            "priority": "low",
            "complexity": "low",
            "estimatedTime": 5,
        }],
    });
    std::fs::write(dir.path().join("plan.json"), plan_payload.to_string()).unwrap();
    let workflow_cmd = format!(
        "if [ \"$POLKA_WORKFLOW\" = plan ]; then cat {}; else echo '{{}}'; fi",
        dir.path().join("plan.json").display()
    );

    polka(&dir)
        .args(["--goal", "mirror me", "--approval", "none", "--auto-approve-safe"])
        .arg("--project-dir")
        .arg(&project)
        .arg("--working-dir")
        .arg(&working)
        .arg("--workflow-cmd")
        .arg(&workflow_cmd)
        .assert()
        .success();

    assert!(working.join("plans").join("mirror-me.md").exists());
    let completed: Vec<_> =
        std::fs::read_dir(working.join("tasks/completed")).unwrap().flatten().collect();
    assert_eq!(completed.len(), 1);
}
