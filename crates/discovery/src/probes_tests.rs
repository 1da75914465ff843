// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use polka_core::TaskStatus;

fn commands(typecheck: &str, build: &str, test: &str, lint: &str) -> ProbeCommands {
    ProbeCommands {
        typecheck: typecheck.to_string(),
        build: build.to_string(),
        test: test.to_string(),
        lint: lint.to_string(),
    }
}

fn prober<'a>(
    dir: &'a tempfile::TempDir,
    commands: &'a ProbeCommands,
    cancel: &'a CancellationToken,
) -> Prober<'a> {
    Prober { cwd: dir.path(), commands, cancel, now_ms: 1_000_000 }
}

#[tokio::test]
async fn typecheck_failure_emits_high_bugfix_and_skips_rest() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    // The build command would leave a marker; it must not run.
    let cmds = commands("echo 'error TS2322' >&2; exit 1", "touch build-ran", "true", "true");
    let p = prober(&dir, &cmds, &cancel);

    let outcome = p.build_errors().await.unwrap();
    assert!(outcome.skip_tests);
    assert_eq!(outcome.tasks.len(), 1);

    let task = &outcome.tasks[0];
    assert_eq!(task.task_type, TaskType::Bugfix);
    assert_eq!(task.priority, Priority::HIGH);
    assert_eq!(task.workflow, Workflow::Code);
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.description.contains("error TS2322"));
    assert!(!dir.path().join("build-ran").exists(), "build probe must be skipped");
}

#[tokio::test]
async fn build_failure_emits_critical_bugfix() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "echo 'link error' >&2; exit 2", "true", "true");
    let p = prober(&dir, &cmds, &cancel);

    let outcome = p.build_errors().await.unwrap();
    assert!(outcome.skip_tests);
    assert_eq!(outcome.tasks.len(), 1);
    assert_eq!(outcome.tasks[0].priority, Priority::CRITICAL);
    assert_eq!(outcome.tasks[0].task_type, TaskType::Bugfix);
}

#[tokio::test]
async fn clean_build_emits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    let p = prober(&dir, &cmds, &cancel);

    let outcome = p.build_errors().await.unwrap();
    assert!(outcome.tasks.is_empty());
    assert!(!outcome.skip_tests);
}

#[tokio::test]
async fn failing_tests_counts_markers_and_caps_estimate() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let test_cmd = "printf '✗ one\\n✗ two\\nFAIL suite\\nok fine\\n'; exit 1";
    let cmds = commands("true", "true", test_cmd, "true");
    let p = prober(&dir, &cmds, &cancel);

    let task = p.failing_tests().await.unwrap().unwrap();
    assert_eq!(task.priority, Priority::HIGH);
    // 3 marker lines → 30 minutes
    assert_eq!(task.estimated_time, 30);
    assert!(task.title.contains("3 failing"));
}

#[tokio::test]
async fn failing_tests_estimate_saturates_at_sixty() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let test_cmd = "for i in $(seq 1 20); do echo \"✗ case $i\"; done; exit 1";
    let cmds = commands("true", "true", test_cmd, "true");
    let p = prober(&dir, &cmds, &cancel);

    let task = p.failing_tests().await.unwrap().unwrap();
    assert_eq!(task.estimated_time, 60);
}

#[tokio::test]
async fn failing_tests_without_markers_still_counts_one() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "exit 1", "true");
    let p = prober(&dir, &cmds, &cancel);

    let task = p.failing_tests().await.unwrap().unwrap();
    assert_eq!(task.estimated_time, 10);
    assert!(task.title.contains("1 failing"));
}

#[tokio::test]
async fn passing_tests_emit_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    let p = prober(&dir, &cmds, &cancel);
    assert!(p.failing_tests().await.unwrap().is_none());
}

#[tokio::test]
async fn type_errors_counts_ts_occurrences() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmd = "printf 'a.ts(1,2): error TS2322\\nb.ts(3,4): error TS2551\\n'; exit 2";
    let cmds = commands(cmd, "true", "true", "true");
    let p = prober(&dir, &cmds, &cancel);

    let task = p.type_errors().await.unwrap().unwrap();
    assert_eq!(task.priority, Priority::HIGH);
    assert_eq!(task.estimated_time, 10); // 5 × 2
    assert!(task.title.contains("2 type error(s)"));
}

#[tokio::test]
async fn type_errors_estimate_saturates_at_forty_five() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmd = "for i in $(seq 1 20); do echo \"x.ts: error TS$i\"; done; exit 1";
    let cmds = commands(cmd, "true", "true", "true");
    let p = prober(&dir, &cmds, &cancel);

    let task = p.type_errors().await.unwrap().unwrap();
    assert_eq!(task.estimated_time, 45);
}

#[tokio::test]
async fn lint_extracts_unique_paths() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let lint_cmd = "printf 'src/app.tsx:1:1 warn\\nsrc/app.tsx:9:9 warn\\nlib/util.js:2:2 err\\n'; exit 1";
    let cmds = commands("true", "true", "true", lint_cmd);
    let p = prober(&dir, &cmds, &cancel);

    let task = p.lint_issues().await.unwrap().unwrap();
    assert_eq!(task.priority, Priority::LOW);
    assert_eq!(task.task_type, TaskType::Refactor);
    assert_eq!(task.files.len(), 2);
    assert!(task.files.contains(&PathBuf::from("src/app.tsx")));
    assert!(task.files.contains(&PathBuf::from("lib/util.js")));
    assert_eq!(task.estimated_time, 4); // 2 × 2 files
}

#[tokio::test]
async fn lint_failure_without_paths_estimates_zero() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "echo 'lint blew up'; exit 1");
    let p = prober(&dir, &cmds, &cancel);

    let task = p.lint_issues().await.unwrap().unwrap();
    assert!(task.files.is_empty());
    assert_eq!(task.estimated_time, 0);
}

#[tokio::test]
async fn clean_lint_emits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    let p = prober(&dir, &cmds, &cancel);
    assert!(p.lint_issues().await.unwrap().is_none());
}

fn write_source(dir: &tempfile::TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn security_flags_secrets_as_critical() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    write_source(&dir, "src/config.ts", "const apiKey = \"sk_live_abcdef123456\";\n");
    write_source(&dir, "src/clean.ts", "export const x = 1;\n");

    let p = prober(&dir, &cmds, &cancel);
    let tasks = p.security();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].priority, Priority::CRITICAL);
    assert_eq!(tasks[0].task_type, TaskType::Security);
    assert_eq!(tasks[0].files.len(), 1);
}

#[tokio::test]
async fn security_flags_eval_as_high() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    write_source(&dir, "src/danger.js", "eval(userInput);\n");

    let p = prober(&dir, &cmds, &cancel);
    let tasks = p.security();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].priority, Priority::HIGH);
}

#[tokio::test]
async fn security_skips_vendored_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    write_source(&dir, "node_modules/dep/index.js", "eval(x); password = \"hunter2hunter2\"\n");

    let p = prober(&dir, &cmds, &cancel);
    assert!(p.security().is_empty());
}

#[tokio::test]
async fn test_coverage_flags_long_untested_files() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");

    let long_body = "const x = 1;\n".repeat(60);
    write_source(&dir, "src/covered.ts", &long_body);
    write_source(&dir, "src/covered.test.ts", "test('x', () => {});\n");
    write_source(&dir, "src/uncovered.ts", &long_body);
    write_source(&dir, "src/short.ts", "const y = 2;\n");

    let p = prober(&dir, &cmds, &cancel);
    let task = p.test_coverage().unwrap();
    assert_eq!(task.task_type, TaskType::Test);
    assert_eq!(task.files, vec![dir.path().join("src/uncovered.ts")]);
}

#[tokio::test]
async fn refactoring_flags_deep_nesting() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    write_source(
        &dir,
        "src/deep.ts",
        "function f() { if (a) { if (b) { if (c) { if (d) { if (e) { g(); } } } } } }\n",
    );

    let p = prober(&dir, &cmds, &cancel);
    let task = p.refactoring().unwrap();
    assert_eq!(task.task_type, TaskType::Refactor);
}

#[tokio::test]
async fn documentation_counts_undocumented_exports() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    write_source(
        &dir,
        "src/api.ts",
        "/** documented */\nexport function good() {}\nexport function bare() {}\nexport const naked = 1;\n",
    );

    let p = prober(&dir, &cmds, &cancel);
    let task = p.documentation().unwrap();
    assert!(task.title.contains("2 exported item(s)"));
    assert_eq!(task.task_type, TaskType::Docs);
}

#[tokio::test]
async fn performance_flags_io_in_loops() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    write_source(
        &dir,
        "src/nplusone.ts",
        "for (const id of ids) {\n  const a = await fetch(url(id));\n  const b = await db.query(id);\n}\n",
    );
    write_source(&dir, "src/fine.ts", "const rows = await db.query(ids);\n");

    let p = prober(&dir, &cmds, &cancel);
    let task = p.performance().unwrap();
    assert_eq!(task.task_type, TaskType::Optimization);
    assert_eq!(task.files.len(), 1);
}

#[tokio::test]
async fn quiet_project_has_no_advanced_findings() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let cmds = commands("true", "true", "true", "true");
    write_source(&dir, "src/tiny.ts", "export const ok = true;\n");

    let p = prober(&dir, &cmds, &cancel);
    assert!(p.security().is_empty());
    assert!(p.test_coverage().is_none());
    assert!(p.refactoring().is_none());
    assert!(p.performance().is_none());
}
