// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::subprocess::{run_shell, PROBE_TIMEOUT};
use polka_core::{FakeClock, ProbeCommands, Priority, TaskType, Workflow};
use std::time::Duration;

async fn git_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let setup = "git init -q -b main \
        && git -c user.email=t@t -c user.name=t commit -q --allow-empty -m init";
    let output = run_shell(setup, dir.path(), PROBE_TIMEOUT, &token).await.unwrap();
    assert!(output.success(), "git fixture setup failed: {}", output.stderr);
    dir
}

fn config_with(typecheck: &str, build: &str, test: &str, lint: &str) -> DiscoveryConfig {
    DiscoveryConfig {
        enabled_strategies: DiscoveryStrategy::defaults(),
        commands: ProbeCommands {
            typecheck: typecheck.to_string(),
            build: build.to_string(),
            test: test.to_string(),
            lint: lint.to_string(),
        },
    }
}

fn engine_in(
    dir: &tempfile::TempDir,
    config: DiscoveryConfig,
    clock: FakeClock,
) -> DiscoveryEngine<FakeClock> {
    DiscoveryEngine::new(dir.path(), config, clock, CancellationToken::new())
}

#[tokio::test]
async fn type_failure_short_circuit() {
    let dir = git_fixture().await;
    // Build and test commands leave markers; neither may run.
    let config = config_with(
        "echo 'error TS2322' >&2; exit 1",
        "touch build-ran; true",
        "touch test-ran; true",
        "true",
    );
    let engine = engine_in(&dir, config, FakeClock::new());

    let tasks = engine.discover(DiscoverOptions::default()).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, TaskType::Bugfix);
    assert_eq!(tasks[0].priority, Priority::HIGH);
    assert_eq!(tasks[0].workflow, Workflow::Code);
    assert!(!dir.path().join("build-ran").exists());
    assert!(!dir.path().join("test-ran").exists());
}

#[tokio::test]
async fn healthy_project_discovers_nothing() {
    let dir = git_fixture().await;
    let engine = engine_in(&dir, config_with("true", "true", "true", "true"), FakeClock::new());
    let tasks = engine.discover(DiscoverOptions::default()).await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn cache_hit_skips_probes() {
    let dir = git_fixture().await;
    let clock = FakeClock::new();

    // First pass populates the cache (typecheck fails → one task).
    let engine = engine_in(
        &dir,
        config_with("touch probes-ran; exit 1", "true", "true", "true"),
        clock.clone(),
    );
    let first = engine
        .discover(DiscoverOptions { use_cache: true, include_advanced: false })
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert!(dir.path().join("probes-ran").exists());
    std::fs::remove_file(dir.path().join("probes-ran")).unwrap();

    // Second pass within the hour and same HEAD: identical result, no probes.
    clock.advance(Duration::from_secs(600));
    let second = engine
        .discover(DiscoverOptions { use_cache: true, include_advanced: false })
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first[0].id);
    assert!(!dir.path().join("probes-ran").exists(), "cache hit must run no probes");
}

#[tokio::test]
async fn cache_expires_after_an_hour() {
    let dir = git_fixture().await;
    let clock = FakeClock::new();
    let engine = engine_in(
        &dir,
        config_with("touch probes-ran; exit 1", "true", "true", "true"),
        clock.clone(),
    );

    engine.discover(DiscoverOptions { use_cache: true, include_advanced: false }).await.unwrap();
    std::fs::remove_file(dir.path().join("probes-ran")).unwrap();

    clock.advance(Duration::from_secs(3601));
    engine.discover(DiscoverOptions { use_cache: true, include_advanced: false }).await.unwrap();
    assert!(dir.path().join("probes-ran").exists(), "expired cache must re-probe");
}

#[tokio::test]
async fn cache_invalidated_by_new_commit() {
    let dir = git_fixture().await;
    let clock = FakeClock::new();
    let engine = engine_in(
        &dir,
        config_with("touch probes-ran; exit 1", "true", "true", "true"),
        clock.clone(),
    );

    engine.discover(DiscoverOptions { use_cache: true, include_advanced: false }).await.unwrap();
    std::fs::remove_file(dir.path().join("probes-ran")).unwrap();

    let token = CancellationToken::new();
    let commit = "git -c user.email=t@t -c user.name=t commit -q --allow-empty -m next";
    run_shell(commit, dir.path(), PROBE_TIMEOUT, &token).await.unwrap();

    engine.discover(DiscoverOptions { use_cache: true, include_advanced: false }).await.unwrap();
    assert!(dir.path().join("probes-ran").exists(), "HEAD change must re-probe");
}

#[tokio::test]
async fn use_cache_false_always_probes() {
    let dir = git_fixture().await;
    let clock = FakeClock::new();
    let engine = engine_in(
        &dir,
        config_with("touch probes-ran; exit 1", "true", "true", "true"),
        clock.clone(),
    );

    engine.discover(DiscoverOptions { use_cache: true, include_advanced: false }).await.unwrap();
    std::fs::remove_file(dir.path().join("probes-ran")).unwrap();

    engine.discover(DiscoverOptions { use_cache: false, include_advanced: false }).await.unwrap();
    assert!(dir.path().join("probes-ran").exists());
}

#[tokio::test]
async fn lint_finding_survives_clean_earlier_probes() {
    let dir = git_fixture().await;
    let config = DiscoveryConfig {
        enabled_strategies: DiscoveryStrategy::defaults(),
        commands: ProbeCommands {
            typecheck: "true".to_string(),
            build: "true".to_string(),
            test: "true".to_string(),
            lint: "echo src/broken.ts:1:1; exit 1".to_string(),
        },
    };
    let engine = engine_in(&dir, config, FakeClock::new());

    let tasks = engine.discover(DiscoverOptions::default()).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, TaskType::Refactor);
}

#[tokio::test]
async fn disabled_strategies_do_not_run() {
    let dir = git_fixture().await;
    let config = DiscoveryConfig {
        enabled_strategies: vec![DiscoveryStrategy::LintIssues],
        commands: ProbeCommands {
            typecheck: "touch typecheck-ran; exit 1".to_string(),
            build: "true".to_string(),
            test: "true".to_string(),
            lint: "true".to_string(),
        },
    };
    let engine = engine_in(&dir, config, FakeClock::new());

    let tasks = engine.discover(DiscoverOptions::default()).await.unwrap();
    assert!(tasks.is_empty());
    assert!(!dir.path().join("typecheck-ran").exists());
}

#[tokio::test]
async fn outside_git_repo_discovery_still_works_without_cache() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(
        &dir,
        config_with("exit 1", "true", "true", "true"),
        FakeClock::new(),
    );

    let tasks = engine
        .discover(DiscoverOptions { use_cache: true, include_advanced: false })
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(!dir.path().join(".polka").exists(), "no cache without a git HEAD");
}

#[tokio::test]
async fn backoff_accessors_delegate() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_in(&dir, config_with("true", "true", "true", "true"), FakeClock::new());

    assert_eq!(engine.backoff_seconds(), 60);
    engine.increase_backoff();
    assert_eq!(engine.backoff_seconds(), 120);
    engine.reset_backoff();
    assert_eq!(engine.backoff_seconds(), 60);
}

#[tokio::test]
async fn advanced_probes_gated_by_options_and_strategies() {
    let dir = git_fixture().await;
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/bad.ts"),
        "const password = \"supersecretvalue\";\n",
    )
    .unwrap();

    let mut config = config_with("true", "true", "true", "true");
    config.enabled_strategies.push(DiscoveryStrategy::Security);
    let engine = engine_in(&dir, config, FakeClock::new());

    let basic = engine
        .discover(DiscoverOptions { use_cache: false, include_advanced: false })
        .await
        .unwrap();
    assert!(basic.is_empty());

    let advanced = engine
        .discover(DiscoverOptions { use_cache: false, include_advanced: true })
        .await
        .unwrap();
    assert_eq!(advanced.len(), 1);
    assert_eq!(advanced[0].task_type, TaskType::Security);
}

#[tokio::test]
async fn tracked_env_file_is_a_critical_security_finding() {
    let dir = git_fixture().await;
    let token = CancellationToken::new();
    std::fs::write(dir.path().join("prod.env"), "DB_PASSWORD=hunter2\n").unwrap();
    run_shell(
        "git add prod.env && git -c user.email=t@t -c user.name=t commit -q -m env",
        dir.path(),
        PROBE_TIMEOUT,
        &token,
    )
    .await
    .unwrap();

    let mut config = config_with("true", "true", "true", "true");
    config.enabled_strategies.push(DiscoveryStrategy::Security);
    let engine = engine_in(&dir, config, FakeClock::new());

    let tasks = engine
        .discover(DiscoverOptions { use_cache: false, include_advanced: true })
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].priority, Priority::CRITICAL);
    assert!(tasks[0].title.contains(".env"));
    assert_eq!(tasks[0].files, vec![std::path::PathBuf::from("prod.env")]);
}
