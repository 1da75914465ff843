// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::invoker::FakeInvoker;
use polka_core::{AgentState, ApprovalLevel, FakeClock, ProbeCommands, SessionId};
use polka_discovery::run_shell;

async fn git_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let setup = "git init -q -b main \
        && git -c user.email=t@t -c user.name=t commit -q --allow-empty -m init";
    let output =
        run_shell(setup, dir.path(), Duration::from_secs(30), &token).await.unwrap();
    assert!(output.success(), "git fixture setup failed: {}", output.stderr);
    dir
}

fn loop_config(typecheck: &str, working_dir: Option<PathBuf>) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.approval.level = ApprovalLevel::None;
    config.discovery.commands = ProbeCommands {
        typecheck: typecheck.to_string(),
        build: "true".to_string(),
        test: "true".to_string(),
        lint: "true".to_string(),
    };
    config.working_dir = working_dir;
    config
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<StateStore>,
    cancel: CancellationToken,
    continuous: ContinuousLoop<FakeInvoker, FakeClock>,
}

fn fixture_in(dir: tempfile::TempDir, config: AgentConfig) -> Fixture {
    let invoker = FakeInvoker::new();
    let store = Arc::new(StateStore::new(dir.path().join(".polka-state")));
    let clock = FakeClock::new();
    store
        .save(&AgentState::new(SessionId::generate(), config.clone(), &clock))
        .unwrap();
    let history = Arc::new(Mutex::new(TaskHistory::load(dir.path().join("h.json"))));
    let approvals = ApprovalManager::new(config.approval.clone(), false);
    let cancel = CancellationToken::new();
    let continuous = ContinuousLoop::new(
        Arc::new(invoker),
        &config,
        dir.path(),
        Arc::clone(&store),
        history,
        approvals,
        clock,
        cancel.clone(),
    );
    Fixture { _dir: dir, store, cancel, continuous }
}

#[tokio::test]
async fn discovered_tasks_are_executed_and_recorded() {
    let dir = git_fixture().await;
    let config = loop_config("exit 1", None);
    let mut fixture = fixture_in(dir, config);

    let cancel = fixture.cancel.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();
    });

    let stats = fixture.continuous.run().await;
    handle.await.unwrap();

    assert!(stats.iterations >= 1);
    assert_eq!(stats.tasks_discovered, 1);
    assert_eq!(stats.tasks_completed, 1);
    assert_eq!(stats.tasks_failed, 0);
    // Discovery found something: backoff reset to base
    assert_eq!(fixture.continuous.backoff_seconds(), 60);

    let state = fixture.store.load().unwrap().unwrap();
    assert_eq!(state.completed_tasks.len(), 1);
    assert_eq!(state.execution_history.len(), 1);
}

#[tokio::test]
async fn empty_discovery_increases_backoff_and_keeps_looping() {
    let dir = git_fixture().await;
    let config = loop_config("true", None);
    let mut fixture = fixture_in(dir, config);

    let cancel = fixture.cancel.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let stats = fixture.continuous.run().await;
    handle.await.unwrap();

    assert!(stats.iterations >= 1);
    assert_eq!(stats.tasks_discovered, 0);
    assert!(fixture.continuous.backoff_seconds() >= 120, "backoff should have doubled");
}

#[tokio::test]
async fn interrupt_exits_promptly_from_backoff_sleep() {
    let dir = git_fixture().await;
    let config = loop_config("true", None);
    let mut fixture = fixture_in(dir, config);

    let cancel = fixture.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let start = std::time::Instant::now();
    fixture.continuous.run().await;
    // The 120 s backoff sleep must not delay shutdown.
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn working_dir_strategy_picks_up_pending_markdown() {
    let dir = git_fixture().await;
    let working_dir = dir.path().join("agent-space");
    let mut config = loop_config("true", Some(working_dir.clone()));
    config.discovery.enabled_strategies.push(polka_core::DiscoveryStrategy::WorkingDir);

    // A human drops a pending task into the working space.
    let clock = FakeClock::new();
    let space = WorkingSpace::new(&working_dir, clock);
    let human_task = Task::builder().title("Human request").build();
    space.create_pending_task(&human_task).unwrap();

    let mut fixture = fixture_in(dir, config);
    let cancel = fixture.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();
    });

    let stats = fixture.continuous.run().await;
    assert_eq!(stats.tasks_discovered, 1);
    assert_eq!(stats.tasks_completed, 1);

    // The pending file was documented as completed.
    let completed: Vec<_> = std::fs::read_dir(working_dir.join("tasks/completed"))
        .unwrap()
        .flatten()
        .collect();
    assert_eq!(completed.len(), 1);
}
