// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! polka: autonomous coding-agent CLI.

mod env;
mod exit_error;

use clap::Parser;
use exit_error::{ExitError, EXIT_INTERRUPTED, EXIT_OK};
use parking_lot::Mutex;
use polka_core::{AgentConfig, AgentState, ApprovalLevel, SessionId, Strategy, SystemClock};
use polka_engine::{
    ApprovalManager, ContinuousLoop, Executor, InterruptHandler, LimitKind, Orchestrator,
    OrchestratorError, ProcessInvoker, ResourceMonitor, WorkflowInvoker,
};
use polka_storage::{Acquire, SessionLock, StateStore, TaskHistory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "polka", version, about = "Autonomous coding-agent core")]
struct Cli {
    /// Goal to accomplish in one run
    #[arg(long, value_name = "TEXT", conflicts_with = "continuous")]
    goal: Option<String>,

    /// Run the continuous-improvement loop until interrupted
    #[arg(long)]
    continuous: bool,

    /// Approval level for tasks and plans
    #[arg(long, value_enum)]
    approval: Option<ApprovalArg>,

    /// In a non-interactive session, approve plans whose tasks all passed
    /// the safety checks (plans are auto-rejected otherwise)
    #[arg(long)]
    auto_approve_safe: bool,

    /// Enable the human-editable working space at this directory
    #[arg(long, value_name = "PATH")]
    working_dir: Option<PathBuf>,

    /// Project directory to operate on
    #[arg(long, value_name = "PATH", default_value = ".")]
    project_dir: PathBuf,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum concurrently executing tasks
    #[arg(long, value_name = "N")]
    max_concurrency: Option<usize>,

    /// Shell command that runs workflows (receives POLKA_WORKFLOW and POLKA_INPUT)
    #[arg(long, value_name = "CMD")]
    workflow_cmd: Option<String>,

    /// Session identifier (defaults to a generated one)
    #[arg(long, value_name = "ID")]
    session_id: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ApprovalArg {
    None,
    Destructive,
    Commits,
    All,
}

impl From<ApprovalArg> for ApprovalLevel {
    fn from(arg: ApprovalArg) -> Self {
        match arg {
            ApprovalArg::None => ApprovalLevel::None,
            ApprovalArg::Destructive => ApprovalLevel::Destructive,
            ApprovalArg::Commits => ApprovalLevel::Commits,
            ApprovalArg::All => ApprovalLevel::All,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            std::process::exit(exit_error::EXIT_ERROR);
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            e.code
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, ExitError> {
    if cli.goal.is_none() && !cli.continuous {
        return Err(ExitError::usage("either --goal or --continuous is required"));
    }

    let config = build_config(&cli)?;
    let workflow_command = config.workflow_command.clone().ok_or_else(|| {
        ExitError::usage("no workflow command configured (use --workflow-cmd or the config file)")
    })?;
    let state_dir = env::state_dir().ok_or_else(|| {
        ExitError::fatal("cannot resolve a state directory (set POLKA_STATE_DIR)")
    })?;

    let clock = SystemClock;
    let session_id = match &cli.session_id {
        Some(id) if id.len() > polka_core::id::ID_MAX_LEN => {
            return Err(ExitError::usage(format!(
                "--session-id must be at most {} characters",
                polka_core::id::ID_MAX_LEN
            )));
        }
        Some(id) => SessionId::from_string(id),
        None => SessionId::generate(),
    };
    let lock = SessionLock::new(env::lock_dir(), clock.clone());
    match lock.acquire(session_id).map_err(|e| ExitError::fatal(e.to_string()))? {
        Acquire::Acquired(_) => {}
        Acquire::Refused { reason, existing } => {
            let mut message = format!("session lock refused: {}", reason);
            if let Some(info) = existing {
                message.push_str(&format!(" (pid {} on {})", info.pid, info.hostname));
            }
            return Err(ExitError::fatal(message));
        }
    }

    let result =
        run_session(&cli, config, workflow_command, &state_dir, session_id, clock).await;

    // Lockfile removal before orderly exit; stale-lock GC covers crashes.
    lock.release(&session_id);
    result
}

fn build_config(cli: &Cli) -> Result<AgentConfig, ExitError> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path).map_err(|e| ExitError::usage(e.to_string()))?,
        None => AgentConfig::default(),
    };
    config.strategy =
        if cli.continuous { Strategy::ContinuousImprovement } else { Strategy::GoalDirected };
    if let Some(level) = cli.approval {
        config.approval.level = level.into();
    }
    if cli.auto_approve_safe {
        config.approval.auto_approve_safe_tasks = true;
    }
    if let Some(dir) = &cli.working_dir {
        config.working_dir = Some(dir.clone());
    }
    if let Some(n) = cli.max_concurrency {
        config.limits.max_concurrency = n;
    }
    if let Some(cmd) = &cli.workflow_cmd {
        config.workflow_command = Some(cmd.clone());
    }
    config.validate().map_err(|e| ExitError::usage(e.to_string()))?;
    Ok(config)
}

async fn run_session(
    cli: &Cli,
    config: AgentConfig,
    workflow_command: String,
    state_dir: &Path,
    session_id: SessionId,
    clock: SystemClock,
) -> Result<i32, ExitError> {
    let root = CancellationToken::new();
    let handler = InterruptHandler::install(root.clone());

    let store = Arc::new(StateStore::new(state_dir));
    let history = Arc::new(Mutex::new(TaskHistory::load(state_dir.join("task-history.json"))));
    let invoker = Arc::new(ProcessInvoker::new(workflow_command, cli.project_dir.clone()));
    let approvals = ApprovalManager::detect(config.approval.clone());

    let outcome: Result<(), ExitError> = if let Some(goal) = &cli.goal {
        let orchestrator = Orchestrator::new(
            Arc::clone(&invoker),
            config.clone(),
            cli.project_dir.clone(),
            Arc::clone(&store),
            Arc::clone(&history),
            approvals,
            clock.clone(),
            root.clone(),
        );
        orchestrator.initialize(session_id).map_err(|e| ExitError::fatal(e.to_string()))?;

        let mut monitor = start_monitor(&config, orchestrator.executor(), root.clone());
        let run = orchestrator.run_goal(goal).await;
        monitor.stop();

        match run {
            Ok(summary) => {
                tracing::info!(
                    approved = summary.plan_approved,
                    completed = summary.completed,
                    failed = summary.failed,
                    committed = summary.committed,
                    "goal run finished"
                );
                Ok(())
            }
            Err(OrchestratorError::Cancelled) => Ok(()),
            Err(e) => Err(ExitError::fatal(e.to_string())),
        }
    } else {
        if store.load().map_err(|e| ExitError::fatal(e.to_string()))?.is_none() {
            let state = AgentState::new(session_id, config.clone(), &clock);
            store.save(&state).map_err(|e| ExitError::fatal(e.to_string()))?;
        }
        let mut continuous = ContinuousLoop::new(
            Arc::clone(&invoker),
            &config,
            cli.project_dir.clone(),
            Arc::clone(&store),
            Arc::clone(&history),
            approvals,
            clock.clone(),
            root.clone(),
        );
        let mut monitor = start_monitor(&config, continuous.executor(), root.clone());
        let stats = continuous.run().await;
        monitor.stop();
        tracing::info!(
            iterations = stats.iterations,
            discovered = stats.tasks_discovered,
            completed = stats.tasks_completed,
            failed = stats.tasks_failed,
            "continuous loop finished"
        );
        Ok(())
    };

    if let Err(e) = store.checkpoint() {
        tracing::warn!(error = %e, "final checkpoint failed");
    }

    match outcome {
        Err(e) => Err(e),
        Ok(()) if handler.interrupted() => Ok(EXIT_INTERRUPTED),
        Ok(()) => Ok(EXIT_OK),
    }
}

/// Wire the resource monitor to the executor and the root token.
///
/// Session-time exhaustion initiates orderly shutdown; other limits produce
/// the single warning the monitor already logs.
fn start_monitor<I: WorkflowInvoker>(
    config: &AgentConfig,
    executor: &Arc<Executor<I>>,
    root: CancellationToken,
) -> ResourceMonitor {
    let sampler = Arc::clone(executor);
    ResourceMonitor::start(
        config.limits,
        Arc::new(move || sampler.longest_running()),
        Arc::new(move |kind, _observed, _limit| {
            if kind == LimitKind::SessionTime {
                root.cancel();
            }
        }),
    )
}
