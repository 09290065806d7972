//! kiwi CLI - command-line interface for the kiwi terminal agent.

mod cli_args;
mod display;
mod interactive;
mod task_execution;
mod ui_writer_impl;
mod utils;

use anyhow::Result;
use clap::Parser;
use kiwi_config::Config;
use kiwi_core::prompts::{system_prompt, PromptMode};
use kiwi_core::{ConversationOrchestrator, Message, TerminalCoordinator, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use cli_args::Cli;
pub use display::describe_turn_error;
pub use ui_writer_impl::ConsoleUiWriter;
pub use utils::{apply_cli_overrides, build_provider_registry, load_config_with_cli_overrides};

use display::{print_banner, print_metrics};
use interactive::run_interactive;
use task_execution::run_cancellable;
use utils::{initialize_logging, resolve_provider};

/// Conventional exit status for a process ended by SIGTERM.
const TERMINATED_EXIT_CODE: i32 = 143;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(cli.verbose);

    let config = load_config_with_cli_overrides(&cli)?;
    debug!("Loaded configuration: {:?}", config);

    let workspace_dir = std::env::current_dir()?;
    let tools = Arc::new(ToolRegistry::standard(&config));
    let terminal = Arc::new(
        TerminalCoordinator::new(Arc::new(ConsoleUiWriter::new()))
            .with_min_dwell(Duration::from_millis(config.agent.min_dwell_ms)),
    );
    spawn_terminate_handler(terminal.clone());
    let orchestrator = ConversationOrchestrator::new(resolve_provider(&config)?, tools.clone(), terminal, &config)
        .with_working_dir(&workspace_dir);

    match cli.task {
        Some(task) => run_single_shot(&orchestrator, &tools, &config, &task).await,
        None => {
            print_banner(&orchestrator.label(), &workspace_dir, config.llm.safe_mode);
            run_interactive(
                &orchestrator,
                system_prompt(PromptMode::Assistant, &tools),
                config.ui.debug,
            )
            .await
        }
    }
}

async fn run_single_shot(
    orchestrator: &ConversationOrchestrator,
    tools: &ToolRegistry,
    config: &Config,
    task: &str,
) -> Result<()> {
    let mut messages = vec![
        Message::system(system_prompt(PromptMode::Execute, tools)),
        Message::user(task),
    ];

    match run_cancellable(orchestrator, &mut messages).await {
        Ok(result) => {
            if config.ui.debug {
                print_metrics(&result.metrics, &orchestrator.label());
            }
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(describe_turn_error(&e))),
    }
}

/// Exit on SIGTERM unless a shell command is running; the subprocess runner
/// forwards the signal to that command instead and the turn carries on.
#[cfg(unix)]
fn spawn_terminate_handler(terminal: Arc<TerminalCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("Could not install SIGTERM handler: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while terminate.recv().await.is_some() {
            if kiwi_core::command_running() {
                debug!("SIGTERM left to the running command");
                continue;
            }
            info!("Received SIGTERM, exiting");
            terminal.force_idle();
            let _ = crossterm::terminal::disable_raw_mode();
            std::process::exit(TERMINATED_EXIT_CODE);
        }
    });
}

#[cfg(not(unix))]
fn spawn_terminate_handler(_terminal: Arc<TerminalCoordinator>) {}
