// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod tui;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, PmCommands};
use dax_config::{Config, ThinkingMode};
use dax_core::{Agent, AgentEvent, ApproveAll, Approver, DenyAll};
use dax_memory::{redact, PmStore};
use dax_telemetry::{build_view, DeltaRenderer, TelemetryBus};
use dax_tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    // When the TUI renderer owns the terminal, stray tracing output corrupts
    // its display; logging goes to DAX_LOG_FILE or nowhere.
    let is_tui = !cli.is_headless() && cli.command.is_none();
    init_logging(cli.verbose, is_tui);

    // Subcommands run before any agent is built.
    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::ShowConfig => {
                let config = dax_config::load(cli.config.as_deref())?;
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                return Ok(());
            }
            Commands::Pm { command } => {
                return run_pm_command(command, cli.config.as_deref()).await;
            }
        }
    }

    // Piped stdin becomes the prompt for a headless run.
    if cli.prompt.is_none() && !is_stdin_tty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        if !buf.trim().is_empty() {
            cli.prompt = Some(buf);
        }
    }

    let mut config = dax_config::load(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.agent.default_mode = mode;
    }
    if let Some(thinking) = cli.thinking {
        config.agent.thinking = thinking;
    }
    let config = Arc::new(config);

    if config.tui.force_tui || cli.prompt.is_none() {
        if !is_stdin_tty() && !config.tui.allow_pipe {
            anyhow::bail!(
                "refusing to run the TUI bridge without a TTY \
                 (set DAX_TUI_ALLOW_PIPE=1 to override)"
            );
        }
        tui::run_bridge(&cli, config).await
    } else {
        run_headless(&cli, config).await
    }
}

// ── Agent assembly ────────────────────────────────────────────────────────────

/// Build the agent the same way for headless and TUI runs.
fn build_agent(cli: &Cli, config: Arc<Config>) -> anyhow::Result<(Agent, Arc<TelemetryBus>)> {
    let provider = dax_model::from_name(&cli.provider)?;
    let store = Arc::new(PmStore::open(&pm_store_path()?)?);
    let bus = Arc::new(TelemetryBus::default());

    // Tool implementations are host-supplied; the core registry starts
    // empty and hosts register their tool set here.
    let registry = Arc::new(ToolRegistry::new());

    let approver: Arc<dyn Approver> = if cli.yes {
        Arc::new(ApproveAll)
    } else {
        Arc::new(DenyAll)
    };

    let work_dir = std::env::current_dir().context("resolving working directory")?;
    let git_remote = detect_git_remote();
    let project_id = dax_memory::project_id(&work_dir.to_string_lossy(), &git_remote);
    store.ensure_project(&project_id, None, &work_dir.to_string_lossy(), &git_remote)?;

    let mut agent = Agent::new(
        provider,
        registry,
        store,
        config,
        bus.clone(),
        approver,
        work_dir,
        &git_remote,
    );
    if let Err(err) = agent.initialize_scope() {
        tracing::warn!(error = %err, "scope baseline scan failed; continuing without it");
    }
    Ok((agent, bus))
}

// ── Headless runner ───────────────────────────────────────────────────────────

async fn run_headless(cli: &Cli, config: Arc<Config>) -> anyhow::Result<()> {
    let thinking = config.agent.thinking;
    let (mut agent, bus) = build_agent(cli, config)?;

    // Render the phased thinking view to stderr as append-only deltas.
    let subscription = if thinking != ThinkingMode::Off {
        let renderer = Mutex::new(DeltaRenderer::new());
        Some(bus.subscribe(move |_event, snapshot| {
            let view = build_view(snapshot, thinking);
            for line in renderer.lock().unwrap().render(&view) {
                eprintln!("{line}");
            }
        }))
    } else {
        None
    };

    let prompt = cli.prompt.clone().unwrap_or_default();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let turn = tokio::spawn(async move {
        let result = agent.submit(&prompt, tx).await;
        (agent, result)
    });

    let mut exit_err: Option<String> = None;
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::TextDelta(chunk) => {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            }
            AgentEvent::TextComplete(_) => println!(),
            AgentEvent::ToolCallStarted { tool_name, .. } => {
                eprintln!("[tool] {tool_name} ...");
            }
            AgentEvent::ToolCallFinished {
                tool_name,
                is_error,
                ..
            } => {
                eprintln!("[tool] {tool_name} {}", if is_error { "failed" } else { "ok" });
            }
            AgentEvent::GateBlocked { code, subject } => {
                eprintln!("[gate] blocked: {code} ({subject})");
            }
            AgentEvent::GateWarning(w) => {
                eprintln!("[gate] {}: {}", w.code, w.subject);
            }
            AgentEvent::ApprovalRequired { .. } => {
                eprintln!("[gate] approval required (re-run with --yes to approve)");
            }
            AgentEvent::FallbackUsed => {
                eprintln!("[stream] fell back to a non-streaming completion");
            }
            AgentEvent::Error(msg) => exit_err = Some(msg),
            AgentEvent::TurnComplete => break,
        }
    }

    let (_agent, result) = turn.await.expect("agent turn panicked");
    if let Some(id) = subscription {
        bus.unsubscribe(id);
    }
    result?;
    if let Some(msg) = exit_err {
        anyhow::bail!("turn ended with error: {msg}");
    }
    Ok(())
}

// ── PM subcommands ────────────────────────────────────────────────────────────

async fn run_pm_command(cmd: &PmCommands, _config: Option<&std::path::Path>) -> anyhow::Result<()> {
    let store = PmStore::open(&pm_store_path()?)?;
    let work_dir = std::env::current_dir().context("resolving working directory")?;
    let git_remote = detect_git_remote();
    let project_id = dax_memory::project_id(&work_dir.to_string_lossy(), &git_remote);

    match cmd {
        PmCommands::Show => {
            let pm = store.load(&project_id)?;
            // Redaction applies only here, at display — stored snapshots
            // keep the raw values for undo fidelity.
            let value = redact(&serde_json::to_value(&pm)?);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        PmCommands::Undo => match store.undo(&project_id, "cli")? {
            Some(_) => println!("Reverted the most recent project-memory update."),
            None => println!("Nothing to undo for {project_id}."),
        },
        PmCommands::Events { limit } => {
            let mut events = store.events(&project_id)?;
            if let Some(n) = limit {
                let skip = events.len().saturating_sub(*n);
                events.drain(..skip);
            }
            if events.is_empty() {
                println!("No events recorded for {project_id}.");
                return Ok(());
            }
            println!("{:<42}  {:<20}  {:<10}  COMMAND", "ID", "TS", "TYPE");
            println!("{}", "-".repeat(90));
            for e in &events {
                println!(
                    "{:<42}  {:<20}  {:<10}  {}",
                    e.id,
                    e.ts.format("%Y-%m-%d %H:%M:%S"),
                    e.event_type.as_str(),
                    e.command
                );
            }
            println!("\nTotal: {} event(s)", events.len());
        }
        PmCommands::PurgeRao => {
            store.purge_rao(&project_id, "cli")?;
            println!("RAO history purged for {project_id}.");
        }
    }
    Ok(())
}

// ── Environment plumbing ──────────────────────────────────────────────────────

fn pm_store_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .context("no usable data directory")?;
    let dir = base.join("dax");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir.join("pm.db"))
}

fn detect_git_remote() -> String {
    std::process::Command::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_default()
}

fn init_logging(verbosity: u8, is_tui: bool) {
    if is_tui {
        // The renderer subprocess owns the terminal; logs go to a file or
        // nowhere.
        if let Ok(log_path) = std::env::var("DAX_LOG_FILE") {
            if let Ok(file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
            {
                let filter =
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
                let _ = tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_ansi(false)
                            .with_writer(Mutex::new(file)),
                    )
                    .with(filter)
                    .try_init();
                return;
            }
        }
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::filter::LevelFilter::OFF)
            .try_init();
        return;
    }

    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn is_stdin_tty() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        unsafe { libc::isatty(std::io::stdin().as_raw_fd()) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
