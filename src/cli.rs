// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dax_config::{AgentMode, ThinkingMode};

/// dax — an interactive terminal coding agent with policy-gated tool
/// execution.
///
/// With a prompt (or piped stdin) dax runs one headless turn and prints the
/// streamed reply.  Without one it spawns the external TUI renderer and
/// bridges it over the line protocol.
#[derive(Parser, Debug)]
#[command(name = "dax", version, about)]
pub struct Cli {
    /// Task prompt for a headless one-shot turn
    #[arg(long, short = 'p')]
    pub prompt: Option<String>,

    /// Agent mode for this run (default from config)
    #[arg(long, value_enum)]
    pub mode: Option<AgentMode>,

    /// Provider name ("mock" is built in; others are host-supplied)
    #[arg(long, default_value = "mock")]
    pub provider: String,

    /// Thinking-view rendering mode (default from config)
    #[arg(long, value_enum)]
    pub thinking: Option<ThinkingMode>,

    /// Approve gated tool batches without asking
    #[arg(long)]
    pub yes: bool,

    /// Explicit config file (merged over the discovered layers)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Headless when a prompt was given (or piped in); TUI otherwise.
    pub fn is_headless(&self) -> bool {
        self.prompt.is_some()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved configuration and exit.
    ShowConfig,

    /// Inspect and edit the persisted project memory.
    Pm {
        #[command(subcommand)]
        command: PmCommands,
    },
}

/// `dax pm` subcommands.
#[derive(Subcommand, Debug)]
pub enum PmCommands {
    /// Print the current project memory (secrets redacted).
    Show,

    /// Revert the most recent project-memory update.
    Undo,

    /// List the project-memory event log.
    Events {
        /// Show only the newest N events.
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Drop the run/audit/override history.
    PurgeRao,
}
