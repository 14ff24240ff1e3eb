// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bridge between the agent core and the external TUI renderer subprocess.
//!
//! The renderer is spawned from `tui.renderer_cmd` and spoken to over the
//! newline-delimited JSON protocol in `dax-protocol`: agent events go out
//! as `dispatch` frames, user input comes back as `input` frames.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;

use dax_config::{AgentMode, Config};
use dax_core::{Agent, AgentEvent};
use dax_protocol::{parse_inbound, route_input, InputRoute, StreamEvent, TuiInbound, TuiOutbound};

use crate::cli::Cli;

pub async fn run_bridge(cli: &Cli, config: Arc<Config>) -> anyhow::Result<()> {
    let (mut agent, _bus) = crate::build_agent(cli, config.clone())?;

    let mut child = tokio::process::Command::new(&config.tui.renderer_cmd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!(
                "failed to spawn TUI renderer {:?} — install it or set tui.renderer_cmd",
                config.tui.renderer_cmd
            )
        })?;
    let mut child_in = child.stdin.take().context("renderer stdin unavailable")?;
    let child_out = child.stdout.take().context("renderer stdout unavailable")?;
    let mut lines = BufReader::new(child_out).lines();

    send(
        &mut child_in,
        &TuiOutbound::Dispatch {
            event: StreamEvent::Meta {
                agent: config.agent.agent_name.clone(),
                mode: agent.mode().to_string(),
                provider: cli.provider.clone(),
            },
        },
    )
    .await?;
    send(
        &mut child_in,
        &TuiOutbound::SetContext {
            files: Vec::new(),
            scope: agent.scope_summary(),
        },
    )
    .await?;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let inbound = match parse_inbound(&line) {
            Ok(msg) => msg,
            Err(err) => {
                send(
                    &mut child_in,
                    &TuiOutbound::Dispatch {
                        event: StreamEvent::Error {
                            message: format!("unreadable input frame: {err}"),
                        },
                    },
                )
                .await?;
                continue;
            }
        };

        let TuiInbound::Input { content } = inbound;
        match route_input(&content) {
            InputRoute::Command(cmd) => {
                if !handle_command(cmd, &mut agent, &mut child_in).await? {
                    break;
                }
            }
            InputRoute::Send(text) => {
                send(
                    &mut child_in,
                    &TuiOutbound::AddUserMessage {
                        content: text.to_string(),
                    },
                )
                .await?;
                run_turn(&mut agent, text, &mut child_in).await?;
            }
        }
    }

    let _ = send(&mut child_in, &TuiOutbound::Destroy).await;
    let _ = child.wait().await;
    Ok(())
}

/// Returns false when the bridge should shut down.
async fn handle_command(
    cmd: &str,
    agent: &mut Agent,
    child_in: &mut ChildStdin,
) -> anyhow::Result<bool> {
    match cmd {
        "/quit" | "/exit" => return Ok(false),
        "/mode build" => {
            agent.set_mode(AgentMode::Build);
            send_state(child_in, json!({"mode": "build"})).await?;
        }
        "/mode plan" => {
            agent.set_mode(AgentMode::Plan);
            send_state(child_in, json!({"mode": "plan"})).await?;
        }
        other => {
            send(
                child_in,
                &TuiOutbound::Dispatch {
                    event: StreamEvent::Error {
                        message: format!("unknown command: {other}"),
                    },
                },
            )
            .await?;
        }
    }
    Ok(true)
}

async fn run_turn(
    agent: &mut Agent,
    text: &str,
    child_in: &mut ChildStdin,
) -> anyhow::Result<()> {
    send_state(child_in, json!({"state": "streaming"})).await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let submit = agent.submit(text, tx);
    tokio::pin!(submit);

    let mut submit_result: Option<anyhow::Result<()>> = None;
    loop {
        tokio::select! {
            result = &mut submit, if submit_result.is_none() => {
                submit_result = Some(result);
            }
            event = rx.recv() => match event {
                Some(event) => forward(event, child_in).await?,
                None => break,
            },
        }
    }

    send_state(child_in, json!({"state": "idle"})).await?;
    if let Some(Err(err)) = submit_result {
        send(
            child_in,
            &TuiOutbound::Dispatch {
                event: StreamEvent::Error {
                    message: err.to_string(),
                },
            },
        )
        .await?;
    }
    Ok(())
}

async fn forward(event: AgentEvent, child_in: &mut ChildStdin) -> anyhow::Result<()> {
    let frame = match event {
        AgentEvent::TextDelta(content) => Some(StreamEvent::TextDelta { content }),
        AgentEvent::TextComplete(content) => Some(StreamEvent::Complete { content }),
        AgentEvent::ToolCallStarted {
            call_id,
            tool_name,
            args,
        } => Some(StreamEvent::ToolCall {
            id: call_id,
            name: tool_name,
            args,
        }),
        AgentEvent::ToolCallFinished {
            call_id,
            tool_name,
            output,
            is_error,
        } => Some(StreamEvent::ToolResult {
            id: call_id,
            name: tool_name,
            output,
            is_error,
        }),
        AgentEvent::GateWarning(w) => Some(StreamEvent::Gate {
            code: w.code,
            subject: w.subject,
            blocked: false,
        }),
        AgentEvent::GateBlocked { code, subject } => Some(StreamEvent::Gate {
            code,
            subject,
            blocked: true,
        }),
        AgentEvent::Error(message) => Some(StreamEvent::Error { message }),
        AgentEvent::ApprovalRequired { .. } => {
            send_state(child_in, json!({"approval_pending": true})).await?;
            None
        }
        AgentEvent::FallbackUsed => {
            send_state(child_in, json!({"stream": "fallback"})).await?;
            None
        }
        AgentEvent::TurnComplete => None,
    };
    if let Some(event) = frame {
        send(child_in, &TuiOutbound::Dispatch { event }).await?;
    }
    Ok(())
}

async fn send_state(child_in: &mut ChildStdin, state: serde_json::Value) -> anyhow::Result<()> {
    send(child_in, &TuiOutbound::UpdateState { state }).await
}

async fn send(child_in: &mut ChildStdin, msg: &TuiOutbound) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    child_in.write_all(line.as_bytes()).await?;
    child_in.flush().await?;
    Ok(())
}
