// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use dax_config::{AgentMode, Config};
use dax_memory::{Outcome, PmStore, PmUpdate};
use dax_model::{LlmProvider, Message, SamplingParams, ToolCallRequest};
use dax_telemetry::{ExecutionPhase, TelemetryBus, TelemetryEvent};
use dax_tools::{
    evaluate_gates, extract_paths, ContractValidator, GateWarning, ScopeTracker, Severity,
    ToolCall, ToolContext, ToolOutput, ToolRegistry, WarnKind,
};

use crate::coordinator::{StreamCoordinator, StreamOptions};
use crate::events::AgentEvent;
use crate::prompts::{system_prompt, PromptContext};

/// Decides whether an approval-gated tool batch may run.
///
/// The CLI wires an interactive implementation; headless runs and tests
/// plug [`ApproveAll`] / [`DenyAll`].
#[async_trait]
pub trait Approver: Send + Sync {
    async fn approve(&self, warnings: &[GateWarning]) -> bool;
}

pub struct ApproveAll;

#[async_trait]
impl Approver for ApproveAll {
    async fn approve(&self, _warnings: &[GateWarning]) -> bool {
        true
    }
}

pub struct DenyAll;

#[async_trait]
impl Approver for DenyAll {
    async fn approve(&self, _warnings: &[GateWarning]) -> bool {
        false
    }
}

/// The core agent.  Owns the conversation (via the stream coordinator) and
/// drives the model ↔ tool loop under the policy gate.
pub struct Agent {
    coordinator: StreamCoordinator,
    tools: Arc<ToolRegistry>,
    store: Arc<PmStore>,
    bus: Arc<TelemetryBus>,
    config: Arc<Config>,
    approver: Arc<dyn Approver>,
    scope: ScopeTracker,
    contract: ContractValidator,
    ctx: ToolContext,
    project_id: String,
    mode: AgentMode,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        store: Arc<PmStore>,
        config: Arc<Config>,
        bus: Arc<TelemetryBus>,
        approver: Arc<dyn Approver>,
        work_dir: impl Into<PathBuf>,
        git_remote: &str,
    ) -> Self {
        let work_dir = work_dir.into();
        let project_id = dax_memory::project_id(&work_dir.to_string_lossy(), git_remote);
        let scope = ScopeTracker::new(work_dir.clone(), config.scope.clone());
        let contract = ContractValidator::from_config(&config.contract);
        let preset = config.sampling();
        let coordinator = StreamCoordinator::new(provider, bus.clone())
            .with_sampling(SamplingParams {
                temperature: preset.temperature,
                top_p: preset.top_p,
                max_tokens: preset.max_tokens,
            })
            .with_fallback_page_chars(config.agent.fallback_page_chars);
        let mode = config.agent.default_mode;
        Self {
            coordinator,
            tools,
            store,
            bus,
            config,
            approver,
            scope,
            contract,
            ctx: ToolContext { work_dir },
            project_id,
            mode,
        }
    }

    /// Establish the scope baseline.  Call once before the first turn.
    pub fn initialize_scope(&mut self) -> std::io::Result<()> {
        self.scope.initialize()
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    /// Takes effect on the next turn (system message and write gating).
    pub fn set_mode(&mut self, mode: AgentMode) {
        self.mode = mode;
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn messages(&self) -> &[Message] {
        self.coordinator.messages()
    }

    /// One-line scope summary (patterns + limits) for status surfaces.
    pub fn scope_summary(&self) -> String {
        self.scope.summary()
    }

    /// Like [`submit`](Agent::submit) but raceable against a cancellation
    /// signal.  Dropping the in-flight turn closes the provider stream.
    pub async fn submit_with_cancel(
        &mut self,
        user_input: &str,
        tx: UnboundedSender<AgentEvent>,
        mut cancel: tokio::sync::oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                let _ = tx.send(AgentEvent::TurnComplete);
                Ok(())
            }
            result = self.submit(user_input, tx.clone()) => result,
        }
    }

    /// Run one user turn: stream the model, gate and dispatch tool calls,
    /// feed results back, repeat until a tool-free reply or the round budget.
    pub async fn submit(
        &mut self,
        user_input: &str,
        tx: UnboundedSender<AgentEvent>,
    ) -> anyhow::Result<()> {
        self.bus
            .emit(TelemetryEvent::phase_enter(ExecutionPhase::Understanding));
        self.bus.emit(TelemetryEvent::phase_step(
            ExecutionPhase::Understanding,
            "interpreting request",
        ));

        if self.coordinator.messages().is_empty() {
            let system = self.system_message();
            self.coordinator.push_message(system);
        }
        self.coordinator.set_tools(self.model_schemas());

        let mut first_round = true;
        let mut rounds = 0u32;
        loop {
            rounds += 1;
            if rounds > self.config.agent.max_tool_rounds {
                let _ = tx.send(AgentEvent::Error(
                    "tool-call round budget exhausted".into(),
                ));
                let _ = tx.send(AgentEvent::TurnComplete);
                break;
            }

            self.bus
                .emit(TelemetryEvent::phase_enter(ExecutionPhase::Analysis));
            self.bus.emit(TelemetryEvent::phase_step(
                ExecutionPhase::Analysis,
                "drafting response",
            ));

            let opts = self.stream_options();
            let chunk_tx = tx.clone();
            let mut on_chunk = move |chunk: &str| {
                let _ = chunk_tx.send(AgentEvent::TextDelta(chunk.to_string()));
            };
            let outcome = if first_round {
                first_round = false;
                self.coordinator
                    .chat_stream(user_input, &mut on_chunk, opts)
                    .await
            } else {
                self.coordinator.stream_turn(&mut on_chunk, opts).await
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    let _ = tx.send(AgentEvent::Error(err.to_string()));
                    let _ = tx.send(AgentEvent::TurnComplete);
                    return Err(err.into());
                }
            };
            if outcome.used_fallback {
                let _ = tx.send(AgentEvent::FallbackUsed);
            }

            if outcome.tool_calls.is_empty() {
                self.bus
                    .emit(TelemetryEvent::phase_enter(ExecutionPhase::Complete));
                self.bus.emit(TelemetryEvent::phase_step(
                    ExecutionPhase::Complete,
                    "response ready",
                ));
                let _ = tx.send(AgentEvent::TextComplete(outcome.content.clone()));
                let _ = tx.send(AgentEvent::TurnComplete);
                break;
            }

            let calls = parse_tool_calls(&outcome.tool_calls);

            // Plan mode refuses writes before the gate even runs.
            if self.mode == AgentMode::Plan {
                let writers: Vec<&ToolCall> = calls
                    .iter()
                    .filter(|c| self.tools.is_write_tool(&c.name))
                    .collect();
                if !writers.is_empty() {
                    for call in &writers {
                        self.bus.emit(TelemetryEvent::gate_blocked(
                            "mode.plan_readonly",
                            &call.name,
                        ));
                        let _ = tx.send(AgentEvent::GateBlocked {
                            code: "mode.plan_readonly".into(),
                            subject: call.name.clone(),
                        });
                    }
                    self.coordinator.push_message(Message::assistant(
                        "Write tools are unavailable in plan mode; produce the plan as text instead.",
                    ));
                    let _ = tx.send(AgentEvent::TurnComplete);
                    break;
                }
            }

            // Gate against a PM snapshot loaded for this batch.  Constraint
            // edits issued mid-turn do not retroactively affect it.
            let pm = self.store.load(&self.project_id)?;
            let expansion = self.scope.check_scope_expansion();
            let gate = evaluate_gates(&calls, &pm, Some(&expansion));

            if gate.blocked {
                for w in &gate.warnings {
                    match w.kind {
                        WarnKind::NeverTouch => self
                            .bus
                            .emit(TelemetryEvent::gate_blocked(&w.code, &w.subject)),
                        WarnKind::RequireApproval => {
                            self.bus.emit(TelemetryEvent::gate_warn(&w.code, &w.subject))
                        }
                    }
                }
                if let Some(w) = gate.warnings.iter().find(|w| w.kind == WarnKind::NeverTouch) {
                    let _ = tx.send(AgentEvent::GateBlocked {
                        code: w.code.clone(),
                        subject: w.subject.clone(),
                    });
                }
                let summary = gate
                    .warnings
                    .iter()
                    .map(|w| format!("{} ({})", w.code, w.subject))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.coordinator.push_message(Message::assistant(format!(
                    "The requested tool batch was blocked by project policy: {summary}."
                )));
                let _ = tx.send(AgentEvent::TurnComplete);
                break;
            }

            let mut scope_approved = false;
            if gate.needs_approval {
                for w in &gate.warnings {
                    self.bus.emit(TelemetryEvent::gate_warn(&w.code, &w.subject));
                    let _ = tx.send(AgentEvent::GateWarning(w.clone()));
                }
                let _ = tx.send(AgentEvent::ApprovalRequired {
                    warnings: gate.warnings.clone(),
                });
                if !self.approver.approve(&gate.warnings).await {
                    self.coordinator.push_message(Message::assistant(
                        "The tool batch was not approved; stopping here.",
                    ));
                    let _ = tx.send(AgentEvent::TurnComplete);
                    break;
                }
                scope_approved = gate
                    .warnings
                    .iter()
                    .any(|w| w.code == "require_approval.scope");
            }

            // Dispatch sequentially.  A failing tool stops the batch; its
            // error still reaches the model as a tool-result message so it
            // can recover in-loop.
            self.bus
                .emit(TelemetryEvent::phase_enter(ExecutionPhase::Execution));
            for call in &calls {
                let targets = extract_paths(&call.args);
                self.bus
                    .emit(TelemetryEvent::tool_start(&call.name, targets));
                let _ = tx.send(AgentEvent::ToolCallStarted {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    args: call.args.clone(),
                });

                let output = if self.tools.is_write_tool(&call.name) {
                    match self.validate_write(call, scope_approved) {
                        Ok(()) => self.tools.execute(call, &self.ctx).await,
                        Err(reason) => ToolOutput::err(&call.id, reason),
                    }
                } else {
                    self.tools.execute(call, &self.ctx).await
                };

                if output.is_error {
                    self.bus
                        .emit(TelemetryEvent::tool_fail(&call.name, &output.content));
                } else {
                    self.bus.emit(TelemetryEvent::tool_ok(&call.name));
                }
                let _ = tx.send(AgentEvent::ToolCallFinished {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    output: output.content.clone(),
                    is_error: output.is_error,
                });

                self.coordinator
                    .push_message(Message::tool_result(&call.id, &output.content));
                self.record_outcome(&call.name, !output.is_error, &output.content);

                if output.is_error {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Contract + scope checks applied before a write-class tool runs.
    fn validate_write(&mut self, call: &ToolCall, scope_approved: bool) -> Result<(), String> {
        let paths = extract_paths(&call.args);
        let Some(path) = paths.first() else {
            return Ok(());
        };
        let content = call
            .args
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let report = self.contract.validate(content, path);
        for v in &report.violations {
            if v.severity == Severity::Warning {
                warn!(path = %v.path, line = v.line, code = %v.code, "contract warning");
            }
        }
        if !report.valid {
            let details = report
                .violations
                .iter()
                .filter(|v| v.severity == Severity::Error)
                .map(|v| format!("{}:{} {}", v.path, v.line, v.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(format!("contract violation: {details}"));
        }

        let old = std::fs::read_to_string(self.ctx.work_dir.join(path)).ok();
        self.scope
            .track_file_change(path, old.as_deref(), Some(content));
        let status = self.scope.get_status();
        if !status.within_limits && !scope_approved {
            return Err(format!("scope exceeded: {}", status.warnings.join("; ")));
        }
        Ok(())
    }

    /// Append one outcome to PM, bounded by the configured maximum.
    fn record_outcome(&self, tool: &str, success: bool, summary: &str) {
        let max = self.config.agent.max_outcomes;
        let result = self.store.load(&self.project_id).and_then(|pm| {
            let mut outcomes = pm.recent_outcomes;
            outcomes.push(Outcome {
                ts: Utc::now(),
                tool: tool.to_string(),
                success,
                summary: clip(summary, 120),
            });
            if outcomes.len() > max {
                let excess = outcomes.len() - max;
                outcomes.drain(..excess);
            }
            self.store.save(
                &self.project_id,
                &PmUpdate {
                    recent_outcomes: Some(outcomes),
                    ..Default::default()
                },
                "agent",
                "record tool outcome",
                None,
            )
        });
        if let Err(err) = result {
            warn!(error = %err, "failed to record tool outcome");
        }
    }

    fn system_message(&self) -> Message {
        let scope_summary = self.scope.summary();
        let contract_text = serde_yaml::to_string(&self.config.contract).ok();
        Message::system(system_prompt(
            self.mode,
            self.config.agent.system_prompt.as_deref(),
            PromptContext {
                agent_name: &self.config.agent.agent_name,
                scope_summary: Some(&scope_summary),
                contract_text: contract_text.as_deref(),
            },
        ))
    }

    fn model_schemas(&self) -> Vec<dax_model::ToolSchema> {
        self.tools
            .schemas()
            .into_iter()
            .map(|s| dax_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect()
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            first_token_timeout_ms: self.config.agent.first_token_timeout_ms,
            overall_timeout_ms: self.config.agent.overall_timeout_ms,
            ..Default::default()
        }
    }
}

/// Parse the wire batch into executable calls: dedup by id, parse the JSON
/// arguments, substitute `{}` for empty or invalid argument buffers.
fn parse_tool_calls(requests: &[ToolCallRequest]) -> Vec<ToolCall> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut calls = Vec::with_capacity(requests.len());
    for req in requests {
        if !seen.insert(req.id.as_str()) {
            continue;
        }
        let args = if req.arguments.is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&req.arguments) {
                Ok(v) => v,
                Err(err) => {
                    warn!(
                        tool_name = %req.name,
                        tool_call_id = %req.id,
                        error = %err,
                        "model sent tool call with invalid JSON arguments; substituting {{}}"
                    );
                    serde_json::Value::Object(Default::default())
                }
            }
        };
        calls.push(ToolCall {
            id: req.id.clone(),
            name: req.name.clone(),
            args,
        });
    }
    calls
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
