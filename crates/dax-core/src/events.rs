// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use dax_tools::GateWarning;

/// Events emitted by the agent during a single turn.
/// Consumers (CLI runner, TUI bridge) subscribe to these to drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// The complete text response from the model (after streaming finishes)
    TextComplete(String),
    /// The model has requested a tool call
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// The gate flagged the batch; approval may still let it through
    GateWarning(GateWarning),
    /// The gate refused the batch outright
    GateBlocked { code: String, subject: String },
    /// The batch needs an approval decision before dispatch
    ApprovalRequired { warnings: Vec<GateWarning> },
    /// The streamed response was replaced by the complete() fallback
    FallbackUsed,
    /// The agent has finished processing the current user turn
    TurnComplete,
    /// A recoverable error occurred
    Error(String),
}
