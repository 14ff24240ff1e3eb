// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model, with parsed arguments.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.  Each tool parses this into its own typed
    /// shape; the policy gate only inspects the conventional path keys.
    pub args: Value,
}

/// Execution context handed to every tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub work_dir: PathBuf,
}

/// The result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// If true, the tool execution failed non-fatally (returned error message).
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result containing a plain-text error message.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Trait that every tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Whether this tool creates or modifies files.  Write tools are
    /// refused in plan mode and their payloads pass the contract validator
    /// and scope tracker before execution.
    fn is_write(&self) -> bool {
        false
    }
    /// Execute the tool.  Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct ReadOnlyTool;

    #[async_trait]
    impl Tool for ReadOnlyTool {
        fn name(&self) -> &str {
            "read_only"
        }
        fn description(&self) -> &str {
            "reads things"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
            ToolOutput::ok(&call.id, "ok")
        }
    }

    struct WriterTool;

    #[async_trait]
    impl Tool for WriterTool {
        fn name(&self) -> &str {
            "write_file"
        }
        fn description(&self) -> &str {
            "writes a file"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn is_write(&self) -> bool {
            true
        }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
            ToolOutput::ok(&call.id, "written")
        }
    }

    #[test]
    fn default_tool_is_not_a_writer() {
        assert!(!ReadOnlyTool.is_write());
    }

    #[test]
    fn writer_tool_overrides_is_write() {
        assert!(WriterTool.is_write());
    }

    #[test]
    fn output_constructors_set_error_flag() {
        let ok = ToolOutput::ok("c1", "fine");
        assert!(!ok.is_error);
        let err = ToolOutput::err("c1", "broken");
        assert!(err.is_error);
        assert_eq!(err.content, "broken");
    }

    #[tokio::test]
    async fn execute_receives_call_id() {
        let call = ToolCall {
            id: "call-9".into(),
            name: "read_only".into(),
            args: json!({}),
        };
        let out = ReadOnlyTool.execute(&call, &ToolContext::default()).await;
        assert_eq!(out.call_id, "call-9");
    }
}
