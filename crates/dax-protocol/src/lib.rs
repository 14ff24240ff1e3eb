// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Line protocol spoken to the external TUI renderer subprocess.
//!
//! Messages are newline-delimited JSON.  The core writes [`TuiOutbound`]
//! frames to the renderer's stdin and reads [`TuiInbound`] frames from its
//! stdout.  Stream events dispatched to the renderer mirror the agent's
//! event kinds one-to-one.

use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Outbound (core → renderer) ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TuiOutbound {
    #[serde(rename = "dispatch")]
    Dispatch { event: StreamEvent },
    #[serde(rename = "addUserMessage")]
    AddUserMessage { content: String },
    #[serde(rename = "setContext")]
    SetContext { files: Vec<String>, scope: String },
    #[serde(rename = "updateState")]
    UpdateState { state: serde_json::Value },
    #[serde(rename = "destroy")]
    Destroy,
}

/// One dispatched agent event, as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    Meta {
        agent: String,
        mode: String,
        provider: String,
    },
    State {
        state: String,
    },
    TextDelta {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },
    Gate {
        code: String,
        subject: String,
        blocked: bool,
    },
    Complete {
        content: String,
    },
    Error {
        message: String,
    },
}

// ─── Inbound (renderer → core) ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TuiInbound {
    #[serde(rename = "input")]
    Input { content: String },
}

/// Where an input line should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRoute<'a> {
    /// `/`-prefixed content goes to the command handler (leading `/` kept)
    Command(&'a str),
    /// Everything else is a chat message for the send handler
    Send(&'a str),
}

pub fn route_input(content: &str) -> InputRoute<'_> {
    if content.starts_with('/') {
        InputRoute::Command(content)
    } else {
        InputRoute::Send(content)
    }
}

// ─── Framing ──────────────────────────────────────────────────────────────────

/// Write one outbound frame followed by a newline.
pub fn write_frame(w: &mut impl Write, msg: &TuiOutbound) -> Result<(), ProtocolError> {
    let json = serde_json::to_string(msg)?;
    w.write_all(json.as_bytes())?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

/// Parse one inbound line.
pub fn parse_inbound(line: &str) -> Result<TuiInbound, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // ── Wire shapes ───────────────────────────────────────────────────────────

    #[test]
    fn outbound_type_tags_match_the_wire_names() {
        let cases: Vec<(TuiOutbound, &str)> = vec![
            (
                TuiOutbound::AddUserMessage {
                    content: "hi".into(),
                },
                "addUserMessage",
            ),
            (
                TuiOutbound::SetContext {
                    files: vec!["a.ts".into()],
                    scope: "src/**".into(),
                },
                "setContext",
            ),
            (
                TuiOutbound::UpdateState {
                    state: json!({"phase": "execution"}),
                },
                "updateState",
            ),
            (TuiOutbound::Destroy, "destroy"),
        ];
        for (msg, tag) in cases {
            let v = serde_json::to_value(&msg).unwrap();
            assert_eq!(v["type"], tag);
        }
    }

    #[test]
    fn dispatch_nests_the_event() {
        let msg = TuiOutbound::Dispatch {
            event: StreamEvent::TextDelta {
                content: "alpha".into(),
            },
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "dispatch");
        assert_eq!(v["event"]["kind"], "text_delta");
        assert_eq!(v["event"]["content"], "alpha");
    }

    #[test]
    fn stream_event_kinds_are_snake_case() {
        let cases: Vec<(StreamEvent, &str)> = vec![
            (
                StreamEvent::Meta {
                    agent: "dax".into(),
                    mode: "build".into(),
                    provider: "mock".into(),
                },
                "meta",
            ),
            (
                StreamEvent::State {
                    state: "streaming".into(),
                },
                "state",
            ),
            (
                StreamEvent::ToolCall {
                    id: "c1".into(),
                    name: "write_file".into(),
                    args: json!({"path": "a.ts"}),
                },
                "tool_call",
            ),
            (
                StreamEvent::ToolResult {
                    id: "c1".into(),
                    name: "write_file".into(),
                    output: "ok".into(),
                    is_error: false,
                },
                "tool_result",
            ),
            (
                StreamEvent::Gate {
                    code: "never_touch.path".into(),
                    subject: "secrets/key.txt".into(),
                    blocked: true,
                },
                "gate",
            ),
            (
                StreamEvent::Complete {
                    content: "done".into(),
                },
                "complete",
            ),
            (
                StreamEvent::Error {
                    message: "boom".into(),
                },
                "error",
            ),
        ];
        for (event, kind) in cases {
            let v = serde_json::to_value(&event).unwrap();
            assert_eq!(v["kind"], kind);
        }
    }

    // ── Framing ───────────────────────────────────────────────────────────────

    #[test]
    fn write_frame_is_newline_delimited() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &TuiOutbound::Destroy).unwrap();
        write_frame(
            &mut buf,
            &TuiOutbound::AddUserMessage {
                content: "hi".into(),
            },
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("destroy"));
        assert!(lines[1].contains("addUserMessage"));
    }

    #[test]
    fn inbound_round_trip() {
        let line = r#"{"type":"input","content":"hello"}"#;
        let msg = parse_inbound(line).unwrap();
        assert_eq!(
            msg,
            TuiInbound::Input {
                content: "hello".into()
            }
        );
    }

    #[test]
    fn malformed_inbound_is_an_error() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"type":"unknown"}"#).is_err());
    }

    // ── Input routing ─────────────────────────────────────────────────────────

    #[test]
    fn slash_prefix_routes_to_command() {
        assert_eq!(route_input("/help"), InputRoute::Command("/help"));
        assert_eq!(route_input("/pm undo"), InputRoute::Command("/pm undo"));
    }

    #[test]
    fn plain_text_routes_to_send() {
        assert_eq!(route_input("fix the bug"), InputRoute::Send("fix the bug"));
        assert_eq!(route_input(""), InputRoute::Send(""));
    }
}
