// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use tracing::warn;

use crate::{
    provider::ResponseStream, CompletionRequest, LlmError, LlmProvider, LlmResponse,
    ToolCallRequest,
};

/// Behavior of one `stream()` call on the scripted mock.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Yield these items, then end the stream normally.
    Stream(Vec<LlmResponse>),
    /// Yield these items, then hang forever (for overall-timeout tests).
    StreamThenHang(Vec<LlmResponse>),
    /// Never yield anything (for first-token-timeout tests).
    StreamNeverYields,
    /// Yield a single stream error immediately (for fallback tests).
    StreamFails(String),
    /// Report no streaming support (`stream()` returns `None`).
    NoStreaming,
}

/// A pre-scripted mock provider.  Each `stream()` call pops the next
/// behavior from the front of the queue, so tests can specify exact event
/// sequences — including tool calls and failure injection — without network
/// access.
pub struct ScriptedMockProvider {
    behaviors: Arc<Mutex<Vec<MockBehavior>>>,
    complete_text: String,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    /// The last `CompletionRequest` seen by this provider.
    /// Written on each call so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    pub fn new(behaviors: Vec<MockBehavior>) -> Self {
        Self {
            behaviors: Arc::new(Mutex::new(behaviors)),
            complete_text: "mock complete response".into(),
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the text returned by `complete()`.
    pub fn with_complete_text(mut self, text: impl Into<String>) -> Self {
        self.complete_text = text.into();
        self
    }

    /// Convenience: provider whose first stream call yields a single text
    /// reply as two deltas.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r: String = reply.into();
        let mid = r.len() / 2;
        let split = (mid..=r.len())
            .find(|&i| r.is_char_boundary(i))
            .unwrap_or(r.len());
        let (head, tail) = r.split_at(split);
        Self::new(vec![MockBehavior::Stream(vec![
            LlmResponse::text(head),
            LlmResponse::text(tail),
        ])])
    }

    /// Convenience: a tool call on the first round, a text reply on the second.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            MockBehavior::Stream(vec![LlmResponse::tool_call(ToolCallRequest {
                index: 0,
                id: tool_id.into(),
                name: tool_name.into(),
                arguments: args_json.into(),
            })]),
            MockBehavior::Stream(vec![LlmResponse::text(final_text)]),
        ])
    }

    /// Number of `complete()` invocations so far.
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    /// Number of `stream()` invocations so far.
    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<LlmResponse, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(req);
        Ok(LlmResponse::text(self.complete_text.clone()))
    }

    async fn stream(&self, req: CompletionRequest) -> Result<Option<ResponseStream>, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(req);
        let behavior = {
            let mut behaviors = self.behaviors.lock().unwrap();
            if behaviors.is_empty() {
                // Default fallback when all scripts are consumed
                warn!("scripted mock exhausted; substituting placeholder reply");
                MockBehavior::Stream(vec![LlmResponse::text("[no more scripts]")])
            } else {
                behaviors.remove(0)
            }
        };
        let s: ResponseStream = match behavior {
            MockBehavior::Stream(items) => {
                let wrapped: Vec<Result<LlmResponse, LlmError>> =
                    items.into_iter().map(Ok).collect();
                Box::pin(stream::iter(wrapped))
            }
            MockBehavior::StreamThenHang(items) => {
                let wrapped: Vec<Result<LlmResponse, LlmError>> =
                    items.into_iter().map(Ok).collect();
                Box::pin(stream::iter(wrapped).chain(stream::pending()))
            }
            MockBehavior::StreamNeverYields => Box::pin(stream::pending()),
            MockBehavior::StreamFails(msg) => {
                let failure: Vec<Result<LlmResponse, LlmError>> =
                    vec![Err(LlmError::Stream(msg))];
                Box::pin(stream::iter(failure))
            }
            MockBehavior::NoStreaming => return Ok(None),
        };
        Ok(Some(s))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::Message;

    fn req() -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn always_text_streams_full_reply() {
        let p = ScriptedMockProvider::always_text("hello world");
        let mut s = p.stream(req()).await.unwrap().unwrap();
        let mut collected = String::new();
        while let Some(item) = s.next().await {
            collected.push_str(&item.unwrap().content);
        }
        assert_eq!(collected, "hello world");
    }

    #[tokio::test]
    async fn tool_then_text_two_rounds() {
        let p = ScriptedMockProvider::tool_then_text("c1", "shell", r#"{"command":"ls"}"#, "done");

        let mut s = p.stream(req()).await.unwrap().unwrap();
        let first = s.next().await.unwrap().unwrap();
        assert_eq!(first.tool_calls[0].name, "shell");

        let mut s2 = p.stream(req()).await.unwrap().unwrap();
        let second = s2.next().await.unwrap().unwrap();
        assert_eq!(second.content, "done");
    }

    #[tokio::test]
    async fn stream_fails_yields_error_item() {
        let p = ScriptedMockProvider::new(vec![MockBehavior::StreamFails("boom".into())]);
        let mut s = p.stream(req()).await.unwrap().unwrap();
        let item = s.next().await.unwrap();
        assert!(matches!(item, Err(LlmError::Stream(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn no_streaming_reports_absent_stream() {
        let p = ScriptedMockProvider::new(vec![MockBehavior::NoStreaming]);
        assert!(p.stream(req()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_counts_invocations() {
        let p = ScriptedMockProvider::new(vec![]).with_complete_text("full");
        assert_eq!(p.complete_calls(), 0);
        let resp = p.complete(req()).await.unwrap();
        assert_eq!(resp.content, "full");
        assert_eq!(p.complete_calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_scripts_fall_back_to_placeholder() {
        let p = ScriptedMockProvider::new(vec![]);
        let mut s = p.stream(req()).await.unwrap().unwrap();
        let item = s.next().await.unwrap().unwrap();
        assert!(item.content.contains("no more scripts"));
    }

    #[tokio::test]
    async fn last_request_is_captured() {
        let p = ScriptedMockProvider::new(vec![]);
        let _ = p.stream(req()).await.unwrap();
        let captured = p.last_request.lock().unwrap();
        assert_eq!(captured.as_ref().unwrap().messages[0].content, "hi");
    }
}
