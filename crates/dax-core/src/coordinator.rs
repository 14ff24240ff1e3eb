// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use dax_model::{
    CompletionRequest, LlmError, LlmProvider, Message, SamplingParams, ToolCallRequest, ToolSchema,
};
use dax_telemetry::{ExecutionPhase, TelemetryBus, TelemetryEvent};

/// Explicit coordinator state, advanced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    RequestSent,
    AwaitingFirstToken,
    Streaming,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    FirstToken,
    Overall,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("no token received within {0} ms")]
    FirstTokenTimeout(u64),
    #[error("stream exceeded its overall budget of {0} ms")]
    OverallTimeout(u64),
    #[error("provider stream failed: {0}")]
    Provider(#[from] LlmError),
}

/// Per-call knobs and observation hooks.
pub struct StreamOptions {
    pub first_token_timeout_ms: u64,
    pub overall_timeout_ms: u64,
    pub on_first_token: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_timeout: Option<Box<dyn Fn(TimeoutKind) + Send + Sync>>,
    pub on_fallback: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            first_token_timeout_ms: 30_000,
            overall_timeout_ms: 120_000,
            on_first_token: None,
            on_timeout: None,
            on_fallback: None,
        }
    }
}

/// What one streamed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub content: String,
    /// Fully reconstructed tool-call batch, ordered by stream index
    pub tool_calls: Vec<ToolCallRequest>,
    pub used_fallback: bool,
}

/// Drives one provider stream per turn: arms the first-token and overall
/// deadlines, forwards content deltas to the chunk callback, reconstructs
/// tool-call batches from fragments, and falls back to `complete()` once
/// when the stream itself fails.
///
/// The coordinator owns the conversation: the streamed (or fallback)
/// assistant message is appended before a turn resolves.
pub struct StreamCoordinator {
    provider: Arc<dyn LlmProvider>,
    bus: Arc<TelemetryBus>,
    messages: Vec<Message>,
    tools: Vec<ToolSchema>,
    sampling: Option<SamplingParams>,
    fallback_page_chars: usize,
    state: StreamState,
}

impl StreamCoordinator {
    pub fn new(provider: Arc<dyn LlmProvider>, bus: Arc<TelemetryBus>) -> Self {
        Self {
            provider,
            bus,
            messages: Vec::new(),
            tools: Vec::new(),
            sampling: None,
            fallback_page_chars: 512,
            state: StreamState::Done,
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = Some(sampling);
        self
    }

    pub fn with_fallback_page_chars(mut self, chars: usize) -> Self {
        self.fallback_page_chars = chars.max(1);
        self
    }

    pub fn set_tools(&mut self, tools: Vec<ToolSchema>) {
        self.tools = tools;
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Append the user message and stream one turn.
    pub async fn chat_stream(
        &mut self,
        user_text: &str,
        on_chunk: &mut (dyn FnMut(&str) + Send),
        opts: StreamOptions,
    ) -> Result<TurnOutput, StreamError> {
        self.messages.push(Message::user(user_text));
        self.stream_turn(on_chunk, opts).await
    }

    /// Stream one turn over the current conversation.
    ///
    /// Used directly by the agent loop for tool-result follow-up rounds,
    /// where no new user message exists.
    pub async fn stream_turn(
        &mut self,
        on_chunk: &mut (dyn FnMut(&str) + Send),
        opts: StreamOptions,
    ) -> Result<TurnOutput, StreamError> {
        let req = CompletionRequest {
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            sampling: self.sampling,
        };

        self.state = StreamState::RequestSent;
        let started = Instant::now();
        let first_token_deadline = started + Duration::from_millis(opts.first_token_timeout_ms);

        let mut stream = match self.provider.stream(req.clone()).await {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                // Complete-only provider: no stream to race, one bounded call.
                return self.complete_only(req, on_chunk, &opts).await;
            }
            Err(err) => {
                // The stream could not even be established; same fallback as
                // a mid-stream failure.
                warn!(error = %err, "stream setup failed, falling back to complete()");
                return self.fallback_complete(req, String::new(), on_chunk, &opts).await;
            }
        };

        self.state = StreamState::AwaitingFirstToken;
        let mut acc = ToolCallAccumulator::default();
        let mut content = String::new();
        let mut first_token_at: Option<Instant> = None;
        let mut overall_deadline: Option<Instant> = None;

        loop {
            let deadline = overall_deadline.unwrap_or(first_token_deadline);
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => {
                    // Dropping the stream closes the provider iterator; no
                    // further chunk callback can fire after this point.
                    drop(stream);
                    self.state = StreamState::Error;
                    return Err(match overall_deadline {
                        None => {
                            if let Some(cb) = &opts.on_timeout {
                                cb(TimeoutKind::FirstToken);
                            }
                            StreamError::FirstTokenTimeout(opts.first_token_timeout_ms)
                        }
                        Some(_) => {
                            if let Some(cb) = &opts.on_timeout {
                                cb(TimeoutKind::Overall);
                            }
                            StreamError::OverallTimeout(opts.overall_timeout_ms)
                        }
                    });
                }
                item = stream.next() => match item {
                    None => break,
                    Some(Ok(chunk)) => {
                        let nonempty = !chunk.content.is_empty() || !chunk.tool_calls.is_empty();
                        if nonempty && first_token_at.is_none() {
                            let now = Instant::now();
                            first_token_at = Some(now);
                            overall_deadline =
                                Some(now + Duration::from_millis(opts.overall_timeout_ms));
                            self.state = StreamState::Streaming;
                            if let Some(cb) = &opts.on_first_token {
                                cb();
                            }
                            let elapsed = now.duration_since(started).as_millis() as u64;
                            self.bus.emit(TelemetryEvent::timing(
                                ExecutionPhase::Execution,
                                "first_token",
                                elapsed,
                                Some(elapsed),
                            ));
                        }
                        if !chunk.content.is_empty() {
                            content.push_str(&chunk.content);
                            on_chunk(&chunk.content);
                        }
                        for frag in chunk.tool_calls {
                            acc.merge(frag);
                        }
                    }
                    Some(Err(err)) => {
                        drop(stream);
                        if acc.is_empty() {
                            warn!(error = %err, "stream failed mid-flight, falling back to complete()");
                            return self.fallback_complete(req, content, on_chunk, &opts).await;
                        }
                        // A tool-call batch was already in flight; surface the
                        // failure instead of silently re-answering.
                        self.state = StreamState::Error;
                        return Err(StreamError::Provider(err));
                    }
                },
            }
        }

        self.state = StreamState::Done;
        let total_ms = Instant::now().duration_since(started).as_millis() as u64;
        let first_ms =
            first_token_at.map(|t| t.duration_since(started).as_millis() as u64);
        self.bus.emit(TelemetryEvent::timing(
            ExecutionPhase::Execution,
            "stream",
            total_ms,
            first_ms,
        ));

        let tool_calls = acc.finish();
        self.messages.push(if tool_calls.is_empty() {
            Message::assistant(&content)
        } else {
            Message::assistant_with_tool_calls(&content, tool_calls.clone())
        });

        Ok(TurnOutput {
            content,
            tool_calls,
            used_fallback: false,
        })
    }

    /// Complete-only mode for providers without `stream()`.  The whole call
    /// is bounded by the combined first-token + overall budget.  This is not
    /// the failure fallback: `on_fallback` does not fire.
    async fn complete_only(
        &mut self,
        req: CompletionRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
        opts: &StreamOptions,
    ) -> Result<TurnOutput, StreamError> {
        let budget = Duration::from_millis(opts.first_token_timeout_ms + opts.overall_timeout_ms);
        let resp = match tokio::time::timeout(budget, self.provider.complete(req)).await {
            Err(_) => {
                self.state = StreamState::Error;
                if let Some(cb) = &opts.on_timeout {
                    cb(TimeoutKind::Overall);
                }
                return Err(StreamError::OverallTimeout(opts.overall_timeout_ms));
            }
            Ok(Err(err)) => {
                self.state = StreamState::Error;
                return Err(StreamError::Provider(err));
            }
            Ok(Ok(resp)) => resp,
        };

        for page in paginate(&resp.content, self.fallback_page_chars) {
            on_chunk(page);
        }

        let mut acc = ToolCallAccumulator::default();
        for frag in resp.tool_calls {
            acc.merge(frag);
        }
        let tool_calls = acc.finish();

        self.messages.push(if tool_calls.is_empty() {
            Message::assistant(&resp.content)
        } else {
            Message::assistant_with_tool_calls(&resp.content, tool_calls.clone())
        });
        self.state = StreamState::Done;
        Ok(TurnOutput {
            content: resp.content,
            tool_calls,
            used_fallback: false,
        })
    }

    /// One-shot `complete()` fallback after a stream failure.  The full
    /// response content is synthesized through `on_chunk` in bounded pages.
    async fn fallback_complete(
        &mut self,
        req: CompletionRequest,
        streamed_prefix: String,
        on_chunk: &mut (dyn FnMut(&str) + Send),
        opts: &StreamOptions,
    ) -> Result<TurnOutput, StreamError> {
        if let Some(cb) = &opts.on_fallback {
            cb();
        }
        let resp = match self.provider.complete(req).await {
            Ok(resp) => resp,
            Err(err) => {
                self.state = StreamState::Error;
                return Err(StreamError::Provider(err));
            }
        };

        for page in paginate(&resp.content, self.fallback_page_chars) {
            on_chunk(page);
        }

        let mut acc = ToolCallAccumulator::default();
        for frag in resp.tool_calls {
            acc.merge(frag);
        }
        let tool_calls = acc.finish();

        let content = format!("{streamed_prefix}{}", resp.content);
        self.messages.push(if tool_calls.is_empty() {
            Message::assistant(&content)
        } else {
            Message::assistant_with_tool_calls(&content, tool_calls.clone())
        });
        self.state = StreamState::Done;
        Ok(TurnOutput {
            content,
            tool_calls,
            used_fallback: true,
        })
    }
}

/// Merges streamed tool-call fragments, keyed by the provider's
/// parallel-tool-call index.
#[derive(Default)]
struct ToolCallAccumulator {
    pending: HashMap<u32, ToolCallRequest>,
}

impl ToolCallAccumulator {
    fn merge(&mut self, frag: ToolCallRequest) {
        let entry = self
            .pending
            .entry(frag.index)
            .or_insert_with(|| ToolCallRequest {
                index: frag.index,
                ..Default::default()
            });
        if !frag.id.is_empty() {
            entry.id = frag.id;
        }
        if !frag.name.is_empty() {
            entry.name = frag.name;
        }
        entry.arguments.push_str(&frag.arguments);
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Flush accumulated calls ordered by index.  Calls with an empty name
    /// cannot be dispatched and are dropped; an empty id gets a synthetic
    /// one so the batch can still complete.
    fn finish(self) -> Vec<ToolCallRequest> {
        let mut sorted: Vec<(u32, ToolCallRequest)> = self.pending.into_iter().collect();
        sorted.sort_by_key(|(idx, _)| *idx);

        let mut out = Vec::with_capacity(sorted.len());
        for (i, (_, mut tc)) in sorted.into_iter().enumerate() {
            if tc.name.is_empty() {
                warn!(tool_call_id = %tc.id, "dropping tool call with empty name from model");
                continue;
            }
            if tc.id.is_empty() {
                tc.id = format!("tc_synthetic_{i}");
                warn!(tool_name = %tc.name, "tool call had empty id; generated synthetic id");
            }
            out.push(tc);
        }
        out
    }
}

/// Char-safe pagination of fallback content.
fn paginate(content: &str, page_chars: usize) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut pages = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in content.char_indices() {
        if count == page_chars {
            pages.push(&content[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    pages.push(&content[start..]);
    pages
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use dax_model::{LlmResponse, MockBehavior, Role, ScriptedMockProvider};

    use super::*;

    struct Callbacks {
        first_token: Arc<AtomicUsize>,
        fallback: Arc<AtomicUsize>,
        timeouts: Arc<Mutex<Vec<TimeoutKind>>>,
    }

    fn opts_with(first_ms: u64, overall_ms: u64) -> (StreamOptions, Callbacks) {
        let first_token = Arc::new(AtomicUsize::new(0));
        let fallback = Arc::new(AtomicUsize::new(0));
        let timeouts: Arc<Mutex<Vec<TimeoutKind>>> = Arc::new(Mutex::new(Vec::new()));
        let cb = Callbacks {
            first_token: first_token.clone(),
            fallback: fallback.clone(),
            timeouts: timeouts.clone(),
        };
        let opts = StreamOptions {
            first_token_timeout_ms: first_ms,
            overall_timeout_ms: overall_ms,
            on_first_token: Some(Box::new(move || {
                first_token.fetch_add(1, Ordering::SeqCst);
            })),
            on_timeout: Some(Box::new(move |kind| {
                timeouts.lock().unwrap().push(kind);
            })),
            on_fallback: Some(Box::new(move || {
                fallback.fetch_add(1, Ordering::SeqCst);
            })),
        };
        (opts, cb)
    }

    fn coordinator(provider: Arc<ScriptedMockProvider>) -> StreamCoordinator {
        StreamCoordinator::new(provider, Arc::new(TelemetryBus::default()))
    }

    // ── Seed scenario 1: first-token timeout ──────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn first_token_timeout_rejects_without_fallback() {
        let provider = Arc::new(ScriptedMockProvider::new(vec![
            MockBehavior::StreamNeverYields,
        ]));
        let mut coord = coordinator(provider.clone());
        let (opts, cb) = opts_with(60, 240);

        let started = Instant::now();
        let mut chunks = Vec::new();
        let result = coord
            .chat_stream("hello", &mut |c| chunks.push(c.to_string()), opts)
            .await;
        let elapsed = Instant::now().duration_since(started);

        assert!(matches!(result, Err(StreamError::FirstTokenTimeout(60))));
        assert!(elapsed <= Duration::from_millis(400));
        assert_eq!(cb.first_token.load(Ordering::SeqCst), 0);
        assert_eq!(cb.fallback.load(Ordering::SeqCst), 0);
        assert_eq!(*cb.timeouts.lock().unwrap(), vec![TimeoutKind::FirstToken]);
        assert_eq!(provider.complete_calls(), 0);
        assert!(chunks.is_empty());
        assert_eq!(coord.state(), StreamState::Error);
    }

    // ── Seed scenario 2: overall timeout after first token ────────────────────

    #[tokio::test(start_paused = true)]
    async fn overall_timeout_after_first_token() {
        let provider = Arc::new(ScriptedMockProvider::new(vec![
            MockBehavior::StreamThenHang(vec![LlmResponse::text("alpha")]),
        ]));
        let mut coord = coordinator(provider.clone());
        let (opts, cb) = opts_with(120, 180);

        let started = Instant::now();
        let mut chunks = Vec::new();
        let result = coord
            .chat_stream("hello", &mut |c| chunks.push(c.to_string()), opts)
            .await;
        let elapsed = Instant::now().duration_since(started);

        assert!(matches!(result, Err(StreamError::OverallTimeout(180))));
        assert!(elapsed <= Duration::from_millis(300));
        assert_eq!(cb.first_token.load(Ordering::SeqCst), 1);
        assert_eq!(*cb.timeouts.lock().unwrap(), vec![TimeoutKind::Overall]);
        assert_eq!(provider.complete_calls(), 0);
        assert_eq!(chunks, vec!["alpha"]);
    }

    // ── Seed scenario 3: stream failure fallback ──────────────────────────────

    #[tokio::test]
    async fn stream_failure_falls_back_to_complete() {
        let provider = Arc::new(
            ScriptedMockProvider::new(vec![MockBehavior::StreamFails("boom".into())])
                .with_complete_text("fallback-complete-response"),
        );
        let mut coord = coordinator(provider.clone());
        let (opts, cb) = opts_with(1_000, 5_000);

        let mut streamed = String::new();
        let output = coord
            .chat_stream("hello", &mut |c| streamed.push_str(c), opts)
            .await
            .unwrap();

        assert!(output.used_fallback);
        assert!(streamed.contains("fallback-complete-response"));
        assert_eq!(cb.fallback.load(Ordering::SeqCst), 1);
        assert_eq!(provider.complete_calls(), 1);

        let last = coord.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.contains("fallback-complete-response"));
        assert_eq!(coord.state(), StreamState::Done);
    }

    #[tokio::test]
    async fn stream_setup_failure_also_falls_back() {
        struct SetupFails {
            inner: ScriptedMockProvider,
        }
        #[async_trait::async_trait]
        impl LlmProvider for SetupFails {
            fn name(&self) -> &str {
                "setup-fails"
            }
            async fn complete(
                &self,
                req: CompletionRequest,
            ) -> Result<LlmResponse, LlmError> {
                self.inner.complete(req).await
            }
            async fn stream(
                &self,
                _req: CompletionRequest,
            ) -> Result<Option<dax_model::ResponseStream>, LlmError> {
                Err(LlmError::Stream("refused".into()))
            }
        }
        let provider = Arc::new(SetupFails {
            inner: ScriptedMockProvider::new(vec![]).with_complete_text("recovered"),
        });
        let mut coord = StreamCoordinator::new(provider, Arc::new(TelemetryBus::default()));
        let (opts, cb) = opts_with(1_000, 5_000);

        let mut streamed = String::new();
        let output = coord
            .chat_stream("hi", &mut |c| streamed.push_str(c), opts)
            .await
            .unwrap();
        assert!(output.used_fallback);
        assert_eq!(streamed, "recovered");
        assert_eq!(cb.fallback.load(Ordering::SeqCst), 1);
    }

    // ── Normal streaming ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn streamed_turn_appends_assistant_message() {
        let provider = Arc::new(ScriptedMockProvider::always_text("hello world"));
        let mut coord = coordinator(provider);
        let (opts, cb) = opts_with(1_000, 5_000);

        let mut streamed = String::new();
        let output = coord
            .chat_stream("hi", &mut |c| streamed.push_str(c), opts)
            .await
            .unwrap();

        assert_eq!(output.content, "hello world");
        assert_eq!(streamed, "hello world");
        assert!(!output.used_fallback);
        assert_eq!(cb.first_token.load(Ordering::SeqCst), 1);
        assert!(cb.timeouts.lock().unwrap().is_empty());

        let roles: Vec<Role> = coord.messages().iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn tool_call_fragments_merge_by_index() {
        let provider = Arc::new(ScriptedMockProvider::new(vec![MockBehavior::Stream(vec![
            LlmResponse::tool_call(ToolCallRequest {
                index: 0,
                id: "call-1".into(),
                name: "write_file".into(),
                arguments: r#"{"path":"#.into(),
            }),
            LlmResponse::tool_call(ToolCallRequest {
                index: 0,
                id: "".into(),
                name: "".into(),
                arguments: r#""a.ts"}"#.into(),
            }),
        ])]));
        let mut coord = coordinator(provider);
        let (opts, _cb) = opts_with(1_000, 5_000);

        let output = coord.chat_stream("hi", &mut |_| {}, opts).await.unwrap();
        assert_eq!(output.tool_calls.len(), 1);
        let tc = &output.tool_calls[0];
        assert_eq!(tc.id, "call-1");
        assert_eq!(tc.name, "write_file");
        assert_eq!(tc.arguments, r#"{"path":"a.ts"}"#);

        let last = coord.messages().last().unwrap();
        assert_eq!(last.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn parallel_tool_calls_keep_index_order() {
        let provider = Arc::new(ScriptedMockProvider::new(vec![MockBehavior::Stream(vec![
            LlmResponse::tool_call(ToolCallRequest {
                index: 1,
                id: "b".into(),
                name: "second".into(),
                arguments: "{}".into(),
            }),
            LlmResponse::tool_call(ToolCallRequest {
                index: 0,
                id: "a".into(),
                name: "first".into(),
                arguments: "{}".into(),
            }),
        ])]));
        let mut coord = coordinator(provider);
        let output = coord
            .chat_stream("hi", &mut |_| {}, StreamOptions::default())
            .await
            .unwrap();
        let names: Vec<&str> = output.tool_calls.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    // ── Complete-only mode ────────────────────────────────────────────────────

    #[tokio::test]
    async fn complete_only_provider_does_not_count_as_fallback() {
        let provider = Arc::new(
            ScriptedMockProvider::new(vec![MockBehavior::NoStreaming])
                .with_complete_text("full answer"),
        );
        let mut coord = coordinator(provider.clone());
        let (opts, cb) = opts_with(1_000, 5_000);

        let mut streamed = String::new();
        let output = coord
            .chat_stream("hi", &mut |c| streamed.push_str(c), opts)
            .await
            .unwrap();

        assert_eq!(output.content, "full answer");
        assert_eq!(streamed, "full answer");
        assert!(!output.used_fallback);
        assert_eq!(cb.fallback.load(Ordering::SeqCst), 0);
        assert_eq!(provider.complete_calls(), 1);
    }

    // ── Pagination ────────────────────────────────────────────────────────────

    #[test]
    fn paginate_splits_on_char_boundaries() {
        let pages = paginate("abcdef", 4);
        assert_eq!(pages, vec!["abcd", "ef"]);
        let pages = paginate("ééé", 2);
        assert_eq!(pages, vec!["éé", "é"]);
        assert!(paginate("", 4).is_empty());
    }

    #[tokio::test]
    async fn fallback_paginates_long_content() {
        let provider = Arc::new(
            ScriptedMockProvider::new(vec![MockBehavior::StreamFails("x".into())])
                .with_complete_text("a".repeat(1000)),
        );
        let mut coord = coordinator(provider).with_fallback_page_chars(256);
        let mut pages = 0usize;
        let output = coord
            .chat_stream("hi", &mut |_| pages += 1, StreamOptions::default())
            .await
            .unwrap();
        assert_eq!(pages, 4);
        assert_eq!(output.content.len(), 1000);
    }

    // ── Telemetry ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stream_emits_timing_events() {
        let bus = Arc::new(TelemetryBus::default());
        let provider = Arc::new(ScriptedMockProvider::always_text("hi"));
        let mut coord = StreamCoordinator::new(provider, bus.clone());
        coord
            .chat_stream("hello", &mut |_| {}, StreamOptions::default())
            .await
            .unwrap();
        let stages: Vec<String> = bus
            .list()
            .iter()
            .filter_map(|e| match &e.kind {
                dax_telemetry::EventKind::Timing { stage, .. } => Some(stage.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec!["first_token", "stream"]);
    }
}
