// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::{CompletionRequest, LlmError, LlmResponse};

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<LlmResponse, LlmError>> + Send>>;

/// Capability consumed by the agent core: something that can complete a
/// conversation, and optionally stream it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier used in status display, telemetry, and the
    /// fallback policy (e.g. `"chatgpt-plus"`, `"claude-cli"`, `"mock"`).
    fn name(&self) -> &str;

    /// Send a completion request and return the full response.
    async fn complete(&self, req: CompletionRequest) -> Result<LlmResponse, LlmError>;

    /// Open a streaming response.
    ///
    /// Returns `Ok(None)` when this provider cannot stream; the coordinator
    /// then runs in complete-only mode.  The returned stream yields partial
    /// [`LlmResponse`] items: content deltas plus tool-call fragments keyed
    /// by index.
    async fn stream(&self, req: CompletionRequest) -> Result<Option<ResponseStream>, LlmError> {
        let _ = req;
        Ok(None)
    }
}

impl fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LlmProvider").field(&self.name()).finish()
    }
}

/// Resolve a provider by name.
///
/// Only `"mock"` is built in — concrete network providers live outside the
/// core and are injected by the host.  The error message points there.
pub fn from_name(name: &str) -> anyhow::Result<Arc<dyn LlmProvider>> {
    match name {
        "mock" => Ok(Arc::new(crate::mock::ScriptedMockProvider::always_text(
            "mock reply",
        ))),
        other => anyhow::bail!(
            "unknown provider {other:?}: the core ships only the \"mock\" provider; \
             network providers are supplied by the embedding application"
        ),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct CompleteOnly;

    #[async_trait]
    impl LlmProvider for CompleteOnly {
        fn name(&self) -> &str {
            "complete-only"
        }
        async fn complete(&self, _req: CompletionRequest) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse::text("full"))
        }
    }

    #[tokio::test]
    async fn default_stream_is_absent() {
        let p = CompleteOnly;
        let s = p.stream(CompletionRequest::default()).await.unwrap();
        assert!(s.is_none());
    }

    #[test]
    fn from_name_resolves_mock() {
        let p = from_name("mock").unwrap();
        assert_eq!(p.name(), "scripted-mock");
    }

    #[test]
    fn from_name_rejects_unknown_provider() {
        let err = from_name("chatgpt-plus").unwrap_err().to_string();
        assert!(err.contains("chatgpt-plus"));
    }
}
