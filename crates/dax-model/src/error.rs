// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Errors surfaced by a model provider.
///
/// Retry policy is the caller's responsibility; the provider reports what
/// happened and nothing more.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The provider API answered with an error status.
    #[error("{provider} error {status} ({code}): {message}")]
    Http {
        provider: String,
        status: u16,
        code: String,
        message: String,
    },

    /// The stream generator failed after being established.
    #[error("provider stream failed: {0}")]
    Stream(String),

    /// `stream()` was required but this provider only implements `complete()`.
    #[error("provider does not support streaming")]
    StreamingUnsupported,

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Short machine-readable code for telemetry and the fallback policy.
    pub fn code(&self) -> &str {
        match self {
            LlmError::Http { code, .. } => code,
            LlmError::Stream(_) => "stream_failed",
            LlmError::StreamingUnsupported => "streaming_unsupported",
            LlmError::Other(_) => "provider_error",
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_contains_all_parts() {
        let e = LlmError::Http {
            provider: "chatgpt-plus".into(),
            status: 502,
            code: "SUBSCRIPTION_UPSTREAM_AUTH_FAILED".into(),
            message: "upstream auth failed".into(),
        };
        let s = e.to_string();
        assert!(s.contains("chatgpt-plus"));
        assert!(s.contains("502"));
        assert!(s.contains("SUBSCRIPTION_UPSTREAM_AUTH_FAILED"));
    }

    #[test]
    fn code_for_stream_error() {
        assert_eq!(LlmError::Stream("boom".into()).code(), "stream_failed");
    }

    #[test]
    fn code_for_http_error_is_api_code() {
        let e = LlmError::Http {
            provider: "p".into(),
            status: 429,
            code: "rate_limited".into(),
            message: "slow down".into(),
        };
        assert_eq!(e.code(), "rate_limited");
    }
}
