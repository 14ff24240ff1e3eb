// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Which alternate providers are installed and reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderAvailability {
    pub codex: bool,
    pub gemini_cli: bool,
    pub claude_cli: bool,
}

/// Pick the next provider after an auth/subscription failure.
///
/// First matching rule wins:
/// 1. A `chatgpt-plus` / `chatgpt-subscription` upstream-auth failure with
///    codex installed switches to `chatgpt-codex`.
/// 2. Any `chatgpt-*` auth failure without codex falls to `gemini-cli`,
/// 3. then to `claude-cli`,
/// 4. and to `None` when nothing is available.
///
/// This selects an alternate *provider*; it is independent of the stream
/// coordinator's in-call `complete()` fallback.
pub fn resolve_fallback(
    provider_id: &str,
    error_text: &str,
    availability: &ProviderAvailability,
) -> Option<&'static str> {
    let upstream_auth = error_text.contains("SUBSCRIPTION_UPSTREAM_AUTH_FAILED")
        || error_text.to_ascii_lowercase().contains("invalid subscription");

    if (provider_id.contains("chatgpt-plus") || provider_id.contains("chatgpt-subscription"))
        && upstream_auth
        && availability.codex
    {
        return Some("chatgpt-codex");
    }

    if provider_id.starts_with("chatgpt-") && is_subscription_auth_failure(error_text) {
        if !availability.codex && availability.gemini_cli {
            return Some("gemini-cli");
        }
        if !availability.codex && !availability.gemini_cli && availability.claude_cli {
            return Some("claude-cli");
        }
    }

    None
}

/// Broad classifier for subscription/auth failures from the ChatGPT-backed
/// providers.  Matches the upstream auth code plus the generic shapes those
/// endpoints produce.
fn is_subscription_auth_failure(error_text: &str) -> bool {
    if error_text.contains("SUBSCRIPTION_UPSTREAM_AUTH_FAILED") {
        return true;
    }
    let lower = error_text.to_ascii_lowercase();
    lower.contains("invalid subscription")
        || lower.contains("subscription expired")
        || lower.contains("unauthorized")
        || lower.contains("401")
        || lower.contains("403")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
