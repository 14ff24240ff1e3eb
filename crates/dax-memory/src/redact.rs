// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

pub const REDACTED: &str = "[redacted]";

fn secret_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(^|[_-])(token|secret|api_key|access_key|password|authorization|bearer|session|refresh_token|client_secret)([_-]|$)",
        )
        .unwrap()
    })
}

/// Replace the value of every key matching the secret pattern with a
/// placeholder, recursively through objects and arrays.
///
/// Applied only at display/serialization to external observers.  Stored
/// event snapshots keep the raw values — undo must restore them faithfully.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(key, val)| {
                    if secret_key_re().is_match(&key.to_ascii_lowercase()) {
                        (key.clone(), Value::String(REDACTED.into()))
                    } else {
                        (key.clone(), redact(val))
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
