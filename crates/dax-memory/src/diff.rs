// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

use crate::model::ProjectMemory;

/// Compute which top-level keys differ between two PM snapshots.
///
/// `constraints` and `preferences` expand to dotted sub-keys
/// (`constraints.never_touch`) when only nested fields changed, so audit
/// output pinpoints the edit.  Keys are returned sorted.
pub fn changed_keys(a: &ProjectMemory, b: &ProjectMemory) -> Vec<String> {
    let a = serde_json::to_value(a).unwrap_or(Value::Null);
    let b = serde_json::to_value(b).unwrap_or(Value::Null);
    let (Value::Object(a), Value::Object(b)) = (a, b) else {
        return Vec::new();
    };

    let mut keys = Vec::new();
    let mut names: Vec<&String> = a.keys().chain(b.keys()).collect();
    names.sort();
    names.dedup();

    for name in names {
        let left = a.get(name.as_str()).unwrap_or(&Value::Null);
        let right = b.get(name.as_str()).unwrap_or(&Value::Null);
        if left == right {
            continue;
        }
        if matches!(name.as_str(), "constraints" | "preferences") {
            keys.extend(nested_changes(name, left, right));
        } else {
            keys.push(name.clone());
        }
    }
    keys.sort();
    keys
}

fn nested_changes(prefix: &str, left: &Value, right: &Value) -> Vec<String> {
    let (Value::Object(left), Value::Object(right)) = (left, right) else {
        return vec![prefix.to_string()];
    };
    let mut names: Vec<&String> = left.keys().chain(right.keys()).collect();
    names.sort();
    names.dedup();

    names
        .into_iter()
        .filter(|name| {
            left.get(name.as_str()).unwrap_or(&Value::Null)
                != right.get(name.as_str()).unwrap_or(&Value::Null)
        })
        .map(|name| format!("{prefix}.{name}"))
        .collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
