// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dax_memory::{AllowKind, ProjectMemory};

use crate::pathglob::glob_match;
use crate::scope::ScopeExpansionCheck;
use crate::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnKind {
    NeverTouch,
    RequireApproval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateWarning {
    pub kind: WarnKind,
    /// Machine-readable code, e.g. `never_touch.path`, `require_approval.tool`
    pub code: String,
    /// The path or tool name the warning is about
    pub subject: String,
    pub message: String,
    /// The constraint patterns that matched, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<String>>,
}

/// Outcome of evaluating one tool-call batch against project memory.
///
/// Invariant: `blocked` implies `needs_approval`; a never_touch hit blocks
/// even when an always_allow rule also matched.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub blocked: bool,
    pub needs_approval: bool,
    pub warnings: Vec<GateWarning>,
    pub tool_calls: Vec<ToolCall>,
}

/// Evaluate a tool-call batch against the PM constraints.
///
/// Evaluation order per call: never_touch globs over the argument paths
/// (unconditional block), then the always_allow tool rules, then each
/// `require_approval_for` entry — tool-name match first, otherwise treated
/// as a path glob whose matches may be individually covered by
/// always_allow path rules.  A scope expansion reported by the tracker
/// appends one `require_approval.scope` warning for the batch.
pub fn evaluate_gates(
    tool_calls: &[ToolCall],
    pm: &ProjectMemory,
    scope: Option<&ScopeExpansionCheck>,
) -> GateResult {
    let constraints = &pm.constraints;
    let mut warnings: Vec<GateWarning> = Vec::new();
    let mut blocked = false;
    let mut approval_required = false;

    for call in tool_calls {
        let paths = extract_paths(&call.args);

        // 1. never_touch wins over everything, always_allow included.
        for path in &paths {
            let matched: Vec<String> = constraints
                .never_touch
                .iter()
                .filter(|glob| glob_match(glob, path))
                .cloned()
                .collect();
            if !matched.is_empty() {
                blocked = true;
                warnings.push(GateWarning {
                    kind: WarnKind::NeverTouch,
                    code: "never_touch.path".into(),
                    subject: path.clone(),
                    message: format!("{} touches restricted paths", call.name),
                    matches: Some(matched),
                });
            }
        }

        // 2. A tool-kind allow rule satisfies tool-name approval for this call.
        let tool_allowed = constraints
            .always_allow
            .iter()
            .any(|rule| rule.kind == AllowKind::Tool && glob_match(&rule.pattern, &call.name));

        // 3. require_approval_for: tool name first, else path glob.
        for pattern in &constraints.require_approval_for {
            if glob_match(pattern, &call.name) {
                if !tool_allowed {
                    approval_required = true;
                    warnings.push(GateWarning {
                        kind: WarnKind::RequireApproval,
                        code: "require_approval.tool".into(),
                        subject: call.name.clone(),
                        message: format!("tool {} requires approval", call.name),
                        matches: Some(vec![pattern.clone()]),
                    });
                }
                continue;
            }

            for path in &paths {
                if !glob_match(pattern, path) {
                    continue;
                }
                let covered = constraints.always_allow.iter().any(|rule| {
                    rule.kind == AllowKind::Path && glob_match(&rule.pattern, path)
                });
                if !covered {
                    approval_required = true;
                    warnings.push(GateWarning {
                        kind: WarnKind::RequireApproval,
                        code: "require_approval.path".into(),
                        subject: path.clone(),
                        message: format!("{} touches approval-gated paths", call.name),
                        matches: Some(vec![pattern.clone()]),
                    });
                }
            }
        }
    }

    // 4. Scope expansion applies to the batch as a whole.
    if constraints.require_approval_for_scope_expansion {
        if let Some(check) = scope {
            if check.needs_approval {
                approval_required = true;
                warnings.push(GateWarning {
                    kind: WarnKind::RequireApproval,
                    code: "require_approval.scope".into(),
                    subject: "scope".into(),
                    message: check.reason.clone(),
                    matches: None,
                });
            }
        }
    }

    GateResult {
        blocked,
        needs_approval: blocked || approval_required,
        warnings,
        tool_calls: tool_calls.to_vec(),
    }
}

/// Pull candidate paths out of a tool's argument object.
///
/// Understands the conventional keys `path` / `file` / `target` (strings)
/// and `files` / `targets` (string arrays); everything else is non-path.
pub fn extract_paths(args: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    let Some(map) = args.as_object() else {
        return paths;
    };
    for key in ["path", "file", "target"] {
        if let Some(s) = map.get(key).and_then(Value::as_str) {
            paths.push(s.to_string());
        }
    }
    for key in ["files", "targets"] {
        if let Some(items) = map.get(key).and_then(Value::as_array) {
            paths.extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    paths
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
