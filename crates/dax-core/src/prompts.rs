// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use dax_config::AgentMode;

/// Optional contextual blocks injected into the system prompt.
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    /// Agent display name ("dax" unless configured otherwise).
    pub agent_name: &'a str,
    /// One-line scope summary (allowed patterns + limits).
    pub scope_summary: Option<&'a str>,
    /// Rendered contract rules the model must respect in written files.
    pub contract_text: Option<&'a str>,
}

/// Compose the system prompt for `mode`.
///
/// A custom prompt replaces the built-in body entirely; scope and contract
/// blocks are appended either way so policy context is never lost.
pub fn system_prompt(mode: AgentMode, custom: Option<&str>, ctx: PromptContext<'_>) -> String {
    let name = if ctx.agent_name.is_empty() {
        "dax"
    } else {
        ctx.agent_name
    };

    let mut prompt = match custom {
        Some(text) => text.to_string(),
        None => match mode {
            AgentMode::Build => format!(
                "You are {name}, a terminal coding agent. Work on the user's task by \
                 calling the available tools, then answer with a concise summary of \
                 what changed. Prefer small, reviewable edits."
            ),
            AgentMode::Plan => format!(
                "You are {name}, a terminal coding agent in plan mode. Investigate \
                 with read-only tools and produce a structured plan. Do not write or \
                 edit any file: write and edit tools are refused in this mode."
            ),
        },
    };

    if let Some(scope) = ctx.scope_summary {
        prompt.push_str("\n\n## Scope\n\nStay within the declared edit budget: ");
        prompt.push_str(scope);
    }

    if let Some(contract) = ctx.contract_text {
        prompt.push_str("\n\n## Contract\n\nFile contents must respect these rules:\n");
        prompt.push_str(contract);
    }

    prompt
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
