// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_agent_name() -> String {
    "dax".into()
}
fn default_max_tool_rounds() -> u32 {
    20
}
fn default_max_outcomes() -> usize {
    20
}
fn default_first_token_timeout_ms() -> u64 {
    30_000
}
fn default_overall_timeout_ms() -> u64 {
    120_000
}
fn default_policy() -> String {
    "balanced".into()
}
fn default_fallback_page_chars() -> usize {
    512
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub contract: ContractConfig,
    #[serde(default)]
    pub tui: TuiConfig,
    /// Base URL for the control CLI.  Overridden by DAX_API_URL.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Active sampling-policy preset name.  Overridden by DAX_POLICY.
    /// Run `dax show-config` to see the resolved preset values.
    #[serde(default = "default_policy")]
    pub policy: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            scope: ScopeConfig::default(),
            contract: ContractConfig::default(),
            tui: TuiConfig::default(),
            api_url: None,
            policy: default_policy(),
        }
    }
}

impl Config {
    /// Resolve the active sampling preset.  Unknown names fall back to
    /// `balanced` so a typo in DAX_POLICY never disables the agent.
    pub fn sampling(&self) -> PolicyPreset {
        policy_preset(&self.policy).unwrap_or_else(|| policy_preset("balanced").unwrap())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent display name used in the system prompt and TUI metadata
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    /// Default mode when none is specified on the CLI
    #[serde(default)]
    pub default_mode: AgentMode,
    /// Maximum number of autonomous tool-call rounds before stopping
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Bound on `recent_outcomes` kept in project memory
    #[serde(default = "default_max_outcomes")]
    pub max_outcomes: usize,
    /// Milliseconds the coordinator waits for the first streamed token
    #[serde(default = "default_first_token_timeout_ms")]
    pub first_token_timeout_ms: u64,
    /// Milliseconds the stream may run after the first token arrived
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
    /// Page size (chars) for chunks synthesized on the complete() fallback
    #[serde(default = "default_fallback_page_chars")]
    pub fallback_page_chars: usize,
    /// Telemetry rendering mode for the thinking view
    #[serde(default)]
    pub thinking: ThinkingMode,
    /// System prompt override; leave None to use the built-in prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            default_mode: AgentMode::Build,
            max_tool_rounds: default_max_tool_rounds(),
            max_outcomes: default_max_outcomes(),
            first_token_timeout_ms: default_first_token_timeout_ms(),
            overall_timeout_ms: default_overall_timeout_ms(),
            fallback_page_chars: default_fallback_page_chars(),
            thinking: ThinkingMode::Minimal,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Full agent with read/write tools
    #[default]
    Build,
    /// Generate a structured plan; write and edit tools are refused
    Plan,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Build => write!(f, "build"),
            AgentMode::Plan => write!(f, "plan"),
        }
    }
}

/// Presentation policy for the phased thinking view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    /// Render nothing
    Off,
    /// Last two phases, two steps each, verb-stripped labels
    #[default]
    Minimal,
    /// Last three phases, six steps each, timing rows included
    Verbose,
}

impl std::fmt::Display for ThinkingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThinkingMode::Off => write!(f, "off"),
            ThinkingMode::Minimal => write!(f, "minimal"),
            ThinkingMode::Verbose => write!(f, "verbose"),
        }
    }
}

/// Declared per-session edit budget.  The scope tracker accounts file and
/// LOC deltas against these limits; `None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default)]
    pub max_loc: Option<usize>,
    /// Glob patterns (`*` within a path segment, `**` across segments)
    /// naming the files the session is allowed to account against its
    /// budget.  Changes outside these patterns are ignored by the tracker.
    #[serde(default = "ScopeConfig::default_patterns")]
    pub allowed_patterns: Vec<String>,
}

impl ScopeConfig {
    fn default_patterns() -> Vec<String> {
        vec!["src/**".into()]
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_files: None,
            max_loc: None,
            allowed_patterns: Self::default_patterns(),
        }
    }
}

// ── Contract rules ────────────────────────────────────────────────────────────

/// Content rules applied to candidate file writes, loaded from the
/// `contract:` key of the config document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractConfig {
    #[serde(default)]
    pub forbidden: ForbiddenRules,
    #[serde(default)]
    pub architecture: ArchitectureRules,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForbiddenRules {
    /// Per-line regex patterns, e.g. `: any` or `as any`
    #[serde(default)]
    pub types: Vec<String>,
    /// Per-line substring matches, e.g. `eval(`
    #[serde(default)]
    pub apis: Vec<String>,
    /// Named patterns; currently recognized: "default export"
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchitectureRules {
    /// Warn when the running brace depth on a line exceeds this value
    #[serde(default)]
    pub max_nesting: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuiConfig {
    /// Force the TUI backend even when a prompt was given.
    /// Overridden by DAX_TUI.
    #[serde(default)]
    pub force_tui: bool,
    /// Allow the TUI bridge to run without a TTY on stdin.
    /// Overridden by DAX_TUI_ALLOW_PIPE.
    #[serde(default)]
    pub allow_pipe: bool,
    /// Command used to spawn the external renderer subprocess
    #[serde(default = "TuiConfig::default_renderer_cmd")]
    pub renderer_cmd: String,
}

impl TuiConfig {
    fn default_renderer_cmd() -> String {
        "dax-tui".into()
    }
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            force_tui: false,
            allow_pipe: false,
            renderer_cmd: Self::default_renderer_cmd(),
        }
    }
}

// ── Sampling presets ──────────────────────────────────────────────────────────

/// A named sampling-parameter preset forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolicyPreset {
    pub name: &'static str,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

const POLICY_PRESETS: &[PolicyPreset] = &[
    PolicyPreset {
        name: "safe",
        temperature: 0.1,
        top_p: 0.8,
        max_tokens: 2048,
    },
    PolicyPreset {
        name: "balanced",
        temperature: 0.2,
        top_p: 0.95,
        max_tokens: 4096,
    },
    PolicyPreset {
        name: "aggressive",
        temperature: 0.45,
        top_p: 1.0,
        max_tokens: 8192,
    },
];

/// Look up a preset by name.  Returns `None` for unknown names.
pub fn policy_preset(name: &str) -> Option<PolicyPreset> {
    POLICY_PRESETS.iter().find(|p| p.name == name).copied()
}

/// All known preset names, in definition order.
pub fn policy_names() -> Vec<&'static str> {
    POLICY_PRESETS.iter().map(|p| p.name).collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
