// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bound on the run/audit/override/clear history kept in project memory.
pub const MAX_RAO_SNAPSHOTS: usize = 50;

/// Stable project identifier: `prj_` + the first 16 hex chars of
/// SHA-256(work_dir "|" git_remote).  Immutable for the project's lifetime.
pub fn project_id(work_dir: &str, git_remote: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(work_dir.as_bytes());
    hasher.update(b"|");
    hasher.update(git_remote.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("prj_{}", &digest[..16])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowKind {
    Tool,
    Path,
}

/// A standing approval rule: a tool-name glob or a path glob that never
/// requires interactive approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowRule {
    pub kind: AllowKind,
    pub pattern: String,
}

impl AllowRule {
    pub fn tool(pattern: impl Into<String>) -> Self {
        Self {
            kind: AllowKind::Tool,
            pattern: pattern.into(),
        }
    }

    pub fn path(pattern: impl Into<String>) -> Self {
        Self {
            kind: AllowKind::Path,
            pattern: pattern.into(),
        }
    }
}

// Legacy memories stored always_allow entries as bare strings.  Those
// normalize to tool rules on load.
impl<'de> Deserialize<'de> for AllowRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Full { kind: AllowKind, pattern: String },
            Legacy(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Full { kind, pattern } => AllowRule { kind, pattern },
            Raw::Legacy(pattern) => AllowRule {
                kind: AllowKind::Tool,
                pattern,
            },
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Path globs the agent must never modify.  Wins over every allow rule.
    #[serde(default)]
    pub never_touch: Vec<String>,
    /// Tool names or path globs that require interactive approval.
    /// Evaluated tool-name-first, then as a path glob.
    #[serde(default)]
    pub require_approval_for: Vec<String>,
    #[serde(default)]
    pub always_allow: Vec<AllowRule>,
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default)]
    pub max_loc: Option<usize>,
    #[serde(default)]
    pub require_approval_for_scope_expansion: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default)]
    pub verbosity: Verbosity,
    #[serde(default)]
    pub explain_before_edit: bool,
    #[serde(default)]
    pub plan_before_tools: bool,
}

/// One recorded tool outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub ts: DateTime<Utc>,
    pub tool: String,
    pub success: bool,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaoKind {
    Run,
    Audit,
    Override,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaoEntry {
    pub ts: DateTime<Utc>,
    pub kind: RaoKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Persistent per-project constraints, preferences, and outcome history.
///
/// `project_id` is immutable; every other field mutates through the store's
/// `save`, which appends an event with full before/after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMemory {
    pub project_id: String,
    #[serde(default)]
    pub charter: Option<String>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub recent_outcomes: Vec<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rao: Option<Vec<RaoEntry>>,
    pub last_updated: DateTime<Utc>,
}

impl ProjectMemory {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            charter: None,
            constraints: Constraints::default(),
            preferences: Preferences::default(),
            recent_outcomes: Vec::new(),
            rao: None,
            last_updated: Utc::now(),
        }
    }

    /// Apply a partial update, producing the next snapshot.
    ///
    /// `constraints` and `preferences` merge field-wise; `recent_outcomes`
    /// and `rao` replace wholesale (rao bounded to [`MAX_RAO_SNAPSHOTS`]).
    /// `project_id` is never changed.
    pub fn merge(&self, update: &PmUpdate) -> ProjectMemory {
        let mut next = self.clone();
        if let Some(charter) = &update.charter {
            next.charter = Some(charter.clone());
        }
        if let Some(c) = &update.constraints {
            if let Some(v) = &c.never_touch {
                next.constraints.never_touch = v.clone();
            }
            if let Some(v) = &c.require_approval_for {
                next.constraints.require_approval_for = v.clone();
            }
            if let Some(v) = &c.always_allow {
                next.constraints.always_allow = v.clone();
            }
            if let Some(v) = c.max_files {
                next.constraints.max_files = Some(v);
            }
            if let Some(v) = c.max_loc {
                next.constraints.max_loc = Some(v);
            }
            if let Some(v) = c.require_approval_for_scope_expansion {
                next.constraints.require_approval_for_scope_expansion = v;
            }
        }
        if let Some(p) = &update.preferences {
            if let Some(v) = p.risk {
                next.preferences.risk = v;
            }
            if let Some(v) = p.verbosity {
                next.preferences.verbosity = v;
            }
            if let Some(v) = p.explain_before_edit {
                next.preferences.explain_before_edit = v;
            }
            if let Some(v) = p.plan_before_tools {
                next.preferences.plan_before_tools = v;
            }
        }
        if let Some(outcomes) = &update.recent_outcomes {
            next.recent_outcomes = outcomes.clone();
        }
        if let Some(rao) = &update.rao {
            let mut rao = rao.clone();
            if rao.len() > MAX_RAO_SNAPSHOTS {
                rao.drain(..rao.len() - MAX_RAO_SNAPSHOTS);
            }
            next.rao = Some(rao);
        }
        next.last_updated = Utc::now();
        next
    }
}

/// Partial update applied through [`ProjectMemory::merge`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PmUpdate {
    #[serde(default)]
    pub charter: Option<String>,
    #[serde(default)]
    pub constraints: Option<ConstraintsUpdate>,
    #[serde(default)]
    pub preferences: Option<PreferencesUpdate>,
    #[serde(default)]
    pub recent_outcomes: Option<Vec<Outcome>>,
    #[serde(default)]
    pub rao: Option<Vec<RaoEntry>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintsUpdate {
    #[serde(default)]
    pub never_touch: Option<Vec<String>>,
    #[serde(default)]
    pub require_approval_for: Option<Vec<String>>,
    #[serde(default)]
    pub always_allow: Option<Vec<AllowRule>>,
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default)]
    pub max_loc: Option<usize>,
    #[serde(default)]
    pub require_approval_for_scope_expansion: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
    #[serde(default)]
    pub explain_before_edit: Option<bool>,
    #[serde(default)]
    pub plan_before_tools: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Update,
    Undo,
    RaoPurge,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Update => "update",
            EventType::Undo => "undo",
            EventType::RaoPurge => "rao_purge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "update" => Some(EventType::Update),
            "undo" => Some(EventType::Undo),
            "rao_purge" => Some(EventType::RaoPurge),
            _ => None,
        }
    }
}

/// One entry of the append-only PM event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmEvent {
    /// `pme_<uuid-v4>`
    pub id: String,
    pub project_id: String,
    pub ts: DateTime<Utc>,
    pub actor: String,
    pub command: String,
    pub before: ProjectMemory,
    pub after: ProjectMemory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub event_type: EventType,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
