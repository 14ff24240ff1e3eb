// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The execution phases of one agent turn, in their total order.
///
/// The derived `Ord` follows declaration order, which is the order the
/// phased view sorts by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Understanding,
    Discovery,
    Analysis,
    Planning,
    Execution,
    Verification,
    Complete,
}

impl ExecutionPhase {
    pub const ALL: [ExecutionPhase; 7] = [
        ExecutionPhase::Understanding,
        ExecutionPhase::Discovery,
        ExecutionPhase::Analysis,
        ExecutionPhase::Planning,
        ExecutionPhase::Execution,
        ExecutionPhase::Verification,
        ExecutionPhase::Complete,
    ];

    /// Capitalized label for rendering ("Analysis").
    pub fn title(&self) -> &'static str {
        match self {
            ExecutionPhase::Understanding => "Understanding",
            ExecutionPhase::Discovery => "Discovery",
            ExecutionPhase::Analysis => "Analysis",
            ExecutionPhase::Planning => "Planning",
            ExecutionPhase::Execution => "Execution",
            ExecutionPhase::Verification => "Verification",
            ExecutionPhase::Complete => "Complete",
        }
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionPhase::Understanding => "understanding",
            ExecutionPhase::Discovery => "discovery",
            ExecutionPhase::Analysis => "analysis",
            ExecutionPhase::Planning => "planning",
            ExecutionPhase::Execution => "execution",
            ExecutionPhase::Verification => "verification",
            ExecutionPhase::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// One telemetry event on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "phase.enter")]
    PhaseEnter { phase: ExecutionPhase },
    #[serde(rename = "phase.step")]
    PhaseStep { phase: ExecutionPhase, text: String },
    #[serde(rename = "tool.start")]
    ToolStart { name: String, targets: Vec<String> },
    #[serde(rename = "tool.ok")]
    ToolOk { name: String },
    #[serde(rename = "tool.fail")]
    ToolFail { name: String, error: String },
    #[serde(rename = "gate.warn")]
    GateWarn { code: String, subject: String },
    #[serde(rename = "gate.blocked")]
    GateBlocked { code: String, subject: String },
    #[serde(rename = "timing")]
    Timing {
        phase: ExecutionPhase,
        stage: String,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_token_ms: Option<u64>,
    },
}

impl TelemetryEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            ts: Utc::now(),
            kind,
        }
    }

    pub fn phase_enter(phase: ExecutionPhase) -> Self {
        Self::new(EventKind::PhaseEnter { phase })
    }

    pub fn phase_step(phase: ExecutionPhase, text: impl Into<String>) -> Self {
        Self::new(EventKind::PhaseStep {
            phase,
            text: text.into(),
        })
    }

    pub fn tool_start(name: impl Into<String>, targets: Vec<String>) -> Self {
        Self::new(EventKind::ToolStart {
            name: name.into(),
            targets,
        })
    }

    pub fn tool_ok(name: impl Into<String>) -> Self {
        Self::new(EventKind::ToolOk { name: name.into() })
    }

    pub fn tool_fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(EventKind::ToolFail {
            name: name.into(),
            error: error.into(),
        })
    }

    pub fn gate_warn(code: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::new(EventKind::GateWarn {
            code: code.into(),
            subject: subject.into(),
        })
    }

    pub fn gate_blocked(code: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::new(EventKind::GateBlocked {
            code: code.into(),
            subject: subject.into(),
        })
    }

    pub fn timing(
        phase: ExecutionPhase,
        stage: impl Into<String>,
        duration_ms: u64,
        first_token_ms: Option<u64>,
    ) -> Self {
        Self::new(EventKind::Timing {
            phase,
            stage: stage.into(),
            duration_ms,
            first_token_ms,
        })
    }

    /// Classify this event into its display phase: phase events carry their
    /// own, tool events belong to execution, gate events to verification,
    /// timing to the phase it measured.
    pub fn phase(&self) -> ExecutionPhase {
        match &self.kind {
            EventKind::PhaseEnter { phase } | EventKind::PhaseStep { phase, .. } => *phase,
            EventKind::ToolStart { .. } | EventKind::ToolOk { .. } | EventKind::ToolFail { .. } => {
                ExecutionPhase::Execution
            }
            EventKind::GateWarn { .. } | EventKind::GateBlocked { .. } => {
                ExecutionPhase::Verification
            }
            EventKind::Timing { phase, .. } => *phase,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
