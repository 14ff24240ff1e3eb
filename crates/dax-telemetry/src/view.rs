// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dax_config::ThinkingMode;

use crate::{EventKind, ExecutionPhase, TelemetryEvent};

/// Maximum characters an item may occupy, ellipsis included.
const MAX_ITEM_CHARS: usize = 120;

/// The phased view of a turn, derived from the telemetry event list.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingView {
    /// Currently active phase (phase of the last event; initial = understanding)
    pub phase: ExecutionPhase,
    pub mode: ThinkingMode,
    /// Rows sorted by total phase order
    pub rows: Vec<PhaseRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRow {
    pub phase: ExecutionPhase,
    pub items: Vec<String>,
    /// Timestamp of the first event that contributed to this row
    pub ts: DateTime<Utc>,
}

/// Presentation policy per thinking mode.
struct ModePolicy {
    phases_shown: usize,
    steps_per_phase: usize,
    show_tools: bool,
    show_gates: bool,
    show_timing: bool,
    collapse: bool,
    strip_verbs: bool,
}

fn policy(mode: ThinkingMode) -> ModePolicy {
    match mode {
        ThinkingMode::Off => ModePolicy {
            phases_shown: 0,
            steps_per_phase: 0,
            show_tools: false,
            show_gates: false,
            show_timing: false,
            collapse: false,
            strip_verbs: false,
        },
        ThinkingMode::Minimal => ModePolicy {
            phases_shown: 2,
            steps_per_phase: 2,
            show_tools: true,
            show_gates: true,
            show_timing: false,
            collapse: true,
            strip_verbs: true,
        },
        ThinkingMode::Verbose => ModePolicy {
            phases_shown: 3,
            steps_per_phase: 6,
            show_tools: true,
            show_gates: true,
            show_timing: true,
            collapse: false,
            strip_verbs: false,
        },
    }
}

/// Minimal-mode label rewrites.  Presentation only — the underlying events
/// are never modified.
const VERB_REWRITES: &[(&str, &str)] = &[
    ("interpreting request", "task parsed"),
    ("building context", "context loaded"),
    ("creating work notes", "drafting plan"),
    ("drafting response", "drafting reply"),
    ("first token received", "stream connected"),
    ("response ready", "reply ready"),
    ("plan draft started", "drafting plan"),
    ("processing follow-up request", "drafting reply"),
    ("continuing task loop", "executing steps"),
];

fn strip_verbs(text: &str) -> String {
    for (from, to) in VERB_REWRITES {
        if text == *from {
            return (*to).to_string();
        }
    }
    // "scanning X" → "X"
    if let Some(rest) = text.strip_prefix("scanning ") {
        if !rest.is_empty() {
            return rest.to_string();
        }
    }
    text.to_string()
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_item(text: &str) -> String {
    if text.chars().count() <= MAX_ITEM_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_ITEM_CHARS - 3).collect();
    format!("{head}...")
}

/// Build the phased view for `events` under the given thinking mode.
///
/// Pure: the same event list and mode always produce the same view.
pub fn build_view(events: &[TelemetryEvent], mode: ThinkingMode) -> ThinkingView {
    let pol = policy(mode);
    let active = events
        .last()
        .map(|e| e.phase())
        .unwrap_or(ExecutionPhase::Understanding);

    if mode == ThinkingMode::Off {
        return ThinkingView {
            phase: active,
            mode,
            rows: Vec::new(),
        };
    }

    // Accumulate items per phase, suppressing consecutive duplicates after
    // normalization.  BTreeMap keys keep rows in total phase order.
    let mut per_phase: BTreeMap<ExecutionPhase, (Vec<String>, DateTime<Utc>)> = BTreeMap::new();
    for event in events {
        let phase = event.phase();
        let raw = match &event.kind {
            EventKind::PhaseEnter { .. } => None,
            EventKind::PhaseStep { text, .. } => Some(text.clone()),
            EventKind::ToolStart { name, targets } => pol.show_tools.then(|| {
                if targets.is_empty() {
                    name.clone()
                } else {
                    format!("{name} {}", targets.join(" "))
                }
            }),
            EventKind::ToolOk { name } => pol.show_tools.then(|| format!("{name} ok")),
            EventKind::ToolFail { name, error } => {
                pol.show_tools.then(|| format!("{name} failed: {error}"))
            }
            EventKind::GateWarn { code, subject } => {
                pol.show_gates.then(|| format!("gate {code}: {subject}"))
            }
            EventKind::GateBlocked { code, subject } => {
                pol.show_gates.then(|| format!("blocked {code}: {subject}"))
            }
            EventKind::Timing {
                stage,
                duration_ms,
                first_token_ms,
                ..
            } => pol.show_timing.then(|| match first_token_ms {
                Some(ft) => format!("{stage} {duration_ms}ms (first token {ft}ms)"),
                None => format!("{stage} {duration_ms}ms"),
            }),
        };
        let Some(raw) = raw else { continue };

        let mut item = normalize(&raw);
        if pol.strip_verbs {
            item = strip_verbs(&item);
        }
        let item = truncate_item(&item);

        let entry = per_phase.entry(phase).or_insert_with(|| (Vec::new(), event.ts));
        if entry.0.last() == Some(&item) {
            continue;
        }
        entry.0.push(item);
    }

    // The active phase is shown even before it has produced any items.
    let active_ts = events.last().map(|e| e.ts).unwrap_or_else(Utc::now);
    per_phase
        .entry(active)
        .or_insert_with(|| (Vec::new(), active_ts));

    let mut rows: Vec<PhaseRow> = per_phase
        .into_iter()
        .map(|(phase, (items, ts))| PhaseRow { phase, items, ts })
        .collect();

    // Collapse empty rows when something else is on screen.  Only the active
    // phase can be empty at this point.
    if pol.collapse && rows.len() > 1 {
        rows.retain(|r| !r.items.is_empty());
    }

    // Keep the last `phases_shown` phases in total order.
    if rows.len() > pol.phases_shown {
        rows.drain(..rows.len() - pol.phases_shown);
    }

    // Per-phase step cap with an overflow tail.
    for row in &mut rows {
        if row.items.len() > pol.steps_per_phase {
            let extra = row.items.len() - pol.steps_per_phase;
            row.items.truncate(pol.steps_per_phase);
            row.items.push(format!("... (+{extra} more)"));
        }
    }

    ThinkingView {
        phase: active,
        mode,
        rows,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn step(phase: ExecutionPhase, text: &str) -> TelemetryEvent {
        TelemetryEvent::phase_step(phase, text)
    }

    // ── Mode policy ───────────────────────────────────────────────────────────

    #[test]
    fn off_mode_renders_nothing() {
        let events = vec![
            TelemetryEvent::phase_enter(ExecutionPhase::Analysis),
            step(ExecutionPhase::Analysis, "thinking"),
        ];
        let view = build_view(&events, ThinkingMode::Off);
        assert!(view.rows.is_empty());
        assert_eq!(view.phase, ExecutionPhase::Analysis);
    }

    #[test]
    fn empty_event_list_starts_in_understanding() {
        let view = build_view(&[], ThinkingMode::Minimal);
        assert_eq!(view.phase, ExecutionPhase::Understanding);
    }

    // ── Seed scenario: dedup + minimal trim ───────────────────────────────────

    #[test]
    fn minimal_dedups_strips_and_trims() {
        let long: String = "x".repeat(140);
        let events = vec![
            TelemetryEvent::phase_enter(ExecutionPhase::Analysis),
            step(ExecutionPhase::Analysis, "  drafting response  "),
            step(ExecutionPhase::Analysis, "drafting response"),
            step(ExecutionPhase::Analysis, &long),
            step(ExecutionPhase::Analysis, "s4"),
            step(ExecutionPhase::Analysis, "s5"),
        ];
        let view = build_view(&events, ThinkingMode::Minimal);
        assert_eq!(view.rows.len(), 1);
        let row = &view.rows[0];
        assert_eq!(row.phase, ExecutionPhase::Analysis);
        assert_eq!(row.items[0], "drafting reply");
        assert!(row.items[1].chars().count() <= 120);
        assert!(row.items[1].ends_with("..."));
        assert_eq!(row.items[2], "... (+2 more)");
    }

    #[test]
    fn consecutive_duplicates_are_suppressed_after_normalization() {
        let events = vec![
            step(ExecutionPhase::Discovery, "reading   files"),
            step(ExecutionPhase::Discovery, "reading files"),
            step(ExecutionPhase::Discovery, "other"),
            step(ExecutionPhase::Discovery, "reading files"),
        ];
        let view = build_view(&events, ThinkingMode::Verbose);
        assert_eq!(
            view.rows[0].items,
            vec!["reading files", "other", "reading files"]
        );
    }

    #[test]
    fn no_two_consecutive_equal_items_in_any_row() {
        let events = vec![
            step(ExecutionPhase::Planning, "a"),
            step(ExecutionPhase::Planning, "a"),
            step(ExecutionPhase::Planning, "b"),
            step(ExecutionPhase::Planning, "b"),
        ];
        let view = build_view(&events, ThinkingMode::Verbose);
        for row in &view.rows {
            for pair in row.items.windows(2) {
                assert_ne!(pair[0], pair[1]);
            }
        }
    }

    // ── Ordering ──────────────────────────────────────────────────────────────

    #[test]
    fn rows_are_sorted_by_phase_order() {
        let events = vec![
            step(ExecutionPhase::Execution, "run"),
            step(ExecutionPhase::Discovery, "scan"),
            step(ExecutionPhase::Analysis, "think"),
        ];
        let view = build_view(&events, ThinkingMode::Verbose);
        let phases: Vec<ExecutionPhase> = view.rows.iter().map(|r| r.phase).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
    }

    #[test]
    fn minimal_keeps_last_two_phases() {
        let events = vec![
            step(ExecutionPhase::Understanding, "u"),
            step(ExecutionPhase::Discovery, "d"),
            step(ExecutionPhase::Analysis, "a"),
        ];
        let view = build_view(&events, ThinkingMode::Minimal);
        let phases: Vec<ExecutionPhase> = view.rows.iter().map(|r| r.phase).collect();
        assert_eq!(
            phases,
            vec![ExecutionPhase::Discovery, ExecutionPhase::Analysis]
        );
    }

    // ── Event class filters ───────────────────────────────────────────────────

    #[test]
    fn timing_rows_only_in_verbose() {
        let events = vec![TelemetryEvent::timing(
            ExecutionPhase::Execution,
            "stream",
            230,
            Some(40),
        )];
        let minimal = build_view(&events, ThinkingMode::Minimal);
        assert!(minimal.rows.iter().all(|r| r.items.is_empty()));
        let verbose = build_view(&events, ThinkingMode::Verbose);
        assert_eq!(verbose.rows[0].items, vec!["stream 230ms (first token 40ms)"]);
    }

    #[test]
    fn tool_events_land_in_execution_row() {
        let events = vec![
            TelemetryEvent::tool_start("write_file", vec!["src/a.ts".into()]),
            TelemetryEvent::tool_ok("write_file"),
        ];
        let view = build_view(&events, ThinkingMode::Verbose);
        let row = &view.rows[0];
        assert_eq!(row.phase, ExecutionPhase::Execution);
        assert_eq!(row.items, vec!["write_file src/a.ts", "write_file ok"]);
    }

    #[test]
    fn gate_events_land_in_verification_row() {
        let events = vec![TelemetryEvent::gate_blocked(
            "never_touch.path",
            "secrets/key.txt",
        )];
        let view = build_view(&events, ThinkingMode::Verbose);
        assert_eq!(view.rows[0].phase, ExecutionPhase::Verification);
        assert_eq!(
            view.rows[0].items,
            vec!["blocked never_touch.path: secrets/key.txt"]
        );
    }

    // ── Verb stripping ────────────────────────────────────────────────────────

    #[test]
    fn scanning_prefix_is_stripped_in_minimal() {
        let events = vec![step(ExecutionPhase::Discovery, "scanning src/lib.rs")];
        let view = build_view(&events, ThinkingMode::Minimal);
        assert_eq!(view.rows[0].items, vec!["src/lib.rs"]);
    }

    #[test]
    fn verbose_keeps_original_wording() {
        let events = vec![step(ExecutionPhase::Analysis, "drafting response")];
        let view = build_view(&events, ThinkingMode::Verbose);
        assert_eq!(view.rows[0].items, vec!["drafting response"]);
    }

    #[test]
    fn rewrite_table_applies_in_minimal() {
        let cases = [
            ("interpreting request", "task parsed"),
            ("first token received", "stream connected"),
            ("continuing task loop", "executing steps"),
        ];
        for (input, expected) in cases {
            let events = vec![step(ExecutionPhase::Understanding, input)];
            let view = build_view(&events, ThinkingMode::Minimal);
            assert_eq!(view.rows[0].items, vec![expected.to_string()], "{input}");
        }
    }

    // ── Active phase ──────────────────────────────────────────────────────────

    #[test]
    fn active_phase_row_kept_in_verbose_even_without_items() {
        let events = vec![TelemetryEvent::phase_enter(ExecutionPhase::Planning)];
        let view = build_view(&events, ThinkingMode::Verbose);
        assert_eq!(view.phase, ExecutionPhase::Planning);
        assert_eq!(view.rows.len(), 1);
        assert!(view.rows[0].items.is_empty());
    }

    #[test]
    fn minimal_collapses_empty_active_row_when_other_rows_exist() {
        let events = vec![
            step(ExecutionPhase::Analysis, "thought"),
            TelemetryEvent::phase_enter(ExecutionPhase::Planning),
        ];
        let view = build_view(&events, ThinkingMode::Minimal);
        assert_eq!(view.phase, ExecutionPhase::Planning);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].phase, ExecutionPhase::Analysis);
    }
}
