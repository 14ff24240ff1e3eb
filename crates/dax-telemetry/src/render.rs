// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;

use dax_config::ThinkingMode;

use crate::{ExecutionPhase, ThinkingView};

/// Renders a [`ThinkingView`] as append-only terminal lines.
///
/// The renderer keeps a persistent `seen` set of keys; rendering the same
/// view twice yields nothing the second time, and rendering an extended
/// view yields exactly the new lines.
#[derive(Debug, Default)]
pub struct DeltaRenderer {
    seen: HashSet<String>,
}

impl DeltaRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything previously emitted, so the next render replays the
    /// full view.
    pub fn clear(&mut self) {
        self.seen.clear();
    }

    /// Produce the lines of `view` not yet emitted and mark them seen.
    pub fn render(&mut self, view: &ThinkingView) -> Vec<String> {
        if view.mode == ThinkingMode::Off {
            return Vec::new();
        }

        let mut lines = Vec::new();
        for row in &view.rows {
            // In minimal mode the complete phase collapses to one terminal
            // marker line; no header, no items.
            if view.mode == ThinkingMode::Minimal && row.phase == ExecutionPhase::Complete {
                if self.seen.insert("complete:marker".to_string()) {
                    lines.push("✓ Complete".to_string());
                }
                continue;
            }

            let header_key = format!("phase:{}", row.phase);
            if self.seen.insert(header_key) {
                let header = match view.mode {
                    ThinkingMode::Verbose => format!("▣ Phase: {}", row.phase.title()),
                    _ => format!("▣ {}", row.phase.title()),
                };
                lines.push(header);
            }

            for item in &row.items {
                let step_key = format!("step:{}:{item}", row.phase);
                if self.seen.insert(step_key) {
                    lines.push(format!("   • {item}"));
                }
            }
        }
        lines
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
