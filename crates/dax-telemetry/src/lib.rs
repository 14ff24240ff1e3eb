// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod bus;
pub mod event;
pub mod render;
pub mod view;

pub use bus::{SubscriptionId, TelemetryBus};
pub use event::{EventKind, ExecutionPhase, TelemetryEvent};
pub use render::DeltaRenderer;
pub use view::{build_view, PhaseRow, ThinkingView};
