// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod contract;
pub mod gate;
pub mod pathglob;
pub mod registry;
pub mod scope;
pub mod tool;

pub use contract::{ContractValidator, Severity, ValidationReport, Violation};
pub use gate::{evaluate_gates, extract_paths, GateResult, GateWarning, WarnKind};
pub use pathglob::{glob_match, glob_to_regex};
pub use registry::{ToolRegistry, ToolSchema};
pub use scope::{ScopeExpansionCheck, ScopeStatus, ScopeTracker};
pub use tool::{Tool, ToolCall, ToolContext, ToolOutput};
