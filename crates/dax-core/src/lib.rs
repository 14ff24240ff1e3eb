// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent;
mod coordinator;
mod events;
mod prompts;

pub use agent::{Agent, ApproveAll, Approver, DenyAll};
pub use coordinator::{
    StreamCoordinator, StreamError, StreamOptions, StreamState, TimeoutKind, TurnOutput,
};
pub use events::AgentEvent;
pub use prompts::{system_prompt, PromptContext};
