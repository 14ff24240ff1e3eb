// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod error;
pub mod fallback;
pub mod mock;
pub mod provider;
pub mod types;

pub use error::LlmError;
pub use fallback::{resolve_fallback, ProviderAvailability};
pub use mock::{MockBehavior, ScriptedMockProvider};
pub use provider::{from_name, LlmProvider, ResponseStream};
pub use types::{
    CompletionRequest, LlmResponse, Message, Role, SamplingParams, ToolCallRequest, ToolSchema,
    Usage,
};
