// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod diff;
pub mod model;
pub mod redact;
pub mod store;

pub use diff::changed_keys;
pub use model::{
    project_id, AllowKind, AllowRule, Constraints, ConstraintsUpdate, EventType, Outcome, PmEvent,
    PmUpdate, Preferences, PreferencesUpdate, ProjectMemory, RaoEntry, RaoKind, RiskLevel,
    Verbosity, MAX_RAO_SNAPSHOTS,
};
pub use redact::redact;
pub use store::{PmStore, StoreError};
