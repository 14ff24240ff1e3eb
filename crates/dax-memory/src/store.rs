// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::model::{EventType, PmEvent, PmUpdate, ProjectMemory};

/// DDL executed when the store is opened.  Idempotent so in-process tests
/// work without a migration step.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT,
    work_dir TEXT NOT NULL,
    git_remote TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pm_state (
    project_id TEXT PRIMARY KEY NOT NULL,
    state_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pm_events (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    command TEXT NOT NULL,
    before_json TEXT NOT NULL,
    after_json TEXT NOT NULL,
    note TEXT,
    event_type TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pm_events_project ON pm_events (project_id);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persists [`ProjectMemory`] snapshots and the append-only event log.
///
/// Writes are serialized behind the connection mutex; concurrent readers
/// observe a consistent snapshot.  Snapshots written to `pm_events` are
/// never redacted — undo fidelity requires the raw values; redaction is a
/// display concern ([`crate::redact`]).
pub struct PmStore {
    conn: Mutex<Connection>,
    write_count: AtomicU64,
}

impl PmStore {
    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            write_count: AtomicU64::new(0),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            write_count: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register a project row.  Existing rows are left untouched so the id
    /// stays stable across sessions.
    pub fn ensure_project(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        work_dir: &str,
        git_remote: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO projects (id, user_id, work_dir, git_remote)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, user_id, work_dir, git_remote],
        )?;
        Ok(())
    }

    /// Load the current memory for a project.  Missing state yields a fresh
    /// default.  Legacy `always_allow` string entries normalize during
    /// deserialization (see [`crate::model::AllowRule`]).
    pub fn load(&self, project_id: &str) -> Result<ProjectMemory, StoreError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT state_json FROM pm_state WHERE project_id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(ProjectMemory::new(project_id)),
        }
    }

    /// Merge `update` into the current state, persist the result, and append
    /// an `update` event with full before/after snapshots.
    pub fn save(
        &self,
        project_id: &str,
        update: &PmUpdate,
        actor: &str,
        command: &str,
        note: Option<&str>,
    ) -> Result<ProjectMemory, StoreError> {
        let before = self.load(project_id)?;
        let after = before.merge(update);
        self.write_state(project_id, &after)?;
        self.append_event(&PmEvent {
            id: new_event_id(),
            project_id: project_id.to_string(),
            ts: Utc::now(),
            actor: actor.to_string(),
            command: command.to_string(),
            before,
            after: after.clone(),
            note: note.map(str::to_string),
            event_type: EventType::Update,
        })?;
        self.write_count.fetch_add(1, Ordering::SeqCst);
        debug!(project_id, command, "project memory saved");
        Ok(after)
    }

    /// Undo the most recent mutating event.
    ///
    /// Selects the newest event that is not itself an undo or rao_purge and
    /// restores its `before` snapshot (with a fresh `last_updated`),
    /// recording the restoration as a new `undo` event.  Returns `None`
    /// when there is nothing to undo.
    pub fn undo(&self, project_id: &str, actor: &str) -> Result<Option<ProjectMemory>, StoreError> {
        let target = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT before_json FROM pm_events
                 WHERE project_id = ?1 AND event_type NOT IN ('undo', 'rao_purge')
                 ORDER BY rowid DESC LIMIT 1",
                params![project_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        };
        let Some(before_json) = target else {
            return Ok(None);
        };

        let mut restored: ProjectMemory = serde_json::from_str(&before_json)?;
        restored.last_updated = Utc::now();

        let current = self.load(project_id)?;
        self.write_state(project_id, &restored)?;
        self.append_event(&PmEvent {
            id: new_event_id(),
            project_id: project_id.to_string(),
            ts: Utc::now(),
            actor: actor.to_string(),
            command: "undo".to_string(),
            before: current,
            after: restored.clone(),
            note: None,
            event_type: EventType::Undo,
        })?;
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(Some(restored))
    }

    /// Drop the RAO history, recording a `rao_purge` event.  Purge events
    /// are invisible to `undo`.
    pub fn purge_rao(&self, project_id: &str, actor: &str) -> Result<ProjectMemory, StoreError> {
        let before = self.load(project_id)?;
        let mut after = before.clone();
        after.rao = None;
        after.last_updated = Utc::now();
        self.write_state(project_id, &after)?;
        self.append_event(&PmEvent {
            id: new_event_id(),
            project_id: project_id.to_string(),
            ts: Utc::now(),
            actor: actor.to_string(),
            command: "rao purge".to_string(),
            before,
            after: after.clone(),
            note: None,
            event_type: EventType::RaoPurge,
        })?;
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(after)
    }

    /// The event log for a project, oldest first.
    pub fn events(&self, project_id: &str) -> Result<Vec<PmEvent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, ts, actor, command, before_json, after_json, note, event_type
             FROM pm_events WHERE project_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, project_id, ts, actor, command, before_json, after_json, note, event_type) =
                row?;
            events.push(PmEvent {
                id,
                project_id,
                ts: parse_ts(&ts),
                actor,
                command,
                before: serde_json::from_str(&before_json)?,
                after: serde_json::from_str(&after_json)?,
                note,
                event_type: EventType::parse(&event_type).unwrap_or(EventType::Update),
            });
        }
        Ok(events)
    }

    /// Monotonically increasing count of state writes performed by this
    /// store instance.  Tests use it to assert write frequency.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    fn write_state(&self, project_id: &str, state: &ProjectMemory) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO pm_state (project_id, state_json, updated_at)
             VALUES (?1, ?2, ?3)",
            params![project_id, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn append_event(&self, event: &PmEvent) -> Result<(), StoreError> {
        let before_json = serde_json::to_string(&event.before)?;
        let after_json = serde_json::to_string(&event.after)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pm_events
             (id, project_id, ts, actor, command, before_json, after_json, note, event_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.id,
                event.project_id,
                event.ts.to_rfc3339(),
                event.actor,
                event.command,
                before_json,
                after_json,
                event.note,
                event.event_type.as_str(),
            ],
        )?;
        Ok(())
    }
}

fn new_event_id() -> String {
    format!("pme_{}", Uuid::new_v4())
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
