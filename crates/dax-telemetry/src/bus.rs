// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use tracing::warn;

use crate::TelemetryEvent;

const DEFAULT_CAPACITY: usize = 300;

pub type SubscriptionId = u64;

type Handler = Box<dyn Fn(&TelemetryEvent, &[TelemetryEvent]) + Send>;

/// Bounded FIFO event ring with synchronous fan-out.
///
/// `emit` appends, drops the oldest event over capacity, then notifies every
/// subscriber in registration order with the event and a snapshot copy of
/// the current list.  A panicking handler is caught and logged; the
/// remaining handlers still run.  Handlers run under the bus lock, so a
/// handler that emits again deadlocks — no reentrancy guarantee is given.
pub struct TelemetryBus {
    inner: Mutex<BusInner>,
}

struct BusInner {
    events: VecDeque<TelemetryEvent>,
    capacity: usize,
    subscribers: Vec<(SubscriptionId, Handler)>,
    next_id: SubscriptionId,
}

impl TelemetryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                events: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                capacity,
                subscribers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    pub fn emit(&self, event: TelemetryEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.events.push_back(event.clone());
        while inner.events.len() > inner.capacity {
            inner.events.pop_front();
        }
        // Snapshot copy so handlers never alias the internal buffer.
        let snapshot: Vec<TelemetryEvent> = inner.events.iter().cloned().collect();
        for (id, handler) in &inner.subscribers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&event, &snapshot)));
            if result.is_err() {
                warn!(subscriber = id, "telemetry subscriber panicked; continuing");
            }
        }
    }

    /// Register a handler; returns the id to pass to [`unsubscribe`].
    ///
    /// [`unsubscribe`]: TelemetryBus::unsubscribe
    pub fn subscribe(
        &self,
        handler: impl Fn(&TelemetryEvent, &[TelemetryEvent]) + Send + 'static,
    ) -> SubscriptionId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|(sid, _)| *sid != id);
    }

    /// Snapshot copy of the current event list.
    pub fn list(&self) -> Vec<TelemetryEvent> {
        self.inner.lock().unwrap().events.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().events.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
