//! Event fan-out.
//!
//! The pipeline exposes exactly three event kinds to the outside world:
//! `Violation`, `VehicleCount`, and `FrameProcessed`. Kinds are a closed
//! enum, so an unknown event type cannot be registered or dispatched in the
//! first place.
//!
//! Dispatch invokes handlers in registration order and isolates failures: a
//! handler returning an error is logged and skipped, and the dispatching
//! caller never sees it. The bus is an explicit instance owned by the
//! pipeline (constructed at startup, dropped at shutdown), not module-level
//! state. Handlers run under the registry lock, so they must not register
//! new handlers from within a dispatch.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use crate::{ViolationCounts, ViolationRecord};

/// The event kinds the pipeline emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Violation,
    VehicleCount,
    FrameProcessed,
}

/// Per-frame summary carried by `FrameProcessed` events. The annotated
/// frame itself stays in the processing result; subscribers that need
/// pixels read them there.
#[derive(Clone, Debug, Serialize)]
pub struct FrameSummary {
    pub timestamp_ms: u64,
    pub source_id: String,
    pub vehicle_count: u32,
    pub violation_counts: ViolationCounts,
}

/// Payloads, one variant per event kind.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventPayload {
    Violation(ViolationRecord),
    VehicleCount { timestamp_ms: u64, count: u32 },
    FrameProcessed(FrameSummary),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Violation(_) => EventKind::Violation,
            EventPayload::VehicleCount { .. } => EventKind::VehicleCount,
            EventPayload::FrameProcessed(_) => EventKind::FrameProcessed,
        }
    }
}

type Handler = Box<dyn Fn(&EventPayload) -> Result<()> + Send + Sync>;

/// Typed callback registry with isolated dispatch.
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for one event kind. Handlers fire in
    /// registration order.
    pub fn register<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&EventPayload) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Invoke every handler registered for the payload's kind.
    ///
    /// A failing handler is logged and skipped; the failure never reaches
    /// the caller or the remaining handlers.
    pub fn dispatch(&self, payload: &EventPayload) {
        let handlers = match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(registered) = handlers.get(&payload.kind()) else {
            return;
        };
        for (i, handler) in registered.iter().enumerate() {
            if let Err(e) = handler(payload) {
                log::warn!(
                    "{:?} handler #{} failed: {:#}; continuing dispatch",
                    payload.kind(),
                    i,
                    e
                );
            }
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
