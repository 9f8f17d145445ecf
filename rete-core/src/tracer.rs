//! Optional structured event recording for debugging.
//!
//! Disjoint from the ambient `log` records the engine emits at telemetry
//! hook points (§6): a `Tracer` captures the same moments as structured,
//! in-process, queryable events with a ring-buffer bound, rather than
//! text lines sent to a logging backend.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    Assert,
    Retract,
    AlphaMatch,
    BetaJoin,
    Activation,
    Fire,
    Derive,
    Refraction,
    Error,
}

/// A single structured event. `node_id` holds either a network node id or
/// a production id rendered as a string, whichever the emitting site has
/// on hand; `correlation_id` lets callers stitch related events (e.g. all
/// events from one `assert` call) back together.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub data: Value,
    pub correlation_id: Option<String>,
}

/// Invoked synchronously for every recorded event. A subscriber that
/// panics is caught at the call site so it cannot corrupt engine state —
/// see [`Tracer::record`].
pub trait TraceSubscriber: Send + Sync {
    fn on_event(&self, event: &TraceEvent);
}

/// Bounded ring buffer of trace events plus a set of registered
/// subscribers. Disabled tracers (`Tracer::disabled()`) record nothing and
/// cost a single branch per call site.
pub struct Tracer {
    enabled: bool,
    max_events: usize,
    events: VecDeque<TraceEvent>,
    subscribers: Vec<(String, Arc<dyn TraceSubscriber>)>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.enabled)
            .field("max_events", &self.max_events)
            .field("events", &self.events.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Tracer {
    pub fn enabled(max_events: usize) -> Self {
        Tracer {
            enabled: true,
            max_events,
            events: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        Tracer {
            enabled: false,
            max_events: 0,
            events: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn subscribe(&mut self, id: impl Into<String>, subscriber: Arc<dyn TraceSubscriber>) {
        self.subscribers.push((id.into(), subscriber));
    }

    pub fn unsubscribe(&mut self, id: &str) {
        self.subscribers.retain(|(existing, _)| existing != id);
    }

    /// Record an event, evicting the oldest if over `max_events`, and
    /// invoke every subscriber. A `std::panic::catch_unwind` around each
    /// subscriber call means a broken subscriber drops its own event
    /// silently rather than poisoning the engine's own state.
    pub fn record(&mut self, kind: TraceEventKind, node_id: impl Into<String>, data: Value, correlation_id: Option<String>) {
        if !self.enabled {
            return;
        }
        let event = TraceEvent {
            kind,
            timestamp: Utc::now(),
            node_id: node_id.into(),
            data,
            correlation_id,
        };
        for (_, subscriber) in &self.subscribers {
            let subscriber = subscriber.clone();
            let event_ref = &event;
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_event(event_ref);
            }));
        }
        if self.events.len() >= self.max_events.max(1) {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn events(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
