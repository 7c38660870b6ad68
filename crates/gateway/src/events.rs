// Path: crates/gateway/src/events.rs
//! The lifecycle event bus.

use artifex_telemetry::gateway_metrics;
use artifex_types::event::ExecutionEvent;
use tokio::sync::broadcast;

/// Default buffered events per subscriber.
const BUS_CAPACITY: usize = 256;

/// Broadcast bus for lifecycle events. Events for one request are emitted
/// in order; slow subscribers may observe lag but never reordering.
pub struct EventBus {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribes to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    /// Publishes one event; dropped silently when nobody listens.
    pub fn emit(&self, event: ExecutionEvent) {
        let kind = match &event {
            ExecutionEvent::Queued { .. } => "queued",
            ExecutionEvent::Started { .. } => "started",
            ExecutionEvent::Progress { .. } => "progress",
            ExecutionEvent::Completed { .. } => "completed",
            ExecutionEvent::Error { .. } => "error",
        };
        gateway_metrics().inc_events_emitted(kind);
        tracing::debug!(target: "gateway", kind, "lifecycle event");
        let _ = self.tx.send(event);
    }
}
