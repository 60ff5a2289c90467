//! Unified event bus — trait for emitting orchestration events from any
//! module.
//!
//! Components accept an `Arc<dyn EventSink>` and emit run/funnel lifecycle
//! events into it. The binary wires a real sink; tests use `CaptureSink`.

use crate::types::{EventType, OrchestrationEvent};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Trait for emitting orchestration events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrchestrationEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: OrchestrationEvent) {}
}

/// Sink that writes every event to the structured log. The binary's
/// default: failures and cancellations reach the operator through the
/// log stream rather than being dropped.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: OrchestrationEvent) {
        tracing::info!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            run_id = ?event.run_id,
            lead_id = ?event.lead_id,
            detail = ?event.detail,
            "Orchestration event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<OrchestrationEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<OrchestrationEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: OrchestrationEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating `OrchestrationEvent` with minimal
/// boilerplate.
pub fn make_event(
    event_type: EventType,
    run_id: Option<Uuid>,
    lead_id: Option<String>,
    detail: Option<String>,
) -> OrchestrationEvent {
    OrchestrationEvent {
        event_id: Uuid::new_v4(),
        event_type,
        run_id,
        lead_id,
        detail,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create the log-backed sink used by the binary.
pub fn log_sink() -> Arc<dyn EventSink> {
    Arc::new(LogSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let run_id = Uuid::new_v4();
        sink.emit(make_event(
            EventType::RunStarted,
            Some(run_id),
            Some("lead-1".into()),
            None,
        ));
        sink.emit(make_event(
            EventType::StepDispatched,
            Some(run_id),
            Some("lead-1".into()),
            Some("step 0".into()),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::RunStarted), 1);
        assert_eq!(sink.count_type(EventType::StepDispatched), 1);

        let events = sink.events();
        assert_eq!(events[0].run_id, Some(run_id));
        assert_eq!(events[1].detail, Some("step 0".into()));
    }

    #[test]
    fn test_noop_sink() {
        let sink = noop_sink();
        // Should not panic
        sink.emit(make_event(EventType::RunCompleted, None, None, None));
    }

    #[test]
    fn test_log_sink_accepts_all_event_shapes() {
        let sink = log_sink();
        sink.emit(make_event(EventType::RunFailed, None, None, None));
        sink.emit(make_event(
            EventType::RunCancelled,
            Some(Uuid::new_v4()),
            Some("lead-1".into()),
            Some("lead removed".into()),
        ));
    }
}
