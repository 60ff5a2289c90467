//! Event ingest — validation and idempotent dedupe in front of the
//! matcher.
//!
//! Repeated deliveries of the same `(lead_id, trigger_id, occurred_at)`
//! event are dropped here so trigger matching stays idempotent under
//! at-least-once delivery from the events API.

use std::sync::Arc;

use tracing::debug;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::event_bus::{make_event, EventSink};
use cadence_core::types::{EventType, FunnelEvent};
use cadence_store::FunnelStore;

use crate::engine::FunnelEngine;

pub struct EventIngest {
    store: Arc<dyn FunnelStore>,
    engine: Arc<FunnelEngine>,
    event_sink: Arc<dyn EventSink>,
}

impl EventIngest {
    pub fn new(store: Arc<dyn FunnelStore>, engine: Arc<FunnelEngine>) -> Self {
        Self {
            store,
            engine,
            event_sink: cadence_core::event_bus::noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Validate, dedupe, and route one event. Returns the stage entered,
    /// or `None` when the event was a duplicate or a no-op.
    pub async fn process(&self, event: &FunnelEvent) -> CadenceResult<Option<String>> {
        if event.lead_id.is_empty() || event.trigger_id.is_empty() {
            return Err(CadenceError::Validation(
                "event requires lead_id and trigger_id".into(),
            ));
        }

        metrics::counter!("ingest.events").increment(1);

        if !self.store.record_event(&event.dedupe_key()) {
            debug!(
                lead_id = %event.lead_id,
                trigger_id = %event.trigger_id,
                "Duplicate event dropped"
            );
            metrics::counter!("ingest.duplicates").increment(1);
            self.event_sink.emit(make_event(
                EventType::EventDeduped,
                None,
                Some(event.lead_id.clone()),
                Some(event.trigger_id.clone()),
            ));
            return Ok(None);
        }

        self.engine.handle_event(event).await
    }
}
