//! Funnel engine — registration, event handling, and stage analytics.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{FunnelDefinition, FunnelEvent};
use cadence_channels::ChannelDispatcher;
use cadence_store::FunnelStore;

use crate::matcher::TriggerMatcher;
use crate::state_machine::{ApplyOutcome, FunnelStateMachine};

/// Aggregate stage occupancy for a funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelStats {
    pub funnel_id: Uuid,
    pub total_leads: u64,
    pub by_stage: HashMap<String, u64>,
}

/// Ties the trigger matcher and state machine together behind one
/// event-handling surface.
pub struct FunnelEngine {
    store: Arc<dyn FunnelStore>,
    matcher: TriggerMatcher,
    state_machine: FunnelStateMachine,
}

impl FunnelEngine {
    pub fn new(store: Arc<dyn FunnelStore>, dispatcher: Arc<ChannelDispatcher>) -> Self {
        Self {
            store: store.clone(),
            matcher: TriggerMatcher::new(store.clone()),
            state_machine: FunnelStateMachine::new(store, dispatcher),
        }
    }

    pub fn with_event_sink(
        mut self,
        sink: Arc<dyn cadence_core::event_bus::EventSink>,
    ) -> Self {
        self.state_machine = self.state_machine.with_event_sink(sink);
        self
    }

    /// Validates and stores a funnel definition.
    pub fn register_funnel(&self, funnel: FunnelDefinition) -> CadenceResult<Uuid> {
        if funnel.stages.is_empty() {
            return Err(CadenceError::Validation(format!(
                "funnel {} has no stages",
                funnel.name
            )));
        }
        let mut seen = HashSet::new();
        for stage in &funnel.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(CadenceError::Validation(format!(
                    "funnel {}: duplicate stage name {}",
                    funnel.name, stage.name
                )));
            }
        }

        let id = funnel.id;
        info!(funnel_id = %id, name = %funnel.name, stages = funnel.stages.len(), "Registering funnel");
        self.store.insert_funnel(funnel)?;
        Ok(id)
    }

    /// Assigns a lead to a funnel; subsequent events for the lead are
    /// matched against it.
    pub fn assign_lead(&self, lead_id: &str, funnel_id: Uuid) {
        self.store.assign_lead(lead_id, funnel_id);
    }

    /// Matches an event and applies the resulting transition, if any.
    /// Returns the stage entered, or `None` for no-op events.
    pub async fn handle_event(&self, event: &FunnelEvent) -> CadenceResult<Option<String>> {
        let transition = match self.matcher.match_event(event)? {
            Some(t) => t,
            None => return Ok(None),
        };

        match self.state_machine.apply(&transition).await? {
            ApplyOutcome::Entered(stage) => Ok(Some(stage)),
            ApplyOutcome::Superseded => Ok(None),
        }
    }

    /// Computes stage occupancy for the given funnel from lead state.
    pub fn stats(&self, funnel_id: &Uuid) -> FunnelStats {
        let mut by_stage: HashMap<String, u64> = HashMap::new();
        let states = self.store.list_states(funnel_id);
        for state in &states {
            *by_stage.entry(state.current_stage.clone()).or_insert(0) += 1;
        }
        FunnelStats {
            funnel_id: *funnel_id,
            total_leads: states.len() as u64,
            by_stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::Stage;

    fn engine() -> FunnelEngine {
        let store = Arc::new(cadence_store::MemoryStore::new());
        let dispatcher = Arc::new(ChannelDispatcher::new(vec![]));
        FunnelEngine::new(store, dispatcher)
    }

    #[test]
    fn test_register_rejects_duplicate_stage_names() {
        let engine = engine();
        let funnel = FunnelDefinition::new(
            "bad",
            vec![
                Stage {
                    name: "trial".into(),
                    triggers: HashSet::new(),
                    actions: vec![],
                },
                Stage {
                    name: "trial".into(),
                    triggers: HashSet::new(),
                    actions: vec![],
                },
            ],
        );
        assert!(matches!(
            engine.register_funnel(funnel),
            Err(CadenceError::Validation(_))
        ));
    }

    #[test]
    fn test_register_rejects_empty_funnel() {
        let engine = engine();
        let funnel = FunnelDefinition::new("empty", vec![]);
        assert!(engine.register_funnel(funnel).is_err());
    }
}
