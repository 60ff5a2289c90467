//! Funnel state machine — applies matched stage transitions.
//!
//! A transition is a conditional write of the lead's funnel state followed
//! by exactly one invocation of each of the target stage's actions. Lost
//! write races are absorbed by re-reading: if another writer already moved
//! the lead at or past the target stage, the transition degrades to a
//! no-op and no actions run.
//!
//! The at-or-past guard holds for direct `apply` callers too, not just
//! races: a transition into the lead's current stage is `Superseded`, so
//! stage actions run exactly once per forward entry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{EventType, LeadFunnelState, Stage, StageTransition, StageVisit};
use cadence_core::event_bus::{make_event, EventSink};
use cadence_channels::ChannelDispatcher;
use cadence_store::FunnelStore;

pub struct FunnelStateMachine {
    store: Arc<dyn FunnelStore>,
    dispatcher: Arc<ChannelDispatcher>,
    event_sink: Arc<dyn EventSink>,
}

/// Whether the transition landed or was superseded by a concurrent writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Entered(String),
    Superseded,
}

impl FunnelStateMachine {
    pub fn new(store: Arc<dyn FunnelStore>, dispatcher: Arc<ChannelDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            event_sink: cadence_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for emitting orchestration events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Applies a stage transition and runs the target stage's actions once.
    pub async fn apply(&self, transition: &StageTransition) -> CadenceResult<ApplyOutcome> {
        let funnel = self
            .store
            .funnel(&transition.funnel_id)
            .ok_or_else(|| CadenceError::NotFound(format!("funnel {}", transition.funnel_id)))?;

        let target_index = funnel.stage_index(&transition.to_stage).ok_or_else(|| {
            CadenceError::Validation(format!(
                "stage {} not in funnel {}",
                transition.to_stage, funnel.name
            ))
        })?;
        let stage = &funnel.stages[target_index];

        let landed = self.write_state(transition, &funnel, target_index)?;
        if !landed {
            return Ok(ApplyOutcome::Superseded);
        }

        info!(
            lead_id = %transition.lead_id,
            funnel = %funnel.name,
            from = ?transition.from_stage,
            to = %transition.to_stage,
            "Lead entered stage"
        );
        metrics::counter!("funnel.stage_entries", "stage" => stage.name.clone()).increment(1);
        self.event_sink.emit(make_event(
            EventType::StageEntered,
            None,
            Some(transition.lead_id.clone()),
            Some(transition.to_stage.clone()),
        ));

        self.run_stage_actions(&transition.lead_id, stage).await;

        Ok(ApplyOutcome::Entered(stage.name.clone()))
    }

    /// Conditional-write loop. Returns `false` when a concurrent writer
    /// already placed the lead at or past the target stage.
    fn write_state(
        &self,
        transition: &StageTransition,
        funnel: &cadence_core::types::FunnelDefinition,
        target_index: usize,
    ) -> CadenceResult<bool> {
        loop {
            let now = Utc::now();
            match self.store.state(&transition.lead_id, &transition.funnel_id) {
                None => {
                    let state = LeadFunnelState {
                        lead_id: transition.lead_id.clone(),
                        funnel_id: transition.funnel_id,
                        current_stage: transition.to_stage.clone(),
                        entered_at: now,
                        version: 0,
                        history: vec![StageVisit {
                            stage: transition.to_stage.clone(),
                            entered_at: now,
                        }],
                    };
                    match self.store.put_state_if_version(state, 0) {
                        Ok(_) => return Ok(true),
                        Err(CadenceError::StoreConflict { .. }) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Some(mut state) => {
                    let current_index =
                        funnel.stage_index(&state.current_stage).unwrap_or(usize::MAX);
                    if target_index <= current_index {
                        return Ok(false);
                    }
                    let expected = state.version;
                    state.current_stage = transition.to_stage.clone();
                    state.entered_at = now;
                    state.history.push(StageVisit {
                        stage: transition.to_stage.clone(),
                        entered_at: now,
                    });
                    match self.store.put_state_if_version(state, expected) {
                        Ok(_) => return Ok(true),
                        Err(CadenceError::StoreConflict { .. }) => continue,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// Invokes each stage action exactly once. An action failure is logged
    /// and surfaced as a failure event; remaining actions still run.
    async fn run_stage_actions(&self, lead_id: &str, stage: &Stage) {
        for action in &stage.actions {
            let mut payload = action.payload.clone();
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("lead_id".into(), serde_json::Value::String(lead_id.into()));
            }

            if let Err(e) = self
                .dispatcher
                .dispatch(action.channel, &action.action_id, &payload)
                .await
            {
                warn!(
                    lead_id = %lead_id,
                    stage = %stage.name,
                    action_id = %action.action_id,
                    error = %e,
                    "Stage action failed"
                );
                metrics::counter!("funnel.action_failures", "stage" => stage.name.clone())
                    .increment(1);
            }
        }
    }
}
