//! Trigger matcher — evaluates incoming events against funnel stage
//! trigger sets.
//!
//! Stages are scanned in definition order and the first stage whose
//! trigger set contains the event's trigger wins, so overlapping trigger
//! sets resolve deterministically. A lead already at or past the matched
//! stage produces no transition: backward movement through the funnel is
//! not allowed.

use std::sync::Arc;

use tracing::debug;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{FunnelEvent, StageTransition};
use cadence_store::FunnelStore;

pub struct TriggerMatcher {
    store: Arc<dyn FunnelStore>,
}

impl TriggerMatcher {
    pub fn new(store: Arc<dyn FunnelStore>) -> Self {
        Self { store }
    }

    /// Returns the stage transition this event causes, if any.
    pub fn match_event(&self, event: &FunnelEvent) -> CadenceResult<Option<StageTransition>> {
        let funnel_id = match self.store.funnel_of(&event.lead_id) {
            Some(id) => id,
            None => {
                debug!(lead_id = %event.lead_id, "Event for lead with no funnel assignment");
                return Ok(None);
            }
        };

        let funnel = self
            .store
            .funnel(&funnel_id)
            .ok_or_else(|| CadenceError::NotFound(format!("funnel {}", funnel_id)))?;

        let (matched_index, matched_stage) = match funnel.matching_stage(&event.trigger_id) {
            Some(found) => found,
            None => {
                debug!(
                    trigger_id = %event.trigger_id,
                    funnel = %funnel.name,
                    "Trigger matches no stage"
                );
                return Ok(None);
            }
        };

        let from_stage = match self.store.state(&event.lead_id, &funnel_id) {
            None => None,
            Some(state) => {
                let current_index =
                    funnel.stage_index(&state.current_stage).ok_or_else(|| {
                        CadenceError::Validation(format!(
                            "lead {} is at stage {} which no longer exists in funnel {}",
                            event.lead_id, state.current_stage, funnel.name
                        ))
                    })?;
                // At or past the matched stage: no backward transitions.
                if matched_index <= current_index {
                    debug!(
                        lead_id = %event.lead_id,
                        current_stage = %state.current_stage,
                        matched_stage = %matched_stage.name,
                        "Event matches current or earlier stage, ignoring"
                    );
                    return Ok(None);
                }
                Some(state.current_stage)
            }
        };

        Ok(Some(StageTransition {
            lead_id: event.lead_id.clone(),
            funnel_id,
            from_stage,
            to_stage: matched_stage.name.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::{FunnelDefinition, LeadFunnelState, Stage};
    use cadence_store::MemoryStore;
    use chrono::Utc;

    fn three_stage_funnel() -> FunnelDefinition {
        FunnelDefinition::new(
            "signup",
            vec![
                Stage {
                    name: "interest".into(),
                    triggers: ["pricing-page-visit".to_string()].into_iter().collect(),
                    actions: vec![],
                },
                Stage {
                    name: "trial".into(),
                    triggers: ["trial-start".to_string()].into_iter().collect(),
                    actions: vec![],
                },
                Stage {
                    name: "conversion".into(),
                    triggers: ["plan-purchased".to_string()].into_iter().collect(),
                    actions: vec![],
                },
            ],
        )
    }

    fn setup() -> (Arc<MemoryStore>, TriggerMatcher, uuid::Uuid) {
        let store = Arc::new(MemoryStore::new());
        let funnel = three_stage_funnel();
        let funnel_id = funnel.id;
        store.insert_funnel(funnel).unwrap();
        store.assign_lead("lead-1", funnel_id);
        let matcher = TriggerMatcher::new(store.clone());
        (store, matcher, funnel_id)
    }

    #[test]
    fn test_first_match_creates_enter_transition() {
        let (_store, matcher, funnel_id) = setup();
        let event = FunnelEvent::new("lead-1", "trial-start", Utc::now());

        let transition = matcher.match_event(&event).unwrap().unwrap();
        assert_eq!(transition.funnel_id, funnel_id);
        assert_eq!(transition.from_stage, None);
        assert_eq!(transition.to_stage, "trial");
    }

    #[test]
    fn test_no_backward_transition() {
        let (store, matcher, funnel_id) = setup();
        store
            .put_state_if_version(
                LeadFunnelState {
                    lead_id: "lead-1".into(),
                    funnel_id,
                    current_stage: "conversion".into(),
                    entered_at: Utc::now(),
                    version: 0,
                    history: vec![],
                },
                0,
            )
            .unwrap();

        let event = FunnelEvent::new("lead-1", "pricing-page-visit", Utc::now());
        assert!(matcher.match_event(&event).unwrap().is_none());
    }

    #[test]
    fn test_forward_transition_carries_from_stage() {
        let (store, matcher, funnel_id) = setup();
        store
            .put_state_if_version(
                LeadFunnelState {
                    lead_id: "lead-1".into(),
                    funnel_id,
                    current_stage: "interest".into(),
                    entered_at: Utc::now(),
                    version: 0,
                    history: vec![],
                },
                0,
            )
            .unwrap();

        let event = FunnelEvent::new("lead-1", "plan-purchased", Utc::now());
        let transition = matcher.match_event(&event).unwrap().unwrap();
        assert_eq!(transition.from_stage, Some("interest".into()));
        assert_eq!(transition.to_stage, "conversion");
    }

    #[test]
    fn test_unknown_trigger_and_unassigned_lead_are_noops() {
        let (_store, matcher, _funnel_id) = setup();

        let event = FunnelEvent::new("lead-1", "newsletter-open", Utc::now());
        assert!(matcher.match_event(&event).unwrap().is_none());

        let event = FunnelEvent::new("lead-unassigned", "trial-start", Utc::now());
        assert!(matcher.match_event(&event).unwrap().is_none());
    }
}
