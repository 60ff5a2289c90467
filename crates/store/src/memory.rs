//! In-memory store backed by DashMap.
//!
//! Production: replace with the remote lead/campaign store behind the same
//! trait surface. This provides identical conditional-write semantics for
//! development and testing.

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use tracing::info;
use uuid::Uuid;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{CampaignDefinition, CampaignRun, FunnelDefinition, LeadFunnelState};

use crate::{FunnelStore, RunStore};

/// Thread-safe in-memory store for campaign definitions, runs, funnels,
/// lead funnel state, and the ingest dedupe ledger.
#[derive(Default)]
pub struct MemoryStore {
    definitions: DashMap<Uuid, CampaignDefinition>,
    runs: DashMap<Uuid, CampaignRun>,
    leads: DashSet<String>,
    funnels: DashMap<Uuid, FunnelDefinition>,
    lead_funnels: DashMap<String, Uuid>,
    states: DashMap<(String, Uuid), LeadFunnelState>,
    seen_events: DashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Memory store initialized (in-memory, development mode)");
        Self::default()
    }
}

impl RunStore for MemoryStore {
    fn insert_definition(&self, def: CampaignDefinition) -> CadenceResult<()> {
        if def.steps.is_empty() {
            return Err(CadenceError::Validation(format!(
                "campaign definition {} has no steps",
                def.name
            )));
        }
        self.definitions.insert(def.id, def);
        Ok(())
    }

    fn definition(&self, id: &Uuid) -> Option<CampaignDefinition> {
        self.definitions.get(id).map(|r| r.value().clone())
    }

    fn list_definitions(&self) -> Vec<CampaignDefinition> {
        let mut defs: Vec<CampaignDefinition> =
            self.definitions.iter().map(|r| r.value().clone()).collect();
        defs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        defs
    }

    fn insert_run(&self, run: CampaignRun) -> CadenceResult<()> {
        if self.definitions.get(&run.definition_id).is_none() {
            return Err(CadenceError::NotFound(format!(
                "definition {}",
                run.definition_id
            )));
        }
        self.runs.insert(run.id, run);
        Ok(())
    }

    fn run(&self, id: &Uuid) -> Option<CampaignRun> {
        self.runs.get(id).map(|r| r.value().clone())
    }

    fn list_runs(&self) -> Vec<CampaignRun> {
        self.runs.iter().map(|r| r.value().clone()).collect()
    }

    fn put_run_if_version(
        &self,
        mut run: CampaignRun,
        expected_version: u64,
    ) -> CadenceResult<CampaignRun> {
        let mut entry = self
            .runs
            .get_mut(&run.id)
            .ok_or_else(|| CadenceError::NotFound(format!("run {}", run.id)))?;
        let current = entry.value();

        if current.version != expected_version {
            return Err(CadenceError::StoreConflict {
                key: run.id.to_string(),
                expected: expected_version,
                found: current.version,
            });
        }
        if run.status != current.status && !current.status.can_transition(run.status) {
            return Err(CadenceError::Validation(format!(
                "run {}: invalid status transition {:?} -> {:?}",
                run.id, current.status, run.status
            )));
        }
        // Monotonic-advance invariant is enforced at the write boundary.
        if run.current_step_index < current.current_step_index {
            return Err(CadenceError::Validation(format!(
                "run {}: step index may not move backwards ({} -> {})",
                run.id, current.current_step_index, run.current_step_index
            )));
        }

        run.version = expected_version + 1;
        run.updated_at = Utc::now();
        *entry.value_mut() = run.clone();
        Ok(run)
    }

    fn register_lead(&self, lead_id: &str) {
        self.leads.insert(lead_id.to_string());
    }

    fn remove_lead(&self, lead_id: &str) {
        self.leads.remove(lead_id);
    }

    fn lead_exists(&self, lead_id: &str) -> bool {
        self.leads.contains(lead_id)
    }
}

impl FunnelStore for MemoryStore {
    fn insert_funnel(&self, def: FunnelDefinition) -> CadenceResult<()> {
        self.funnels.insert(def.id, def);
        Ok(())
    }

    fn funnel(&self, id: &Uuid) -> Option<FunnelDefinition> {
        self.funnels.get(id).map(|r| r.value().clone())
    }

    fn assign_lead(&self, lead_id: &str, funnel_id: Uuid) {
        self.lead_funnels.insert(lead_id.to_string(), funnel_id);
    }

    fn funnel_of(&self, lead_id: &str) -> Option<Uuid> {
        self.lead_funnels.get(lead_id).map(|r| *r.value())
    }

    fn state(&self, lead_id: &str, funnel_id: &Uuid) -> Option<LeadFunnelState> {
        self.states
            .get(&(lead_id.to_string(), *funnel_id))
            .map(|r| r.value().clone())
    }

    fn list_states(&self, funnel_id: &Uuid) -> Vec<LeadFunnelState> {
        self.states
            .iter()
            .filter(|r| r.value().funnel_id == *funnel_id)
            .map(|r| r.value().clone())
            .collect()
    }

    fn put_state_if_version(
        &self,
        mut state: LeadFunnelState,
        expected_version: u64,
    ) -> CadenceResult<LeadFunnelState> {
        let key = (state.lead_id.clone(), state.funnel_id);
        match self.states.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.version != expected_version {
                    return Err(CadenceError::StoreConflict {
                        key: format!("{}/{}", state.lead_id, state.funnel_id),
                        expected: expected_version,
                        found: current.version,
                    });
                }
                state.version = expected_version + 1;
                occupied.insert(state.clone());
                Ok(state)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Err(CadenceError::StoreConflict {
                        key: format!("{}/{}", state.lead_id, state.funnel_id),
                        expected: expected_version,
                        found: 0,
                    });
                }
                state.version = 1;
                vacant.insert(state.clone());
                Ok(state)
            }
        }
    }

    fn record_event(&self, dedupe_key: &str) -> bool {
        self.seen_events.insert(dedupe_key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::{CampaignStep, Channel, RunStatus, StageVisit};
    use chrono::Utc;

    fn sample_definition() -> CampaignDefinition {
        CampaignDefinition::new(
            "outbound",
            vec![CampaignStep {
                delay_days: 0,
                template_id: "t0".into(),
                channel: Channel::Email,
            }],
        )
    }

    #[test]
    fn test_versioned_run_write_detects_conflict() {
        let store = MemoryStore::new();
        let def = sample_definition();
        let def_id = def.id;
        store.insert_definition(def).unwrap();

        let run = CampaignRun::new(def_id, "lead-1", Utc::now());
        let run_id = run.id;
        store.insert_run(run).unwrap();

        // Two writers read the same version; the second write loses.
        let mut a = store.run(&run_id).unwrap();
        let b = store.run(&run_id).unwrap();

        a.attempts += 1;
        store.put_run_if_version(a, 1).unwrap();

        let err = store.put_run_if_version(b, 1).unwrap_err();
        assert!(matches!(err, CadenceError::StoreConflict { .. }));

        // update_run absorbs the conflict by re-reading.
        let updated = crate::update_run(&store, &run_id, |r| {
            r.attempts += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(updated.attempts, 2);
        assert_eq!(updated.version, 3);
    }

    #[test]
    fn test_run_write_rejects_backward_step_index() {
        let store = MemoryStore::new();
        let def = sample_definition();
        let def_id = def.id;
        store.insert_definition(def).unwrap();

        let mut run = CampaignRun::new(def_id, "lead-1", Utc::now());
        run.current_step_index = 2;
        let run_id = run.id;
        store.insert_run(run).unwrap();

        let mut stale = store.run(&run_id).unwrap();
        stale.current_step_index = 1;
        let err = store.put_run_if_version(stale, 1).unwrap_err();
        assert!(matches!(err, CadenceError::Validation(_)));
    }

    #[test]
    fn test_run_write_rejects_invalid_status_transition() {
        let store = MemoryStore::new();
        let def = sample_definition();
        let def_id = def.id;
        store.insert_definition(def).unwrap();

        let mut run = CampaignRun::new(def_id, "lead-1", Utc::now());
        run.status = RunStatus::Completed;
        let run_id = run.id;
        store.insert_run(run).unwrap();

        let mut reopened = store.run(&run_id).unwrap();
        reopened.status = RunStatus::Running;
        let err = store.put_run_if_version(reopened, 1).unwrap_err();
        assert!(matches!(err, CadenceError::Validation(_)));
    }

    #[test]
    fn test_state_insert_and_conflict() {
        let store = MemoryStore::new();
        let funnel_id = Uuid::new_v4();
        let now = Utc::now();

        let state = LeadFunnelState {
            lead_id: "lead-1".into(),
            funnel_id,
            current_stage: "interest".into(),
            entered_at: now,
            version: 0,
            history: vec![StageVisit {
                stage: "interest".into(),
                entered_at: now,
            }],
        };

        let stored = store.put_state_if_version(state.clone(), 0).unwrap();
        assert_eq!(stored.version, 1);

        // A second blind insert loses the race.
        let err = store.put_state_if_version(state, 0).unwrap_err();
        assert!(matches!(err, CadenceError::StoreConflict { .. }));
    }

    #[test]
    fn test_event_dedupe_ledger() {
        let store = MemoryStore::new();
        assert!(store.record_event("lead-1:trial-start:1700000000000"));
        assert!(!store.record_event("lead-1:trial-start:1700000000000"));
        assert!(store.record_event("lead-1:trial-start:1700000060000"));
    }

    #[test]
    fn test_lead_registry() {
        let store = MemoryStore::new();
        store.register_lead("lead-1");
        assert!(store.lead_exists("lead-1"));
        store.remove_lead("lead-1");
        assert!(!store.lead_exists("lead-1"));
    }
}
