//! Storage seams for the orchestration engine.
//!
//! The engine talks to its durable store only through the `RunStore` and
//! `FunnelStore` traits. The in-memory `MemoryStore` implements both for
//! development and testing; production swaps in a remote store with the
//! same conditional-write surface.

pub mod memory;

use uuid::Uuid;

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::{CampaignDefinition, CampaignRun, FunnelDefinition, LeadFunnelState};

pub use memory::MemoryStore;

/// CRUD plus conditional writes over campaign definitions and runs.
///
/// `put_run_if_version` is the only mutation path for an existing run:
/// the write succeeds only when the caller's `expected_version` matches
/// the stored one, which serializes writers per run.
pub trait RunStore: Send + Sync {
    fn insert_definition(&self, def: CampaignDefinition) -> CadenceResult<()>;
    fn definition(&self, id: &Uuid) -> Option<CampaignDefinition>;
    fn list_definitions(&self) -> Vec<CampaignDefinition>;

    fn insert_run(&self, run: CampaignRun) -> CadenceResult<()>;
    fn run(&self, id: &Uuid) -> Option<CampaignRun>;
    fn list_runs(&self) -> Vec<CampaignRun>;
    /// Conditional write. Returns the stored run with its version bumped,
    /// or `StoreConflict` when another writer won the race.
    fn put_run_if_version(&self, run: CampaignRun, expected_version: u64)
        -> CadenceResult<CampaignRun>;

    fn register_lead(&self, lead_id: &str);
    fn remove_lead(&self, lead_id: &str);
    fn lead_exists(&self, lead_id: &str) -> bool;
}

/// CRUD plus conditional writes over funnel definitions and lead state,
/// and the ingest dedupe ledger.
pub trait FunnelStore: Send + Sync {
    fn insert_funnel(&self, def: FunnelDefinition) -> CadenceResult<()>;
    fn funnel(&self, id: &Uuid) -> Option<FunnelDefinition>;

    /// Leads are assigned to at most one funnel.
    fn assign_lead(&self, lead_id: &str, funnel_id: Uuid);
    fn funnel_of(&self, lead_id: &str) -> Option<Uuid>;

    fn state(&self, lead_id: &str, funnel_id: &Uuid) -> Option<LeadFunnelState>;
    fn list_states(&self, funnel_id: &Uuid) -> Vec<LeadFunnelState>;
    /// Conditional write; `expected_version == 0` with no existing state
    /// inserts a fresh record.
    fn put_state_if_version(
        &self,
        state: LeadFunnelState,
        expected_version: u64,
    ) -> CadenceResult<LeadFunnelState>;

    /// Records an event dedupe key. Returns `true` if the key was new.
    fn record_event(&self, dedupe_key: &str) -> bool;
}

/// Read-modify-write loop over a run's conditional write: on conflict,
/// re-reads and reapplies `mutate` until the write lands.
pub fn update_run<S, F>(store: &S, run_id: &Uuid, mut mutate: F) -> CadenceResult<CampaignRun>
where
    S: RunStore + ?Sized,
    F: FnMut(&mut CampaignRun) -> CadenceResult<()>,
{
    loop {
        let mut run = store
            .run(run_id)
            .ok_or_else(|| CadenceError::NotFound(format!("run {}", run_id)))?;
        let expected = run.version;
        mutate(&mut run)?;
        match store.put_run_if_version(run, expected) {
            Ok(stored) => return Ok(stored),
            Err(CadenceError::StoreConflict { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Read-modify-write loop over a lead's funnel state, mirroring
/// [`update_run`].
pub fn update_state<S, F>(
    store: &S,
    lead_id: &str,
    funnel_id: &Uuid,
    mut mutate: F,
) -> CadenceResult<LeadFunnelState>
where
    S: FunnelStore + ?Sized,
    F: FnMut(&mut LeadFunnelState) -> CadenceResult<()>,
{
    loop {
        let mut state = store
            .state(lead_id, funnel_id)
            .ok_or_else(|| CadenceError::NotFound(format!("state {}/{}", lead_id, funnel_id)))?;
        let expected = state.version;
        mutate(&mut state)?;
        match store.put_state_if_version(state, expected) {
            Ok(stored) => return Ok(stored),
            Err(CadenceError::StoreConflict { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
}
