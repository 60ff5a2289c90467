//! Funnel orchestration — trigger matching and the lead funnel state
//! machine.
//!
//! Events arrive through `EventIngest`, are matched against funnel stage
//! trigger sets by `TriggerMatcher`, and matched transitions are applied
//! (state write + stage actions) by `FunnelStateMachine`. `FunnelEngine`
//! ties the three together.

pub mod engine;
pub mod ingest;
pub mod matcher;
pub mod state_machine;

pub use engine::{FunnelEngine, FunnelStats};
pub use ingest::EventIngest;
pub use matcher::TriggerMatcher;
pub use state_machine::FunnelStateMachine;
