//! Campaign scheduling and execution.
//!
//! The `Scheduler` owns the time-ordered work queue and the
//! at-most-one-in-flight guarantee per run; the `Executor` dispatches due
//! steps to channel providers and advances or retries runs; `WorkerPool`
//! drives both from a polling loop with bounded dispatch concurrency.

pub mod backoff;
pub mod executor;
pub mod scheduler;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use executor::{DispatchOutcome, Executor};
pub use scheduler::{DueStep, Scheduler};
pub use worker::WorkerPool;
