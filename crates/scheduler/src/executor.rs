//! Step executor — dispatches due steps to channel providers and records
//! the outcome.
//!
//! Success advances the run cursor; transient failures reschedule with
//! exponential backoff until `max_attempts` is exhausted, at which point
//! the failure converts to permanent and the run is marked failed for
//! operator handling. Outcomes of runs cancelled mid-flight are discarded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use cadence_channels::ChannelDispatcher;
use cadence_core::config::RetryConfig;
use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::event_bus::{make_event, EventSink};
use cadence_core::types::{EventType, RunStatus};
use cadence_store::{update_run, RunStore};

use crate::backoff::BackoffPolicy;
use crate::scheduler::{DueStep, Scheduler};

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
    /// The run was cancelled while the dispatch was in flight; the result
    /// was discarded without touching the run.
    Discarded,
}

pub struct Executor {
    store: Arc<dyn RunStore>,
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<ChannelDispatcher>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    event_sink: Arc<dyn EventSink>,
}

impl Executor {
    pub fn new(
        store: Arc<dyn RunStore>,
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<ChannelDispatcher>,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            dispatcher,
            backoff: BackoffPolicy::new(retry),
            max_attempts: retry.max_attempts,
            event_sink: cadence_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for emitting orchestration events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Dispatches one due step and records its outcome. Always releases
    /// the run's in-flight slot before returning.
    pub async fn execute(&self, due: DueStep, now: DateTime<Utc>) -> CadenceResult<DispatchOutcome> {
        let result = self.dispatch_and_record(&due, now).await;
        self.scheduler.release(&due.run.id);
        result
    }

    async fn dispatch_and_record(
        &self,
        due: &DueStep,
        now: DateTime<Utc>,
    ) -> CadenceResult<DispatchOutcome> {
        let run = &due.run;
        let attempt = run.attempts + 1;

        info!(
            run_id = %run.id,
            step_index = due.step_index,
            attempt = attempt,
            channel = %due.step.channel.display_name(),
            "Dispatching step"
        );
        metrics::counter!("executor.dispatch_attempts", "channel" => due.step.channel.display_name())
            .increment(1);

        let payload = serde_json::json!({
            "lead_id": run.lead_id,
            "run_id": run.id,
            "step_index": due.step_index,
            "template_id": due.step.template_id,
        });

        let dispatch_result = self
            .dispatcher
            .dispatch(due.step.channel, &due.step.template_id, &payload)
            .await;

        // The run may have been cancelled while the dispatch was in
        // flight; its outcome is discarded.
        let current = self
            .store
            .run(&run.id)
            .ok_or_else(|| CadenceError::NotFound(format!("run {}", run.id)))?;
        if current.status == RunStatus::Cancelled {
            info!(
                run_id = %run.id,
                step_index = due.step_index,
                "Run cancelled mid-flight, outcome discarded"
            );
            return Ok(DispatchOutcome::Discarded);
        }

        match dispatch_result {
            Ok(receipt) => {
                self.record_success(due).await?;
                info!(
                    run_id = %run.id,
                    step_index = due.step_index,
                    attempt = attempt,
                    provider_message_id = ?receipt.provider_message_id,
                    outcome = "success",
                    "Step dispatched"
                );
                Ok(DispatchOutcome::Success)
            }
            Err(e) if e.is_transient() && attempt < self.max_attempts => {
                let delay = self.backoff.delay_for_attempt(attempt);
                warn!(
                    run_id = %run.id,
                    step_index = due.step_index,
                    attempt = attempt,
                    retry_in_secs = delay.num_seconds(),
                    error = %e,
                    outcome = "transient_failure",
                    "Step dispatch failed, retrying"
                );
                update_run(self.store.as_ref(), &run.id, |r| {
                    r.attempts = attempt;
                    r.last_error = Some(e.to_string());
                    Ok(())
                })?;
                self.scheduler.reschedule(run.id, delay, now);
                self.event_sink.emit(make_event(
                    EventType::StepRetried,
                    Some(run.id),
                    Some(run.lead_id.clone()),
                    Some(format!("attempt {}: {}", attempt, e)),
                ));
                Ok(DispatchOutcome::TransientFailure)
            }
            Err(e) => {
                // Permanent failure, or retry budget exhausted.
                warn!(
                    run_id = %run.id,
                    step_index = due.step_index,
                    attempt = attempt,
                    error = %e,
                    outcome = "permanent_failure",
                    "Step dispatch failed permanently"
                );
                update_run(self.store.as_ref(), &run.id, |r| {
                    r.attempts = attempt;
                    r.last_error = Some(e.to_string());
                    r.status = RunStatus::Failed;
                    Ok(())
                })?;
                metrics::counter!("executor.runs_failed").increment(1);
                self.event_sink.emit(make_event(
                    EventType::RunFailed,
                    Some(run.id),
                    Some(run.lead_id.clone()),
                    Some(e.to_string()),
                ));
                Ok(DispatchOutcome::PermanentFailure)
            }
        }
    }

    /// Advances the cursor past the acknowledged step and either enqueues
    /// the next step or completes the run.
    async fn record_success(&self, due: &DueStep) -> CadenceResult<()> {
        let definition = self
            .store
            .definition(&due.run.definition_id)
            .ok_or_else(|| {
                CadenceError::NotFound(format!("definition {}", due.run.definition_id))
            })?;

        let updated = update_run(self.store.as_ref(), &due.run.id, |r| {
            r.current_step_index = due.step_index + 1;
            r.attempts = 0;
            r.last_error = None;
            if r.current_step_index >= definition.steps.len() {
                r.status = RunStatus::Completed;
            }
            Ok(())
        })?;

        self.event_sink.emit(make_event(
            EventType::StepDispatched,
            Some(updated.id),
            Some(updated.lead_id.clone()),
            Some(format!("step {}", due.step_index)),
        ));

        if updated.status == RunStatus::Completed {
            info!(run_id = %updated.id, lead_id = %updated.lead_id, "Campaign run completed");
            metrics::counter!("executor.runs_completed").increment(1);
            self.event_sink.emit(make_event(
                EventType::RunCompleted,
                Some(updated.id),
                Some(updated.lead_id),
                None,
            ));
        } else {
            self.scheduler.enqueue(&updated)?;
        }
        Ok(())
    }

    /// Manual operator retry for a failed run: resets the attempt counter
    /// and requeues the current step immediately.
    pub fn retry_failed(&self, run_id: &Uuid, now: DateTime<Utc>) -> CadenceResult<()> {
        let run = update_run(self.store.as_ref(), run_id, |r| {
            if r.status != RunStatus::Failed {
                return Err(CadenceError::Validation(format!(
                    "run {} is not failed ({:?})",
                    r.id, r.status
                )));
            }
            r.status = RunStatus::Running;
            r.attempts = 0;
            Ok(())
        })?;
        info!(run_id = %run_id, "Failed run requeued by operator");
        self.scheduler.reschedule(run.id, chrono::Duration::zero(), now);
        Ok(())
    }
}
