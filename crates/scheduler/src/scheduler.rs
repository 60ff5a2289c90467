//! Due-step scheduler — time-ordered work queue over campaign runs.
//!
//! Due time of step `i` is `started_at + sum(delay_days[0..=i])`. The
//! scheduler re-reads every run from the store at dequeue time, so
//! cancellations always take effect before the next dispatch, and an
//! in-flight set guarantees at most one outstanding dispatch per run.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_channels::send_time::{ExactSchedule, SendTimeStrategy};
use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::event_bus::{make_event, EventSink};
use cadence_core::types::{CampaignDefinition, CampaignRun, CampaignStep, EventType, RunStatus};
use cadence_store::{update_run, RunStore};

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledStep {
    due_at: DateTime<Utc>,
    run_id: Uuid,
    /// Cursor position the entry was queued for; entries whose run has
    /// since advanced are stale and dropped at dequeue.
    step_index: usize,
}

impl Ord for ScheduledStep {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then(self.run_id.cmp(&other.run_id))
            .then(self.step_index.cmp(&other.step_index))
    }
}

impl PartialOrd for ScheduledStep {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A run handed out for dispatch, paired with its due step.
#[derive(Debug, Clone)]
pub struct DueStep {
    pub run: CampaignRun,
    pub step: CampaignStep,
    pub step_index: usize,
}

pub struct Scheduler {
    store: Arc<dyn RunStore>,
    queue: Mutex<BinaryHeap<Reverse<ScheduledStep>>>,
    in_flight: DashSet<Uuid>,
    send_time: Arc<dyn SendTimeStrategy>,
    event_sink: Arc<dyn EventSink>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            store,
            queue: Mutex::new(BinaryHeap::new()),
            in_flight: DashSet::new(),
            send_time: Arc::new(ExactSchedule),
            event_sink: cadence_core::event_bus::noop_sink(),
        }
    }

    /// Attach a send-time strategy applied to step due times (not to retry
    /// backoff).
    pub fn with_send_time(mut self, strategy: Arc<dyn SendTimeStrategy>) -> Self {
        self.send_time = strategy;
        self
    }

    /// Attach an event sink for emitting orchestration events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Creates a run for the lead, marks it running, and enqueues its
    /// first step.
    pub fn start_run(
        &self,
        definition_id: &Uuid,
        lead_id: &str,
        now: DateTime<Utc>,
    ) -> CadenceResult<Uuid> {
        let definition = self
            .store
            .definition(definition_id)
            .ok_or_else(|| CadenceError::NotFound(format!("definition {}", definition_id)))?;
        if !self.store.lead_exists(lead_id) {
            return Err(CadenceError::NotFound(format!("lead {}", lead_id)));
        }

        let run = CampaignRun::new(*definition_id, lead_id, now);
        let run_id = run.id;
        self.store.insert_run(run)?;
        let run = update_run(self.store.as_ref(), &run_id, |r| {
            r.status = RunStatus::Running;
            Ok(())
        })?;

        info!(
            run_id = %run_id,
            definition = %definition.name,
            lead_id = %lead_id,
            steps = definition.steps.len(),
            "Campaign run started"
        );
        self.event_sink.emit(make_event(
            EventType::RunStarted,
            Some(run_id),
            Some(lead_id.to_string()),
            None,
        ));

        self.enqueue(&run)?;
        Ok(run_id)
    }

    /// Enqueues the run's current step at its computed due time.
    pub fn enqueue(&self, run: &CampaignRun) -> CadenceResult<()> {
        let definition = self
            .store
            .definition(&run.definition_id)
            .ok_or_else(|| CadenceError::NotFound(format!("definition {}", run.definition_id)))?;

        let due_at = match self.step_due_at(run, &definition) {
            Some(due) => due,
            None => return Ok(()), // no remaining steps
        };
        let due_at = self.send_time.send_at(&run.lead_id, due_at);

        debug!(run_id = %run.id, step = run.current_step_index, due_at = %due_at, "Step enqueued");
        self.push(due_at, run.id, run.current_step_index);
        Ok(())
    }

    /// Requeues a run's current step after `delay`, for retry backoff. The
    /// send-time strategy is bypassed so backoff spacing stays exact.
    pub fn reschedule(&self, run_id: Uuid, delay: Duration, now: DateTime<Utc>) {
        let run = match self.store.run(&run_id) {
            Some(run) => run,
            None => {
                warn!(run_id = %run_id, "Reschedule requested for unknown run");
                return;
            }
        };
        let due_at = now + delay;
        debug!(run_id = %run_id, due_at = %due_at, "Run rescheduled");
        self.push(due_at, run_id, run.current_step_index);
    }

    /// Pops every step due at `now`, re-validates its run against the
    /// store, and hands out at most one step per run.
    pub fn dequeue_due(&self, now: DateTime<Utc>) -> CadenceResult<Vec<DueStep>> {
        let mut entries = Vec::new();
        {
            let mut queue = self.queue.lock().expect("scheduler queue mutex poisoned");
            loop {
                match queue.peek() {
                    Some(Reverse(head)) if head.due_at <= now => {}
                    _ => break,
                }
                if let Some(Reverse(entry)) = queue.pop() {
                    entries.push(entry);
                }
            }
        }

        let mut due = Vec::new();
        for entry in entries {
            let run_id = entry.run_id;

            // A dispatch is already outstanding for this run; the entry
            // stays queued until the outcome is recorded.
            if self.in_flight.contains(&run_id) {
                self.push(entry.due_at, run_id, entry.step_index);
                continue;
            }

            let run = match self.store.run(&run_id) {
                Some(run) => run,
                None => {
                    warn!(run_id = %run_id, "Queued run no longer in store");
                    continue;
                }
            };
            if run.status != RunStatus::Running {
                debug!(run_id = %run_id, status = ?run.status, "Skipping non-running run");
                continue;
            }
            // The run advanced past the cursor this entry was queued for.
            if entry.step_index != run.current_step_index {
                debug!(
                    run_id = %run_id,
                    entry_step = entry.step_index,
                    current_step = run.current_step_index,
                    "Dropping stale queue entry"
                );
                continue;
            }

            // The lead was removed: the run is cancelled, not dispatched.
            if !self.store.lead_exists(&run.lead_id) {
                self.cancel_run_internal(&run_id, "lead removed")?;
                continue;
            }

            let definition = self
                .store
                .definition(&run.definition_id)
                .ok_or_else(|| {
                    CadenceError::NotFound(format!("definition {}", run.definition_id))
                })?;

            match definition.steps.get(run.current_step_index) {
                Some(step) => {
                    self.in_flight.insert(run_id);
                    due.push(DueStep {
                        step: step.clone(),
                        step_index: run.current_step_index,
                        run,
                    });
                }
                None => {
                    // No remaining steps.
                    self.complete_run(&run_id)?;
                }
            }
        }

        Ok(due)
    }

    /// Releases the in-flight slot for a run. Called by the executor once
    /// a dispatch outcome has been recorded.
    pub fn release(&self, run_id: &Uuid) {
        self.in_flight.remove(run_id);
    }

    /// Cancels a run. Takes effect before its next scheduled dispatch; an
    /// in-flight dispatch completes but its outcome is discarded.
    pub fn cancel_run(&self, run_id: &Uuid) -> CadenceResult<CampaignRun> {
        let run = update_run(self.store.as_ref(), run_id, |r| {
            if !r.status.can_transition(RunStatus::Cancelled) {
                return Err(CadenceError::Validation(format!(
                    "run {} cannot be cancelled from {:?}",
                    r.id, r.status
                )));
            }
            r.status = RunStatus::Cancelled;
            Ok(())
        })?;
        info!(run_id = %run_id, "Campaign run cancelled");
        self.event_sink.emit(make_event(
            EventType::RunCancelled,
            Some(*run_id),
            Some(run.lead_id.clone()),
            None,
        ));
        Ok(run)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.lock().expect("scheduler queue mutex poisoned").len()
    }

    fn step_due_at(
        &self,
        run: &CampaignRun,
        definition: &CampaignDefinition,
    ) -> Option<DateTime<Utc>> {
        if run.current_step_index >= definition.steps.len() {
            return None;
        }
        let offset = definition.due_offset_days(run.current_step_index);
        Some(run.started_at + Duration::days(offset))
    }

    fn push(&self, due_at: DateTime<Utc>, run_id: Uuid, step_index: usize) {
        self.queue
            .lock()
            .expect("scheduler queue mutex poisoned")
            .push(Reverse(ScheduledStep {
                due_at,
                run_id,
                step_index,
            }));
    }

    fn complete_run(&self, run_id: &Uuid) -> CadenceResult<()> {
        let run = update_run(self.store.as_ref(), run_id, |r| {
            r.status = RunStatus::Completed;
            Ok(())
        })?;
        info!(run_id = %run_id, lead_id = %run.lead_id, "Campaign run completed");
        self.event_sink.emit(make_event(
            EventType::RunCompleted,
            Some(*run_id),
            Some(run.lead_id),
            None,
        ));
        Ok(())
    }

    fn cancel_run_internal(&self, run_id: &Uuid, reason: &str) -> CadenceResult<()> {
        let run = update_run(self.store.as_ref(), run_id, |r| {
            r.status = RunStatus::Cancelled;
            Ok(())
        })?;
        info!(run_id = %run_id, reason = %reason, "Campaign run cancelled");
        self.event_sink.emit(make_event(
            EventType::RunCancelled,
            Some(*run_id),
            Some(run.lead_id),
            Some(reason.to_string()),
        ));
        Ok(())
    }
}
