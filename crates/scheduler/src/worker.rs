//! Worker pool — drives the scheduler/executor pair from a polling loop.
//!
//! One poll task dequeues due steps on an interval and fans each out to
//! its own tokio task, bounded by a semaphore so dispatch concurrency
//! respects external channel rate limits. Per-run ordering is preserved
//! by the scheduler's in-flight guard, not by the pool.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use cadence_core::config::SchedulerConfig;

use crate::executor::Executor;
use crate::scheduler::Scheduler;

pub struct WorkerPool {
    scheduler: Arc<Scheduler>,
    executor: Arc<Executor>,
    config: SchedulerConfig,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(scheduler: Arc<Scheduler>, executor: Arc<Executor>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            scheduler,
            executor,
            config,
            shutdown_tx,
            handle: None,
        }
    }

    /// Spawns the poll loop.
    pub fn start(&mut self) {
        let scheduler = self.scheduler.clone();
        let executor = self.executor.clone();
        let poll_interval = std::time::Duration::from_millis(self.config.poll_interval_ms);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_dispatches));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_dispatches,
            "Worker pool started"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("Worker pool shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let due = match scheduler.dequeue_due(Utc::now()) {
                            Ok(due) => due,
                            Err(e) => {
                                error!(error = %e, "Failed to dequeue due steps");
                                continue;
                            }
                        };

                        for step in due {
                            let permit = match semaphore.clone().acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => return, // semaphore closed
                            };
                            let executor = executor.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                let run_id = step.run.id;
                                if let Err(e) = executor.execute(step, Utc::now()).await {
                                    warn!(run_id = %run_id, error = %e, "Dispatch task failed");
                                }
                            });
                        }
                    }
                }
            }
        });

        self.handle = Some(handle);
    }

    /// Signals the poll loop to stop and waits for it to exit. In-flight
    /// dispatch tasks are left to finish on the runtime.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker pool task panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}
