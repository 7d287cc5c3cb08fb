//! The job poller: a long-lived loop that claims due jobs and executes them.
//!
//! ## What
//!
//! - [`Poller::run`] ticks on a fixed interval until a shutdown signal
//!   arrives, letting an in-flight tick finish first.
//! - [`Poller::tick`] claims up to a batch of due pending jobs (ordered by
//!   `run_at`), executes each inside a local failure boundary, and finalizes
//!   every job as `done` or `failed` with a matching audit event.
//!
//! ## How
//!
//! Claiming goes through [`crate::store::JobTable::claim_due`], whose
//! SKIP LOCKED + claim-expiry semantics let any number of poller processes
//! run against the same store without double-executing a job. One job's
//! failure never aborts the rest of the batch; a tick-level store error is
//! logged and the next tick retries naturally.

use crate::config::Config;
use crate::error::Result;
use crate::executor::StepExecutor;
use crate::store::{AnyStore, Store};
use crate::types::{EventType, JobRecord, NewEvent};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Outcome of one tick, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Jobs claimed this tick
    pub claimed: usize,
    /// Jobs that reached `done`
    pub done: usize,
    /// Jobs that reached `failed`
    pub failed: usize,
}

/// Periodic claim-and-process worker.
#[derive(Clone)]
pub struct Poller {
    store: AnyStore,
    executor: StepExecutor,
    config: Config,
}

impl Poller {
    pub fn new(store: AnyStore, executor: StepExecutor) -> Self {
        let config = store.config().clone();
        Self {
            store,
            executor,
            config,
        }
    }

    /// Run the polling loop until `shutdown` fires.
    ///
    /// The tick in progress finishes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            interval_seconds = self.config.poll_interval_seconds,
            batch_size = self.config.batch_size,
            "worker started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(summary) if summary.claimed > 0 => {
                            tracing::info!(
                                claimed = summary.claimed,
                                done = summary.done,
                                failed = summary.failed,
                                "tick processed"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => {
                            // Nothing was finalized; claims expire and the
                            // next tick retries.
                            tracing::error!(error = %error, "tick failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("worker shutting down");
                    break;
                }
            }
        }
    }

    /// Claim and process one batch of due jobs.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let jobs = self
            .store
            .jobs()
            .claim_due(
                now,
                self.config.batch_size as i64,
                self.config.claim_timeout(),
            )
            .await?;

        let mut summary = TickSummary {
            claimed: jobs.len(),
            ..TickSummary::default()
        };

        for job in &jobs {
            match self.executor.execute(job).await {
                Ok(()) => {
                    self.finalize_done(job).await?;
                    summary.done += 1;
                }
                Err(error) => {
                    tracing::warn!(job = job.id, error = %error, "job failed");
                    self.finalize_failed(job, &error.to_string()).await?;
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn finalize_done(&self, job: &JobRecord) -> Result<()> {
        self.store.jobs().mark_done(job.id).await?;
        self.store
            .events()
            .append(NewEvent {
                customer_id: job.customer_id,
                lead_id: job.lead_id,
                job_id: Some(job.id),
                step_id: Some(job.step_id),
                event_type: EventType::JobDone,
                message: Some("Job completed".to_string()),
                meta: serde_json::json!({}),
            })
            .await?;
        Ok(())
    }

    async fn finalize_failed(&self, job: &JobRecord, error: &str) -> Result<()> {
        self.store.jobs().mark_failed(job.id).await?;
        self.store
            .events()
            .append(NewEvent {
                customer_id: job.customer_id,
                lead_id: job.lead_id,
                job_id: Some(job.id),
                step_id: Some(job.step_id),
                event_type: EventType::JobFailed,
                message: Some(error.to_string()),
                meta: serde_json::json!({ "error": error }),
            })
            .await?;
        Ok(())
    }
}
