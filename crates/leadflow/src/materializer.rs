//! Job materialization: expand matching flows into scheduled jobs when a
//! lead is created.
//!
//! ## What
//!
//! - [`Materializer::materialize_for_lead`] turns every active `new_lead`
//!   flow of the lead's tenant into one pending job per step, with
//!   cumulative delays.
//! - [`Materializer::capture_lead`] is the trigger hook for lead capture:
//!   insert the lead, then materialize; a materialization error never loses
//!   the lead.
//! - [`Materializer::reconcile`] sweeps leads that have no jobs at all and
//!   materializes them, healing a crash between capture and materialization.
//!
//! ## How
//!
//! Delays are relative to the previous step, so run times are the running
//! sum: a flow [email now, wait 2 days, email] yields offsets 0, 2880 and
//! 2880 minutes. A (lead, flow) pair is materialized at most once.

use crate::error::Result;
use crate::store::{AnyStore, Store};
use crate::types::{
    EventType, FlowRecord, LeadRecord, NewEvent, NewJob, NewLead, TRIGGER_NEW_LEAD,
};
use chrono::{DateTime, Duration, Utc};

/// Expands flows into concrete, time-ordered jobs for a specific lead.
#[derive(Clone)]
pub struct Materializer {
    store: AnyStore,
    current_time: Option<DateTime<Utc>>,
}

impl Materializer {
    pub fn new(store: AnyStore) -> Self {
        Self {
            store,
            current_time: None,
        }
    }

    /// Pin "now" for deterministic tests.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.current_time = Some(time);
        self
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.current_time.unwrap_or_else(Utc::now)
    }

    /// Capture a lead and schedule its follow-ups.
    ///
    /// The lead insert and the materialization are separate operations; if
    /// materialization fails the error is logged and the captured lead is
    /// returned anyway. [`Materializer::reconcile`] picks such leads up
    /// later.
    pub async fn capture_lead(&self, new_lead: NewLead) -> Result<LeadRecord> {
        let lead = self.store.leads().insert(new_lead).await?;
        tracing::info!(lead = lead.id, customer = lead.customer_id, "lead captured");

        if let Err(error) = self.materialize_for_lead(&lead).await {
            tracing::error!(
                lead = lead.id,
                error = %error,
                "follow-up materialization failed; lead kept"
            );
        }

        Ok(lead)
    }

    /// Materialize jobs for every active `new_lead` flow of the lead's
    /// tenant. Returns the number of jobs created.
    ///
    /// Flows that already have jobs for this lead are skipped, so the call
    /// is idempotent and safe to repeat from the reconciliation sweep.
    pub async fn materialize_for_lead(&self, lead: &LeadRecord) -> Result<u32> {
        let flows = self
            .store
            .flows()
            .active_for_trigger(lead.customer_id, TRIGGER_NEW_LEAD)
            .await?;

        let mut created = 0;
        for flow in flows {
            created += self.materialize_flow(lead, &flow).await?;
        }
        Ok(created)
    }

    /// Sweep leads with no jobs and materialize them.
    pub async fn reconcile(&self) -> Result<u32> {
        let leads = self.store.leads().without_jobs().await?;
        let mut created = 0;
        for lead in leads {
            let count = self.materialize_for_lead(&lead).await?;
            if count > 0 {
                tracing::info!(lead = lead.id, jobs = count, "reconciled missing follow-ups");
            }
            created += count;
        }
        Ok(created)
    }

    async fn materialize_flow(&self, lead: &LeadRecord, flow: &FlowRecord) -> Result<u32> {
        if self
            .store
            .jobs()
            .exists_for_lead_flow(lead.id, flow.id)
            .await?
        {
            tracing::debug!(lead = lead.id, flow = flow.id, "already materialized");
            return Ok(0);
        }

        let now = self.current_time();
        let steps = self.store.steps().list_for_flow(flow.id).await?;

        let mut total_delay: i64 = 0;
        let mut created = 0;
        for step in steps {
            // Delays are relative to the previous step; negative values
            // never push run_at backwards.
            total_delay += i64::from(step.delay_minutes.max(0));
            let run_at = now + Duration::minutes(total_delay);

            let job = self
                .store
                .jobs()
                .insert(NewJob {
                    customer_id: lead.customer_id,
                    lead_id: lead.id,
                    flow_id: flow.id,
                    step_id: step.id,
                    run_at,
                })
                .await?;

            self.store
                .events()
                .append(NewEvent {
                    customer_id: lead.customer_id,
                    lead_id: lead.id,
                    job_id: Some(job.id),
                    step_id: Some(step.id),
                    event_type: EventType::JobCreated,
                    message: Some(format!(
                        "Scheduled step {} of flow '{}'",
                        step.step_order, flow.name
                    )),
                    meta: serde_json::json!({
                        "flow": flow.id,
                        "flow_name": flow.name,
                        "trigger": flow.trigger,
                        "step_type": step.step_type,
                        "step_order": step.step_order,
                        "delay_minutes": step.delay_minutes,
                        "total_delay_minutes": total_delay,
                        "run_at": run_at,
                    }),
                })
                .await?;

            created += 1;
        }

        if created > 0 {
            tracing::info!(
                lead = lead.id,
                flow = flow.id,
                jobs = created,
                "flow materialized"
            );
        }
        Ok(created)
    }
}
