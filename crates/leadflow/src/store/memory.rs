//! In-memory implementation of the Store trait.
//!
//! Backs tests and local development; the claim/finalize semantics match the
//! Postgres backend, with the whole-state mutex standing in for row locks.
//! Single-process only.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::JobStatusCounts;
use crate::store::{
    ConcurrencyModel, EventTable, FlowTable, JobTable, LeadTable, StepTable, Store,
};
use crate::types::{
    EventRecord, FlowRecord, FlowUpdate, JobRecord, JobStatus, LeadRecord, NewEvent, NewFlow,
    NewJob, NewLead, NewStep, StepRecord, StepUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    flows: Vec<FlowRecord>,
    steps: Vec<StepRecord>,
    leads: Vec<LeadRecord>,
    jobs: Vec<JobRecord>,
    events: Vec<EventRecord>,
    next_flow_id: i64,
    next_step_id: i64,
    next_lead_id: i64,
    next_job_id: i64,
    next_event_id: i64,
}

#[derive(Debug, Clone, Default)]
struct Shared(Arc<Mutex<State>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.0.lock().expect("memory store state mutex poisoned")
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    config: Config,
    flows: Arc<MemoryFlows>,
    steps: Arc<MemorySteps>,
    leads: Arc<MemoryLeads>,
    jobs: Arc<MemoryJobs>,
    events: Arc<MemoryEvents>,
}

impl MemoryStore {
    pub fn new(config: &Config) -> Self {
        let shared = Shared::default();
        Self {
            config: config.clone(),
            flows: Arc::new(MemoryFlows {
                shared: shared.clone(),
            }),
            steps: Arc::new(MemorySteps {
                shared: shared.clone(),
            }),
            leads: Arc::new(MemoryLeads {
                shared: shared.clone(),
            }),
            jobs: Arc::new(MemoryJobs {
                shared: shared.clone(),
            }),
            events: Arc::new(MemoryEvents { shared }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&Config::from_dsn("memory://"))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn flows(&self) -> &dyn FlowTable {
        self.flows.as_ref()
    }

    fn steps(&self) -> &dyn StepTable {
        self.steps.as_ref()
    }

    fn leads(&self) -> &dyn LeadTable {
        self.leads.as_ref()
    }

    fn jobs(&self) -> &dyn JobTable {
        self.jobs.as_ref()
    }

    fn events(&self) -> &dyn EventTable {
        self.events.as_ref()
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn concurrency_model(&self) -> ConcurrencyModel {
        ConcurrencyModel::SingleProcess
    }

    async fn install(&self) -> Result<()> {
        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryFlows {
    shared: Shared,
}

#[async_trait]
impl FlowTable for MemoryFlows {
    async fn insert(&self, flow: NewFlow) -> Result<FlowRecord> {
        let mut state = self.shared.lock();
        state.next_flow_id += 1;
        let record = FlowRecord {
            id: state.next_flow_id,
            customer_id: flow.customer_id,
            name: flow.name,
            trigger: flow.trigger,
            is_active: flow.is_active,
            created_at: Utc::now(),
        };
        state.flows.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<FlowRecord> {
        let state = self.shared.lock();
        state
            .flows
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("Flow", id))
    }

    async fn list(&self, customer_id: i64) -> Result<Vec<FlowRecord>> {
        let state = self.shared.lock();
        let mut flows: Vec<FlowRecord> = state
            .flows
            .iter()
            .filter(|f| f.customer_id == customer_id)
            .cloned()
            .collect();
        flows.sort_by_key(|f| std::cmp::Reverse(f.id));
        Ok(flows)
    }

    async fn active_for_trigger(
        &self,
        customer_id: i64,
        trigger: &str,
    ) -> Result<Vec<FlowRecord>> {
        let state = self.shared.lock();
        let mut flows: Vec<FlowRecord> = state
            .flows
            .iter()
            .filter(|f| f.customer_id == customer_id && f.trigger == trigger && f.is_active)
            .cloned()
            .collect();
        flows.sort_by_key(|f| f.id);
        Ok(flows)
    }

    async fn update(&self, id: i64, update: FlowUpdate) -> Result<FlowRecord> {
        let mut state = self.shared.lock();
        let flow = state
            .flows
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| Error::not_found("Flow", id))?;
        if let Some(name) = update.name {
            flow.name = name;
        }
        if let Some(trigger) = update.trigger {
            flow.trigger = trigger;
        }
        if let Some(is_active) = update.is_active {
            flow.is_active = is_active;
        }
        Ok(flow.clone())
    }

    async fn delete(&self, id: i64) -> Result<u64> {
        let mut state = self.shared.lock();
        let before = state.flows.len();
        state.flows.retain(|f| f.id != id);
        Ok((before - state.flows.len()) as u64)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.shared.lock().flows.len() as i64)
    }

    async fn count_active(&self) -> Result<i64> {
        Ok(self.shared.lock().flows.iter().filter(|f| f.is_active).count() as i64)
    }
}

#[derive(Debug)]
struct MemorySteps {
    shared: Shared,
}

#[async_trait]
impl StepTable for MemorySteps {
    async fn insert(&self, step: NewStep) -> Result<StepRecord> {
        let mut state = self.shared.lock();
        state.next_step_id += 1;
        let record = StepRecord {
            id: state.next_step_id,
            flow_id: step.flow_id,
            step_order: step.step_order,
            step_type: step.step_type,
            delay_minutes: step.delay_minutes,
            config: step.config,
        };
        state.steps.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<StepRecord> {
        let state = self.shared.lock();
        state
            .steps
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("Step", id))
    }

    async fn list_for_flow(&self, flow_id: i64) -> Result<Vec<StepRecord>> {
        let state = self.shared.lock();
        let mut steps: Vec<StepRecord> = state
            .steps
            .iter()
            .filter(|s| s.flow_id == flow_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        Ok(steps)
    }

    async fn update(&self, id: i64, update: StepUpdate) -> Result<StepRecord> {
        let mut state = self.shared.lock();
        let step = state
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::not_found("Step", id))?;
        if let Some(step_type) = update.step_type {
            step.step_type = step_type;
        }
        if let Some(delay_minutes) = update.delay_minutes {
            step.delay_minutes = delay_minutes;
        }
        if let Some(config) = update.config {
            step.config = config;
        }
        Ok(step.clone())
    }

    async fn delete(&self, id: i64) -> Result<u64> {
        let mut state = self.shared.lock();
        let before = state.steps.len();
        state.steps.retain(|s| s.id != id);
        Ok((before - state.steps.len()) as u64)
    }

    async fn delete_for_flow(&self, flow_id: i64) -> Result<u64> {
        let mut state = self.shared.lock();
        let before = state.steps.len();
        state.steps.retain(|s| s.flow_id != flow_id);
        Ok((before - state.steps.len()) as u64)
    }

    async fn set_order(&self, flow_id: i64, ordered_ids: &[i64]) -> Result<Vec<StepRecord>> {
        let mut state = self.shared.lock();
        for (idx, step_id) in ordered_ids.iter().enumerate() {
            let step = state
                .steps
                .iter_mut()
                .find(|s| s.id == *step_id && s.flow_id == flow_id)
                .ok_or(Error::StepNotInFlow {
                    step_id: *step_id,
                    flow_id,
                })?;
            step.step_order = (idx + 1) as i32;
        }
        let mut steps: Vec<StepRecord> = state
            .steps
            .iter()
            .filter(|s| s.flow_id == flow_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        Ok(steps)
    }
}

#[derive(Debug)]
struct MemoryLeads {
    shared: Shared,
}

#[async_trait]
impl LeadTable for MemoryLeads {
    async fn insert(&self, lead: NewLead) -> Result<LeadRecord> {
        let mut state = self.shared.lock();
        state.next_lead_id += 1;
        let record = LeadRecord {
            id: state.next_lead_id,
            customer_id: lead.customer_id,
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            message: lead.message,
            status: "new".to_string(),
            created_at: Utc::now(),
        };
        state.leads.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<LeadRecord> {
        let state = self.shared.lock();
        state
            .leads
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("Lead", id))
    }

    async fn list(&self, customer_id: i64) -> Result<Vec<LeadRecord>> {
        let state = self.shared.lock();
        let mut leads: Vec<LeadRecord> = state
            .leads
            .iter()
            .filter(|l| l.customer_id == customer_id)
            .cloned()
            .collect();
        leads.sort_by_key(|l| std::cmp::Reverse(l.id));
        Ok(leads)
    }

    async fn update_status(&self, id: i64, status: &str) -> Result<LeadRecord> {
        let mut state = self.shared.lock();
        let lead = state
            .leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::not_found("Lead", id))?;
        lead.status = status.to_string();
        Ok(lead.clone())
    }

    async fn without_jobs(&self) -> Result<Vec<LeadRecord>> {
        let state = self.shared.lock();
        let mut leads: Vec<LeadRecord> = state
            .leads
            .iter()
            .filter(|l| !state.jobs.iter().any(|j| j.lead_id == l.id))
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.id);
        Ok(leads)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.shared.lock().leads.len() as i64)
    }
}

#[derive(Debug)]
struct MemoryJobs {
    shared: Shared,
}

#[async_trait]
impl JobTable for MemoryJobs {
    async fn insert(&self, job: NewJob) -> Result<JobRecord> {
        let mut state = self.shared.lock();
        state.next_job_id += 1;
        let record = JobRecord {
            id: state.next_job_id,
            customer_id: job.customer_id,
            lead_id: job.lead_id,
            flow_id: job.flow_id,
            step_id: job.step_id,
            run_at: job.run_at,
            status: JobStatus::Pending,
            locked_until: None,
            created_at: Utc::now(),
        };
        state.jobs.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<JobRecord> {
        let state = self.shared.lock();
        state
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn list(&self, customer_id: i64, status: Option<JobStatus>) -> Result<Vec<JobRecord>> {
        let state = self.shared.lock();
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .iter()
            .filter(|j| j.customer_id == customer_id && status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.run_at, j.id));
        Ok(jobs)
    }

    async fn list_for_lead(&self, lead_id: i64) -> Result<Vec<JobRecord>> {
        let state = self.shared.lock();
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .iter()
            .filter(|j| j.lead_id == lead_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.run_at, j.id));
        Ok(jobs)
    }

    async fn exists_for_lead_flow(&self, lead_id: i64, flow_id: i64) -> Result<bool> {
        let state = self.shared.lock();
        Ok(state
            .jobs
            .iter()
            .any(|j| j.lead_id == lead_id && j.flow_id == flow_id))
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        claim_timeout: Duration,
    ) -> Result<Vec<JobRecord>> {
        let mut state = self.shared.lock();
        let mut due_ids: Vec<(DateTime<Utc>, i64)> = state
            .jobs
            .iter()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && j.run_at <= now
                    && j.locked_until.map_or(true, |lock| lock <= now)
            })
            .map(|j| (j.run_at, j.id))
            .collect();
        due_ids.sort();
        due_ids.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due_ids.len());
        for (_, id) in due_ids {
            let job = state
                .jobs
                .iter_mut()
                .find(|j| j.id == id)
                .expect("claimed job id vanished under lock");
            job.locked_until = Some(now + claim_timeout);
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn mark_done(&self, id: i64) -> Result<bool> {
        let mut state = self.shared.lock();
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Done;
                job.locked_until = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_failed(&self, id: i64) -> Result<bool> {
        let mut state = self.shared.lock();
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Failed;
                job.locked_until = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn status_counts(&self) -> Result<JobStatusCounts> {
        let state = self.shared.lock();
        let mut counts = JobStatusCounts::default();
        for job in &state.jobs {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[derive(Debug)]
struct MemoryEvents {
    shared: Shared,
}

#[async_trait]
impl EventTable for MemoryEvents {
    async fn append(&self, event: NewEvent) -> Result<EventRecord> {
        let mut state = self.shared.lock();
        state.next_event_id += 1;
        let record = EventRecord {
            id: state.next_event_id,
            customer_id: event.customer_id,
            lead_id: event.lead_id,
            job_id: event.job_id,
            step_id: event.step_id,
            event_type: event.event_type.to_string(),
            message: event.message,
            meta: event.meta,
            created_at: Utc::now(),
        };
        state.events.push(record.clone());
        Ok(record)
    }

    async fn list_for_lead(&self, lead_id: i64, limit: i64) -> Result<Vec<EventRecord>> {
        let state = self.shared.lock();
        let mut events: Vec<EventRecord> = state
            .events
            .iter()
            .filter(|e| e.lead_id == lead_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse(e.id));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn list(&self, customer_id: i64, limit: i64) -> Result<Vec<EventRecord>> {
        let state = self.shared.lock();
        let mut events: Vec<EventRecord> = state
            .events
            .iter()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse(e.id));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.shared.lock().events.len() as i64)
    }
}
