//! Core database abstraction for leadflow.
//!
//! This module defines the [`Store`] trait and its per-table repositories,
//! enabling leadflow to run against PostgreSQL in production and an
//! in-memory backend in tests and local development.

use crate::config::Config;
use crate::error::Result;
use crate::stats::JobStatusCounts;
use crate::types::{
    EventRecord, FlowRecord, FlowUpdate, JobRecord, JobStatus, LeadRecord, NewEvent, NewFlow,
    NewJob, NewLead, NewStep, StepRecord, StepUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub mod any;
pub mod memory;
pub mod postgres;

pub use any::AnyStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Concurrency model supported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyModel {
    /// Backend supports multiple processes claiming jobs concurrently.
    MultiProcess,
    /// Backend supports only a single process accessing the store.
    SingleProcess,
}

/// Flow definition table.
#[async_trait]
pub trait FlowTable: Send + Sync {
    async fn insert(&self, flow: NewFlow) -> Result<FlowRecord>;
    async fn get(&self, id: i64) -> Result<FlowRecord>;
    async fn list(&self, customer_id: i64) -> Result<Vec<FlowRecord>>;

    /// Flows the materializer expands: active, matching tenant and trigger.
    async fn active_for_trigger(&self, customer_id: i64, trigger: &str)
        -> Result<Vec<FlowRecord>>;

    async fn update(&self, id: i64, update: FlowUpdate) -> Result<FlowRecord>;

    /// Delete a flow row. Callers must have deleted its steps first; the
    /// store never cascades.
    async fn delete(&self, id: i64) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
    async fn count_active(&self) -> Result<i64>;
}

/// Step table.
#[async_trait]
pub trait StepTable: Send + Sync {
    async fn insert(&self, step: NewStep) -> Result<StepRecord>;
    async fn get(&self, id: i64) -> Result<StepRecord>;

    /// Steps of a flow, ordered ascending by `step_order`.
    async fn list_for_flow(&self, flow_id: i64) -> Result<Vec<StepRecord>>;

    async fn update(&self, id: i64, update: StepUpdate) -> Result<StepRecord>;
    async fn delete(&self, id: i64) -> Result<u64>;
    async fn delete_for_flow(&self, flow_id: i64) -> Result<u64>;

    /// Atomically reassign `step_order = 1..N` following `ordered_ids`.
    ///
    /// Callers validate that `ordered_ids` is a permutation of the flow's
    /// steps; this method only performs the renumbering and returns the
    /// steps in their new order.
    async fn set_order(&self, flow_id: i64, ordered_ids: &[i64]) -> Result<Vec<StepRecord>>;
}

/// Lead table.
#[async_trait]
pub trait LeadTable: Send + Sync {
    async fn insert(&self, lead: NewLead) -> Result<LeadRecord>;
    async fn get(&self, id: i64) -> Result<LeadRecord>;
    async fn list(&self, customer_id: i64) -> Result<Vec<LeadRecord>>;
    async fn update_status(&self, id: i64, status: &str) -> Result<LeadRecord>;

    /// Leads with no jobs at all, for the reconciliation sweep.
    async fn without_jobs(&self) -> Result<Vec<LeadRecord>>;

    async fn count(&self) -> Result<i64>;
}

/// Job table: the scheduling core.
#[async_trait]
pub trait JobTable: Send + Sync {
    async fn insert(&self, job: NewJob) -> Result<JobRecord>;
    async fn get(&self, id: i64) -> Result<JobRecord>;
    async fn list(&self, customer_id: i64, status: Option<JobStatus>) -> Result<Vec<JobRecord>>;
    async fn list_for_lead(&self, lead_id: i64) -> Result<Vec<JobRecord>>;

    /// Whether any job exists for this (lead, flow) pair; this is the
    /// materialize-once guard.
    async fn exists_for_lead_flow(&self, lead_id: i64, flow_id: i64) -> Result<bool>;

    /// Claim up to `limit` due pending jobs, ordered by `run_at` ascending.
    ///
    /// A claimed job is invisible to other claimants until `now +
    /// claim_timeout`; a claimant that crashes without finalizing loses the
    /// claim when it expires. Backends must guarantee that concurrent calls
    /// never return the same job while a claim is live.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        claim_timeout: Duration,
    ) -> Result<Vec<JobRecord>>;

    /// Transition a job to `done`. Returns false if the job was not pending.
    async fn mark_done(&self, id: i64) -> Result<bool>;

    /// Transition a job to `failed`. Returns false if the job was not pending.
    async fn mark_failed(&self, id: i64) -> Result<bool>;

    async fn status_counts(&self) -> Result<JobStatusCounts>;
}

/// Append-only event table.
#[async_trait]
pub trait EventTable: Send + Sync {
    async fn append(&self, event: NewEvent) -> Result<EventRecord>;
    async fn list_for_lead(&self, lead_id: i64, limit: i64) -> Result<Vec<EventRecord>>;
    async fn list(&self, customer_id: i64, limit: i64) -> Result<Vec<EventRecord>>;
    async fn count(&self) -> Result<i64>;
}

/// Trait defining the interface for a leadflow storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    fn flows(&self) -> &dyn FlowTable;
    fn steps(&self) -> &dyn StepTable;
    fn leads(&self) -> &dyn LeadTable;
    fn jobs(&self) -> &dyn JobTable;
    fn events(&self) -> &dyn EventTable;

    fn config(&self) -> &Config;
    fn backend_name(&self) -> &'static str;
    fn concurrency_model(&self) -> ConcurrencyModel;

    /// Install the leadflow schema (idempotent).
    async fn install(&self) -> Result<()>;

    /// Verify the leadflow schema is correctly installed.
    async fn verify(&self) -> Result<()>;
}
