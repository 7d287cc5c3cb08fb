//! Administrative interface for managing leadflow infrastructure.
//!
//! This module provides the [`Admin`] struct for installing and verifying
//! the schema and for flow/step management with the ordering invariants the
//! materializer depends on.
//!
//! ## What
//!
//! - Schema management: `install()`, `verify()`, `stats()`.
//! - Flow operations: create, update, delete (steps removed first,
//!   explicitly).
//! - Step operations: append (next dense order), update, delete (survivors
//!   renumbered), reorder (full-permutation check, atomic 1..N reassign).
//!
//! ## How
//!
//! Step configs are validated here, at the boundary where steps are created
//! or updated, so the executor never sees a config that mismatches its step
//! type. After any step operation, reading the flow's steps back yields
//! `step_order` exactly `1..N`.

use crate::error::{Error, Result};
use crate::stats::SystemStats;
use crate::store::{AnyStore, Store};
use crate::types::{
    FlowRecord, FlowUpdate, LeadRecord, NewFlow, NewStep, StepConfig, StepRecord, StepType,
    StepUpdate,
};
use std::collections::HashSet;

/// Admin interface over any storage backend.
#[derive(Clone)]
pub struct Admin {
    store: AnyStore,
}

impl Admin {
    pub fn new(store: AnyStore) -> Self {
        Self { store }
    }

    // ===== Schema Management =====

    /// Install the leadflow schema (idempotent).
    pub async fn install(&self) -> Result<()> {
        self.store.install().await
    }

    /// Verify the leadflow schema is correctly installed.
    pub async fn verify(&self) -> Result<()> {
        self.store.verify().await
    }

    /// System-wide counts for monitoring.
    pub async fn stats(&self) -> Result<SystemStats> {
        let jobs = self.store.jobs().status_counts().await?;
        Ok(SystemStats {
            total_flows: self.store.flows().count().await?,
            active_flows: self.store.flows().count_active().await?,
            total_leads: self.store.leads().count().await?,
            pending_jobs: jobs.pending,
            done_jobs: jobs.done,
            failed_jobs: jobs.failed,
            total_events: self.store.events().count().await?,
            backend: self.store.backend_name().to_string(),
        })
    }

    // ===== Flow Operations =====

    pub async fn create_flow(&self, flow: NewFlow) -> Result<FlowRecord> {
        if flow.name.trim().is_empty() {
            return Err(Error::InvalidConfig {
                field: "name".to_string(),
                message: "Flow name cannot be empty".to_string(),
            });
        }
        if flow.trigger.trim().is_empty() {
            return Err(Error::InvalidConfig {
                field: "trigger".to_string(),
                message: "Flow trigger cannot be empty".to_string(),
            });
        }
        self.store.flows().insert(flow).await
    }

    pub async fn get_flow(&self, id: i64) -> Result<FlowRecord> {
        self.store.flows().get(id).await
    }

    pub async fn list_flows(&self, customer_id: i64) -> Result<Vec<FlowRecord>> {
        self.store.flows().list(customer_id).await
    }

    pub async fn update_flow(&self, id: i64, update: FlowUpdate) -> Result<FlowRecord> {
        self.store.flows().update(id, update).await
    }

    /// Delete a flow and its steps.
    ///
    /// Steps are deleted first, explicitly; the store never cascades.
    /// Existing jobs are untouched: they are snapshots and will fail with
    /// "step not found" if they run after this.
    pub async fn delete_flow(&self, id: i64) -> Result<()> {
        let flow = self.store.flows().get(id).await?;
        let removed = self.store.steps().delete_for_flow(flow.id).await?;
        self.store.flows().delete(flow.id).await?;
        tracing::info!(flow = id, steps = removed, "flow deleted");
        Ok(())
    }

    // ===== Step Operations =====

    pub async fn list_steps(&self, flow_id: i64) -> Result<Vec<StepRecord>> {
        // Surface a proper not-found for unknown flows instead of [].
        self.store.flows().get(flow_id).await?;
        self.store.steps().list_for_flow(flow_id).await
    }

    /// Append a step to the end of a flow, assigning the next `step_order`.
    pub async fn append_step(
        &self,
        flow_id: i64,
        step_type: &str,
        delay_minutes: i32,
        config: serde_json::Value,
    ) -> Result<StepRecord> {
        self.store.flows().get(flow_id).await?;
        validate_delay(delay_minutes)?;
        StepConfig::parse(&StepType::parse(step_type), &config)?;

        let existing = self.store.steps().list_for_flow(flow_id).await?;
        let step_order = existing.len() as i32 + 1;

        self.store
            .steps()
            .insert(NewStep {
                flow_id,
                step_order,
                step_type: step_type.to_string(),
                delay_minutes,
                config,
            })
            .await
    }

    /// Update a step's type, delay or config, revalidating the combination.
    pub async fn update_step(&self, step_id: i64, update: StepUpdate) -> Result<StepRecord> {
        let current = self.store.steps().get(step_id).await?;

        if let Some(delay) = update.delay_minutes {
            validate_delay(delay)?;
        }
        let step_type = update
            .step_type
            .clone()
            .unwrap_or_else(|| current.step_type.clone());
        let config = update.config.clone().unwrap_or_else(|| current.config.clone());
        StepConfig::parse(&StepType::parse(&step_type), &config)?;

        self.store.steps().update(step_id, update).await
    }

    /// Delete a step and renumber the survivors to a dense `1..N`.
    pub async fn delete_step(&self, step_id: i64) -> Result<()> {
        let step = self.store.steps().get(step_id).await?;
        self.store.steps().delete(step_id).await?;

        let remaining = self.store.steps().list_for_flow(step.flow_id).await?;
        if !remaining.is_empty() {
            let ids: Vec<i64> = remaining.iter().map(|s| s.id).collect();
            self.store.steps().set_order(step.flow_id, &ids).await?;
        }
        Ok(())
    }

    /// Atomically reorder a flow's steps to the given id sequence.
    ///
    /// `ordered_ids` must be a permutation of the flow's step ids: every id
    /// must belong to the flow, appear exactly once, and no step may be
    /// missing.
    pub async fn reorder_steps(
        &self,
        flow_id: i64,
        ordered_ids: &[i64],
    ) -> Result<Vec<StepRecord>> {
        let current = self.list_steps(flow_id).await?;
        let current_ids: HashSet<i64> = current.iter().map(|s| s.id).collect();

        if ordered_ids.len() != current.len() {
            return Err(Error::InvalidReorder {
                message: format!(
                    "expected {} step ids for flow {}, got {}",
                    current.len(),
                    flow_id,
                    ordered_ids.len()
                ),
            });
        }

        let mut seen = HashSet::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if !current_ids.contains(id) {
                return Err(Error::InvalidReorder {
                    message: format!("step {} does not belong to flow {}", id, flow_id),
                });
            }
            if !seen.insert(*id) {
                return Err(Error::InvalidReorder {
                    message: format!("step {} appears more than once", id),
                });
            }
        }

        self.store.steps().set_order(flow_id, ordered_ids).await
    }

    // ===== Lead Operations =====

    pub async fn update_lead_status(&self, lead_id: i64, status: &str) -> Result<LeadRecord> {
        self.store.leads().update_status(lead_id, status).await
    }
}

fn validate_delay(delay_minutes: i32) -> Result<()> {
    if delay_minutes < 0 {
        return Err(Error::InvalidConfig {
            field: "delay_minutes".to_string(),
            message: format!("delay must be non-negative, got {}", delay_minutes),
        });
    }
    Ok(())
}
