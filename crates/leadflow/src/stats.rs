//! System statistics for monitoring.

use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobStatusCounts {
    /// Jobs waiting for their run time
    pub pending: i64,
    /// Jobs that executed successfully
    pub done: i64,
    /// Jobs that failed terminally
    pub failed: i64,
}

impl JobStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.done + self.failed
    }
}

impl fmt::Display for JobStatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JobStatusCounts {{ pending: {}, done: {}, failed: {} }}",
            self.pending, self.done, self.failed
        )
    }
}

/// System-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    /// Total number of flows
    pub total_flows: i64,
    /// Number of active flows
    pub active_flows: i64,
    /// Total number of leads
    pub total_leads: i64,
    /// Jobs waiting for their run time
    pub pending_jobs: i64,
    /// Jobs that executed successfully
    pub done_jobs: i64,
    /// Jobs that failed terminally
    pub failed_jobs: i64,
    /// Total number of audit events
    pub total_events: i64,
    /// Storage backend in use
    pub backend: String,
}

impl Tabled for SystemStats {
    const LENGTH: usize = 8;

    fn fields(&self) -> Vec<std::borrow::Cow<'static, str>> {
        vec![
            self.total_flows.to_string().into(),
            self.active_flows.to_string().into(),
            self.total_leads.to_string().into(),
            self.pending_jobs.to_string().into(),
            self.done_jobs.to_string().into(),
            self.failed_jobs.to_string().into(),
            self.total_events.to_string().into(),
            self.backend.clone().into(),
        ]
    }

    fn headers() -> Vec<std::borrow::Cow<'static, str>> {
        vec![
            "total_flows",
            "active_flows",
            "total_leads",
            "pending_jobs",
            "done_jobs",
            "failed_jobs",
            "total_events",
            "backend",
        ]
        .into_iter()
        .map(|s| s.into())
        .collect()
    }
}
