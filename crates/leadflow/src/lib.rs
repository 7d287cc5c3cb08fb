//! # leadflow
//!
//! **leadflow** is a multi-tenant lead follow-up automation engine backed by
//! PostgreSQL. Customers define flows of timed steps; when a lead arrives,
//! every matching flow is materialized into scheduled jobs, and a polling
//! worker executes due jobs with an append-only audit trail.
//!
//! ## Features
//!
//! - **Library-only core**: embed the materializer and worker in your own
//!   binaries, or use the bundled `leadflow` CLI.
//! - **Safe concurrent workers**: job claiming uses PostgreSQL's
//!   `FOR UPDATE SKIP LOCKED` plus a claim timeout, so any number of worker
//!   processes can poll the same store without double-sending an email.
//! - **Relative delays**: each step waits `delay_minutes` after the previous
//!   step; run times are the running sum from the trigger.
//! - **Audit trail**: every materialization, delivery and state transition is
//!   an immutable event row.
//! - **Test-friendly**: an in-memory store backend and a recording mock
//!   mailer ship with the crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use leadflow::types::{NewFlow, NewLead, TRIGGER_NEW_LEAD};
//! use serde_json::json;
//!
//! # async fn example() -> leadflow::Result<()> {
//! // Connect to PostgreSQL
//! let store = leadflow::connect("postgresql://localhost/mydb").await?;
//!
//! // Setup (run once)
//! let admin = leadflow::admin(&store);
//! admin.install().await?;
//!
//! // Define a follow-up flow
//! let flow = admin
//!     .create_flow(NewFlow {
//!         customer_id: 1,
//!         name: "Quick Follow-up".into(),
//!         trigger: TRIGGER_NEW_LEAD.into(),
//!         is_active: true,
//!     })
//!     .await?;
//! admin
//!     .append_step(flow.id, "email", 0, json!({"subject": "Hi {{name}}"}))
//!     .await?;
//! admin.append_step(flow.id, "wait", 10, json!({})).await?;
//! admin.append_step(flow.id, "email", 0, json!({"subject": "Reminder"})).await?;
//!
//! // Capture a lead; jobs are scheduled immediately
//! let lead = leadflow::materializer(&store)
//!     .capture_lead(NewLead {
//!         customer_id: 1,
//!         name: "Ann".into(),
//!         email: "ann@x.com".into(),
//!         phone: None,
//!         message: Some("I'd like a quote".into()),
//!     })
//!     .await?;
//! assert_eq!(lead.status, "new");
//! # Ok(())
//! # }
//! ```
//!
//! The worker is a separate long-lived process; see [`poller::Poller`] and
//! the `leadflow worker run` CLI command.

pub mod admin;
pub mod config;
pub mod error;
pub mod executor;
pub mod mailer;
pub mod materializer;
pub mod poller;
pub mod stats;
pub mod store;
pub mod types;

pub use crate::admin::Admin;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::executor::StepExecutor;
pub use crate::mailer::{Mailer, MockMailer, SentEmail, SmtpMailer};
pub use crate::materializer::Materializer;
pub use crate::poller::{Poller, TickSummary};
pub use crate::stats::{JobStatusCounts, SystemStats};
pub use crate::store::{AnyStore, ConcurrencyModel, MemoryStore, PostgresStore, Store};
pub use crate::types::{
    EmailConfig, EventRecord, EventType, FlowRecord, FlowUpdate, JobRecord, JobStatus, LeadRecord,
    NewEvent, NewFlow, NewJob, NewLead, NewStep, StepConfig, StepRecord, StepType, StepUpdate,
    TRIGGER_NEW_LEAD,
};

/// Connect to a storage backend using just a DSN string.
///
/// `postgres://` / `postgresql://` select PostgreSQL; `memory://` selects the
/// in-memory backend.
pub async fn connect(dsn: &str) -> Result<AnyStore> {
    AnyStore::connect_with_dsn(dsn).await
}

/// Connect to a storage backend using a full configuration object.
pub async fn connect_with_config(config: &Config) -> Result<AnyStore> {
    AnyStore::connect(config).await
}

/// Create an [`Admin`] for schema and flow management.
pub fn admin(store: &AnyStore) -> Admin {
    Admin::new(store.clone())
}

/// Create a [`Materializer`], the lead-creation trigger hook.
pub fn materializer(store: &AnyStore) -> Materializer {
    Materializer::new(store.clone())
}
