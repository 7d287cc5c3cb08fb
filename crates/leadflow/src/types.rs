//! Core types for leadflow: flows, steps, leads, jobs, and events.
//!
//! This module defines the main data structures used for automation
//! definitions, scheduled jobs, and the audit trail.
//!
//! ## What
//!
//! - [`FlowRecord`] / [`StepRecord`] describe a tenant's automation.
//! - [`LeadRecord`] is the contact a flow runs against.
//! - [`JobRecord`] is one scheduled execution of one step for one lead.
//! - [`EventRecord`] is an immutable audit entry.
//!
//! ## How
//!
//! Records are read through the store traits; `New*` structs are the insert
//! inputs. [`StepConfig`] is the typed view of a step's JSON config,
//! validated when steps are created or updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self};
use tabled::Tabled;

/// Trigger identifier for flows that run when a lead is created.
///
/// The only trigger materialized today; the column stays free-form text so
/// new triggers can be added without a schema change.
pub const TRIGGER_NEW_LEAD: &str = "new_lead";

/// An automation flow definition owned by one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled, sqlx::FromRow)]
pub struct FlowRecord {
    /// Unique flow ID
    pub id: i64,
    /// Tenant that owns this flow
    pub customer_id: i64,
    /// Human-readable flow name
    pub name: String,
    /// Trigger identifier (currently only `new_lead` is materialized)
    pub trigger: String,
    /// Inactive flows are never materialized
    pub is_active: bool,
    /// Timestamp when the flow was created
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for FlowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlowRecord {{ id: {}, customer_id: {}, name: {}, trigger: {}, is_active: {} }}",
            self.id, self.customer_id, self.name, self.trigger, self.is_active
        )
    }
}

/// Input data for creating a new flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlow {
    pub customer_id: i64,
    pub name: String,
    pub trigger: String,
    pub is_active: bool,
}

/// Partial update for a flow; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct FlowUpdate {
    pub name: Option<String>,
    pub trigger: Option<String>,
    pub is_active: Option<bool>,
}

/// One unit of work within a flow.
///
/// `step_order` values within a flow are dense `1..N`; `delay_minutes` is
/// relative to the previous step, not to the trigger.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled, sqlx::FromRow)]
pub struct StepRecord {
    /// Unique step ID
    pub id: i64,
    /// Flow this step belongs to
    pub flow_id: i64,
    /// 1-based position within the flow
    pub step_order: i32,
    /// Step type tag (`wait`, `email`, or a future type)
    pub step_type: String,
    /// Minutes to wait since the previous step
    pub delay_minutes: i32,
    /// Type-specific configuration (JSON)
    pub config: serde_json::Value,
}

impl StepRecord {
    /// Typed view of the step type tag.
    pub fn kind(&self) -> StepType {
        StepType::parse(&self.step_type)
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StepRecord {{ id: {}, flow_id: {}, step_order: {}, step_type: {}, delay_minutes: {} }}",
            self.id, self.flow_id, self.step_order, self.step_type, self.delay_minutes
        )
    }
}

/// Input data for creating a new step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStep {
    pub flow_id: i64,
    pub step_order: i32,
    pub step_type: String,
    pub delay_minutes: i32,
    pub config: serde_json::Value,
}

/// Partial update for a step; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct StepUpdate {
    pub step_type: Option<String>,
    pub delay_minutes: Option<i32>,
    pub config: Option<serde_json::Value>,
}

/// Step type tag.
///
/// The set is open: unrecognized tags decode to [`StepType::Other`] and
/// execute as no-ops, so adding a step type never breaks deployed workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepType {
    /// No side effect; exists only to push later steps' run times out
    Wait,
    /// Send a templated email to the lead
    Email,
    /// Unrecognized type (future channel); executes as a no-op
    Other(String),
}

impl StepType {
    /// Decode a step type tag. Never fails; unknown tags become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "wait" => StepType::Wait,
            "email" => StepType::Email,
            other => StepType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepType::Wait => "wait",
            StepType::Email => "email",
            StepType::Other(s) => s,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Config payload for an `email` step.
///
/// Subject and body are templates over `{{name}}`, `{{email}}`, `{{phone}}`
/// and `{{message}}`. Both fall back to stock copy when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmailConfig {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Typed view of a step's `config` object, keyed by the step type.
#[derive(Debug, Clone, PartialEq)]
pub enum StepConfig {
    /// Wait steps carry no configuration
    Wait,
    /// Email template configuration
    Email(EmailConfig),
    /// Unrecognized step types keep their config opaque
    Other(serde_json::Value),
}

impl StepConfig {
    /// Parse and validate a config object against a step type.
    ///
    /// Wait steps ignore their config entirely. Email configs must be an
    /// object whose `subject`/`body`, when present, are strings. Unknown
    /// types accept anything.
    pub fn parse(kind: &StepType, config: &serde_json::Value) -> crate::error::Result<Self> {
        match kind {
            StepType::Wait => Ok(StepConfig::Wait),
            StepType::Email => {
                if config.is_null() {
                    return Ok(StepConfig::Email(EmailConfig::default()));
                }
                if !config.is_object() {
                    return Err(crate::error::Error::InvalidStepConfig {
                        step_type: kind.to_string(),
                        message: "config must be a JSON object".to_string(),
                    });
                }
                let parsed: EmailConfig = serde_json::from_value(config.clone()).map_err(|e| {
                    crate::error::Error::InvalidStepConfig {
                        step_type: kind.to_string(),
                        message: e.to_string(),
                    }
                })?;
                Ok(StepConfig::Email(parsed))
            }
            StepType::Other(_) => Ok(StepConfig::Other(config.clone())),
        }
    }
}

/// A tenant-owned contact record captured by an inbound form or webhook.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled, sqlx::FromRow)]
pub struct LeadRecord {
    /// Unique lead ID
    pub id: i64,
    /// Tenant that owns this lead
    pub customer_id: i64,
    /// Contact name
    pub name: String,
    /// Contact email address (follow-up recipient)
    pub email: String,
    /// Contact phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    #[tabled(skip)]
    pub phone: Option<String>,
    /// Free-form message from the capture form
    #[serde(skip_serializing_if = "Option::is_none")]
    #[tabled(skip)]
    pub message: Option<String>,
    /// Free-form status (e.g. new/contacted/closed)
    pub status: String,
    /// Timestamp when the lead was captured
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for LeadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LeadRecord {{ id: {}, customer_id: {}, name: {}, email: {}, status: {} }}",
            self.id, self.customer_id, self.name, self.email, self.status
        )
    }
}

/// Input data for capturing a new lead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLead {
    pub customer_id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
}

/// Job status enumeration.
///
/// `done` and `failed` are terminal: there is no automatic retry. Recovering
/// a failed job is an operator action (reset the row to `pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its run time; claimable once due
    Pending,
    /// Step executed successfully
    Done,
    /// Step execution failed; terminal
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// A scheduled, single-execution instance of one step for one lead.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled, sqlx::FromRow)]
pub struct JobRecord {
    /// Unique job ID
    pub id: i64,
    /// Tenant that owns this job
    pub customer_id: i64,
    /// Lead the step runs against
    pub lead_id: i64,
    /// Flow the step was materialized from
    pub flow_id: i64,
    /// Step to execute
    pub step_id: i64,
    /// Earliest time the job may run
    pub run_at: DateTime<Utc>,
    /// Current status
    pub status: JobStatus,
    /// Claim expiry; a claimed job becomes claimable again after this passes
    #[serde(skip_serializing_if = "Option::is_none")]
    #[tabled(skip)]
    pub locked_until: Option<DateTime<Utc>>,
    /// Timestamp when the job was materialized
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JobRecord {{ id: {}, lead_id: {}, flow_id: {}, step_id: {}, run_at: {}, status: {} }}",
            self.id, self.lead_id, self.flow_id, self.step_id, self.run_at, self.status
        )
    }
}

/// Input data for materializing a new job
#[derive(Debug, Clone)]
pub struct NewJob {
    pub customer_id: i64,
    pub lead_id: i64,
    pub flow_id: i64,
    pub step_id: i64,
    pub run_at: DateTime<Utc>,
}

/// Audit event type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// A job was materialized for a lead
    JobCreated,
    /// An email step delivered its message
    EmailSent,
    /// A job reached `done`
    JobDone,
    /// A job reached `failed`
    JobFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::JobCreated => "job_created",
            EventType::EmailSent => "email_sent",
            EventType::JobDone => "job_done",
            EventType::JobFailed => "job_failed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable audit record.
///
/// Append-only; never updated or deleted. The `event_type` column stays text
/// so readers keep working when new tags appear.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled, sqlx::FromRow)]
pub struct EventRecord {
    /// Unique event ID
    pub id: i64,
    /// Tenant the event belongs to
    pub customer_id: i64,
    /// Lead the event concerns
    pub lead_id: i64,
    /// Job involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    #[tabled(skip)]
    pub job_id: Option<i64>,
    /// Step involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    #[tabled(skip)]
    pub step_id: Option<i64>,
    /// Event type tag
    pub event_type: String,
    /// Human-readable summary
    #[serde(skip_serializing_if = "Option::is_none")]
    #[tabled(skip)]
    pub message: Option<String>,
    /// Structured context (flow name, step type, recipient, error text, ...)
    #[tabled(skip)]
    pub meta: serde_json::Value,
    /// Timestamp when the event was recorded
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventRecord {{ id: {}, lead_id: {}, event_type: {}, created_at: {} }}",
            self.id, self.lead_id, self.event_type, self.created_at
        )
    }
}

/// Input data for appending a new event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub customer_id: i64,
    pub lead_id: i64,
    pub job_id: Option<i64>,
    pub step_id: Option<i64>,
    pub event_type: EventType,
    pub message: Option<String>,
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_type_roundtrip() {
        assert_eq!(StepType::parse("wait"), StepType::Wait);
        assert_eq!(StepType::parse("email"), StepType::Email);
        assert_eq!(
            StepType::parse("whatsapp"),
            StepType::Other("whatsapp".to_string())
        );
        assert_eq!(StepType::parse("email").as_str(), "email");
        assert_eq!(StepType::Other("sms".into()).to_string(), "sms");
    }

    #[test]
    fn test_email_config_parsing() {
        let cfg = StepConfig::parse(
            &StepType::Email,
            &json!({"subject": "Hi {{name}}", "body": "Thanks"}),
        )
        .unwrap();
        assert_eq!(
            cfg,
            StepConfig::Email(EmailConfig {
                subject: Some("Hi {{name}}".to_string()),
                body: Some("Thanks".to_string()),
            })
        );

        // Extra keys are tolerated; the executor only reads subject/body.
        assert!(StepConfig::parse(
            &StepType::Email,
            &json!({"subject": "s", "reply_to": "x@y.z"})
        )
        .is_ok());

        // Wrong value types are rejected at the boundary.
        assert!(StepConfig::parse(&StepType::Email, &json!({"subject": 7})).is_err());
        assert!(StepConfig::parse(&StepType::Email, &json!("not an object")).is_err());
    }

    #[test]
    fn test_wait_and_unknown_configs() {
        assert_eq!(
            StepConfig::parse(&StepType::Wait, &json!({"anything": true})).unwrap(),
            StepConfig::Wait
        );
        let unknown = StepConfig::parse(&StepType::parse("sms"), &json!({"text": "hi"})).unwrap();
        assert_eq!(unknown, StepConfig::Other(json!({"text": "hi"})));
    }

    #[test]
    fn test_job_status_strings() {
        use std::str::FromStr;
        for status in [JobStatus::Pending, JobStatus::Done, JobStatus::Failed] {
            assert_eq!(JobStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(JobStatus::from_str("running").is_err());
    }
}
