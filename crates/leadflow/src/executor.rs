//! Step execution: interpret a claimed job's step against its lead.
//!
//! ## What
//!
//! - [`StepExecutor`] resolves a job's step and lead and performs the step's
//!   effect: nothing for `wait`, a templated email for `email`.
//! - [`render_template`] substitutes the lead placeholders `{{name}}`,
//!   `{{email}}`, `{{phone}}` and `{{message}}`.
//!
//! ## How
//!
//! Construct one per worker with the store, a [`Mailer`] and the configured
//! sender address, then call [`StepExecutor::execute`] for each claimed job.
//! Unknown step types succeed as no-ops so flows with future step types keep
//! running.

use crate::error::{Error, Result};
use crate::mailer::Mailer;
use crate::store::{AnyStore, Store};
use crate::types::{EmailConfig, EventType, JobRecord, LeadRecord, NewEvent, StepConfig, StepType};
use std::sync::Arc;

/// Default subject when an email step's config has none.
const DEFAULT_SUBJECT: &str = "Thanks!";
/// Default body when an email step's config has none.
const DEFAULT_BODY: &str = "We will contact you soon.";

/// Substitute lead fields into a template string.
///
/// Literal replacement only: no escaping, conditionals or loops. Missing
/// optional fields substitute the empty string, never the text "null".
pub fn render_template(template: &str, lead: &LeadRecord) -> String {
    template
        .replace("{{name}}", &lead.name)
        .replace("{{email}}", &lead.email)
        .replace("{{phone}}", lead.phone.as_deref().unwrap_or(""))
        .replace("{{message}}", lead.message.as_deref().unwrap_or(""))
}

/// Wrap a rendered body as minimal HTML, converting newlines to breaks.
fn to_html(body: &str) -> String {
    format!("<p>{}</p>", body.replace('\n', "<br/>"))
}

/// Executes one job's step against its lead.
#[derive(Clone)]
pub struct StepExecutor {
    store: AnyStore,
    mailer: Arc<dyn Mailer>,
    sender: Option<String>,
}

impl StepExecutor {
    pub fn new(store: AnyStore, mailer: Arc<dyn Mailer>, sender: Option<String>) -> Self {
        Self {
            store,
            mailer,
            sender,
        }
    }

    /// Execute a claimed job.
    ///
    /// Any error returned here fails the job terminally; the caller records
    /// the error text in the audit trail.
    pub async fn execute(&self, job: &JobRecord) -> Result<()> {
        let step = self.store.steps().get(job.step_id).await?;
        let lead = self.store.leads().get(job.lead_id).await?;

        match step.kind() {
            StepType::Wait => {
                // The delay is already encoded in run_at; nothing to do.
                Ok(())
            }
            StepType::Email => {
                let config = match StepConfig::parse(&StepType::Email, &step.config)? {
                    StepConfig::Email(config) => config,
                    _ => EmailConfig::default(),
                };
                self.send_email(job, &lead, &config).await
            }
            StepType::Other(step_type) => {
                tracing::debug!(
                    job = job.id,
                    step = step.id,
                    step_type = %step_type,
                    "unknown step type, skipping"
                );
                Ok(())
            }
        }
    }

    async fn send_email(
        &self,
        job: &JobRecord,
        lead: &LeadRecord,
        config: &EmailConfig,
    ) -> Result<()> {
        let subject = render_template(config.subject.as_deref().unwrap_or(DEFAULT_SUBJECT), lead);
        let body = render_template(config.body.as_deref().unwrap_or(DEFAULT_BODY), lead);

        let from = self.sender.as_deref().ok_or(Error::MissingSender)?;
        let html = to_html(&body);

        self.mailer.send(from, &lead.email, &subject, &html).await?;

        self.store
            .events()
            .append(NewEvent {
                customer_id: job.customer_id,
                lead_id: job.lead_id,
                job_id: Some(job.id),
                step_id: Some(job.step_id),
                event_type: EventType::EmailSent,
                message: Some(format!("Email sent to {}", lead.email)),
                meta: serde_json::json!({
                    "to": lead.email,
                    "subject": subject,
                }),
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lead(phone: Option<&str>, message: Option<&str>) -> LeadRecord {
        LeadRecord {
            id: 1,
            customer_id: 1,
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            phone: phone.map(String::from),
            message: message.map(String::from),
            status: "new".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_all_placeholders() {
        let lead = lead(Some("555-0100"), Some("I want a quote"));
        let rendered = render_template("{{name}}|{{email}}|{{phone}}|{{message}}", &lead);
        assert_eq!(rendered, "Ann|ann@x.com|555-0100|I want a quote");
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_render_missing_fields_are_empty() {
        let lead = lead(None, None);
        let rendered = render_template("p={{phone}} m={{message}}", &lead);
        assert_eq!(rendered, "p= m=");
        assert!(!rendered.contains("null"));
    }

    #[test]
    fn test_render_leaves_unknown_tokens() {
        let lead = lead(None, None);
        assert_eq!(
            render_template("Hi {{name}}, ref {{company}}", &lead),
            "Hi Ann, ref {{company}}"
        );
    }

    #[test]
    fn test_to_html_converts_newlines() {
        assert_eq!(to_html("a\nb\nc"), "<p>a<br/>b<br/>c</p>");
        assert_eq!(to_html("plain"), "<p>plain</p>");
    }
}
