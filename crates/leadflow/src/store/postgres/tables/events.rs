use crate::error::Result;
use crate::store::EventTable;
use crate::types::{EventRecord, NewEvent};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Events {
    pool: PgPool,
}

impl Events {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// SQL Constants
const APPEND_EVENT: &str = r#"
    INSERT INTO leadflow_events (customer_id, lead_id, job_id, step_id, event_type, message, meta, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
    RETURNING id, customer_id, lead_id, job_id, step_id, event_type, message, meta, created_at
"#;

const LIST_EVENTS_FOR_LEAD: &str = r#"
    SELECT id, customer_id, lead_id, job_id, step_id, event_type, message, meta, created_at
    FROM leadflow_events
    WHERE lead_id = $1
    ORDER BY created_at DESC, id DESC
    LIMIT $2
"#;

const LIST_EVENTS: &str = r#"
    SELECT id, customer_id, lead_id, job_id, step_id, event_type, message, meta, created_at
    FROM leadflow_events
    WHERE customer_id = $1
    ORDER BY created_at DESC, id DESC
    LIMIT $2
"#;

const COUNT_EVENTS: &str = r#"
    SELECT COUNT(*) FROM leadflow_events
"#;

#[async_trait::async_trait]
impl EventTable for Events {
    async fn append(&self, event: NewEvent) -> Result<EventRecord> {
        let record = sqlx::query_as::<_, EventRecord>(APPEND_EVENT)
            .bind(event.customer_id)
            .bind(event.lead_id)
            .bind(event.job_id)
            .bind(event.step_id)
            .bind(event.event_type.as_str())
            .bind(&event.message)
            .bind(&event.meta)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn list_for_lead(&self, lead_id: i64, limit: i64) -> Result<Vec<EventRecord>> {
        let records = sqlx::query_as::<_, EventRecord>(LIST_EVENTS_FOR_LEAD)
            .bind(lead_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn list(&self, customer_id: i64, limit: i64) -> Result<Vec<EventRecord>> {
        let records = sqlx::query_as::<_, EventRecord>(LIST_EVENTS)
            .bind(customer_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(COUNT_EVENTS)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
