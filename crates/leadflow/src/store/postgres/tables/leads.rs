use crate::error::{Error, Result};
use crate::store::LeadTable;
use crate::types::{LeadRecord, NewLead};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Leads {
    pool: PgPool,
}

impl Leads {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// SQL Constants
const INSERT_LEAD: &str = r#"
    INSERT INTO leadflow_leads (customer_id, name, email, phone, message, status, created_at)
    VALUES ($1, $2, $3, $4, $5, 'new', NOW())
    RETURNING id, customer_id, name, email, phone, message, status, created_at
"#;

const GET_LEAD_BY_ID: &str = r#"
    SELECT id, customer_id, name, email, phone, message, status, created_at
    FROM leadflow_leads
    WHERE id = $1
"#;

const LIST_LEADS: &str = r#"
    SELECT id, customer_id, name, email, phone, message, status, created_at
    FROM leadflow_leads
    WHERE customer_id = $1
    ORDER BY created_at DESC
"#;

const UPDATE_LEAD_STATUS: &str = r#"
    UPDATE leadflow_leads
    SET status = $2
    WHERE id = $1
    RETURNING id, customer_id, name, email, phone, message, status, created_at
"#;

const LEADS_WITHOUT_JOBS: &str = r#"
    SELECT l.id, l.customer_id, l.name, l.email, l.phone, l.message, l.status, l.created_at
    FROM leadflow_leads l
    LEFT OUTER JOIN leadflow_jobs j ON j.lead_id = l.id
    WHERE j.id IS NULL
    ORDER BY l.created_at ASC
"#;

const COUNT_LEADS: &str = r#"
    SELECT COUNT(*) FROM leadflow_leads
"#;

#[async_trait::async_trait]
impl LeadTable for Leads {
    async fn insert(&self, lead: NewLead) -> Result<LeadRecord> {
        let record = sqlx::query_as::<_, LeadRecord>(INSERT_LEAD)
            .bind(lead.customer_id)
            .bind(&lead.name)
            .bind(&lead.email)
            .bind(&lead.phone)
            .bind(&lead.message)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<LeadRecord> {
        sqlx::query_as::<_, LeadRecord>(GET_LEAD_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Lead", id))
    }

    async fn list(&self, customer_id: i64) -> Result<Vec<LeadRecord>> {
        let records = sqlx::query_as::<_, LeadRecord>(LIST_LEADS)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn update_status(&self, id: i64, status: &str) -> Result<LeadRecord> {
        sqlx::query_as::<_, LeadRecord>(UPDATE_LEAD_STATUS)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Lead", id))
    }

    async fn without_jobs(&self) -> Result<Vec<LeadRecord>> {
        let records = sqlx::query_as::<_, LeadRecord>(LEADS_WITHOUT_JOBS)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(COUNT_LEADS).fetch_one(&self.pool).await?;
        Ok(count)
    }
}
