use crate::error::{Error, Result};
use crate::store::FlowTable;
use crate::types::{FlowRecord, FlowUpdate, NewFlow};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Flows {
    pool: PgPool,
}

impl Flows {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// SQL Constants
const INSERT_FLOW: &str = r#"
    INSERT INTO leadflow_flows (customer_id, name, trigger, is_active, created_at)
    VALUES ($1, $2, $3, $4, NOW())
    RETURNING id, customer_id, name, trigger, is_active, created_at
"#;

const GET_FLOW_BY_ID: &str = r#"
    SELECT id, customer_id, name, trigger, is_active, created_at
    FROM leadflow_flows
    WHERE id = $1
"#;

const LIST_FLOWS: &str = r#"
    SELECT id, customer_id, name, trigger, is_active, created_at
    FROM leadflow_flows
    WHERE customer_id = $1
    ORDER BY created_at DESC
"#;

const ACTIVE_FLOWS_FOR_TRIGGER: &str = r#"
    SELECT id, customer_id, name, trigger, is_active, created_at
    FROM leadflow_flows
    WHERE customer_id = $1 AND trigger = $2 AND is_active = TRUE
    ORDER BY id ASC
"#;

const UPDATE_FLOW: &str = r#"
    UPDATE leadflow_flows
    SET name = COALESCE($2, name),
        trigger = COALESCE($3, trigger),
        is_active = COALESCE($4, is_active)
    WHERE id = $1
    RETURNING id, customer_id, name, trigger, is_active, created_at
"#;

const DELETE_FLOW: &str = r#"
    DELETE FROM leadflow_flows
    WHERE id = $1
"#;

const COUNT_FLOWS: &str = r#"
    SELECT COUNT(*) FROM leadflow_flows
"#;

const COUNT_ACTIVE_FLOWS: &str = r#"
    SELECT COUNT(*) FROM leadflow_flows WHERE is_active = TRUE
"#;

#[async_trait::async_trait]
impl FlowTable for Flows {
    async fn insert(&self, flow: NewFlow) -> Result<FlowRecord> {
        let record = sqlx::query_as::<_, FlowRecord>(INSERT_FLOW)
            .bind(flow.customer_id)
            .bind(&flow.name)
            .bind(&flow.trigger)
            .bind(flow.is_active)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<FlowRecord> {
        sqlx::query_as::<_, FlowRecord>(GET_FLOW_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Flow", id))
    }

    async fn list(&self, customer_id: i64) -> Result<Vec<FlowRecord>> {
        let records = sqlx::query_as::<_, FlowRecord>(LIST_FLOWS)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn active_for_trigger(
        &self,
        customer_id: i64,
        trigger: &str,
    ) -> Result<Vec<FlowRecord>> {
        let records = sqlx::query_as::<_, FlowRecord>(ACTIVE_FLOWS_FOR_TRIGGER)
            .bind(customer_id)
            .bind(trigger)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn update(&self, id: i64, update: FlowUpdate) -> Result<FlowRecord> {
        sqlx::query_as::<_, FlowRecord>(UPDATE_FLOW)
            .bind(id)
            .bind(update.name)
            .bind(update.trigger)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Flow", id))
    }

    async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query(DELETE_FLOW).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(COUNT_FLOWS).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn count_active(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(COUNT_ACTIVE_FLOWS)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
