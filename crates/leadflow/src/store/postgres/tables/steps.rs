use crate::error::{Error, Result};
use crate::store::StepTable;
use crate::types::{NewStep, StepRecord, StepUpdate};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Steps {
    pool: PgPool,
}

impl Steps {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// SQL Constants
const INSERT_STEP: &str = r#"
    INSERT INTO leadflow_steps (flow_id, step_order, step_type, delay_minutes, config)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id, flow_id, step_order, step_type, delay_minutes, config
"#;

const GET_STEP_BY_ID: &str = r#"
    SELECT id, flow_id, step_order, step_type, delay_minutes, config
    FROM leadflow_steps
    WHERE id = $1
"#;

const LIST_STEPS_FOR_FLOW: &str = r#"
    SELECT id, flow_id, step_order, step_type, delay_minutes, config
    FROM leadflow_steps
    WHERE flow_id = $1
    ORDER BY step_order ASC
"#;

const UPDATE_STEP: &str = r#"
    UPDATE leadflow_steps
    SET step_type = COALESCE($2, step_type),
        delay_minutes = COALESCE($3, delay_minutes),
        config = COALESCE($4, config)
    WHERE id = $1
    RETURNING id, flow_id, step_order, step_type, delay_minutes, config
"#;

const DELETE_STEP: &str = r#"
    DELETE FROM leadflow_steps
    WHERE id = $1
"#;

const DELETE_STEPS_FOR_FLOW: &str = r#"
    DELETE FROM leadflow_steps
    WHERE flow_id = $1
"#;

const SET_STEP_ORDER: &str = r#"
    UPDATE leadflow_steps
    SET step_order = $3
    WHERE id = $1 AND flow_id = $2
"#;

#[async_trait::async_trait]
impl StepTable for Steps {
    async fn insert(&self, step: NewStep) -> Result<StepRecord> {
        let record = sqlx::query_as::<_, StepRecord>(INSERT_STEP)
            .bind(step.flow_id)
            .bind(step.step_order)
            .bind(&step.step_type)
            .bind(step.delay_minutes)
            .bind(&step.config)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<StepRecord> {
        sqlx::query_as::<_, StepRecord>(GET_STEP_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Step", id))
    }

    async fn list_for_flow(&self, flow_id: i64) -> Result<Vec<StepRecord>> {
        let records = sqlx::query_as::<_, StepRecord>(LIST_STEPS_FOR_FLOW)
            .bind(flow_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn update(&self, id: i64, update: StepUpdate) -> Result<StepRecord> {
        sqlx::query_as::<_, StepRecord>(UPDATE_STEP)
            .bind(id)
            .bind(update.step_type)
            .bind(update.delay_minutes)
            .bind(update.config)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Step", id))
    }

    async fn delete(&self, id: i64) -> Result<u64> {
        let result = sqlx::query(DELETE_STEP).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_flow(&self, flow_id: i64) -> Result<u64> {
        let result = sqlx::query(DELETE_STEPS_FOR_FLOW)
            .bind(flow_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_order(&self, flow_id: i64, ordered_ids: &[i64]) -> Result<Vec<StepRecord>> {
        // One transaction so the dense 1..N sequence appears atomically; the
        // unique (flow_id, step_order) constraint is deferred to commit.
        let mut tx = self.pool.begin().await?;
        for (idx, step_id) in ordered_ids.iter().enumerate() {
            let result = sqlx::query(SET_STEP_ORDER)
                .bind(step_id)
                .bind(flow_id)
                .bind((idx + 1) as i32)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(Error::StepNotInFlow {
                    step_id: *step_id,
                    flow_id,
                });
            }
        }
        tx.commit().await?;

        self.list_for_flow(flow_id).await
    }
}
