use crate::error::{Error, Result};
use crate::stats::JobStatusCounts;
use crate::store::JobTable;
use crate::types::{JobRecord, JobStatus, NewJob};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Jobs {
    pool: PgPool,
}

impl Jobs {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// SQL Constants
const INSERT_JOB: &str = r#"
    INSERT INTO leadflow_jobs (customer_id, lead_id, flow_id, step_id, run_at, status, created_at)
    VALUES ($1, $2, $3, $4, $5, 'pending', NOW())
    RETURNING id, customer_id, lead_id, flow_id, step_id, run_at, status, locked_until, created_at
"#;

const GET_JOB_BY_ID: &str = r#"
    SELECT id, customer_id, lead_id, flow_id, step_id, run_at, status, locked_until, created_at
    FROM leadflow_jobs
    WHERE id = $1
"#;

const LIST_JOBS: &str = r#"
    SELECT id, customer_id, lead_id, flow_id, step_id, run_at, status, locked_until, created_at
    FROM leadflow_jobs
    WHERE customer_id = $1 AND ($2 IS NULL OR status = $2)
    ORDER BY run_at ASC
"#;

const LIST_JOBS_FOR_LEAD: &str = r#"
    SELECT id, customer_id, lead_id, flow_id, step_id, run_at, status, locked_until, created_at
    FROM leadflow_jobs
    WHERE lead_id = $1
    ORDER BY run_at ASC
"#;

const EXISTS_FOR_LEAD_FLOW: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM leadflow_jobs
        WHERE lead_id = $1 AND flow_id = $2
    )
"#;

/// Claim due pending jobs with SKIP LOCKED.
///
/// The inner select takes row locks and skips rows a concurrent claimant
/// already holds; `locked_until` keeps the claim across statements until the
/// claimant finalizes the job or crashes and the claim expires.
const CLAIM_DUE_JOBS: &str = r#"
    UPDATE leadflow_jobs t
    SET locked_until = $1 + make_interval(secs => $3::double precision)
    FROM (
        SELECT id
        FROM leadflow_jobs
        WHERE status = 'pending' AND run_at <= $1
          AND (locked_until IS NULL OR locked_until <= $1)
        ORDER BY run_at ASC
        LIMIT $2
        FOR UPDATE SKIP LOCKED
    ) due
    WHERE t.id = due.id
    RETURNING t.id, t.customer_id, t.lead_id, t.flow_id, t.step_id, t.run_at, t.status, t.locked_until, t.created_at
"#;

const MARK_JOB_DONE: &str = r#"
    UPDATE leadflow_jobs
    SET status = 'done', locked_until = NULL
    WHERE id = $1 AND status = 'pending'
"#;

const MARK_JOB_FAILED: &str = r#"
    UPDATE leadflow_jobs
    SET status = 'failed', locked_until = NULL
    WHERE id = $1 AND status = 'pending'
"#;

const STATUS_COUNTS: &str = r#"
    SELECT
        COUNT(*) FILTER (WHERE status = 'pending') AS pending,
        COUNT(*) FILTER (WHERE status = 'done') AS done,
        COUNT(*) FILTER (WHERE status = 'failed') AS failed
    FROM leadflow_jobs
"#;

#[async_trait::async_trait]
impl JobTable for Jobs {
    async fn insert(&self, job: NewJob) -> Result<JobRecord> {
        let record = sqlx::query_as::<_, JobRecord>(INSERT_JOB)
            .bind(job.customer_id)
            .bind(job.lead_id)
            .bind(job.flow_id)
            .bind(job.step_id)
            .bind(job.run_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<JobRecord> {
        sqlx::query_as::<_, JobRecord>(GET_JOB_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn list(&self, customer_id: i64, status: Option<JobStatus>) -> Result<Vec<JobRecord>> {
        let records = sqlx::query_as::<_, JobRecord>(LIST_JOBS)
            .bind(customer_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn list_for_lead(&self, lead_id: i64) -> Result<Vec<JobRecord>> {
        let records = sqlx::query_as::<_, JobRecord>(LIST_JOBS_FOR_LEAD)
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn exists_for_lead_flow(&self, lead_id: i64, flow_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(EXISTS_FOR_LEAD_FLOW)
            .bind(lead_id)
            .bind(flow_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        claim_timeout: Duration,
    ) -> Result<Vec<JobRecord>> {
        let mut records = sqlx::query_as::<_, JobRecord>(CLAIM_DUE_JOBS)
            .bind(now)
            .bind(limit)
            .bind(claim_timeout.num_seconds() as f64)
            .fetch_all(&self.pool)
            .await?;
        // UPDATE ... RETURNING does not preserve the subquery's order.
        records.sort_by_key(|job| (job.run_at, job.id));
        Ok(records)
    }

    async fn mark_done(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(MARK_JOB_DONE)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(MARK_JOB_FAILED)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn status_counts(&self) -> Result<JobStatusCounts> {
        let (pending, done, failed): (i64, i64, i64) = sqlx::query_as(STATUS_COUNTS)
            .fetch_one(&self.pool)
            .await?;
        Ok(JobStatusCounts {
            pending,
            done,
            failed,
        })
    }
}
