//! Postgres implementation of the Store trait.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{
    ConcurrencyModel, EventTable, FlowTable, JobTable, LeadTable, StepTable, Store,
};
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use std::sync::Arc;

pub mod tables;

use self::tables::events::Events;
use self::tables::flows::Flows;
use self::tables::jobs::Jobs;
use self::tables::leads::Leads;
use self::tables::steps::Steps;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

// Verification queries
const CHECK_TABLE_EXISTS: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_name = $1
    )
"#;

const CHECK_ORPHANED_STEPS: &str = r#"
    SELECT COUNT(*)
    FROM leadflow_steps s
    LEFT OUTER JOIN leadflow_flows f ON s.flow_id = f.id
    WHERE f.id IS NULL
"#;

const CHECK_ORPHANED_JOBS: &str = r#"
    SELECT COUNT(*)
    FROM leadflow_jobs j
    LEFT OUTER JOIN leadflow_leads l ON j.lead_id = l.id
    WHERE l.id IS NULL
"#;

const REQUIRED_TABLES: &[&str] = &[
    "leadflow_flows",
    "leadflow_steps",
    "leadflow_leads",
    "leadflow_jobs",
    "leadflow_events",
];

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    config: Config,
    flows: Arc<Flows>,
    steps: Arc<Steps>,
    leads: Arc<Leads>,
    jobs: Arc<Jobs>,
    events: Arc<Events>,
}

impl PostgresStore {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool: pool.clone(),
            config: config.clone(),
            flows: Arc::new(Flows::new(pool.clone())),
            steps: Arc::new(Steps::new(pool.clone())),
            leads: Arc::new(Leads::new(pool.clone())),
            jobs: Arc::new(Jobs::new(pool.clone())),
            events: Arc::new(Events::new(pool)),
        }
    }

    /// Get access to the underlying PgPool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn flows(&self) -> &dyn FlowTable {
        self.flows.as_ref()
    }

    fn steps(&self) -> &dyn StepTable {
        self.steps.as_ref()
    }

    fn leads(&self) -> &dyn LeadTable {
        self.leads.as_ref()
    }

    fn jobs(&self) -> &dyn JobTable {
        self.jobs.as_ref()
    }

    fn events(&self) -> &dyn EventTable {
        self.events.as_ref()
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn concurrency_model(&self) -> ConcurrencyModel {
        ConcurrencyModel::MultiProcess
    }

    async fn install(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        for table in REQUIRED_TABLES {
            let exists: bool = sqlx::query_scalar(CHECK_TABLE_EXISTS)
                .bind(*table)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(Error::SchemaValidation {
                    message: format!("required table '{}' is missing", table),
                });
            }
        }

        let orphaned_steps: i64 = sqlx::query_scalar(CHECK_ORPHANED_STEPS)
            .fetch_one(&self.pool)
            .await?;
        if orphaned_steps > 0 {
            return Err(Error::SchemaValidation {
                message: format!("{} steps reference a missing flow", orphaned_steps),
            });
        }

        let orphaned_jobs: i64 = sqlx::query_scalar(CHECK_ORPHANED_JOBS)
            .fetch_one(&self.pool)
            .await?;
        if orphaned_jobs > 0 {
            return Err(Error::SchemaValidation {
                message: format!("{} jobs reference a missing lead", orphaned_jobs),
            });
        }

        Ok(())
    }
}
