//! AnyStore enum for runtime backend selection.
//!
//! This module provides the `AnyStore` enum which wraps the storage backend
//! implementations and provides a unified interface via the `Store` trait.

use super::*;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::memory::MemoryStore;
use crate::store::postgres::PostgresStore;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;

/// Backend selected from the DSN scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendType {
    Postgres,
    Memory,
}

impl BackendType {
    fn detect(dsn: &str) -> Result<Self> {
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            Ok(BackendType::Postgres)
        } else if dsn.starts_with("memory://") {
            Ok(BackendType::Memory)
        } else {
            Err(Error::InvalidConfig {
                field: "dsn".to_string(),
                message: format!(
                    "unsupported DSN '{}': expected postgres:// or memory://",
                    dsn
                ),
            })
        }
    }
}

/// Runtime-selectable storage backend.
///
/// The DSN format determines which backend is used:
/// - `postgres://` or `postgresql://` → PostgreSQL
/// - `memory://` → in-memory (tests and local development)
#[derive(Debug, Clone)]
pub enum AnyStore {
    /// PostgreSQL backend
    Postgres(PostgresStore),
    /// In-memory backend
    Memory(MemoryStore),
}

impl AnyStore {
    /// Connect to a storage backend using a configuration object.
    ///
    /// Applies the schema search path, pool size, and connection timeout for
    /// the Postgres backend. Users should prefer the high-level
    /// [`crate::connect`] / [`crate::connect_with_config`] functions.
    pub(crate) async fn connect(config: &Config) -> Result<Self> {
        match BackendType::detect(&config.dsn)? {
            BackendType::Postgres => {
                let search_path_sql = format!("SET search_path = \"{}\"", config.schema);

                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(std::time::Duration::from_secs(
                        config.connection_timeout_seconds,
                    ))
                    .after_connect(move |conn, _meta| {
                        let sql = search_path_sql.clone();
                        Box::pin(async move {
                            sqlx::query(&sql).execute(&mut *conn).await?;
                            Ok(())
                        })
                    })
                    .connect(&config.dsn)
                    .await?;

                Ok(AnyStore::Postgres(PostgresStore::new(pool, config)))
            }
            BackendType::Memory => Ok(AnyStore::Memory(MemoryStore::new(config))),
        }
    }

    /// Connect using just a DSN string with default configuration.
    pub async fn connect_with_dsn(dsn: &str) -> Result<Self> {
        let config = Config::from_dsn(dsn);
        Self::connect(&config).await
    }
}

#[async_trait]
impl Store for AnyStore {
    fn flows(&self) -> &dyn FlowTable {
        match self {
            AnyStore::Postgres(s) => s.flows(),
            AnyStore::Memory(s) => s.flows(),
        }
    }

    fn steps(&self) -> &dyn StepTable {
        match self {
            AnyStore::Postgres(s) => s.steps(),
            AnyStore::Memory(s) => s.steps(),
        }
    }

    fn leads(&self) -> &dyn LeadTable {
        match self {
            AnyStore::Postgres(s) => s.leads(),
            AnyStore::Memory(s) => s.leads(),
        }
    }

    fn jobs(&self) -> &dyn JobTable {
        match self {
            AnyStore::Postgres(s) => s.jobs(),
            AnyStore::Memory(s) => s.jobs(),
        }
    }

    fn events(&self) -> &dyn EventTable {
        match self {
            AnyStore::Postgres(s) => s.events(),
            AnyStore::Memory(s) => s.events(),
        }
    }

    fn config(&self) -> &Config {
        match self {
            AnyStore::Postgres(s) => s.config(),
            AnyStore::Memory(s) => s.config(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            AnyStore::Postgres(s) => s.backend_name(),
            AnyStore::Memory(s) => s.backend_name(),
        }
    }

    fn concurrency_model(&self) -> ConcurrencyModel {
        match self {
            AnyStore::Postgres(s) => s.concurrency_model(),
            AnyStore::Memory(s) => s.concurrency_model(),
        }
    }

    async fn install(&self) -> Result<()> {
        match self {
            AnyStore::Postgres(s) => s.install().await,
            AnyStore::Memory(s) => s.install().await,
        }
    }

    async fn verify(&self) -> Result<()> {
        match self {
            AnyStore::Postgres(s) => s.verify().await,
            AnyStore::Memory(s) => s.verify().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detection() {
        assert_eq!(
            BackendType::detect("postgres://localhost/db").unwrap(),
            BackendType::Postgres
        );
        assert_eq!(
            BackendType::detect("postgresql://localhost/db").unwrap(),
            BackendType::Postgres
        );
        assert_eq!(
            BackendType::detect("memory://").unwrap(),
            BackendType::Memory
        );
        assert!(BackendType::detect("mysql://localhost/db").is_err());
    }
}
