//! Error types and result handling for leadflow.
//!
//! This module defines the core error type [`Error`] used throughout the
//! crate, as well as the [`Result`] alias for fallible operations.
//!
//! ## What
//!
//! - [`Error`] enumerates all error cases that can occur in leadflow,
//!   including database, configuration, serialization, flow-management, and
//!   mail-transport errors.
//! - [`Result<T>`] is a convenient alias for `Result<T, Error>`.
//!
//! ## How
//!
//! Use [`Error`] for error handling in your application code and when
//! matching on error cases. Most crate APIs return [`Result<T>`].
use thiserror::Error;

/// Result type for leadflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for leadflow operations.
///
/// This enum covers all error cases that can occur when using leadflow,
/// including database connectivity, configuration, serialization, and
/// automation-specific operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (SQLx errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),

    /// JSON serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or parsing failed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Required configuration field is missing
    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },

    /// Configuration field has an invalid value
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Entity not found
    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: String, id: i64 },

    /// Step does not belong to the flow an operation targets
    #[error("Step {step_id} does not belong to flow {flow_id}")]
    StepNotInFlow { step_id: i64, flow_id: i64 },

    /// Step config does not match its declared step type
    #[error("Invalid config for step type '{step_type}': {message}")]
    InvalidStepConfig { step_type: String, message: String },

    /// Reorder request is not a permutation of the flow's steps
    #[error("Invalid step reorder: {message}")]
    InvalidReorder { message: String },

    /// No sender address configured for outbound email
    #[error("No sender address configured (set sender_email)")]
    MissingSender,

    /// Mail transport rejected or failed to deliver a message
    #[error("Mail transport error: {message}")]
    MailTransport { message: String },

    /// Database schema validation failed
    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },

    /// Unexpected internal error occurred
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with the given entity name.
    pub fn not_found(entity: &str, id: i64) -> Self {
        Error::NotFound {
            entity: entity.to_string(),
            id,
        }
    }
}
