//! Error types for Postbeam.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Delivery adapter errors.
///
/// These carry the destination and the transport's own error detail so that
/// user-visible failures include enough to retry manually. Repository errors
/// never travel through here.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Cannot resolve destination {identifier}: {reason}")]
    Resolve { identifier: String, reason: String },

    #[error("Delivery to {destination} failed: {reason}")]
    Send {
        destination: String,
        reason: String,
    },

    #[error("Delivery to {destination} timed out after {timeout:?}")]
    Timeout {
        destination: String,
        timeout: Duration,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
