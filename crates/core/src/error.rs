//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic failures only (validation, unknown catalog entries).
/// Transport and storage failures belong to the client crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed record).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A table or resource name is not part of the entity catalog.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A filter referenced a field the entity does not declare.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A record is missing the unique key its table declares.
    #[error("missing unique key `{key}` for table `{table}`")]
    MissingKey { table: String, key: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable(name.into())
    }

    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    pub fn missing_key(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            table: table.into(),
            key: key.into(),
        }
    }
}
