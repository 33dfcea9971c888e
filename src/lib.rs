//! # eavdb - Schema-less object storage
//!
//! Entity-attribute-value storage on top of a relational database.
//!
//! eavdb provides:
//! - Generic `objects` / `attributes` tables with append-only attribute history
//! - Per-type pivot views (`v_<type>`, `vp_<type>`) and optional shadow tables
//! - A per-object JSON snapshot cache
//! - A fluent query builder that compiles to SQL against the views
//! - A declarative schema model that plans CREATE/ALTER migrations

pub mod schema;
pub mod model;
pub mod object;
pub mod storage;
pub mod view;
pub mod query;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use model::{CastType, FieldSpec, ModelRegistry, TypeModel};
pub use object::{Entity, Link};
pub use query::{Direction, Operator, QueryBuilder};
pub use schema::Dialect;
pub use storage::{ObjectStore, StoreOptions};

/// Result type alias for eavdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for eavdb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A write transaction failed and was rolled back
    #[error("There was a problem {operation} data: {source}")]
    Write {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Object not found: {0}")]
    NotFound(u64),

    #[error("Object {id} is of type {actual}, expected one of: {}", allowed.join(", "))]
    WrongType {
        id: u64,
        actual: String,
        allowed: Vec<String>,
    },

    #[error("Unknown object type: {0}")]
    UnknownType(String),

    #[error("Unknown field {field} on type {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Unknown query operator: {0}")]
    UnknownOperator(String),

    #[error("{given} given, expecting {expected} for operator: {operator}")]
    ArgumentCount {
        operator: &'static str,
        expected: String,
        given: usize,
    },

    #[error("Unbalanced query group")]
    UnbalancedGroup,

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl Error {
    /// Wrap a failure that happened inside a rolled-back write
    pub fn write(operation: &'static str, source: Error) -> Self {
        Error::Write {
            operation,
            source: Box::new(source),
        }
    }

    /// Whether this error reports caller input rather than a storage failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidIdentifier(_)
                | Error::UnknownOperator(_)
                | Error::ArgumentCount { .. }
                | Error::UnbalancedGroup
                | Error::UnknownField { .. }
                | Error::InvalidSchema(_)
        )
    }
}

/// Check that a type or field name is safe to splice into SQL as an identifier
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = name.len() <= 64
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
