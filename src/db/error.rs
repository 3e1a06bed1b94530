//! Storage error types.
//!
//! Both backends (SQLite and the JSONL file store) report failures through
//! these variants, so callers never see backend-specific errors.

use miette::Diagnostic;
use thiserror::Error;

/// Storage operation errors.
#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Entity not found: {entity_type} with id '{id}'")]
    #[diagnostic(code(opgate::db::not_found))]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {message}")]
    #[diagnostic(code(opgate::db::validation_error))]
    Validation { message: String },

    #[error("Database error: {message}")]
    #[diagnostic(code(opgate::db::database_error))]
    Database { message: String },

    #[error("Migration error: {message}")]
    #[diagnostic(code(opgate::db::migration_error))]
    Migration { message: String },

    #[error("Connection error: {message}")]
    #[diagnostic(code(opgate::db::connection_error))]
    Connection { message: String },

    #[error("Storage file error: {message}")]
    #[diagnostic(
        code(opgate::db::file_error),
        help("Check that the data directory exists and is writable.")
    )]
    File { message: String },
}

impl DbError {
    pub(crate) fn not_found(entity_type: &str, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        DbError::Validation {
            message: message.into(),
        }
    }
}

/// Result type for storage operations.
pub type DbResult<T> = Result<T, DbError>;
