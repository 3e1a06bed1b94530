//! Storage layer.
//!
//! Trait-based data access so the dispatcher works the same against any
//! backend. The backend is chosen once at startup.
//!
//! # Architecture
//!
//! - `error`: Storage-agnostic error types
//! - `models`: Domain entities (ServiceConfig, ExecutionRecord, Template)
//! - `repository`: Trait definitions for data access
//! - `sqlite`: Relational backend (sqlx)
//! - `file`: JSONL file backend with live reload

mod error;
pub mod file;
mod models;
mod repository;
pub mod sqlite;
pub(crate) mod utils;


pub use error::{DbError, DbResult};
pub use file::FileDatabase;
pub use models::*;
pub use repository::*;
pub use sqlite::SqliteDatabase;
