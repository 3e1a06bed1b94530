//! SQLite implementation of the storage traits.

mod config;
mod connection;
mod execution;
mod template;

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod template_test;

pub use config::SqliteConfigStore;
pub use connection::SqliteDatabase;
pub use execution::SqliteExecutionLog;
pub use template::SqliteTemplateRepository;
