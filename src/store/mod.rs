//! Persistence layer — libSQL-backed storage for channels, posts,
//! scheduled items, the event log, and per-user settings.

pub mod libsql_backend;
pub mod migrations;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Repository;
