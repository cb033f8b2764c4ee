//! Persistence — sessions, intel items, and lead profiles.

mod libsql_backend;
mod migrations;
mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
