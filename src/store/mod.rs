//! Persistence layer. libSQL-backed storage for referrals, call attempts,
//! follow-up flags and notification logs.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
