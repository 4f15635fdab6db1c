//! Persistence for the baseline table, the change log, and the agent
//! identity. Components depend on the traits in [`ports`]; SQLite provides
//! the implementations.

pub mod infrastructure;
pub mod ports;

pub use infrastructure::sqlite::SqliteDatabase;
pub use ports::{BaselineRepository, ChangeEventRepository, ChangeJournal, IdentityRepository};
