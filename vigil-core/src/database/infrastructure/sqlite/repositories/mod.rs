//! SQLite-backed repository implementations.

/// `files_baseline` table.
pub mod baseline;
/// `change_events` table.
pub mod change_events;
/// `agent_identity` table.
pub mod identity;
/// Change transactions spanning both tables.
pub mod journal;

pub use baseline::SqliteBaselineRepository;
pub use change_events::SqliteChangeEventRepository;
pub use identity::SqliteIdentityRepository;
pub use journal::SqliteChangeJournal;
