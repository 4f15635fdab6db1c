//! Storage traits the engine and the agent depend on.

/// Baseline reads and single writes.
pub mod baseline;
/// Event log.
pub mod change_events;
/// Stored agent identity.
pub mod identity;
/// Transactional baseline + event writes.
pub mod journal;

pub use baseline::BaselineRepository;
pub use change_events::ChangeEventRepository;
pub use identity::IdentityRepository;
pub use journal::ChangeJournal;
