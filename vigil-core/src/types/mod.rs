//! Domain records shared by the engine, the stores, and the dispatcher.

/// Collector wire bodies.
pub mod alert;
/// Trusted per-file state.
pub mod baseline;
/// Raw and classified events.
pub mod change;
/// Identifiers.
pub mod ids;

pub use alert::{AlertPayload, InventoryPayload};
pub use baseline::{BaselineRecord, path_from_key, path_key};
pub use change::{ChangeEvent, ChangeEventRecord, ChangeKind, RawEvent, RawEventKind};
pub use ids::AgentId;
