//! Wiring for the `vigil-agent` binary: identity resolution, logging setup,
//! and the runtime that connects the watcher, the reconciler, and the event
//! pipeline.

pub mod identity;
pub mod runtime;
pub mod telemetry;
