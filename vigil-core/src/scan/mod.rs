//! Directory enumeration and the periodic reconciliation sweep.

/// Recursive regular-file listing.
pub mod enumerate;
/// Periodic sweep against the baseline.
pub mod reconciler;

pub use enumerate::{enumerate_files, enumerate_roots};
pub use reconciler::{Reconciler, SweepReport};
