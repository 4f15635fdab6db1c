//! Concrete storage backends.

pub mod sqlite;
