//! # Applying updates to the relational store
//!
//! A [RecordStore] is a stateless executor of keyed partial updates against
//! the `issues` table. It owns no data of its own: the table belongs to
//! whatever system created the rows, and this crate only ever mutates rows
//! which already exist.
//!
//! ## Timestamps
//!
//! `updated_at` is always written by the adapter itself, never left to a
//! trigger or column default. If the update carries an explicit
//! `updated_at` it wins, otherwise the current UTC time is used.
//!
//! ## Missing rows
//!
//! Updating an identifier that doesn't exist affects zero rows and is a
//! success, not an error.

#[cfg(any(feature = "mysql", feature = "sqlite"))]
pub mod sql;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

mod record_store;

pub use record_store::RecordStore;

/// The table every backend writes to.
pub const ISSUES_TABLE: &str = "issues";
