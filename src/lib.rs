#![deny(missing_docs)]
//! Row visibility and primary-key deduplication for a multi-version,
//! append-only table store.
//!
//! Given a transaction's snapshot and a batch of candidate primary keys, the
//! engine decides whether any of those keys already exists among the rows the
//! transaction may see: its own uncommitted workspace, objects created by
//! transactions committing concurrently, and immutable persisted objects.
//!
//! The entry point is [`table::TxnTable`], which pairs a catalog table with a
//! transaction. Its [`table::BaseTable`] sides expose the full-scan lookup,
//! the resumable incremental lookup used by background drivers, and the
//! workspace hooks a transaction runs through on its way to commit.
//!
//! Storage is reached only through the [`object::ObjectData`] and
//! [`object::ObjectLoader`] traits; [`inmem`] provides in-memory versions.

mod observability;

/// Catalog metadata: tables, objects, visibility, object walks.
pub mod catalog;
/// Error types.
pub mod error;
/// Primary-key extraction from Arrow columns.
pub mod extractor;
/// Object identifiers.
pub mod id;
/// In-memory object data and loader.
pub mod inmem;
/// Owned primary-key values.
pub mod key;
/// MVCC primitives shared across modules.
pub mod mvcc;
/// Storage-facing traits and object descriptors.
pub mod object;
/// Engine configuration.
pub mod option;
/// Zone maps and object pruning.
pub mod pruning;
/// Row identifiers and lookup result vectors.
pub mod row;
/// Transaction-side table: dedup, lookups and lifecycle hooks.
pub mod table;
/// Transaction commit state and timestamps.
pub mod transaction;
/// Per-transaction table workspace and log commands.
pub mod workspace;

pub use crate::{
    error::{AccessError, DedupError, DedupResult},
    option::EngineOptions,
    table::{BaseTable, TxnTable},
};

#[cfg(test)]
mod test_util;

#[cfg(test)]
mod tests_internal;
