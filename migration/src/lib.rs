//! # State Migration
//!
//! Moves pallet state from a source chain onto a destination chain with an incompatible
//! storage format.
//!
//! ## Overview
//!
//! A run goes through four stages:
//!
//! 1. [`fork`]: capture every key/value pair under the configured storage prefixes at one
//!    source block.
//! 2. [`transform`]: rewrite each entry into the destination schema, recomputing vesting
//!    schedules for the destination block time and inferring proxy deposits.
//! 3. [`builder`] and [`dispatcher`]: fold the records into bounded destination calls and
//!    submit them nonce by nonce, with a cap on transactions in flight.
//! 4. [`verify`]: re-fork both chains at the blocks recorded in a [`MigrationSummary`] and
//!    compare entry by entry.
//!
//! [`pipeline::migrate`] drives all four for a [`MigrationPlan`].
// Strong Documentation Lints
#![deny(
	rustdoc::broken_intra_doc_links,
	rustdoc::missing_crate_level_docs,
	rustdoc::invalid_codeblock_attributes,
	missing_docs
)]

/// Folding records into destination calls
pub mod builder;
/// Transaction submission
pub mod dispatcher;
mod error;
/// Storage snapshots
pub mod fork;
/// Run orchestration
pub mod pipeline;
/// Migration configuration
pub mod plan;
/// Persisted block boundaries
pub mod summary;
/// Source to destination rewriting
pub mod transform;
/// Post migration checks
pub mod verify;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use pipeline::{migrate, verify_summary, MigrateOptions, MigrationReport};
pub use plan::{MigrationConfig, MigrationPlan};
pub use summary::MigrationSummary;
