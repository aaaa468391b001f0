// Strong Documentation Lints
#![deny(
	rustdoc::broken_intra_doc_links,
	rustdoc::missing_crate_level_docs,
	rustdoc::invalid_codeblock_attributes,
	missing_docs
)]

//! Primitives shared by the chain migration crates.
//!
//! - [`storage`]: storage key derivation for pallets, items and map entries.
//! - [`node`]: chain-native scalar aliases.
//! - [`balances`], [`vesting`], [`proxy`]: SCALE layouts of the migrated records.
//! - [`events`]: the `System.Events` record layout.

/// Account balance records
pub mod balances;
/// Event records
pub mod events;
/// Chain-native type aliases
pub mod node;
/// Delegated-authority records
pub mod proxy;
/// Storage addressing
pub mod storage;
/// Vesting schedule records
pub mod vesting;
