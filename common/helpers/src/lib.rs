//! Helper modules shared by the chain migration crates.

/// Mapping of RPC client errors.
pub mod rpc;
/// JSON file and hex helpers.
pub mod serde;
#[cfg(test)]
mod serde_tests;
