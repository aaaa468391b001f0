// Strong Documentation Lints
#![deny(
	rustdoc::broken_intra_doc_links,
	rustdoc::missing_crate_level_docs,
	rustdoc::invalid_codeblock_attributes,
	missing_docs
)]

//! Chain handle used by the migration pipeline.
//!
//! [`ChainClient`] is the seam between the pipeline and a live node. [`RpcChainClient`]
//! implements it over a `jsonrpsee` websocket connection. [`RuntimeContext`] resolves calls,
//! events and constants by name from the runtime metadata, and [`Sr25519Signer`] turns an
//! encoded call into a signed extrinsic. Events are read from `System.Events` and split into
//! records with the runtime's type registry.

mod client;
mod error;
/// `System.Events` decoding
pub mod events;
/// Runtime metadata index
pub mod metadata;
/// Raw node RPC definitions
pub mod rpc;
mod signer;
/// RPC response shapes
pub mod types;

pub use client::{ChainClient, RpcChainClient, StatusStream};
/// Attribute for implementing [`ChainClient`] outside this crate.
pub use jsonrpsee::core::async_trait;
pub use error::ClientError;
pub use metadata::RuntimeContext;
pub use signer::Sr25519Signer;
pub use types::{RpcBlock, TransactionStatus};
