use common_helpers::rpc::RpcFailure;

/// Errors of the chain handle.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
	/// An RPC request failed.
	#[error(transparent)]
	Rpc(#[from] RpcFailure),
	/// Response bytes could not be decoded.
	#[error("Failed to decode {what}: {source}")]
	Decode {
		/// What was decoded
		what: String,
		/// Codec error
		source: parity_scale_codec::Error,
	},
	/// The node does not know the requested block.
	#[error("Block {0} not found")]
	BlockNotFound(String),
	/// Only metadata V14 and V15 are understood.
	#[error("Unsupported metadata version {0}")]
	UnsupportedMetadata(u32),
	/// The runtime has no pallet of that name.
	#[error("Pallet {0} not found in runtime metadata")]
	MissingPallet(String),
	/// The pallet has no call of that name.
	#[error("Call {pallet}.{call} not found in runtime metadata")]
	MissingCall {
		/// Pallet name
		pallet: String,
		/// Call name
		call: String,
	},
	/// The pallet has no event of that name.
	#[error("Event {pallet}.{event} not found in runtime metadata")]
	MissingEvent {
		/// Pallet name
		pallet: String,
		/// Event name
		event: String,
	},
	/// The pallet has no constant of that name.
	#[error("Constant {pallet}.{constant} not found in runtime metadata")]
	MissingConstant {
		/// Pallet name
		pallet: String,
		/// Constant name
		constant: String,
	},
	/// A signed extension with a non-empty payload we cannot fill in.
	#[error("Unsupported signed extension {0}")]
	UnsupportedSignedExtension(String),
	/// The signing secret could not be turned into a key pair.
	#[error("Invalid signing seed: {0}")]
	InvalidSeed(String),
	/// A transaction status subscription ended with an error.
	#[error("Subscription failed: {0}")]
	Subscription(String),
}

impl ClientError {
	/// Decode error for `what`.
	pub fn decode(what: impl Into<String>, source: parity_scale_codec::Error) -> Self {
		ClientError::Decode { what: what.into(), source }
	}
}
