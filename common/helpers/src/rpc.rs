use jsonrpsee::core::ClientError;

/// A failed RPC request, tagged with the method that failed.
#[derive(thiserror::Error, Debug)]
pub enum RpcFailure {
	/// The node answered with a JSON-RPC error object.
	#[error("{method} failed with code {code}: {message}")]
	Call {
		/// Called method
		method: &'static str,
		/// JSON-RPC error code
		code: i32,
		/// Error message from the node
		message: String,
		/// Raw error data, if any
		data: Option<String>,
	},
	/// The connection to the node is gone or unusable.
	#[error("{method} failed, transport error: {reason}")]
	Transport {
		/// Called method
		method: &'static str,
		/// Transport failure description
		reason: String,
	},
	/// The node did not answer in time.
	#[error("{method} timed out")]
	Timeout {
		/// Called method
		method: &'static str,
	},
	/// Any other client side failure, including malformed responses.
	#[error("{method} failed: {reason}")]
	Other {
		/// Called method
		method: &'static str,
		/// Failure description
		reason: String,
	},
}

impl RpcFailure {
	/// Whether retrying the same request may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, RpcFailure::Transport { .. } | RpcFailure::Timeout { .. })
	}
}

/// Converts a client result into a result tagged with the calling method
/// # Arguments
/// * `method` - The RPC method name the response belongs to
/// * `response` - The response of the jsonrpsee client
/// # Returns
/// * `Result<T, RpcFailure>`
pub fn map_rpc_result<T>(
	method: &'static str,
	response: Result<T, ClientError>,
) -> Result<T, RpcFailure> {
	response.map_err(|e| match e {
		ClientError::Call(object) => RpcFailure::Call {
			method,
			code: object.code(),
			message: object.message().to_string(),
			data: object.data().map(|d| d.get().to_string()),
		},
		ClientError::Transport(reason) => RpcFailure::Transport { method, reason: reason.to_string() },
		ClientError::RestartNeeded(reason) =>
			RpcFailure::Transport { method, reason: reason.to_string() },
		ClientError::RequestTimeout => RpcFailure::Timeout { method },
		other => RpcFailure::Other { method, reason: other.to_string() },
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use jsonrpsee::types::ErrorObject;

	#[test]
	fn call_errors_keep_code_and_message() {
		let response: Result<(), _> =
			Err(ClientError::Call(ErrorObject::owned(1010, "Invalid Transaction", None::<()>)));
		let failure = map_rpc_result("author_submitAndWatchExtrinsic", response).unwrap_err();
		assert!(matches!(failure, RpcFailure::Call { code: 1010, .. }));
		assert!(!failure.is_transient());
		assert_eq!(
			failure.to_string(),
			"author_submitAndWatchExtrinsic failed with code 1010: Invalid Transaction"
		);
	}

	#[test]
	fn timeouts_are_transient() {
		let failure =
			map_rpc_result::<()>("state_getStorage", Err(ClientError::RequestTimeout)).unwrap_err();
		assert!(failure.is_transient());
	}
}
