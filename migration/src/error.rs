use crate::{
	builder::BuildError, dispatcher::DispatchError, fork::FetchError, plan::PlanError,
	transform::TransformError, verify::VerifyError,
};
use migration_client::ClientError;

/// Any error stopping a migration run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// Invalid configuration
	#[error(transparent)]
	Plan(#[from] PlanError),
	/// Reading a chain failed
	#[error(transparent)]
	Fetch(#[from] FetchError),
	/// A source entry could not be rewritten
	#[error(transparent)]
	Transform(#[from] TransformError),
	/// Calls could not be built
	#[error(transparent)]
	Build(#[from] BuildError),
	/// Dispatch lost nonce synchronization
	#[error(transparent)]
	Dispatch(#[from] DispatchError),
	/// Verification could not run
	#[error(transparent)]
	Verify(#[from] VerifyError),
	/// Talking to a chain failed
	#[error(transparent)]
	Client(#[from] ClientError),
}
