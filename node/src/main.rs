//! Chain migration CLI binary.
#![warn(missing_docs)]

fn main() -> Result<(), migration_cli::Error> {
	migration_cli::run()
}
