//! Chain migration CLI library.

#![allow(missing_docs)]
mod cli;
mod command;
mod error;
mod migrate_cmd;

pub use cli::*;
pub use command::*;
pub use error::Error;
pub use migrate_cmd::*;
