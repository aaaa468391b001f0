pub mod mock;

mod builder_tests;
mod fork_tests;
