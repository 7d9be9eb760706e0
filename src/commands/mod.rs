//! CLI command implementations.
//!
//! - `check`: provider and signal capability validation
//! - `config`: configuration file generation
//! - `test`: sampling test runs

pub mod check;
pub mod config;

pub use check::command_check;
pub use config::command_config;
pub use test::command_test;
