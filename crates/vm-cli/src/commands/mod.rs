//! CLI commands

pub mod create;
pub mod keys;

pub use create::{CreateArgs, CreateCommand};
pub use keys::ListKeysCommand;
