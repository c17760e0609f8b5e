//! Bootstrap wiring for the slack-mcp-server binary.

pub mod bootstrap;

pub use bootstrap::{Bootstrap, build_context};
