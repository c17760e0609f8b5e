//! Slack Web API surface for slack-mcp.
//!
//! - `client` - thin wrapper over Slack Web methods returning decoded JSON
//! - `holder` - process-wide current client with hot rebind after refresh
//! - `cache` - lazily populated channel and user name caches
//! - `format` - pure response formatting: timestamps, reactions, markup,
//!   empty-field stripping
//! - `error` - stable error code mapping

pub mod cache;
pub mod client;
pub mod error;
pub mod format;
pub mod holder;

pub use cache::{CachedChannel, ChannelCache, UserCache};
pub use client::{SlackAuth, SlackClient};
pub use error::SlackError;
pub use holder::SlackClientHolder;
