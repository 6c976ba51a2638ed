//! Resilient notifier client for the Telegram Bot API.
//!
//! Transport-agnostic: HTTP lives behind the [`transport::Transport`] port,
//! implemented in adapter crates.

pub mod api;
pub mod classify;
pub mod config;
pub mod errors;
pub mod executor;
pub mod history;
pub mod logging;
pub mod segment;
pub mod session;
pub mod sink;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
