//! Core domain + application logic for the Telegram notify bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, SQLite and the HTTP
//! surface live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod listener;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod store;

pub use errors::{Error, Result};

#[cfg(test)]
pub(crate) mod testing;
