//! Core domain + application logic for the broadcast bot.
//!
//! This crate is framework-agnostic. Telegram and MongoDB live behind ports
//! (traits) implemented in adapter crates.

pub mod broadcast;
pub mod config;
pub mod confirm;
pub mod delivery;
pub mod denylist;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod platform;
pub mod purge;
pub mod report;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
