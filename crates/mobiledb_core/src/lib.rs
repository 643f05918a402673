//! # MobileDB Core
//!
//! Lifecycle management for an embedded MobileDB engine.
//!
//! This crate provides:
//! - [`MobileDb`]: library initialization and ordered teardown
//! - A per-path cache of storage instances
//! - [`Client`] handles tracked for bulk closure
//! - Translation of native statuses into [`MobileError`]
//! - Forwarding of engine log messages to a [`Logger`]
//!
//! The engine itself is reached through the
//! [`EmbeddedEngine`](mobiledb_capi::EmbeddedEngine) trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod config;
mod error;
mod instance;
pub mod log;
mod manager;
#[cfg(test)]
mod testing;

pub use client::{Client, ClientId};
pub use config::{ClientSettings, MobileOptions};
pub use error::{MobileError, MobileResult};
pub use log::{FnLogger, InvalidSeverity, LogSeverity, Logger, TracingLogger};
pub use manager::MobileDb;
pub use mobiledb_capi as capi;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
