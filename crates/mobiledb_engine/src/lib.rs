//! # MobileDB Reference Engine
//!
//! An in-process engine implementing the `mobiledb_capi` native contract.
//!
//! This crate provides:
//! - [`ReferenceEngine`], an [`EmbeddedEngine`](mobiledb_capi::EmbeddedEngine)
//!   with handle tables and the native ordering rules
//! - Per-path storage directories with locking and JSON persistence
//! - A small JSON command protocol executed through `client_invoke`
//! - Log delivery through the registered callback
//! - A journal of accepted calls for inspection in tests

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
mod engine;
mod error;
mod journal;
pub mod log;
pub mod store;

pub use engine::{ReferenceEngine, MAX_OPEN_INSTANCES};
pub use error::{codes, EngineError, EngineResult};
pub use journal::EngineCall;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
