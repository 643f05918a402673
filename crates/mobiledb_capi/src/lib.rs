//! # MobileDB C API
//!
//! The native call contract of an embedded MobileDB engine.
//!
//! This crate provides:
//! - Opaque library, instance and client handles
//! - The status object and status codes every native call reports through
//! - Log flags and the log callback signature
//! - The [`EmbeddedEngine`] trait engine bindings implement
//!
//! Nothing here manages lifetimes. Ordering (clients before instances,
//! instances before the library) is the caller's responsibility; see
//! `mobiledb_core` for the manager that enforces it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod status;
mod types;

pub use engine::EmbeddedEngine;
pub use status::{Status, StatusCode};
pub use types::{ClientHandle, InitParams, InstanceHandle, LibHandle, LogCallback, LogFlags};
