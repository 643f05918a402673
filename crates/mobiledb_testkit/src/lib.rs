//! # MobileDB Testkit
//!
//! Test utilities for MobileDB.
//!
//! This crate provides:
//! - [`TestEnv`]: a manager over a fresh reference engine with temporary
//!   storage directories
//! - [`RecordingLogger`]: a logger that keeps every engine message
//! - [`Driver`]: a minimal document driver for exercising clients
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mobiledb_testkit::prelude::*;
//!
//! #[test]
//! fn insert_and_find() {
//!     let env = TestEnv::initialized();
//!     let client = env.db.create(&env.settings("t1")).unwrap();
//!     let coll = Driver::new(&client).database("test").collection("foo");
//!     coll.insert_one(json!({"test": 42})).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod fixtures;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::driver::*;
    pub use crate::fixtures::*;
    pub use serde_json::json;
}

pub use driver::{Collection, Database, Driver, DriverError, DriverResult};
pub use fixtures::{init_tracing, LogRecord, RecordingLogger, TestEnv};
