//! Engine-internal errors and their server error codes.

use mobiledb_capi::{Status, StatusCode};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine internals.
pub type EngineResult<T> = Result<T, EngineError>;

/// Server error codes reported with [`StatusCode::Exception`].
pub mod codes {
    /// Unclassified server failure.
    pub const INTERNAL_ERROR: i32 = 1;
    /// A value was not acceptable.
    pub const BAD_VALUE: i32 = 2;
    /// A document or config could not be parsed.
    pub const FAILED_TO_PARSE: i32 = 9;
    /// The collection does not exist.
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    /// The storage directory does not exist.
    pub const NON_EXISTENT_PATH: i32 = 29;
    /// The command name is not recognised.
    pub const COMMAND_NOT_FOUND: i32 = 59;
    /// The storage directory is locked by another instance.
    pub const DB_PATH_IN_USE: i32 = 98;
    /// A document with the same `_id` already exists.
    pub const DUPLICATE_KEY: i32 = 11000;
}

/// Failures raised inside the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The storage directory does not exist.
    #[error("data directory {} not found", .path.display())]
    NonExistentPath {
        /// The missing directory.
        path: PathBuf,
    },

    /// Another instance holds the storage directory lock.
    #[error("unable to lock data directory {}; is another instance running?", .path.display())]
    DbPathInUse {
        /// The locked directory.
        path: PathBuf,
    },

    /// A config document, request or data file could not be parsed.
    #[error("failed to parse: {message}")]
    FailedToParse {
        /// Parser message.
        message: String,
    },

    /// A request carried an unacceptable value.
    #[error("{message}")]
    BadValue {
        /// Description of the problem.
        message: String,
    },

    /// The request named no known command.
    #[error("no such command")]
    CommandNotFound,

    /// The collection does not exist.
    #[error("ns not found: {namespace}")]
    NamespaceNotFound {
        /// `<db>.<collection>`.
        namespace: String,
    },

    /// Duplicate `_id`.
    #[error("duplicate key {id} in {namespace}")]
    DuplicateKey {
        /// `<db>.<collection>`.
        namespace: String,
        /// The duplicated `_id`.
        id: String,
    },

    /// I/O failure in the storage directory.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Creates a parse error.
    pub fn failed_to_parse(message: impl Into<String>) -> Self {
        Self::FailedToParse {
            message: message.into(),
        }
    }

    /// Creates a bad value error.
    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::BadValue {
            message: message.into(),
        }
    }

    /// The server error code for this failure.
    pub fn server_code(&self) -> i32 {
        match self {
            Self::NonExistentPath { .. } => codes::NON_EXISTENT_PATH,
            Self::DbPathInUse { .. } => codes::DB_PATH_IN_USE,
            Self::FailedToParse { .. } => codes::FAILED_TO_PARSE,
            Self::BadValue { .. } => codes::BAD_VALUE,
            Self::CommandNotFound => codes::COMMAND_NOT_FOUND,
            Self::NamespaceNotFound { .. } => codes::NAMESPACE_NOT_FOUND,
            Self::DuplicateKey { .. } => codes::DUPLICATE_KEY,
            Self::Io(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Writes this failure into a native status as an exception.
    pub(crate) fn report(&self, status: &mut Status) -> StatusCode {
        status.set(StatusCode::Exception, self.server_code(), self.to_string());
        StatusCode::Exception
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::failed_to_parse(err.to_string())
    }
}
