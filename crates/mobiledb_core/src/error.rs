//! Error types and native status translation.

use mobiledb_capi::{Status, StatusCode};
use thiserror::Error;

/// Result type for MobileDB operations.
pub type MobileResult<T> = Result<T, MobileError>;

/// Errors surfaced by MobileDB.
///
/// Every native failure is reported through one of these three kinds; raw
/// status codes never reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MobileError {
    /// The API was misused (double initialization, use before
    /// initialization, a handle used after it was released).
    #[error("logic error: {message}")]
    Logic {
        /// Description of the misuse.
        message: String,
    },

    /// The embedded engine raised an internal exception.
    #[error("embedded engine error {server_code}: {message}")]
    EmbeddedEngine {
        /// Raw server error code reported by the engine.
        server_code: i32,
        /// Explanation reported by the engine.
        message: String,
    },

    /// Any other unexpected failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl MobileError {
    /// Creates a logic error.
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic {
            message: message.into(),
        }
    }

    /// Creates an embedded engine error.
    pub fn embedded(server_code: i32, message: impl Into<String>) -> Self {
        Self::EmbeddedEngine {
            server_code,
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn not_initialized() -> Self {
        Self::logic("not initialized")
    }

    /// Translates a native status object.
    ///
    /// A status still in the success state maps to [`MobileError::Internal`]:
    /// it only reaches here when a call failed without reporting why.
    pub fn from_status(status: &Status) -> Self {
        let message = status.explanation().to_owned();
        match status.error() {
            StatusCode::LibraryAlreadyInitialized
            | StatusCode::LibraryNotInitialized
            | StatusCode::InvalidLibHandle
            | StatusCode::InvalidDbHandle
            | StatusCode::HasDbHandlesOpen
            | StatusCode::DbMaxOpen
            | StatusCode::DbClientsOpen
            | StatusCode::InvalidClientHandle
            | StatusCode::ReentrancyNotAllowed => Self::Logic { message },
            StatusCode::Exception => Self::EmbeddedEngine {
                server_code: status.server_code(),
                message,
            },
            StatusCode::Success => Self::internal(format!(
                "native call failed without a status: {message}"
            )),
            StatusCode::OutOfMemory
            | StatusCode::DbInitializationFailed
            | StatusCode::Unknown
            | StatusCode::InReportingError => Self::Internal { message },
        }
    }

    /// Returns the server error code for [`MobileError::EmbeddedEngine`].
    pub fn server_code(&self) -> Option<i32> {
        match self {
            Self::EmbeddedEngine { server_code, .. } => Some(*server_code),
            _ => None,
        }
    }

    /// Returns true for [`MobileError::Logic`].
    pub fn is_logic(&self) -> bool {
        matches!(self, Self::Logic { .. })
    }
}

impl From<&Status> for MobileError {
    fn from(status: &Status) -> Self {
        Self::from_status(status)
    }
}

impl From<serde_json::Error> for MobileError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("config serialization failed: {err}"))
    }
}

/// Turns a status code returned by a release-style native call into a result.
pub(crate) fn check(code: StatusCode, status: &Status) -> MobileResult<()> {
    if code.is_ok() {
        Ok(())
    } else if status.is_ok() {
        // Engine returned a failure code but left the status untouched.
        Err(MobileError::internal(format!("native call failed with {code:?}")))
    } else {
        Err(MobileError::from_status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode, server_code: i32) -> Status {
        let mut status = Status::new();
        status.set(code, server_code, "boom");
        status
    }

    #[test]
    fn misuse_codes_are_logic_errors() {
        for code in [
            StatusCode::LibraryAlreadyInitialized,
            StatusCode::LibraryNotInitialized,
            StatusCode::InvalidLibHandle,
            StatusCode::InvalidDbHandle,
            StatusCode::HasDbHandlesOpen,
            StatusCode::DbMaxOpen,
            StatusCode::DbClientsOpen,
            StatusCode::InvalidClientHandle,
            StatusCode::ReentrancyNotAllowed,
        ] {
            let err = MobileError::from_status(&status(code, 0));
            assert_eq!(err, MobileError::logic("boom"), "{code:?}");
        }
    }

    #[test]
    fn exception_carries_server_code() {
        let err = MobileError::from(&status(StatusCode::Exception, 29));
        assert_eq!(err, MobileError::embedded(29, "boom"));
        assert_eq!(err.server_code(), Some(29));
        assert_eq!(err.to_string(), "embedded engine error 29: boom");
    }

    #[test]
    fn everything_else_is_internal() {
        for code in [
            StatusCode::OutOfMemory,
            StatusCode::DbInitializationFailed,
            StatusCode::Unknown,
            StatusCode::InReportingError,
        ] {
            let err = MobileError::from_status(&status(code, 0));
            assert_eq!(err, MobileError::internal("boom"), "{code:?}");
            assert_eq!(err.server_code(), None);
        }
    }

    #[test]
    fn success_status_on_failure_is_internal() {
        let err = MobileError::from_status(&Status::new());
        assert!(matches!(err, MobileError::Internal { .. }));
    }

    #[test]
    fn check_release_codes() {
        assert!(check(StatusCode::Success, &Status::new()).is_ok());

        let err = check(StatusCode::DbClientsOpen, &status(StatusCode::DbClientsOpen, 0));
        assert!(err.unwrap_err().is_logic());

        let err = check(StatusCode::Unknown, &Status::new()).unwrap_err();
        assert!(matches!(err, MobileError::Internal { .. }));
    }
}
