//! Status codes and the status object.

use std::fmt;

/// Result code reported by every fallible native call.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The engine failed while recording another failure.
    InReportingError = -2,
    /// Unclassified failure.
    Unknown = -1,
    /// Operation succeeded.
    Success = 0,
    /// Allocation failed.
    OutOfMemory = 1,
    /// The engine raised an internal exception; see [`Status::server_code`].
    Exception = 2,
    /// The library was initialized twice.
    LibraryAlreadyInitialized = 3,
    /// The library has not been initialized.
    LibraryNotInitialized = 4,
    /// The library handle is unknown to the engine.
    InvalidLibHandle = 5,
    /// A storage instance could not be started.
    DbInitializationFailed = 6,
    /// The instance handle is unknown to the engine.
    InvalidDbHandle = 7,
    /// The library still has open instances.
    HasDbHandlesOpen = 8,
    /// No further instances may be opened.
    DbMaxOpen = 9,
    /// The instance still has open clients.
    DbClientsOpen = 10,
    /// The client handle is unknown to the engine.
    InvalidClientHandle = 11,
    /// A native call was made from inside a callback of another call.
    ReentrancyNotAllowed = 12,
}

impl StatusCode {
    /// Returns true if the code indicates success.
    pub fn is_ok(self) -> bool {
        self == StatusCode::Success
    }

    /// Returns true if the code indicates a failure.
    pub fn is_err(self) -> bool {
        self != StatusCode::Success
    }

    /// Returns the raw integer value.
    pub fn raw(self) -> i32 {
        self as i32
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        match code {
            -2 => StatusCode::InReportingError,
            0 => StatusCode::Success,
            1 => StatusCode::OutOfMemory,
            2 => StatusCode::Exception,
            3 => StatusCode::LibraryAlreadyInitialized,
            4 => StatusCode::LibraryNotInitialized,
            5 => StatusCode::InvalidLibHandle,
            6 => StatusCode::DbInitializationFailed,
            7 => StatusCode::InvalidDbHandle,
            8 => StatusCode::HasDbHandlesOpen,
            9 => StatusCode::DbMaxOpen,
            10 => StatusCode::DbClientsOpen,
            11 => StatusCode::InvalidClientHandle,
            12 => StatusCode::ReentrancyNotAllowed,
            _ => StatusCode::Unknown,
        }
    }
}

impl From<StatusCode> for i32 {
    fn from(code: StatusCode) -> Self {
        code as i32
    }
}

/// Native status object.
///
/// Callers allocate one per call (or reuse one after [`Status::clear`]) and
/// pass it by mutable reference; the engine fills it in on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    error: StatusCode,
    server_code: i32,
    explanation: String,
}

impl Status {
    /// Creates a status in the success state.
    pub fn new() -> Self {
        Self {
            error: StatusCode::Success,
            server_code: 0,
            explanation: String::new(),
        }
    }

    /// Records a failure.
    pub fn set(&mut self, error: StatusCode, server_code: i32, explanation: impl Into<String>) {
        self.error = error;
        self.server_code = server_code;
        self.explanation = explanation.into();
    }

    /// Resets to the success state.
    pub fn clear(&mut self) {
        self.error = StatusCode::Success;
        self.server_code = 0;
        self.explanation.clear();
    }

    /// The engine-level error category.
    pub fn error(&self) -> StatusCode {
        self.error
    }

    /// Server error code. Only meaningful for [`StatusCode::Exception`].
    pub fn server_code(&self) -> i32 {
        self.server_code
    }

    /// Human readable explanation of the failure.
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    /// Returns true if no failure has been recorded.
    pub fn is_ok(&self) -> bool {
        self.error.is_ok()
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.error)?;
        if self.error == StatusCode::Exception {
            write!(f, " (server code {})", self.server_code)?;
        }
        if !self.explanation.is_empty() {
            write!(f, ": {}", self.explanation)?;
        }
        Ok(())
    }
}
