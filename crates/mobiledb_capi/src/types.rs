//! Handle and parameter types crossing the native boundary.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::num::NonZeroU64;
use std::ops::BitOr;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Wraps a raw handle value. Returns `None` for the null handle.
            pub fn from_raw(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Returns the raw handle value.
            pub fn as_raw(self) -> u64 {
                self.0.get()
            }
        }
    };
}

opaque_handle!(
    /// An opaque handle to the initialized engine library.
    ///
    /// At most one is live per process.
    LibHandle
);

opaque_handle!(
    /// An opaque handle to one open storage instance (one `dbPath`).
    InstanceHandle
);

opaque_handle!(
    /// An opaque handle to one client connection of an instance.
    ClientHandle
);

/// Log callback invoked by the engine.
///
/// Arguments are the registered user data, the message, the component, the
/// context and the severity. Any text pointer may be null.
pub type LogCallback = unsafe extern "C" fn(
    user_data: *mut c_void,
    message: *const c_char,
    component: *const c_char,
    context: *const c_char,
    severity: c_int,
);

/// Where the engine sends its log output.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogFlags(u64);

impl LogFlags {
    /// No logging at all.
    pub const NONE: LogFlags = LogFlags(0);
    /// Parse logging options from the library config only.
    pub const PARSE_ONLY: LogFlags = LogFlags(1);
    /// Log to standard output.
    pub const STDOUT: LogFlags = LogFlags(2);
    /// Deliver log lines through [`InitParams::log_callback`].
    pub const CALLBACK: LogFlags = LogFlags(4);

    /// Returns the raw bit set.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    pub fn contains(self, other: LogFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LogFlags {
    type Output = LogFlags;

    fn bitor(self, rhs: LogFlags) -> LogFlags {
        LogFlags(self.0 | rhs.0)
    }
}

/// Parameters for library initialization.
#[derive(Debug, Clone, Copy)]
pub struct InitParams<'a> {
    /// Optional library-level configuration string.
    pub yaml_config: Option<&'a CStr>,
    /// Log routing.
    pub log_flags: LogFlags,
    /// Callback used when [`LogFlags::CALLBACK`] is set.
    pub log_callback: Option<LogCallback>,
    /// Opaque pointer handed back as the callback's first argument.
    pub log_user_data: *mut c_void,
}

impl Default for InitParams<'_> {
    fn default() -> Self {
        Self {
            yaml_config: None,
            log_flags: LogFlags::NONE,
            log_callback: None,
            log_user_data: std::ptr::null_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_rejected() {
        assert!(LibHandle::from_raw(0).is_none());
        assert!(InstanceHandle::from_raw(0).is_none());
        assert_eq!(ClientHandle::from_raw(7).map(ClientHandle::as_raw), Some(7));
    }

    #[test]
    fn log_flags() {
        let flags = LogFlags::STDOUT | LogFlags::CALLBACK;
        assert_eq!(flags.bits(), 6);
        assert!(flags.contains(LogFlags::CALLBACK));
        assert!(!flags.contains(LogFlags::PARSE_ONLY));
        assert!(LogFlags::NONE.contains(LogFlags::NONE));
    }

    #[test]
    fn init_params_default() {
        let params = InitParams::default();
        assert!(params.yaml_config.is_none());
        assert_eq!(params.log_flags, LogFlags::NONE);
        assert!(params.log_callback.is_none());
        assert!(params.log_user_data.is_null());
    }
}
