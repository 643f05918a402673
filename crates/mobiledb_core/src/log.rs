//! Engine log forwarding.
//!
//! The engine reports log lines through a single C callback. When a logger is
//! registered at initialization, [`log_trampoline`] is installed as that
//! callback with a pointer to the manager-owned [`LogBridge`] as its user
//! data. Without a logger no callback is installed at all.

use std::borrow::Cow;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Severity of an engine log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    /// Raw value `-4`.
    Fatal,
    /// Raw value `-3`.
    Error,
    /// Raw value `-2`.
    Warning,
    /// Raw value `-1`.
    Info,
    /// Raw value `0`.
    Log,
    /// Raw values `1..=5`; the value is the verbosity level.
    Debug(u8),
}

/// A raw severity outside the engine's documented range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("log severity {0} is outside -4..=5")]
pub struct InvalidSeverity(pub i32);

impl LogSeverity {
    /// Returns the raw engine value.
    pub fn raw(self) -> i32 {
        match self {
            LogSeverity::Fatal => -4,
            LogSeverity::Error => -3,
            LogSeverity::Warning => -2,
            LogSeverity::Info => -1,
            LogSeverity::Log => 0,
            LogSeverity::Debug(level) => i32::from(level),
        }
    }
}

impl TryFrom<i32> for LogSeverity {
    type Error = InvalidSeverity;

    fn try_from(raw: i32) -> Result<Self, InvalidSeverity> {
        match raw {
            -4 => Ok(LogSeverity::Fatal),
            -3 => Ok(LogSeverity::Error),
            -2 => Ok(LogSeverity::Warning),
            -1 => Ok(LogSeverity::Info),
            0 => Ok(LogSeverity::Log),
            1..=5 => Ok(LogSeverity::Debug(raw as u8)),
            _ => Err(InvalidSeverity(raw)),
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSeverity::Fatal => f.write_str("fatal"),
            LogSeverity::Error => f.write_str("error"),
            LogSeverity::Warning => f.write_str("warning"),
            LogSeverity::Info => f.write_str("info"),
            LogSeverity::Log => f.write_str("log"),
            LogSeverity::Debug(level) => write!(f, "debug{level}"),
        }
    }
}

/// Receives log messages produced by the embedded engine.
///
/// Called synchronously on whatever thread the engine is running the current
/// operation on, possibly while a `MobileDb` or [`Client`](crate::Client)
/// call is in progress and holding its lock. A logger must not call back into
/// the `MobileDb` that delivered the message, nor into any of its clients
/// (including [`Client::is_open`](crate::Client::is_open)); the locks are not
/// reentrant.
pub trait Logger: Send + Sync {
    /// Handles one message.
    ///
    /// * `message` - The text of the log message
    /// * `component` - Functional category, e.g. `"STORAGE"` or `"COMMAND"`
    /// * `context` - Where the message originated, e.g. `"initandlisten"`
    /// * `severity` - Severity of the message
    fn on_message(&self, message: &str, component: &str, context: &str, severity: LogSeverity);
}

/// A [`Logger`] backed by a closure.
pub struct FnLogger<F>(pub F);

impl<F> Logger for FnLogger<F>
where
    F: Fn(&str, &str, &str, LogSeverity) + Send + Sync,
{
    fn on_message(&self, message: &str, component: &str, context: &str, severity: LogSeverity) {
        (self.0)(message, component, context, severity);
    }
}

/// Forwards engine messages to `tracing` under the `mobiledb::engine` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn on_message(&self, message: &str, component: &str, context: &str, severity: LogSeverity) {
        match severity {
            LogSeverity::Fatal | LogSeverity::Error => {
                tracing::error!(target: "mobiledb::engine", component, context, %severity, "{message}")
            }
            LogSeverity::Warning => {
                tracing::warn!(target: "mobiledb::engine", component, context, "{message}")
            }
            LogSeverity::Info | LogSeverity::Log => {
                tracing::info!(target: "mobiledb::engine", component, context, "{message}")
            }
            LogSeverity::Debug(1) => {
                tracing::debug!(target: "mobiledb::engine", component, context, "{message}")
            }
            LogSeverity::Debug(level) => {
                tracing::trace!(target: "mobiledb::engine", component, context, level, "{message}")
            }
        }
    }
}

/// Context handed to the engine as log user data.
///
/// Boxed and owned by the manager so its address stays stable for as long as
/// the library handle is live.
pub(crate) struct LogBridge {
    logger: Arc<dyn Logger>,
}

impl LogBridge {
    pub(crate) fn new(logger: Arc<dyn Logger>) -> Box<Self> {
        Box::new(Self { logger })
    }

    pub(crate) fn user_data(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }

    /// Maps the raw severity and hands the message to the logger.
    ///
    /// # Panics
    ///
    /// Panics on a severity outside `-4..=5`. Reached from the trampoline
    /// this aborts the process.
    pub(crate) fn forward(&self, message: &str, component: &str, context: &str, severity: i32) {
        let severity = match LogSeverity::try_from(severity) {
            Ok(severity) => severity,
            Err(err) => panic!("engine log contract violated: {err}"),
        };
        self.logger.on_message(message, component, context, severity);
    }
}

/// Reads an engine-owned string, mapping null to the empty string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for `'a`.
#[allow(unsafe_code)]
unsafe fn text<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        // SAFETY: non-null and NUL-terminated per this function's contract.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

/// The log callback installed into the engine's init parameters.
///
/// # Safety
///
/// `user_data` must be the pointer returned by [`LogBridge::user_data`] for a
/// bridge that is still alive. Text pointers must be null or NUL-terminated
/// strings valid for the duration of the call.
#[allow(unsafe_code)]
pub(crate) unsafe extern "C" fn log_trampoline(
    user_data: *mut c_void,
    message: *const c_char,
    component: *const c_char,
    context: *const c_char,
    severity: c_int,
) {
    // SAFETY: the manager registers this callback only together with a live,
    // boxed `LogBridge` and keeps it alive until the library is finalized.
    let bridge = unsafe { &*(user_data as *const LogBridge) };
    // SAFETY: the engine passes null or strings valid for this call.
    let (message, component, context) = unsafe { (text(message), text(component), text(context)) };
    bridge.forward(&message, &component, &context, severity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::ffi::CString;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(String, String, String, LogSeverity)>>);

    impl Logger for Capture {
        fn on_message(&self, message: &str, component: &str, context: &str, severity: LogSeverity) {
            self.0.lock().push((
                message.to_owned(),
                component.to_owned(),
                context.to_owned(),
                severity,
            ));
        }
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(LogSeverity::try_from(-4), Ok(LogSeverity::Fatal));
        assert_eq!(LogSeverity::try_from(-3), Ok(LogSeverity::Error));
        assert_eq!(LogSeverity::try_from(-2), Ok(LogSeverity::Warning));
        assert_eq!(LogSeverity::try_from(-1), Ok(LogSeverity::Info));
        assert_eq!(LogSeverity::try_from(0), Ok(LogSeverity::Log));
        assert_eq!(LogSeverity::try_from(1), Ok(LogSeverity::Debug(1)));
        assert_eq!(LogSeverity::try_from(5), Ok(LogSeverity::Debug(5)));
        assert_eq!(LogSeverity::try_from(6), Err(InvalidSeverity(6)));
        assert_eq!(LogSeverity::try_from(-5), Err(InvalidSeverity(-5)));
    }

    #[test]
    fn severity_display() {
        assert_eq!(LogSeverity::Warning.to_string(), "warning");
        assert_eq!(LogSeverity::Debug(3).to_string(), "debug3");
    }

    proptest! {
        #[test]
        fn severity_accepts_exactly_the_documented_range(raw in any::<i32>()) {
            match LogSeverity::try_from(raw) {
                Ok(severity) => {
                    prop_assert!((-4..=5).contains(&raw));
                    prop_assert_eq!(severity.raw(), raw);
                }
                Err(err) => {
                    prop_assert!(!(-4..=5).contains(&raw));
                    prop_assert_eq!(err.0, raw);
                }
            }
        }
    }

    #[test]
    #[allow(unsafe_code)]
    fn trampoline_forwards_and_maps_null_text() {
        let capture = Arc::new(Capture::default());
        let bridge = LogBridge::new(capture.clone());

        let message = CString::new("waiting for connections").unwrap();
        let context = CString::new("initandlisten").unwrap();
        // SAFETY: bridge is alive; strings outlive the call.
        unsafe {
            log_trampoline(
                bridge.user_data(),
                message.as_ptr(),
                std::ptr::null(),
                context.as_ptr(),
                -1,
            );
        }

        let seen = capture.0.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "waiting for connections");
        assert_eq!(seen[0].1, "");
        assert_eq!(seen[0].2, "initandlisten");
        assert_eq!(seen[0].3, LogSeverity::Info);
    }

    #[test]
    #[should_panic(expected = "outside -4..=5")]
    fn out_of_range_severity_fails_fast() {
        let bridge = LogBridge::new(Arc::new(Capture::default()));
        bridge.forward("m", "c", "x", 9);
    }

    #[test]
    fn fn_logger_invokes_closure() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let logger = FnLogger(move |_: &str, _: &str, _: &str, severity: LogSeverity| {
            assert_eq!(severity, LogSeverity::Debug(2));
            *counter.lock() += 1;
        });
        let bridge = LogBridge::new(Arc::new(logger));
        bridge.forward("m", "c", "x", 2);
        assert_eq!(*hits.lock(), 1);
    }
}
