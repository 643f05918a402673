//! Delivery of engine log lines to the registered callback.

use mobiledb_capi::{InitParams, LogCallback, LogFlags};
use std::ffi::{c_void, CString};
use std::sync::Arc;

/// Severity values the engine emits.
pub mod severity {
    /// Fatal.
    pub const FATAL: i32 = -4;
    /// Error.
    pub const ERROR: i32 = -3;
    /// Warning.
    pub const WARNING: i32 = -2;
    /// Informational.
    pub const INFO: i32 = -1;
    /// Default log level.
    pub const LOG: i32 = 0;
    /// Debug verbosity 1; higher verbosities are `2..=5`.
    pub const DEBUG: i32 = 1;
}

/// The callback registered at library initialization.
pub(crate) struct LogSink {
    callback: LogCallback,
    user_data: *mut c_void,
}

// SAFETY: the engine never dereferences `user_data`; it only hands it back to
// `callback`. Whoever registered the pair promised it may be called from any
// thread the engine runs on.
#[allow(unsafe_code)]
unsafe impl Send for LogSink {}
// SAFETY: as above; the sink itself is immutable.
#[allow(unsafe_code)]
unsafe impl Sync for LogSink {}

impl LogSink {
    /// Builds a sink if the parameters ask for callback logging.
    pub(crate) fn from_params(params: &InitParams<'_>) -> Option<Self> {
        if !params.log_flags.contains(LogFlags::CALLBACK) {
            return None;
        }
        params.log_callback.map(|callback| Self {
            callback,
            user_data: params.log_user_data,
        })
    }

    /// Delivers one log line.
    #[allow(unsafe_code)]
    pub(crate) fn emit(&self, message: &str, component: &str, context: &str, severity: i32) {
        let message = c_text(message);
        let component = c_text(component);
        let context = c_text(context);
        // SAFETY: the callback and user data were registered together at
        // initialization and stay valid until the library is finalized; the
        // strings outlive the call.
        unsafe {
            (self.callback)(
                self.user_data,
                message.as_ptr(),
                component.as_ptr(),
                context.as_ptr(),
                severity,
            );
        }
    }
}

/// Log lines queued while the engine state is locked.
///
/// Lines are delivered when the outbox is dropped. Declare it before taking
/// the state lock so the lock is released first and the callback can inspect
/// the engine.
#[derive(Default)]
pub(crate) struct Outbox {
    sink: Option<Arc<LogSink>>,
    lines: Vec<(String, String, String, i32)>,
}

impl Outbox {
    /// Sets where queued lines go. Without a sink they are discarded.
    pub(crate) fn attach(&mut self, sink: Option<Arc<LogSink>>) {
        self.sink = sink;
    }

    /// Queues one line.
    pub(crate) fn push(
        &mut self,
        message: impl Into<String>,
        component: &str,
        context: &str,
        severity: i32,
    ) {
        if self.sink.is_some() {
            self.lines
                .push((message.into(), component.to_owned(), context.to_owned(), severity));
        }
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        let Some(sink) = &self.sink else {
            return;
        };
        for (message, component, context, severity) in self.lines.drain(..) {
            sink.emit(&message, &component, &context, severity);
        }
    }
}

fn c_text(text: &str) -> CString {
    CString::new(text).unwrap_or_else(|_| {
        CString::new(text.replace('\0', "\u{FFFD}")).unwrap_or_default()
    })
}
