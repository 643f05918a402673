//! Scriptable engine for unit tests.

use mobiledb_capi::{
    ClientHandle, EmbeddedEngine, InitParams, InstanceHandle, LibHandle, LogCallback, LogFlags,
    Status, StatusCode,
};
use parking_lot::Mutex;
use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StubCall {
    LibInit,
    LibFini,
    InstanceCreate(String),
    InstanceDestroy,
    ClientCreate,
    ClientDestroy,
    ClientInvoke,
}

#[derive(Default)]
struct Script {
    fail_instance_create: bool,
    fail_instance_destroy: bool,
    fail_client_create: bool,
    fail_client_destroy: bool,
    fail_lib_fini: bool,
}

/// Records calls, hands out sequential handles, fails on request.
pub(crate) struct StubEngine {
    next_handle: AtomicU64,
    calls: Mutex<Vec<StubCall>>,
    script: Mutex<Script>,
    log: Mutex<Option<(LogCallback, usize)>>,
}

impl StubEngine {
    pub(crate) fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(Script::default()),
            log: Mutex::new(None),
        }
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_client(&self) -> ClientHandle {
        ClientHandle::from_raw(self.next()).unwrap()
    }

    pub(crate) fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&StubCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    pub(crate) fn client_destroys(&self) -> usize {
        self.count(|call| *call == StubCall::ClientDestroy)
    }

    pub(crate) fn fail_next_instance_create(&self) {
        self.script.lock().fail_instance_create = true;
    }

    pub(crate) fn fail_next_instance_destroy(&self) {
        self.script.lock().fail_instance_destroy = true;
    }

    pub(crate) fn fail_next_client_create(&self) {
        self.script.lock().fail_client_create = true;
    }

    pub(crate) fn fail_next_client_destroy(&self) {
        self.script.lock().fail_client_destroy = true;
    }

    pub(crate) fn fail_next_lib_fini(&self) {
        self.script.lock().fail_lib_fini = true;
    }

    pub(crate) fn has_log_callback(&self) -> bool {
        self.log.lock().is_some()
    }

    /// Delivers one message through the registered callback, if any.
    #[allow(unsafe_code)]
    pub(crate) fn emit(&self, message: &str, severity: i32) {
        let Some((callback, user_data)) = *self.log.lock() else {
            return;
        };
        let message = CString::new(message).unwrap();
        let component = CString::new("TEST").unwrap();
        // SAFETY: user_data was registered at init together with the
        // callback; the strings outlive the call.
        unsafe {
            callback(
                user_data as *mut std::ffi::c_void,
                message.as_ptr(),
                component.as_ptr(),
                std::ptr::null(),
                severity,
            );
        }
    }

    fn record(&self, call: StubCall) {
        self.calls.lock().push(call);
    }
}

impl EmbeddedEngine for StubEngine {
    fn lib_init(&self, params: &InitParams<'_>, _status: &mut Status) -> Option<LibHandle> {
        self.record(StubCall::LibInit);
        if params.log_flags.contains(LogFlags::CALLBACK) {
            if let Some(callback) = params.log_callback {
                *self.log.lock() = Some((callback, params.log_user_data as usize));
            }
        }
        LibHandle::from_raw(self.next())
    }

    fn lib_fini(&self, _lib: LibHandle, status: &mut Status) -> StatusCode {
        self.record(StubCall::LibFini);
        if std::mem::take(&mut self.script.lock().fail_lib_fini) {
            status.set(StatusCode::HasDbHandlesOpen, 0, "scripted failure");
            return StatusCode::HasDbHandlesOpen;
        }
        *self.log.lock() = None;
        StatusCode::Success
    }

    fn instance_create(
        &self,
        _lib: LibHandle,
        config: &CStr,
        status: &mut Status,
    ) -> Option<InstanceHandle> {
        self.record(StubCall::InstanceCreate(config.to_string_lossy().into_owned()));
        if std::mem::take(&mut self.script.lock().fail_instance_create) {
            status.set(StatusCode::Exception, 29, "scripted failure");
            return None;
        }
        InstanceHandle::from_raw(self.next())
    }

    fn instance_destroy(&self, _instance: InstanceHandle, status: &mut Status) -> StatusCode {
        self.record(StubCall::InstanceDestroy);
        if std::mem::take(&mut self.script.lock().fail_instance_destroy) {
            status.set(StatusCode::Unknown, 0, "scripted failure");
            return StatusCode::Unknown;
        }
        StatusCode::Success
    }

    fn client_create(
        &self,
        _instance: InstanceHandle,
        status: &mut Status,
    ) -> Option<ClientHandle> {
        self.record(StubCall::ClientCreate);
        if std::mem::take(&mut self.script.lock().fail_client_create) {
            status.set(StatusCode::OutOfMemory, 0, "scripted failure");
            return None;
        }
        Some(self.next_client())
    }

    fn client_destroy(&self, _client: ClientHandle, status: &mut Status) -> StatusCode {
        self.record(StubCall::ClientDestroy);
        if std::mem::take(&mut self.script.lock().fail_client_destroy) {
            status.set(StatusCode::InvalidClientHandle, 0, "scripted failure");
            return StatusCode::InvalidClientHandle;
        }
        StatusCode::Success
    }

    fn client_invoke(
        &self,
        _client: ClientHandle,
        input: &[u8],
        output: &mut Vec<u8>,
        _status: &mut Status,
    ) -> StatusCode {
        self.record(StubCall::ClientInvoke);
        output.extend_from_slice(input);
        StatusCode::Success
    }
}
