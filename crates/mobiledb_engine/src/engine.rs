//! The reference engine.

use crate::command;
use crate::error::{EngineError, EngineResult};
use crate::journal::{EngineCall, Journal};
use crate::log::{severity, LogSink, Outbox};
use crate::store::{StorageDir, Store};
use mobiledb_capi::{
    ClientHandle, EmbeddedEngine, InitParams, InstanceHandle, LibHandle, Status, StatusCode,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::CStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of storage instances the engine can keep open at once.
pub const MAX_OPEN_INSTANCES: usize = 1;

thread_local! {
    static IN_CALL: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a native call.
struct CallGuard;

impl CallGuard {
    fn enter(status: &mut Status) -> Option<Self> {
        IN_CALL.with(|in_call| {
            if in_call.replace(true) {
                status.set(
                    StatusCode::ReentrancyNotAllowed,
                    0,
                    "native call made from inside another native call",
                );
                None
            } else {
                Some(CallGuard)
            }
        })
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        IN_CALL.with(|in_call| in_call.set(false));
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceConfig {
    storage: StorageConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageConfig {
    db_path: String,
}

struct Library {
    handle: LibHandle,
    log: Option<Arc<LogSink>>,
}

struct Instance {
    db_path: String,
    dir: StorageDir,
    store: Store,
    clients: usize,
}

struct Client {
    instance: InstanceHandle,
}

#[derive(Default)]
struct EngineState {
    lib: Option<Library>,
    instances: HashMap<InstanceHandle, Instance>,
    clients: HashMap<ClientHandle, Client>,
}

impl EngineState {
    fn log_sink(&self) -> Option<Arc<LogSink>> {
        self.lib.as_ref().and_then(|lib| lib.log.clone())
    }

    fn library(&self, handle: LibHandle, status: &mut Status) -> Option<&Library> {
        match &self.lib {
            Some(lib) if lib.handle == handle => Some(lib),
            Some(_) => {
                status.set(StatusCode::InvalidLibHandle, 0, "unknown library handle");
                None
            }
            None => {
                status.set(
                    StatusCode::LibraryNotInitialized,
                    0,
                    "library is not initialized",
                );
                None
            }
        }
    }
}

/// An in-process document engine implementing the native contract.
///
/// Behaves like the embedded engine it stands in for:
/// - one library per engine; a second `lib_init` fails
/// - at most [`MAX_OPEN_INSTANCES`] open storage instances
/// - instances cannot be destroyed while clients are open, nor the library
///   finalized while instances are open
/// - each instance locks its `dbPath` directory and persists its documents
///   there when destroyed
///
/// Every accepted call is journaled; see [`ReferenceEngine::calls`].
///
/// Log lines are delivered after the engine's internal lock is released, so
/// a log callback may use the inspection methods. Native calls made from
/// inside a callback are rejected with `ReentrancyNotAllowed`.
///
/// # Example
///
/// ```rust,ignore
/// use mobiledb_core::{ClientSettings, MobileDb, MobileOptions};
/// use mobiledb_engine::ReferenceEngine;
/// use std::sync::Arc;
///
/// let db = MobileDb::new(Arc::new(ReferenceEngine::new()));
/// db.initialize(MobileOptions::new())?;
/// let client = db.create(&ClientSettings::new("/data/db"))?;
/// ```
pub struct ReferenceEngine {
    state: Mutex<EngineState>,
    journal: Journal,
    next_handle: AtomicU64,
}

impl ReferenceEngine {
    /// Creates an engine with no library initialized.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            journal: Journal::default(),
            next_handle: AtomicU64::new(1),
        }
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Every call accepted so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.journal.snapshot()
    }

    /// Number of accepted calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.journal.count(pred)
    }

    /// Number of instances created for `db_path`.
    pub fn instance_creates(&self, db_path: &str) -> usize {
        self.count_calls(|call| {
            matches!(call, EngineCall::InstanceCreate { db_path: path } if path == db_path)
        })
    }

    /// Forgets every recorded call.
    pub fn clear_calls(&self) {
        self.journal.clear();
    }

    /// Returns true while a library is initialized.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().lib.is_some()
    }

    /// Storage paths with an open instance, sorted.
    pub fn open_instances(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut paths: Vec<String> = state
            .instances
            .values()
            .map(|instance| instance.db_path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Number of open clients.
    pub fn open_clients(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Sends a log line through the registered callback, as if the engine
    /// had produced it. Does nothing without callback logging.
    pub fn emit_log(&self, message: &str, component: &str, context: &str, severity: i32) {
        let mut outbox = Outbox::default();
        outbox.attach(self.state.lock().log_sink());
        outbox.push(message, component, context, severity);
    }

    fn open_instance(&self, config: &CStr) -> EngineResult<(String, StorageDir, Store)> {
        let config: InstanceConfig = serde_json::from_slice(config.to_bytes())?;
        let db_path = config.storage.db_path;
        let dir = StorageDir::open(Path::new(&db_path))?;
        let store = dir.load()?;
        Ok((db_path, dir, store))
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedEngine for ReferenceEngine {
    fn lib_init(&self, params: &InitParams<'_>, status: &mut Status) -> Option<LibHandle> {
        let _guard = CallGuard::enter(status)?;
        let mut outbox = Outbox::default();
        let mut state = self.state.lock();
        if state.lib.is_some() {
            status.set(
                StatusCode::LibraryAlreadyInitialized,
                0,
                "library already initialized",
            );
            return None;
        }

        let handle = LibHandle::from_raw(self.next_raw())?;
        let lib = Library {
            handle,
            log: LogSink::from_params(params).map(Arc::new),
        };
        outbox.attach(lib.log.clone());
        outbox.push(
            format!("MobileDB reference engine {} starting", crate::VERSION),
            "CONTROL",
            "initandlisten",
            severity::LOG,
        );
        state.lib = Some(lib);
        self.journal.record(EngineCall::LibInit);
        debug!("engine library initialized");
        Some(handle)
    }

    fn lib_fini(&self, lib: LibHandle, status: &mut Status) -> StatusCode {
        let Some(_guard) = CallGuard::enter(status) else {
            return status.error();
        };
        let mut outbox = Outbox::default();
        let mut state = self.state.lock();
        if state.library(lib, status).is_none() {
            return status.error();
        }
        if !state.instances.is_empty() {
            status.set(
                StatusCode::HasDbHandlesOpen,
                0,
                format!("{} storage instance(s) still open", state.instances.len()),
            );
            return status.error();
        }

        outbox.attach(state.log_sink());
        outbox.push("shutting down", "CONTROL", "shutdown", severity::LOG);
        state.lib = None;
        self.journal.record(EngineCall::LibFini);
        debug!("engine library finalized");
        StatusCode::Success
    }

    fn instance_create(
        &self,
        lib: LibHandle,
        config: &CStr,
        status: &mut Status,
    ) -> Option<InstanceHandle> {
        let _guard = CallGuard::enter(status)?;
        let mut outbox = Outbox::default();
        let mut state = self.state.lock();
        state.library(lib, status)?;
        outbox.attach(state.log_sink());
        if state.instances.len() >= MAX_OPEN_INSTANCES {
            status.set(
                StatusCode::DbMaxOpen,
                0,
                "only one storage instance may be open at a time",
            );
            return None;
        }

        let (db_path, dir, store) = match self.open_instance(config) {
            Ok(opened) => opened,
            Err(err) => {
                warn!(%err, "failed to open storage instance");
                err.report(status);
                return None;
            }
        };

        let handle = InstanceHandle::from_raw(self.next_raw())?;
        outbox.push(
            format!("opened storage at {db_path}"),
            "STORAGE",
            "initandlisten",
            severity::INFO,
        );
        self.journal.record(EngineCall::InstanceCreate {
            db_path: db_path.clone(),
        });
        state.instances.insert(
            handle,
            Instance {
                db_path,
                dir,
                store,
                clients: 0,
            },
        );
        Some(handle)
    }

    fn instance_destroy(&self, instance: InstanceHandle, status: &mut Status) -> StatusCode {
        let Some(_guard) = CallGuard::enter(status) else {
            return status.error();
        };
        let mut outbox = Outbox::default();
        let mut state = self.state.lock();
        outbox.attach(state.log_sink());
        let Some(open) = state.instances.get(&instance) else {
            status.set(StatusCode::InvalidDbHandle, 0, "unknown instance handle");
            return status.error();
        };
        if open.clients > 0 {
            status.set(
                StatusCode::DbClientsOpen,
                0,
                format!("{} client(s) still open on {}", open.clients, open.db_path),
            );
            return status.error();
        }
        if let Err(err) = open.dir.save(&open.store) {
            return err.report(status);
        }

        let Some(closed) = state.instances.remove(&instance) else {
            return StatusCode::Success;
        };
        outbox.push(
            format!("closed storage at {}", closed.db_path),
            "STORAGE",
            "shutdown",
            severity::INFO,
        );
        self.journal.record(EngineCall::InstanceDestroy {
            db_path: closed.db_path,
        });
        StatusCode::Success
    }

    fn client_create(
        &self,
        instance: InstanceHandle,
        status: &mut Status,
    ) -> Option<ClientHandle> {
        let _guard = CallGuard::enter(status)?;
        let mut outbox = Outbox::default();
        let mut state = self.state.lock();
        outbox.attach(state.log_sink());
        let handle = ClientHandle::from_raw(self.next_raw())?;
        let state = &mut *state;
        let Some(open) = state.instances.get_mut(&instance) else {
            status.set(StatusCode::InvalidDbHandle, 0, "unknown instance handle");
            return None;
        };

        open.clients += 1;
        state.clients.insert(handle, Client { instance });
        outbox.push(
            format!("client connected to {}", open.db_path),
            "NETWORK",
            "conn",
            severity::DEBUG,
        );
        self.journal.record(EngineCall::ClientCreate {
            db_path: open.db_path.clone(),
        });
        Some(handle)
    }

    fn client_destroy(&self, client: ClientHandle, status: &mut Status) -> StatusCode {
        let Some(_guard) = CallGuard::enter(status) else {
            return status.error();
        };
        let mut outbox = Outbox::default();
        let mut state = self.state.lock();
        outbox.attach(state.log_sink());
        let Some(closed) = state.clients.remove(&client) else {
            status.set(StatusCode::InvalidClientHandle, 0, "unknown client handle");
            return status.error();
        };

        let state = &mut *state;
        let db_path = match state.instances.get_mut(&closed.instance) {
            Some(open) => {
                open.clients -= 1;
                open.db_path.clone()
            }
            None => String::new(),
        };
        outbox.push(
            format!("client disconnected from {db_path}"),
            "NETWORK",
            "conn",
            severity::DEBUG,
        );
        self.journal.record(EngineCall::ClientDestroy { db_path });
        StatusCode::Success
    }

    fn client_invoke(
        &self,
        client: ClientHandle,
        input: &[u8],
        output: &mut Vec<u8>,
        status: &mut Status,
    ) -> StatusCode {
        let Some(_guard) = CallGuard::enter(status) else {
            return status.error();
        };
        let mut outbox = Outbox::default();
        let mut state = self.state.lock();
        outbox.attach(state.log_sink());
        let state = &mut *state;
        let Some(instance) = state.clients.get(&client).map(|client| client.instance) else {
            status.set(StatusCode::InvalidClientHandle, 0, "unknown client handle");
            return status.error();
        };
        let Some(open) = state.instances.get_mut(&instance) else {
            status.set(StatusCode::InvalidDbHandle, 0, "client outlived its instance");
            return status.error();
        };

        let executed = command::execute(&mut open.store, input);
        outbox.push(
            format!("command {} on {}", executed.name, open.db_path),
            "COMMAND",
            "conn",
            severity::DEBUG + 1,
        );
        if let Some(batch) = executed.reply["cursor"]["firstBatch"].as_array() {
            outbox.push(
                format!("returned {} document(s)", batch.len()),
                "QUERY",
                "conn",
                severity::DEBUG + 4,
            );
        }

        if let Err(err) = serde_json::to_writer(&mut *output, &executed.reply) {
            return EngineError::from(err).report(status);
        }
        self.journal.record(EngineCall::ClientInvoke {
            db_path: open.db_path.clone(),
            command: executed.name,
        });
        StatusCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use tempfile::TempDir;

    fn config(path: &Path) -> CString {
        CString::new(format!(
            r#"{{"storage":{{"dbPath":{}}}}}"#,
            serde_json::to_string(path.to_str().unwrap()).unwrap()
        ))
        .unwrap()
    }

    fn init(engine: &ReferenceEngine) -> LibHandle {
        engine
            .lib_init(&InitParams::default(), &mut Status::new())
            .unwrap()
    }

    #[test]
    fn library_is_single() {
        let engine = ReferenceEngine::new();
        let lib = init(&engine);

        let mut status = Status::new();
        assert!(engine.lib_init(&InitParams::default(), &mut status).is_none());
        assert_eq!(status.error(), StatusCode::LibraryAlreadyInitialized);

        assert_eq!(engine.lib_fini(lib, &mut Status::new()), StatusCode::Success);
        let mut status = Status::new();
        assert_eq!(engine.lib_fini(lib, &mut status), StatusCode::LibraryNotInitialized);
    }

    #[test]
    fn ordering_is_enforced() {
        let dir = TempDir::new().unwrap();
        let engine = ReferenceEngine::new();
        let lib = init(&engine);
        let instance = engine
            .instance_create(lib, &config(dir.path()), &mut Status::new())
            .unwrap();
        let client = engine.client_create(instance, &mut Status::new()).unwrap();

        let mut status = Status::new();
        assert_eq!(engine.instance_destroy(instance, &mut status), StatusCode::DbClientsOpen);
        let mut status = Status::new();
        assert_eq!(engine.lib_fini(lib, &mut status), StatusCode::HasDbHandlesOpen);

        assert!(engine.client_destroy(client, &mut Status::new()).is_ok());
        assert!(engine.instance_destroy(instance, &mut Status::new()).is_ok());
        assert!(engine.lib_fini(lib, &mut Status::new()).is_ok());
        assert!(!engine.is_initialized());
    }

    #[test]
    fn only_one_instance_at_a_time() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let engine = ReferenceEngine::new();
        let lib = init(&engine);
        engine
            .instance_create(lib, &config(a.path()), &mut Status::new())
            .unwrap();

        let mut status = Status::new();
        assert!(engine.instance_create(lib, &config(b.path()), &mut status).is_none());
        assert_eq!(status.error(), StatusCode::DbMaxOpen);
    }

    #[test]
    fn instance_create_failures() {
        let dir = TempDir::new().unwrap();
        let engine = ReferenceEngine::new();
        let lib = init(&engine);

        let mut status = Status::new();
        let missing = config(&dir.path().join("missing"));
        assert!(engine.instance_create(lib, &missing, &mut status).is_none());
        assert_eq!(status.error(), StatusCode::Exception);
        assert_eq!(status.server_code(), 29);

        let mut status = Status::new();
        let garbage = CString::new("storage: {}").unwrap();
        assert!(engine.instance_create(lib, &garbage, &mut status).is_none());
        assert_eq!(status.server_code(), 9);

        let mut status = Status::new();
        let stale = LibHandle::from_raw(lib.as_raw() + 100).unwrap();
        assert!(engine.instance_create(stale, &config(dir.path()), &mut status).is_none());
        assert_eq!(status.error(), StatusCode::InvalidLibHandle);
        assert_eq!(engine.instance_creates(dir.path().to_str().unwrap()), 0);
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let engine = ReferenceEngine::new();
        let lib = init(&engine);

        let instance = engine
            .instance_create(lib, &config(dir.path()), &mut Status::new())
            .unwrap();
        let client = engine.client_create(instance, &mut Status::new()).unwrap();
        let mut reply = Vec::new();
        let request = br#"{"insert":"foo","$db":"test","documents":[{"test":42}]}"#;
        assert!(engine
            .client_invoke(client, request, &mut reply, &mut Status::new())
            .is_ok());
        engine.client_destroy(client, &mut Status::new());
        engine.instance_destroy(instance, &mut Status::new());

        let instance = engine
            .instance_create(lib, &config(dir.path()), &mut Status::new())
            .unwrap();
        let client = engine.client_create(instance, &mut Status::new()).unwrap();
        let mut reply = Vec::new();
        let request = br#"{"count":"foo","$db":"test"}"#;
        engine.client_invoke(client, request, &mut reply, &mut Status::new());
        let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(reply["n"], 1);
    }

    #[test]
    fn unknown_handles() {
        let engine = ReferenceEngine::new();
        let bogus_client = ClientHandle::from_raw(42).unwrap();
        let bogus_instance = InstanceHandle::from_raw(42).unwrap();

        let mut status = Status::new();
        assert_eq!(
            engine.client_destroy(bogus_client, &mut status),
            StatusCode::InvalidClientHandle
        );
        let mut status = Status::new();
        assert_eq!(
            engine.client_invoke(bogus_client, b"{}", &mut Vec::new(), &mut status),
            StatusCode::InvalidClientHandle
        );
        let mut status = Status::new();
        assert_eq!(
            engine.instance_destroy(bogus_instance, &mut status),
            StatusCode::InvalidDbHandle
        );
        let mut status = Status::new();
        assert!(engine.client_create(bogus_instance, &mut status).is_none());
        assert_eq!(status.error(), StatusCode::InvalidDbHandle);
    }

    #[test]
    fn reentrant_calls_are_rejected() {
        let engine = ReferenceEngine::new();
        let _outer = CallGuard::enter(&mut Status::new()).unwrap();

        let mut status = Status::new();
        assert!(engine.lib_init(&InitParams::default(), &mut status).is_none());
        assert_eq!(status.error(), StatusCode::ReentrancyNotAllowed);
    }
}
