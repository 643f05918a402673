//! The library manager.

use crate::client::{Client, ClientCell, ClientId, ClientRegistry};
use crate::config::{ClientSettings, MobileOptions};
use crate::error::{check, MobileError, MobileResult};
use crate::instance::InstanceCache;
use crate::log::{log_trampoline, LogBridge};
use mobiledb_capi::{EmbeddedEngine, InitParams, LibHandle, LogCallback, LogFlags, Status};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct LibraryState {
    lib: Option<LibHandle>,
    bridge: Option<Box<LogBridge>>,
    instances: InstanceCache,
    clients: ClientRegistry,
}

/// Owns the engine library and everything derived from it.
///
/// `MobileDb` drives the resource hierarchy of an embedded engine:
/// - one library handle, created by [`initialize`](Self::initialize)
/// - storage instances, opened per `dbPath` on first [`create`](Self::create)
/// - clients, handed to the caller by [`create`](Self::create)
///
/// [`close`](Self::close) tears the hierarchy down in order: clients, then
/// instances, then the library. Dropping an initialized manager closes it.
///
/// All operations are serialized on one lock, so a `MobileDb` can be shared
/// between threads. Loggers must not call back into the manager that
/// delivered the message or into its clients.
///
/// # Example
///
/// ```rust,ignore
/// use mobiledb_core::{ClientSettings, MobileDb, MobileOptions};
///
/// let db = MobileDb::new(engine);
/// db.initialize(MobileOptions::new())?;
///
/// let client = db.create(&ClientSettings::new("/data/db"))?;
/// let reply = client.invoke(br#"{"ping":1}"#)?;
///
/// db.close()?;
/// ```
///
/// The engine keeps only one storage path open at a time. Creating a client
/// for a new path closes every existing client and instance first.
pub struct MobileDb {
    engine: Arc<dyn EmbeddedEngine>,
    state: Mutex<LibraryState>,
}

impl MobileDb {
    /// Creates an uninitialized manager over an engine binding.
    pub fn new(engine: Arc<dyn EmbeddedEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(LibraryState::default()),
        }
    }

    /// Initializes the engine library.
    ///
    /// With a logger in `options`, engine log messages are delivered to it
    /// until [`close`](Self::close). Without one, engine logging is disabled.
    ///
    /// # Errors
    ///
    /// - [`MobileError::Logic`] if already initialized
    /// - the translated native status if library initialization fails
    pub fn initialize(&self, options: MobileOptions) -> MobileResult<()> {
        let mut state = self.state.lock();
        if state.lib.is_some() {
            return Err(MobileError::logic("already initialized"));
        }

        let bridge = options.logger.map(LogBridge::new);
        let params = match &bridge {
            Some(bridge) => InitParams {
                log_flags: LogFlags::CALLBACK,
                log_callback: Some(log_trampoline as LogCallback),
                log_user_data: bridge.user_data(),
                ..InitParams::default()
            },
            None => InitParams::default(),
        };

        let mut status = Status::new();
        let lib = self
            .engine
            .lib_init(&params, &mut status)
            .ok_or_else(|| MobileError::from_status(&status))?;

        debug!(logging = bridge.is_some(), "library initialized");
        state.lib = Some(lib);
        state.bridge = bridge;
        Ok(())
    }

    /// Creates a client for the storage instance at `settings.db_path`.
    ///
    /// The instance is opened on first use and reused afterwards. Opening a
    /// different path closes every outstanding client and destroys every
    /// cached instance first.
    ///
    /// # Errors
    ///
    /// - [`MobileError::Logic`] if not initialized
    /// - the translated native status if eviction, instance creation or
    ///   client creation fails
    pub fn create(&self, settings: &ClientSettings) -> MobileResult<Client> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let lib = state.lib.ok_or_else(MobileError::not_initialized)?;

        let instance = state.instances.get_or_create(
            self.engine.as_ref(),
            lib,
            &mut state.clients,
            &settings.db_path,
        )?;

        let mut status = Status::new();
        let handle = self
            .engine
            .client_create(instance, &mut status)
            .ok_or_else(|| MobileError::from_status(&status))?;

        let cell = ClientCell::new(handle);
        let id = state.clients.register(Arc::clone(&cell));
        debug!(client = %id, db_path = %settings.db_path, "client created");

        Ok(Client::new(
            id,
            settings.db_path.clone(),
            cell,
            Arc::clone(&self.engine),
        ))
    }

    /// Closes all clients, destroys all instances and finalizes the library.
    ///
    /// If closing clients or destroying instances fails, the error is returned
    /// and the library stays initialized so `close` can be retried. Once
    /// finalization has been attempted the manager is reset regardless of its
    /// outcome and can be initialized again.
    ///
    /// # Errors
    ///
    /// - [`MobileError::Logic`] if not initialized
    /// - the translated native status of the first failing step
    pub fn close(&self) -> MobileResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let lib = state.lib.ok_or_else(MobileError::not_initialized)?;

        state.clients.close_all(self.engine.as_ref())?;
        state.instances.destroy_all(self.engine.as_ref())?;

        let mut status = Status::new();
        let code = self.engine.lib_fini(lib, &mut status);
        let result = check(code, &status);

        if let Some(bridge) = state.bridge.take() {
            if result.is_err() {
                // The library may still hold the callback; keep its context valid.
                std::mem::forget(bridge);
            }
        }
        state.lib = None;
        state.instances.clear();
        state.clients.clear();

        match &result {
            Ok(()) => debug!("library finalized"),
            Err(err) => warn!(%err, "library finalization failed; state reset"),
        }
        result
    }

    /// Returns true between a successful `initialize` and `close`.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().lib.is_some()
    }

    /// Storage paths with an open instance, sorted.
    pub fn active_paths(&self) -> Vec<String> {
        self.state.lock().instances.paths()
    }

    /// Number of issued clients that are still open.
    pub fn tracked_clients(&self) -> usize {
        self.state.lock().clients.live_count()
    }

    /// Returns true if the client with `id` is tracked and still open.
    pub fn is_tracked(&self, id: ClientId) -> bool {
        self.state.lock().clients.is_live(id)
    }
}

impl fmt::Debug for MobileDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MobileDb")
            .field("initialized", &state.lib.is_some())
            .field("active_paths", &state.instances.paths())
            .field("tracked_clients", &state.clients.live_count())
            .finish()
    }
}

impl Drop for MobileDb {
    fn drop(&mut self) {
        if self.state.get_mut().lib.is_none() {
            return;
        }
        if let Err(err) = self.close() {
            warn!(%err, "failed to close on drop");
        }
    }
}
