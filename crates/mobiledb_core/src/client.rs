//! Client connections and the registry that tracks them.
//!
//! A [`Client`] is owned by the caller. The manager keeps a slot in the
//! [`ClientRegistry`] pointing at the client's [`ClientCell`] so it can close
//! every outstanding client before the owning instance is destroyed. The
//! cell's handle slot is the liveness flag: once a client is closed, by its
//! owner or by the registry, the handle is gone and the other side sees a
//! released client.

use crate::error::{check, MobileError, MobileResult};
use mobiledb_capi::{ClientHandle, EmbeddedEngine, Status};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stable identifier of a registry slot.
///
/// The generation distinguishes successive clients that reused one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId {
    /// Slot index.
    pub slot: u32,
    /// Generation of the slot when the client was registered.
    pub generation: u32,
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

/// Native client handle shared between a [`Client`] and its registry slot.
pub(crate) struct ClientCell {
    handle: Mutex<Option<ClientHandle>>,
}

impl ClientCell {
    pub(crate) fn new(handle: ClientHandle) -> Arc<Self> {
        Arc::new(Self {
            handle: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn is_live(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Destroys the native client if it is still live.
    ///
    /// Returns `Ok(false)` when it had already been released. If the native
    /// call fails the handle is kept so the close can be retried.
    pub(crate) fn close(&self, engine: &dyn EmbeddedEngine) -> MobileResult<bool> {
        let mut guard = self.handle.lock();
        let Some(handle) = *guard else {
            return Ok(false);
        };
        let mut status = Status::new();
        let code = engine.client_destroy(handle, &mut status);
        check(code, &status)?;
        *guard = None;
        Ok(true)
    }
}

/// A connection to one storage instance.
///
/// Hand it to a document driver, which talks to the engine through
/// [`Client::invoke`]. Dropping the client closes it. The manager may close
/// it earlier: when another storage path is opened, or on
/// [`MobileDb::close`](crate::MobileDb::close). After that every call fails
/// with [`MobileError::Logic`].
pub struct Client {
    id: ClientId,
    db_path: String,
    cell: Arc<ClientCell>,
    engine: Arc<dyn EmbeddedEngine>,
}

impl Client {
    pub(crate) fn new(
        id: ClientId,
        db_path: String,
        cell: Arc<ClientCell>,
        engine: Arc<dyn EmbeddedEngine>,
    ) -> Self {
        Self {
            id,
            db_path,
            cell,
            engine,
        }
    }

    /// Registry identifier of this client.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Storage path of the instance this client belongs to.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Returns true until the client is closed.
    pub fn is_open(&self) -> bool {
        self.cell.is_live()
    }

    /// Sends one request to the engine and returns its reply.
    ///
    /// The bytes are opaque to MobileDB; their format is whatever the engine
    /// and the driver agree on. The client stays locked for the duration of
    /// the native call, including any log messages it delivers.
    pub fn invoke(&self, request: &[u8]) -> MobileResult<Vec<u8>> {
        let guard = self.cell.handle.lock();
        let handle = (*guard).ok_or_else(|| MobileError::logic("client is closed"))?;
        let mut status = Status::new();
        let mut reply = Vec::new();
        let code = self
            .engine
            .client_invoke(handle, request, &mut reply, &mut status);
        check(code, &status)?;
        Ok(reply)
    }

    /// Closes the client. Closing an already closed client is a no-op.
    pub fn close(&self) -> MobileResult<()> {
        if self.cell.close(self.engine.as_ref())? {
            debug!(client = %self.id, db_path = %self.db_path, "client closed");
        }
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("db_path", &self.db_path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(client = %self.id, %err, "failed to close client on drop");
        }
    }
}

struct Slot {
    generation: u32,
    cell: Option<Arc<ClientCell>>,
}

impl Slot {
    fn is_vacant(&self) -> bool {
        self.cell.as_ref().map_or(true, |cell| !cell.is_live())
    }
}

/// Tracks every client issued by the manager without owning them.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    slots: Vec<Slot>,
}

impl ClientRegistry {
    /// Tracks a newly created client, reusing a slot whose client is gone.
    pub(crate) fn register(&mut self, cell: Arc<ClientCell>) -> ClientId {
        if let Some((index, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_vacant())
        {
            slot.generation = slot.generation.wrapping_add(1);
            slot.cell = Some(cell);
            return ClientId {
                slot: index as u32,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            cell: Some(cell),
        });
        ClientId {
            slot: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Returns true if `id` names a tracked client that is still open.
    pub(crate) fn is_live(&self, id: ClientId) -> bool {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.cell.as_ref())
            .map_or(false, |cell| cell.is_live())
    }

    /// Number of open clients.
    pub(crate) fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_vacant()).count()
    }

    /// Closes every client that is still open and stops tracking the closed ones.
    ///
    /// Clients already released by their owner are skipped. Every client is
    /// attempted; the first failure is returned. Clients that failed to close
    /// stay tracked so a later call can retry them.
    pub(crate) fn close_all(&mut self, engine: &dyn EmbeddedEngine) -> MobileResult<()> {
        let mut first_err = None;
        let mut closed = 0usize;

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(cell) = slot.cell.take() else {
                continue;
            };
            match cell.close(engine) {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(slot = index, %err, "failed to close client");
                    first_err.get_or_insert(err);
                    slot.cell = Some(cell);
                }
            }
        }

        if closed > 0 {
            debug!(closed, "closed outstanding clients");
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Stops tracking every client without closing them.
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.cell = None;
        }
    }
}
