//! The engine trait.

use crate::status::{Status, StatusCode};
use crate::types::{ClientHandle, InitParams, InstanceHandle, LibHandle};
use std::ffi::CStr;

/// The native call contract of an embedded engine.
///
/// Every fallible call takes a [`Status`] it fills in on failure. Calls that
/// produce a handle return `None` on failure; calls that release one return
/// the [`StatusCode`] that was also written to the status.
///
/// Implementations must be callable from any thread. They are not required to
/// protect a handle against concurrent destroy and use; callers serialize
/// that.
pub trait EmbeddedEngine: Send + Sync {
    /// Initializes the library.
    fn lib_init(&self, params: &InitParams<'_>, status: &mut Status) -> Option<LibHandle>;

    /// Finalizes the library. All instances must already be destroyed.
    fn lib_fini(&self, lib: LibHandle, status: &mut Status) -> StatusCode;

    /// Opens a storage instance from a JSON config document.
    fn instance_create(
        &self,
        lib: LibHandle,
        config: &CStr,
        status: &mut Status,
    ) -> Option<InstanceHandle>;

    /// Destroys an instance. All of its clients must already be destroyed.
    fn instance_destroy(&self, instance: InstanceHandle, status: &mut Status) -> StatusCode;

    /// Creates a client connection on an instance.
    fn client_create(&self, instance: InstanceHandle, status: &mut Status)
        -> Option<ClientHandle>;

    /// Destroys a client.
    fn client_destroy(&self, client: ClientHandle, status: &mut Status) -> StatusCode;

    /// Sends one request through a client and writes the reply to `output`.
    fn client_invoke(
        &self,
        client: ClientHandle,
        input: &[u8],
        output: &mut Vec<u8>,
        status: &mut Status,
    ) -> StatusCode;
}
