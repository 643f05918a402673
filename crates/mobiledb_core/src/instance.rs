//! Storage instance cache.

use crate::client::ClientRegistry;
use crate::config::instance_config;
use crate::error::{check, MobileError, MobileResult};
use mobiledb_capi::{EmbeddedEngine, InstanceHandle, LibHandle, Status};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Maps storage paths to lazily opened native instances.
#[derive(Default)]
pub(crate) struct InstanceCache {
    records: HashMap<String, InstanceHandle>,
}

impl InstanceCache {
    /// Returns the instance for `db_path`, opening it on first use.
    ///
    /// Opening a new path first evicts every other instance along with all
    /// clients; see [`single_active_path`].
    pub(crate) fn get_or_create(
        &mut self,
        engine: &dyn EmbeddedEngine,
        lib: LibHandle,
        clients: &mut ClientRegistry,
        db_path: &str,
    ) -> MobileResult<InstanceHandle> {
        if let Some(&instance) = self.records.get(db_path) {
            return Ok(instance);
        }

        let config = instance_config(db_path)?;
        single_active_path::make_room(self, engine, clients)?;

        let mut status = Status::new();
        let instance = engine
            .instance_create(lib, &config, &mut status)
            .ok_or_else(|| MobileError::from_status(&status))?;

        debug!(db_path, "opened storage instance");
        self.records.insert(db_path.to_owned(), instance);
        Ok(instance)
    }

    /// Destroys every cached instance.
    ///
    /// Every destruction is attempted. Destroyed records are removed, failed
    /// ones are kept so a later call can retry them, and the first failure is
    /// returned. Clients must already be closed.
    pub(crate) fn destroy_all(&mut self, engine: &dyn EmbeddedEngine) -> MobileResult<()> {
        let mut first_err = None;

        self.records.retain(|db_path, instance| {
            let mut status = Status::new();
            let code = engine.instance_destroy(*instance, &mut status);
            match check(code, &status) {
                Ok(()) => {
                    debug!(db_path = db_path.as_str(), "destroyed storage instance");
                    false
                }
                Err(err) => {
                    warn!(db_path = db_path.as_str(), %err, "failed to destroy storage instance");
                    first_err.get_or_insert(err);
                    true
                }
            }
        });

        first_err.map_or(Ok(()), Err)
    }

    /// Cached storage paths, sorted.
    pub(crate) fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.records.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

/// Workaround for a backend limitation: the engine keeps at most one storage
/// path open at a time. Delete this module (and its call above) once the
/// engine lifts the restriction.
mod single_active_path {
    use super::*;

    /// Closes all clients and destroys all instances before a new path opens.
    pub(super) fn make_room(
        cache: &mut InstanceCache,
        engine: &dyn EmbeddedEngine,
        clients: &mut ClientRegistry,
    ) -> MobileResult<()> {
        if cache.is_empty() {
            return Ok(());
        }

        debug!(instances = cache.len(), evicting = ?cache.paths(), "switching storage path");
        clients.close_all(engine)?;
        cache.destroy_all(engine)
    }
}
