//! Record of accepted native calls.

use parking_lot::Mutex;

/// One native call the engine accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// Library initialized.
    LibInit,
    /// Library finalized.
    LibFini,
    /// Instance opened for a storage path.
    InstanceCreate {
        /// Storage path.
        db_path: String,
    },
    /// Instance destroyed.
    InstanceDestroy {
        /// Storage path.
        db_path: String,
    },
    /// Client created on an instance.
    ClientCreate {
        /// Storage path of the instance.
        db_path: String,
    },
    /// Client destroyed.
    ClientDestroy {
        /// Storage path of the instance.
        db_path: String,
    },
    /// Request executed through a client.
    ClientInvoke {
        /// Storage path of the instance.
        db_path: String,
        /// Command name.
        command: &'static str,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    calls: Mutex<Vec<EngineCall>>,
}

impl Journal {
    pub(crate) fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }

    pub(crate) fn snapshot(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().clear();
    }
}
