//! Test fixtures.
//!
//! Provides a manager wired to a fresh [`ReferenceEngine`] with storage
//! directories under a temporary root, and a logger that records what it
//! receives.

use mobiledb_core::{ClientSettings, LogSeverity, Logger, MobileDb, MobileOptions};
use mobiledb_engine::ReferenceEngine;
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing through the test harness.
///
/// Filtered by `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A manager over its own engine with automatic cleanup.
pub struct TestEnv {
    /// The engine, for inspecting its journal.
    pub engine: Arc<ReferenceEngine>,
    /// The manager under test.
    pub db: MobileDb,
    /// Root of the storage directories (dropped last).
    root: TempDir,
}

impl TestEnv {
    /// Creates an uninitialized environment.
    pub fn new() -> Self {
        init_tracing();
        let engine = Arc::new(ReferenceEngine::new());
        let db = MobileDb::new(engine.clone());
        Self {
            engine,
            db,
            root: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Creates an environment initialized without a logger.
    pub fn initialized() -> Self {
        let env = Self::new();
        env.db
            .initialize(MobileOptions::new())
            .expect("Failed to initialize");
        env
    }

    /// Creates an environment initialized with `logger`.
    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        let env = Self::new();
        env.db
            .initialize(MobileOptions::new().with_logger(logger))
            .expect("Failed to initialize");
        env
    }

    /// Returns the path of storage directory `name`, creating it.
    pub fn path(&self, name: &str) -> String {
        let path = self.root.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create storage directory");
        path.to_string_lossy().into_owned()
    }

    /// Returns the path of storage directory `name` without creating it.
    pub fn missing_path(&self, name: &str) -> String {
        self.root.path().join(name).to_string_lossy().into_owned()
    }

    /// Client settings for storage directory `name`, creating it.
    pub fn settings(&self, name: &str) -> ClientSettings {
        ClientSettings::new(self.path(name))
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// One message received by a [`RecordingLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Message text.
    pub message: String,
    /// Component.
    pub component: String,
    /// Context.
    pub context: String,
    /// Severity.
    pub severity: LogSeverity,
}

/// A logger that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every message received so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Returns true if a message with `severity` was received.
    pub fn saw(&self, severity: LogSeverity) -> bool {
        self.records
            .lock()
            .iter()
            .any(|record| record.severity == severity)
    }

    /// Number of messages received.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Logger for RecordingLogger {
    fn on_message(&self, message: &str, component: &str, context: &str, severity: LogSeverity) {
        self.records.lock().push(LogRecord {
            message: message.to_owned(),
            component: component.to_owned(),
            context: context.to_owned(),
            severity,
        });
    }
}
