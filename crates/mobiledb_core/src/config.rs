//! Initialization options, client settings and the instance config document.

use crate::error::{MobileError, MobileResult};
use crate::log::Logger;
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

/// Options for [`MobileDb::initialize`](crate::MobileDb::initialize).
#[derive(Clone, Default)]
pub struct MobileOptions {
    /// Receives engine log messages. Without one the engine is initialized
    /// with logging disabled.
    pub logger: Option<Arc<dyn Logger>>,
}

impl MobileOptions {
    /// Creates options with no logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

impl fmt::Debug for MobileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MobileOptions")
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Settings for [`MobileDb::create`](crate::MobileDb::create).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Storage directory of the instance the client connects to.
    pub db_path: String,
}

impl ClientSettings {
    /// Creates settings for a storage path.
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

#[derive(Serialize)]
struct InstanceConfig<'a> {
    storage: StorageConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StorageConfig<'a> {
    db_path: &'a str,
}

/// Builds the config document handed to native instance creation:
/// `{"storage":{"dbPath":"<path>"}}`.
///
/// A path containing NUL is rejected: the engine reads it as a C string and
/// would stop at the first NUL.
pub fn instance_config(db_path: &str) -> MobileResult<CString> {
    let nul_in_path = || MobileError::logic(format!("dbPath contains a NUL byte: {db_path:?}"));
    if db_path.contains('\0') {
        return Err(nul_in_path());
    }
    let document = serde_json::to_string(&InstanceConfig {
        storage: StorageConfig { db_path },
    })?;
    CString::new(document).map_err(|_| nul_in_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::TracingLogger;

    #[test]
    fn config_document_shape() {
        let config = instance_config("/data/db").unwrap();
        assert_eq!(
            config.to_str().unwrap(),
            r#"{"storage":{"dbPath":"/data/db"}}"#
        );
    }

    #[test]
    fn config_document_escapes_path() {
        let config = instance_config(r#"C:\data\"quoted""#).unwrap();
        let value: serde_json::Value = serde_json::from_str(config.to_str().unwrap()).unwrap();
        assert_eq!(value["storage"]["dbPath"], r#"C:\data\"quoted""#);
    }

    #[test]
    fn nul_in_path_is_rejected() {
        let err = instance_config("bad\0path").unwrap_err();
        assert!(err.is_logic());
        assert!(err.to_string().contains("NUL byte"));
        assert!(instance_config("\0").unwrap_err().is_logic());
    }

    #[test]
    fn client_settings_serde() {
        let settings: ClientSettings = serde_json::from_str(r#"{"dbPath":"t1"}"#).unwrap();
        assert_eq!(settings, ClientSettings::new("t1"));
        assert_eq!(
            serde_json::to_string(&settings).unwrap(),
            r#"{"dbPath":"t1"}"#
        );
    }

    #[test]
    fn options_builder() {
        assert!(MobileOptions::new().logger.is_none());
        let options = MobileOptions::new().with_logger(Arc::new(TracingLogger));
        assert!(options.logger.is_some());
        assert_eq!(format!("{options:?}"), "MobileOptions { logger: true }");
    }
}
