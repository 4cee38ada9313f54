//! Settings types.

mod discovery;

pub use discovery::{DEFAULT_EXCLUDE_DIRS, DiscoverySettings};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuidanceSettings {
    /// Discovery engine settings.
    pub discovery: DiscoverySettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level passed to the subscriber filter.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

impl GuidanceSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let d = &self.discovery;
        if d.max_import_depth == 0 {
            return Err(SettingsError::InvalidValue(
                "maxImportDepth must be at least 1".into(),
            ));
        }
        if d.reduced_pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "reducedPoolSize must be at least 1".into(),
            ));
        }
        if d.max_document_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "maxDocumentBytes must be positive".into(),
            ));
        }
        Ok(())
    }
}
