//! Engine configuration.
//!
//! Every field has a default so an empty TOML document is a valid config.
//! Unknown keys are rejected.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{is_plain_identifier, ConfigError};

/// Mutual exclusion policy for concurrent refreshes of the same cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshGuard {
    /// At most one refresh per cache in flight; waiters re-check staleness.
    #[default]
    PerCache,
    /// No locking. Concurrent refreshes race and the last writer wins.
    Unguarded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Attached catalog; first part of every physical table name.
    pub catalog_name: String,
    /// Schema inside the catalog holding the metadata tables.
    pub metadata_schema: String,
    pub refresh_guard: RefreshGuard,
    /// Refuse passthrough for sources with `passthrough_enabled = false`.
    pub enforce_passthrough_flag: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_name: "lakesync".to_string(),
            metadata_schema: "lakesync".to_string(),
            refresh_guard: RefreshGuard::PerCache,
            enforce_passthrough_flag: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_identifier("catalog_name", &self.catalog_name)?;
        require_identifier("metadata_schema", &self.metadata_schema)?;
        Ok(())
    }
}

/// Where the lakehouse catalog lives; consumed by storage setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    /// Connection string of the catalog database.
    pub catalog_connection: String,
    /// Directory or object-store prefix for table data files.
    pub data_path: String,
}

impl StorageSettings {
    pub fn new(catalog_connection: impl Into<String>, data_path: impl Into<String>) -> Self {
        Self {
            catalog_connection: catalog_connection.into(),
            data_path: data_path.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog_connection.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "catalog_connection".to_string(),
                value: self.catalog_connection.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.data_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "data_path".to_string(),
                value: self.data_path.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn require_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if !is_plain_identifier(value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be a plain identifier".to_string(),
        });
    }
    Ok(())
}
