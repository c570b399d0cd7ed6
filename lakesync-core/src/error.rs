//! Error types for lakesync operations

use thiserror::Error;

/// A named record the caller asked for does not exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Source '{name}' not found")]
    Source { name: String },

    #[error("Cache '{name}' not found")]
    Cache { name: String },
}

/// Engine lifecycle and routing policy errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("lakesync not initialized. Call setup_storage first.")]
    NotInitialized,

    #[error("Passthrough is disabled for source '{source_name}'")]
    PassthroughDisabled { source_name: String },

    #[error("Refresh of cache '{cache}' failed: {message}")]
    RefreshFailed { cache: String, message: String },

    #[error("Failed to init tracing subscriber: {reason}")]
    Telemetry { reason: String },
}

/// Failures reported by the remote warehouse connector.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Failed to execute source query: {reason}")]
    QueryFailed { reason: String },

    #[error("Failed to query source metadata: {reason}")]
    ProbeFailed { reason: String },
}

/// The query text could not be turned into a query tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty query")]
    Empty,

    #[error("Invalid SQL: {reason}")]
    Invalid { reason: String },

    #[error("Expected exactly one statement, found {count}")]
    MultipleStatements { count: usize },

    #[error("Unsupported statement kind: {kind}")]
    UnsupportedStatement { kind: String },
}

/// Materialized storage (catalog) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Lakehouse storage not attached")]
    NotAttached,

    #[error("Failed to materialize {table}: {reason}")]
    MaterializeFailed { table: String, reason: String },

    #[error("Catalog error: {reason}")]
    CatalogFailed { reason: String },

    #[error("Table {table} does not exist")]
    UnknownTable { table: String },
}

/// Validation errors for administrative input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all lakesync errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LakesyncError {
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl LakesyncError {
    /// True for the errors that must surface immediately at entry points.
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Engine(EngineError::NotInitialized)
        )
    }
}

/// Result type alias for lakesync operations.
pub type LakesyncResult<T> = Result<T, LakesyncError>;

// =============================================================================
// TESTS
// =============================================================================
