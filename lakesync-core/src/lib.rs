//! lakesync core - data types
//!
//! Pure data structures shared by every lakesync crate: the metadata records
//! (sources, caches, per-cache refresh state), qualified table names, content
//! fingerprints, row sets and refresh statuses. Nothing in this crate performs
//! I/O; collaborators live in `lakesync-storage` and the decision logic in
//! `lakesync-engine`.

use chrono::{DateTime, Utc};

pub mod config;
pub mod error;

mod entities;
mod fingerprint;
mod name;
mod rows;
mod status;

pub use config::{EngineConfig, RefreshGuard, StorageSettings};
pub use entities::{Cache, CacheSpec, CacheState, DriverKind, Source};
pub use error::{
    ConfigError, EngineError, LakesyncError, LakesyncResult, NotFoundError, ParseError,
    RemoteError, StorageError, ValidationError,
};
pub use fingerprint::Fingerprint;
pub use name::{is_plain_identifier, QualifiedName};
pub use rows::{Column, RowSet, Schema};
pub use status::{RefreshOutcome, RefreshStatus, RouteStrategy};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
