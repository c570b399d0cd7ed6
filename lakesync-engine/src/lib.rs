//! lakesync engine
//!
//! Decision logic on top of the collaborator contracts in `lakesync-storage`:
//!
//! - [`StalenessOracle`]: TTL first, then a content fingerprint of the
//!   monitored tables
//! - [`RefreshOrchestrator`]: re-materializes a stale cache and records its
//!   new state, reporting a status instead of failing
//! - [`QueryRouter`]: serves a query from caches when every table it reads is
//!   cached, otherwise forwards it to the warehouse unchanged
//! - [`ReplacementScan`]: the implicit single-table path for unknown
//!   identifiers
//! - [`Engine`]: the caller-owned handle tying them together

mod engine;
mod locks;
mod oracle;
mod orchestrator;
mod replacement;
mod router;

pub mod telemetry;

pub use engine::{CacheStatus, Engine, Services};
pub use locks::RefreshLocks;
pub use oracle::{Staleness, StalenessOracle};
pub use orchestrator::RefreshOrchestrator;
pub use replacement::ReplacementScan;
pub use router::{MatchKind, QueryRouter, RoutedQuery, TableResolution};
pub use telemetry::{init_tracing, TelemetryConfig};
