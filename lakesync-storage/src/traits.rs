//! Collaborator contracts.
//!
//! The engine talks to the outside world only through these four traits,
//! held as `Arc<dyn _>`. Implementations must be safe to share across tasks.

use async_trait::async_trait;
use lakesync_core::{
    Cache, CacheState, LakesyncResult, QualifiedName, RowSet, Schema, Source, StorageSettings,
};
use std::collections::BTreeMap;

/// Persisted definitions of sources and caches plus per-cache refresh state.
///
/// Every operation except `initialize` fails with
/// `EngineError::NotInitialized` until `initialize` has succeeded.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the metadata tables inside `catalog.schema`. Idempotent.
    async fn initialize(&self, catalog: &str, schema: &str) -> LakesyncResult<()>;

    async fn is_initialized(&self) -> bool;

    /// Insert a source, replacing any source with the same name.
    async fn create_source(&self, source: &Source) -> LakesyncResult<()>;

    async fn get_source(&self, name: &str) -> LakesyncResult<Option<Source>>;

    /// All sources ordered by name.
    async fn list_sources(&self) -> LakesyncResult<Vec<Source>>;

    /// Returns whether a source was removed.
    async fn delete_source(&self, name: &str) -> LakesyncResult<bool>;

    /// Insert a cache, replacing any cache with the same name.
    async fn create_cache(&self, cache: &Cache) -> LakesyncResult<()>;

    async fn get_cache(&self, name: &str) -> LakesyncResult<Option<Cache>>;

    /// Cache named `name`, falling back to a case-insensitive match when no
    /// cache has that exact name.
    async fn find_cache(&self, name: &str) -> LakesyncResult<Option<Cache>> {
        if let Some(cache) = self.get_cache(name).await? {
            return Ok(Some(cache));
        }
        Ok(self
            .list_caches()
            .await?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// First cache of `source_name`, in name order, that monitors `table`
    /// (case-insensitive).
    async fn get_cache_by_monitored_table(
        &self,
        source_name: &str,
        table: &str,
    ) -> LakesyncResult<Option<Cache>>;

    /// All caches ordered by name.
    async fn list_caches(&self) -> LakesyncResult<Vec<Cache>>;

    /// Remove a cache and its state. Returns whether a cache was removed.
    async fn delete_cache(&self, name: &str) -> LakesyncResult<bool>;

    /// Create a zeroed state for `cache_name`. No-op if one exists.
    async fn initialize_state(&self, cache_name: &str) -> LakesyncResult<()>;

    /// Replace the state wholesale, setting `refresh_count` to the previous
    /// count plus one. Returns the state as stored.
    async fn update_state(&self, state: &CacheState) -> LakesyncResult<CacheState>;

    async fn get_state(&self, cache_name: &str) -> LakesyncResult<Option<CacheState>>;
}

/// The lakehouse catalog holding materialized cache tables.
#[async_trait]
pub trait CatalogStorage: Send + Sync {
    /// Attach the catalog described by `settings`. Idempotent.
    async fn attach(&self, settings: &StorageSettings) -> LakesyncResult<()>;

    fn is_attached(&self) -> bool;

    /// Name the catalog is attached under.
    fn catalog_name(&self) -> &str;

    /// Physical location of a cache: `catalog.source.cache`.
    fn physical_table_name(&self, cache_name: &str, source_name: &str) -> QualifiedName {
        QualifiedName::three_part(self.catalog_name(), source_name, cache_name)
    }

    async fn table_exists(&self, table: &QualifiedName) -> LakesyncResult<bool>;

    /// Create the schema if missing, then create-or-replace `table` with
    /// `rows`. Returns the number of rows written.
    async fn materialize(&self, table: &QualifiedName, rows: &RowSet) -> LakesyncResult<u64>;

    /// Drop `table` if it exists. Returns whether a table was dropped.
    async fn drop_table(&self, table: &QualifiedName) -> LakesyncResult<bool>;
}

/// Black-box connection to the remote warehouse.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Run `sql` with the given credential and return every row.
    async fn run_query(&self, credential: &str, sql: &str) -> LakesyncResult<RowSet>;

    /// Last-modified markers for `tables`, keyed by the names as given.
    /// Tables the warehouse does not know are omitted.
    async fn probe_last_modified(
        &self,
        credential: &str,
        tables: &[String],
    ) -> LakesyncResult<BTreeMap<String, String>>;

    /// Result schema of `sql` without running it.
    async fn describe(&self, credential: &str, sql: &str) -> LakesyncResult<Schema>;
}

/// The local engine that executes rewritten queries.
#[async_trait]
pub trait HostEngine: Send + Sync {
    /// Bind `sql` and return its result schema without executing it.
    async fn prepare(&self, sql: &str) -> LakesyncResult<Schema>;

    async fn execute(&self, sql: &str) -> LakesyncResult<RowSet>;
}
