//! Refresh orchestrator: staleness check, materialization, state update.

use chrono::Utc;
use lakesync_core::{
    Cache, CacheState, LakesyncError, LakesyncResult, NotFoundError, RefreshStatus, Source,
    StorageError,
};
use lakesync_storage::{CatalogStorage, MetadataStore, WarehouseConnector};
use std::sync::Arc;
use std::time::Instant;

use crate::locks::RefreshLocks;
use crate::oracle::StalenessOracle;

pub struct RefreshOrchestrator {
    metadata: Arc<dyn MetadataStore>,
    catalog: Arc<dyn CatalogStorage>,
    warehouse: Arc<dyn WarehouseConnector>,
    oracle: StalenessOracle,
    locks: Arc<RefreshLocks>,
}

impl RefreshOrchestrator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        catalog: Arc<dyn CatalogStorage>,
        warehouse: Arc<dyn WarehouseConnector>,
        locks: Arc<RefreshLocks>,
    ) -> Self {
        Self {
            metadata,
            catalog,
            oracle: StalenessOracle::new(Arc::clone(&warehouse)),
            warehouse,
            locks,
        }
    }

    pub fn oracle(&self) -> &StalenessOracle {
        &self.oracle
    }

    /// Refresh `cache_name` if stale (or always, with `force`).
    ///
    /// Never fails: every error becomes an ERROR status. State written before
    /// a failure is not rolled back, so a failed refresh can leave the table
    /// newer than its recorded state.
    pub async fn refresh(&self, cache_name: &str, force: bool) -> RefreshStatus {
        match self.try_refresh(cache_name, force).await {
            Ok(status) => status,
            Err(LakesyncError::NotFound(e)) => {
                tracing::warn!(cache = %cache_name, error = %e, "refresh of unknown cache");
                RefreshStatus::error(e.to_string())
            }
            Err(e) => {
                tracing::error!(cache = %cache_name, error = %e, "refresh failed");
                RefreshStatus::error(format!("Refresh failed: {}", e))
            }
        }
    }

    pub async fn try_refresh(&self, cache_name: &str, force: bool) -> LakesyncResult<RefreshStatus> {
        let started = Instant::now();
        let (cache, source) = self.resolve(cache_name).await?;

        // Held until the new state is written, so a waiter re-checks
        // against it.
        let _guard = self.locks.acquire(&cache.name).await;

        let state = self.metadata.get_state(&cache.name).await?;
        let decision = self
            .oracle
            .assess(&source, &cache, state.as_ref(), force, Utc::now())
            .await?;
        if !decision.needs_refresh() {
            tracing::debug!(cache = %cache.name, "cache is fresh");
            return Ok(RefreshStatus::skipped("Cache is fresh, no refresh needed"));
        }

        tracing::info!(cache = %cache.name, reason = %decision, "refreshing cache");
        let rows = self.materialize(&cache, &source).await?;

        let fingerprint = self.oracle.probe(&source, &cache).await?;
        let stored = self
            .metadata
            .update_state(&CacheState::refreshed(&cache, Utc::now(), fingerprint))
            .await?;

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            cache = %cache.name,
            rows,
            duration_ms,
            refresh_count = stored.refresh_count,
            "cache refreshed"
        );
        Ok(RefreshStatus::refreshed(rows, duration_ms))
    }

    async fn resolve(&self, cache_name: &str) -> LakesyncResult<(Cache, Source)> {
        let cache = self
            .metadata
            .get_cache(cache_name)
            .await?
            .ok_or_else(|| NotFoundError::Cache {
                name: cache_name.to_string(),
            })?;
        let source = self
            .metadata
            .get_source(&cache.source_name)
            .await?
            .ok_or_else(|| NotFoundError::Source {
                name: cache.source_name.clone(),
            })?;
        Ok((cache, source))
    }

    /// Run the defining query once and replace the physical table.
    async fn materialize(&self, cache: &Cache, source: &Source) -> LakesyncResult<u64> {
        if !self.catalog.is_attached() {
            return Err(StorageError::NotAttached.into());
        }
        let rows = self.warehouse.run_query(&source.credential, &cache.query).await?;
        let table = self.catalog.physical_table_name(&cache.name, &source.name);
        self.catalog.materialize(&table, &rows).await
    }
}
