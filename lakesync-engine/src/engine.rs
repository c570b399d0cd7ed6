//! The engine handle.
//!
//! All session state lives here and is owned by the caller. The handle starts
//! `Uninitialized`; [`Engine::setup_storage`] attaches the lakehouse catalog,
//! creates the metadata tables and moves it to `Initialized`. Every other
//! operation fails with `EngineError::NotInitialized` before that, except
//! [`Engine::replacement_scan`], which declines.

use chrono::Utc;
use lakesync_core::{
    Cache, CacheSpec, CacheState, ConfigError, DriverKind, EngineConfig, EngineError,
    LakesyncError, LakesyncResult, NotFoundError, QualifiedName, RefreshStatus, RowSet, Source,
    StorageSettings, ValidationError,
};
use lakesync_storage::{CatalogStorage, HostEngine, MetadataStore, WarehouseConnector};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::locks::RefreshLocks;
use crate::orchestrator::RefreshOrchestrator;
use crate::replacement::ReplacementScan;
use crate::router::{QueryRouter, RoutedQuery};

/// Collaborators injected into an [`Engine`].
#[derive(Clone)]
pub struct Services {
    pub metadata: Arc<dyn MetadataStore>,
    pub catalog: Arc<dyn CatalogStorage>,
    pub warehouse: Arc<dyn WarehouseConnector>,
    pub host: Arc<dyn HostEngine>,
}

/// Cache definition with its refresh state and current validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub cache: Cache,
    pub state: Option<CacheState>,
    pub physical_table: QualifiedName,
    /// Refreshed at least once and not TTL-expired.
    pub valid: bool,
}

struct Components {
    locks: Arc<RefreshLocks>,
    orchestrator: Arc<RefreshOrchestrator>,
    router: QueryRouter,
    replacement: ReplacementScan,
}

enum EngineState {
    Uninitialized,
    Initialized(Arc<Components>),
}

pub struct Engine {
    config: EngineConfig,
    services: Services,
    state: RwLock<EngineState>,
}

impl Engine {
    pub fn new(config: EngineConfig, services: Services) -> LakesyncResult<Self> {
        config.validate()?;
        if !services
            .catalog
            .catalog_name()
            .eq_ignore_ascii_case(&config.catalog_name)
        {
            return Err(ConfigError::InvalidValue {
                field: "catalog_name".to_string(),
                value: config.catalog_name.clone(),
                reason: format!(
                    "catalog storage is attached as '{}'",
                    services.catalog.catalog_name()
                ),
            }
            .into());
        }
        Ok(Self {
            config,
            services,
            state: RwLock::new(EngineState::Uninitialized),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn is_initialized(&self) -> bool {
        matches!(*self.state.read().await, EngineState::Initialized(_))
    }

    async fn components(&self) -> LakesyncResult<Arc<Components>> {
        match &*self.state.read().await {
            EngineState::Initialized(components) => Ok(Arc::clone(components)),
            EngineState::Uninitialized => Err(EngineError::NotInitialized.into()),
        }
    }

    fn build_components(&self) -> Components {
        let Services {
            metadata,
            catalog,
            warehouse,
            host,
        } = self.services.clone();
        let locks = Arc::new(RefreshLocks::new(self.config.refresh_guard));
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            Arc::clone(&metadata),
            Arc::clone(&catalog),
            Arc::clone(&warehouse),
            Arc::clone(&locks),
        ));
        let router = QueryRouter::new(
            self.config.clone(),
            Arc::clone(&metadata),
            Arc::clone(&catalog),
            warehouse,
            host,
            Arc::clone(&orchestrator),
        );
        let replacement = ReplacementScan::new(metadata, catalog, Arc::clone(&orchestrator));
        Components {
            locks,
            orchestrator,
            router,
            replacement,
        }
    }

    // ========================================================================
    // SETUP
    // ========================================================================

    /// Attach the lakehouse and create the metadata tables. Idempotent.
    #[tracing::instrument(skip(self, settings))]
    pub async fn setup_storage(&self, settings: &StorageSettings) -> LakesyncResult<()> {
        let mut state = self.state.write().await;
        if matches!(*state, EngineState::Initialized(_)) {
            tracing::debug!("storage already set up");
            return Ok(());
        }

        self.services.catalog.attach(settings).await?;
        self.services
            .metadata
            .initialize(&self.config.catalog_name, &self.config.metadata_schema)
            .await?;

        *state = EngineState::Initialized(Arc::new(self.build_components()));
        tracing::info!(
            catalog = %self.config.catalog_name,
            metadata_schema = %self.config.metadata_schema,
            "lakesync storage ready"
        );
        Ok(())
    }

    // ========================================================================
    // SOURCES
    // ========================================================================

    /// Register a source, replacing one with the same name.
    #[tracing::instrument(skip(self, credential))]
    pub async fn add_source(
        &self,
        name: &str,
        driver: &str,
        credential: &str,
        passthrough_enabled: bool,
    ) -> LakesyncResult<Source> {
        self.components().await?;
        let driver: DriverKind = driver.parse()?;
        let source = Source::new(name, driver, credential, passthrough_enabled)?;
        self.services.metadata.create_source(&source).await?;
        tracing::info!(source = %source.name, driver = %source.driver, "source added");
        Ok(source)
    }

    pub async fn list_sources(&self) -> LakesyncResult<Vec<Source>> {
        self.components().await?;
        self.services.metadata.list_sources().await
    }

    /// Remove a source. Rejected while any cache still belongs to it.
    #[tracing::instrument(skip(self))]
    pub async fn drop_source(&self, name: &str) -> LakesyncResult<()> {
        self.components().await?;
        let metadata = &self.services.metadata;
        if metadata.get_source(name).await?.is_none() {
            return Err(NotFoundError::Source {
                name: name.to_string(),
            }
            .into());
        }

        let dependents: Vec<String> = metadata
            .list_caches()
            .await?
            .into_iter()
            .filter(|c| c.source_name == name)
            .map(|c| c.name)
            .collect();
        if !dependents.is_empty() {
            return Err(ValidationError::ConstraintViolation {
                constraint: "cache_source".to_string(),
                reason: format!(
                    "source '{}' is used by caches: {}",
                    name,
                    dependents.join(", ")
                ),
            }
            .into());
        }

        metadata.delete_source(name).await?;
        tracing::info!(source = %name, "source dropped");
        Ok(())
    }

    // ========================================================================
    // CACHES
    // ========================================================================

    /// Register a cache with a zeroed state.
    ///
    /// Redefining an existing cache resets its state, so the next access
    /// refreshes it.
    #[tracing::instrument(skip(self, spec), fields(cache = %spec.name))]
    pub async fn create_cache(&self, spec: CacheSpec) -> LakesyncResult<Cache> {
        self.components().await?;
        let cache = spec.into_cache()?;
        let metadata = &self.services.metadata;
        if metadata.get_source(&cache.source_name).await?.is_none() {
            return Err(NotFoundError::Source {
                name: cache.source_name.clone(),
            }
            .into());
        }

        if metadata.delete_cache(&cache.name).await? {
            tracing::debug!(cache = %cache.name, "replacing cache definition");
        }
        metadata.create_cache(&cache).await?;
        metadata.initialize_state(&cache.name).await?;
        tracing::info!(
            cache = %cache.name,
            source = %cache.source_name,
            monitored = cache.monitored_tables.len(),
            ttl_seconds = ?cache.ttl_seconds(),
            "cache created"
        );
        Ok(cache)
    }

    pub async fn list_caches(&self) -> LakesyncResult<Vec<Cache>> {
        self.components().await?;
        self.services.metadata.list_caches().await
    }

    /// Remove a cache, its state and its materialized table.
    #[tracing::instrument(skip(self))]
    pub async fn drop_cache(&self, name: &str) -> LakesyncResult<()> {
        let components = self.components().await?;
        let cache = self
            .services
            .metadata
            .get_cache(name)
            .await?
            .ok_or_else(|| NotFoundError::Cache {
                name: name.to_string(),
            })?;

        let table = self
            .services
            .catalog
            .physical_table_name(&cache.name, &cache.source_name);
        let dropped = self.services.catalog.drop_table(&table).await?;
        self.services.metadata.delete_cache(&cache.name).await?;
        components.locks.forget(&cache.name);
        tracing::info!(cache = %cache.name, table = %table, dropped, "cache dropped");
        Ok(())
    }

    pub async fn cache_status(&self, name: &str) -> LakesyncResult<CacheStatus> {
        self.components().await?;
        let metadata = &self.services.metadata;
        let cache = metadata
            .get_cache(name)
            .await?
            .ok_or_else(|| NotFoundError::Cache {
                name: name.to_string(),
            })?;
        let state = metadata.get_state(&cache.name).await?;
        let valid = state
            .as_ref()
            .is_some_and(|s| s.is_valid_at(&cache, Utc::now()));
        let physical_table = self
            .services
            .catalog
            .physical_table_name(&cache.name, &cache.source_name);
        Ok(CacheStatus {
            cache,
            state,
            physical_table,
            valid,
        })
    }

    // ========================================================================
    // REFRESH AND QUERY
    // ========================================================================

    /// Refresh a cache. Unknown caches and refresh failures are reported in
    /// the status; only an uninitialized engine is an error.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self, name: &str, force: bool) -> LakesyncResult<RefreshStatus> {
        let components = self.components().await?;
        Ok(components.orchestrator.refresh(name, force).await)
    }

    /// Decide where `sql` runs and prepare it, without executing.
    #[tracing::instrument(skip(self, sql))]
    pub async fn route(&self, sql: &str, source_name: &str) -> LakesyncResult<RoutedQuery> {
        let components = self.components().await?;
        components.router.route(sql, source_name).await
    }

    /// Route and execute `sql`.
    #[tracing::instrument(skip(self, sql))]
    pub async fn query(&self, sql: &str, source_name: &str) -> LakesyncResult<(RoutedQuery, RowSet)> {
        let components = self.components().await?;
        components.router.execute(sql, source_name).await
    }

    /// Resolve a bare identifier the host could not find. Declines with
    /// `Ok(None)` before setup or when no cache has that name.
    pub async fn replacement_scan(&self, identifier: &str) -> LakesyncResult<Option<QualifiedName>> {
        let components = match self.components().await {
            Ok(components) => components,
            Err(LakesyncError::Engine(EngineError::NotInitialized)) => return Ok(None),
            Err(e) => return Err(e),
        };
        components.replacement.resolve(identifier).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lakesync_core::RefreshOutcome;
    use lakesync_test_utils::fixtures::*;
    use lakesync_test_utils::{InMemoryLakehouse, InMemoryMetadataStore, ScriptedWarehouse};

    fn services(lakehouse: &Arc<InMemoryLakehouse>, warehouse: ScriptedWarehouse) -> Services {
        Services {
            metadata: Arc::new(InMemoryMetadataStore::new()),
            catalog: Arc::clone(lakehouse) as Arc<dyn CatalogStorage>,
            warehouse: Arc::new(warehouse),
            host: Arc::clone(lakehouse) as Arc<dyn HostEngine>,
        }
    }

    fn engine() -> Engine {
        let lakehouse = Arc::new(InMemoryLakehouse::new("lakesync"));
        Engine::new(EngineConfig::default(), services(&lakehouse, warehouse_with_orders(3, 2)))
            .unwrap()
    }

    async fn ready() -> Engine {
        let engine = engine();
        engine.setup_storage(&storage_settings()).await.unwrap();
        engine.add_source("snow", "snowflake", "snow_secret", true).await.unwrap();
        engine
    }

    #[test]
    fn test_new_rejects_catalog_mismatch() {
        let lakehouse = Arc::new(InMemoryLakehouse::new("other"));
        let result = Engine::new(EngineConfig::default(), services(&lakehouse, ScriptedWarehouse::new()));
        assert!(matches!(
            result,
            Err(LakesyncError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[tokio::test]
    async fn test_operations_before_setup() {
        let engine = engine();
        assert!(!engine.is_initialized().await);
        let not_initialized = LakesyncError::Engine(EngineError::NotInitialized);

        assert_eq!(engine.list_caches().await.unwrap_err(), not_initialized);
        assert_eq!(
            engine.add_source("snow", "snowflake", "s", true).await.unwrap_err(),
            not_initialized
        );
        assert_eq!(engine.refresh("orders_cache", false).await.unwrap_err(), not_initialized);
        assert_eq!(
            engine.route("SELECT 1", "snow").await.unwrap_err(),
            not_initialized
        );
        assert_eq!(engine.replacement_scan("orders_cache").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_setup_is_idempotent() {
        let engine = engine();
        engine.setup_storage(&storage_settings()).await.unwrap();
        engine.setup_storage(&storage_settings()).await.unwrap();
        assert!(engine.is_initialized().await);
    }

    #[tokio::test]
    async fn test_add_source_rejects_driver() {
        let engine = ready().await;
        let err = engine.add_source("pg", "postgres", "pg_secret", true).await.unwrap_err();
        assert!(err.to_string().contains("Only 'snowflake' is supported"));
        assert_eq!(engine.list_sources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_cache_requires_source() {
        let engine = ready().await;
        let err = engine
            .create_cache(orders_cache_spec("missing", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Source 'missing' not found");
        assert!(engine.list_caches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_cache_initializes_state() {
        let engine = ready().await;
        engine.create_cache(orders_cache_spec("snow", Some(60))).await.unwrap();
        let status = engine.cache_status("orders_cache").await.unwrap();
        assert!(!status.valid);
        assert_eq!(status.state, Some(CacheState::zeroed("orders_cache")));
        assert_eq!(status.physical_table.to_string(), "lakesync.snow.orders_cache");
    }

    #[tokio::test]
    async fn test_redefining_cache_resets_state() {
        let engine = ready().await;
        engine.create_cache(orders_cache_spec("snow", None)).await.unwrap();
        engine.refresh("orders_cache", false).await.unwrap();
        assert!(engine.cache_status("orders_cache").await.unwrap().valid);

        engine.create_cache(orders_cache_spec("snow", Some(10))).await.unwrap();
        let status = engine.cache_status("orders_cache").await.unwrap();
        assert!(!status.valid);
        assert_eq!(status.cache.ttl_seconds(), Some(10));
    }

    #[tokio::test]
    async fn test_drop_source_rejected_while_referenced() {
        let engine = ready().await;
        engine.create_cache(orders_cache_spec("snow", None)).await.unwrap();
        let err = engine.drop_source("snow").await.unwrap_err();
        assert!(matches!(
            err,
            LakesyncError::Validation(ValidationError::ConstraintViolation { .. })
        ));

        engine.drop_cache("orders_cache").await.unwrap();
        engine.drop_source("snow").await.unwrap();
        assert!(engine.list_sources().await.unwrap().is_empty());
        assert!(engine.drop_source("snow").await.is_err());
    }

    #[tokio::test]
    async fn test_drop_cache_removes_table() {
        let lakehouse = Arc::new(InMemoryLakehouse::new("lakesync"));
        let engine = Engine::new(
            EngineConfig::default(),
            services(&lakehouse, warehouse_with_orders(3, 0)),
        )
        .unwrap();
        engine.setup_storage(&storage_settings()).await.unwrap();
        engine.add_source("snow", "snowflake", "snow_secret", true).await.unwrap();
        engine.create_cache(orders_cache_spec("snow", None)).await.unwrap();
        engine.refresh("orders_cache", false).await.unwrap();
        assert_eq!(lakehouse.table_count().await, 1);

        engine.drop_cache("orders_cache").await.unwrap();
        assert_eq!(lakehouse.table_count().await, 0);
        assert!(engine.cache_status("orders_cache").await.is_err());
        assert!(engine.drop_cache("orders_cache").await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_unknown_cache_is_status() {
        let engine = ready().await;
        let status = engine.refresh("missing", false).await.unwrap();
        assert_eq!(status.outcome, RefreshOutcome::Error);
        assert_eq!(status.message, "Cache 'missing' not found");
    }
}
