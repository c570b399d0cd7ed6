//! In-memory metadata store.

use async_trait::async_trait;
use lakesync_core::{
    Cache, CacheState, EngineError, LakesyncResult, NotFoundError, Source,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::MetadataStore;

/// [`MetadataStore`] backed by ordered maps behind a tokio `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    inner: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    /// `catalog.schema` the store was initialized in.
    location: Option<String>,
    sources: BTreeMap<String, Source>,
    caches: BTreeMap<String, Cache>,
    states: BTreeMap<String, CacheState>,
}

impl Tables {
    fn check(&self) -> LakesyncResult<()> {
        if self.location.is_none() {
            return Err(EngineError::NotInitialized.into());
        }
        Ok(())
    }
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `catalog.schema` the metadata tables live in, once initialized.
    pub async fn location(&self) -> Option<String> {
        self.inner.read().await.location.clone()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn initialize(&self, catalog: &str, schema: &str) -> LakesyncResult<()> {
        let mut tables = self.inner.write().await;
        if tables.location.is_none() {
            let location = format!("{}.{}", catalog, schema);
            tracing::debug!(location = %location, "metadata tables created");
            tables.location = Some(location);
        }
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.inner.read().await.location.is_some()
    }

    async fn create_source(&self, source: &Source) -> LakesyncResult<()> {
        let mut tables = self.inner.write().await;
        tables.check()?;
        tables.sources.insert(source.name.clone(), source.clone());
        Ok(())
    }

    async fn get_source(&self, name: &str) -> LakesyncResult<Option<Source>> {
        let tables = self.inner.read().await;
        tables.check()?;
        Ok(tables.sources.get(name).cloned())
    }

    async fn list_sources(&self) -> LakesyncResult<Vec<Source>> {
        let tables = self.inner.read().await;
        tables.check()?;
        Ok(tables.sources.values().cloned().collect())
    }

    async fn delete_source(&self, name: &str) -> LakesyncResult<bool> {
        let mut tables = self.inner.write().await;
        tables.check()?;
        Ok(tables.sources.remove(name).is_some())
    }

    async fn create_cache(&self, cache: &Cache) -> LakesyncResult<()> {
        let mut tables = self.inner.write().await;
        tables.check()?;
        tables.caches.insert(cache.name.clone(), cache.clone());
        Ok(())
    }

    async fn get_cache(&self, name: &str) -> LakesyncResult<Option<Cache>> {
        let tables = self.inner.read().await;
        tables.check()?;
        Ok(tables.caches.get(name).cloned())
    }

    async fn get_cache_by_monitored_table(
        &self,
        source_name: &str,
        table: &str,
    ) -> LakesyncResult<Option<Cache>> {
        let tables = self.inner.read().await;
        tables.check()?;
        Ok(tables
            .caches
            .values()
            .find(|c| c.source_name == source_name && c.monitors(table))
            .cloned())
    }

    async fn list_caches(&self) -> LakesyncResult<Vec<Cache>> {
        let tables = self.inner.read().await;
        tables.check()?;
        Ok(tables.caches.values().cloned().collect())
    }

    async fn delete_cache(&self, name: &str) -> LakesyncResult<bool> {
        let mut tables = self.inner.write().await;
        tables.check()?;
        tables.states.remove(name);
        Ok(tables.caches.remove(name).is_some())
    }

    async fn initialize_state(&self, cache_name: &str) -> LakesyncResult<()> {
        let mut tables = self.inner.write().await;
        tables.check()?;
        tables
            .states
            .entry(cache_name.to_string())
            .or_insert_with(|| CacheState::zeroed(cache_name));
        Ok(())
    }

    async fn update_state(&self, state: &CacheState) -> LakesyncResult<CacheState> {
        let mut tables = self.inner.write().await;
        tables.check()?;
        if !tables.caches.contains_key(&state.cache_name) {
            return Err(NotFoundError::Cache {
                name: state.cache_name.clone(),
            }
            .into());
        }
        let previous = tables
            .states
            .get(&state.cache_name)
            .map_or(0, |s| s.refresh_count);
        let stored = CacheState {
            refresh_count: previous + 1,
            ..state.clone()
        };
        tables
            .states
            .insert(stored.cache_name.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_state(&self, cache_name: &str) -> LakesyncResult<Option<CacheState>> {
        let tables = self.inner.read().await;
        tables.check()?;
        Ok(tables.states.get(cache_name).cloned())
    }
}
