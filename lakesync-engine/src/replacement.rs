//! Replacement scan: resolve an unknown bare identifier to a cache table.
//!
//! Only the stored state is consulted. A cache that was refreshed and has not
//! outlived its TTL is served as-is, without probing the warehouse; routing
//! through [`crate::QueryRouter`] probes on every call instead.

use chrono::Utc;
use lakesync_core::{EngineError, LakesyncResult, QualifiedName};
use lakesync_storage::{CatalogStorage, MetadataStore};
use std::sync::Arc;

use crate::orchestrator::RefreshOrchestrator;

pub struct ReplacementScan {
    metadata: Arc<dyn MetadataStore>,
    catalog: Arc<dyn CatalogStorage>,
    orchestrator: Arc<RefreshOrchestrator>,
}

impl ReplacementScan {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        catalog: Arc<dyn CatalogStorage>,
        orchestrator: Arc<RefreshOrchestrator>,
    ) -> Self {
        Self {
            metadata,
            catalog,
            orchestrator,
        }
    }

    /// Physical table for `identifier`, or `None` if it names no cache.
    ///
    /// An invalid cache is refreshed first; a failed refresh is an error
    /// since the host has already committed to this resolution.
    pub async fn resolve(&self, identifier: &str) -> LakesyncResult<Option<QualifiedName>> {
        let Some(cache) = self.metadata.find_cache(identifier).await? else {
            return Ok(None);
        };

        let state = self.metadata.get_state(&cache.name).await?;
        let valid = state
            .as_ref()
            .is_some_and(|s| s.is_valid_at(&cache, Utc::now()));
        if !valid {
            let status = self.orchestrator.refresh(&cache.name, false).await;
            if status.is_error() {
                return Err(EngineError::RefreshFailed {
                    cache: cache.name.clone(),
                    message: status.message,
                }
                .into());
            }
            tracing::debug!(cache = %cache.name, outcome = %status.outcome, "cache refreshed for scan");
        }

        Ok(Some(
            self.catalog.physical_table_name(&cache.name, &cache.source_name),
        ))
    }
}
