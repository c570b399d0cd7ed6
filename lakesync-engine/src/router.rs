//! Query router: serve a query entirely from caches or forward it unchanged.
//!
//! Routing is all-or-nothing. A query is rewritten onto materialized tables
//! only when every table it reads resolves to a cache of the routed source
//! and every one of those caches is fresh (refreshing it first if needed).
//! Anything else goes to the warehouse verbatim.

use lakesync_core::{
    Cache, EngineConfig, EngineError, LakesyncResult, NotFoundError, QualifiedName,
    RefreshStatus, RouteStrategy, RowSet, Schema, Source,
};
use lakesync_sql::{extract_tables, rewrite_tables, SubstitutionMap};
use lakesync_storage::{CatalogStorage, HostEngine, MetadataStore, WarehouseConnector};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::orchestrator::RefreshOrchestrator;

/// How an extracted table was matched to a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Bare name equal to the cache name.
    CacheName,
    /// Name listed in the cache's monitored tables.
    MonitoredTable,
}

/// A referenced table resolved to a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableResolution {
    pub table: QualifiedName,
    pub cache: String,
    pub matched_by: MatchKind,
    pub physical: QualifiedName,
}

/// A routing decision, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedQuery {
    pub strategy: RouteStrategy,
    /// Query to run: rewritten for CACHE, the original text for PASSTHROUGH.
    pub sql: String,
    pub schema: Schema,
    pub source_name: String,
    /// Tables resolved to caches, in name order.
    pub tables: Vec<TableResolution>,
    /// Refresh run for each resolved cache before the decision.
    pub refreshes: Vec<(String, RefreshStatus)>,
    /// Why the query was not served from caches.
    pub fallback_reason: Option<String>,
}

pub struct QueryRouter {
    config: EngineConfig,
    metadata: Arc<dyn MetadataStore>,
    catalog: Arc<dyn CatalogStorage>,
    warehouse: Arc<dyn WarehouseConnector>,
    host: Arc<dyn HostEngine>,
    orchestrator: Arc<RefreshOrchestrator>,
}

impl QueryRouter {
    pub fn new(
        config: EngineConfig,
        metadata: Arc<dyn MetadataStore>,
        catalog: Arc<dyn CatalogStorage>,
        warehouse: Arc<dyn WarehouseConnector>,
        host: Arc<dyn HostEngine>,
        orchestrator: Arc<RefreshOrchestrator>,
    ) -> Self {
        Self {
            config,
            metadata,
            catalog,
            warehouse,
            host,
            orchestrator,
        }
    }

    pub async fn route(&self, sql: &str, source_name: &str) -> LakesyncResult<RoutedQuery> {
        let source = self
            .metadata
            .get_source(source_name)
            .await?
            .ok_or_else(|| NotFoundError::Source {
                name: source_name.to_string(),
            })?;

        let extraction = extract_tables(sql);
        let mut tables = Vec::with_capacity(extraction.tables.len());
        let mut unresolved = Vec::new();
        let mut caches: BTreeMap<String, Cache> = BTreeMap::new();
        for table in &extraction.tables {
            match self.resolve_table(table, &source).await? {
                Some((cache, matched_by)) => {
                    tables.push(TableResolution {
                        table: table.clone(),
                        cache: cache.name.clone(),
                        matched_by,
                        physical: self.catalog.physical_table_name(&cache.name, &source.name),
                    });
                    caches.insert(cache.name.clone(), cache);
                }
                None => unresolved.push(table.to_string()),
            }
        }

        let mut refreshes = Vec::with_capacity(caches.len());
        let mut failed = Vec::new();
        for name in caches.keys() {
            let status = self.orchestrator.refresh(name, false).await;
            if status.is_error() {
                tracing::warn!(cache = %name, message = %status.message, "refresh failed during routing");
                failed.push(name.clone());
            }
            refreshes.push((name.clone(), status));
        }

        let fallback_reason = if !extraction.parsed {
            Some("query could not be parsed".to_string())
        } else if !extraction.opaque.is_empty() {
            Some(format!(
                "relations outside the structural walk: {}",
                extraction.opaque.join(", ")
            ))
        } else if extraction.is_empty() {
            Some("query reads no tables".to_string())
        } else if !unresolved.is_empty() {
            Some(format!("not cached: {}", unresolved.join(", ")))
        } else if !failed.is_empty() {
            Some(format!("refresh failed: {}", failed.join(", ")))
        } else {
            None
        };

        let routed = match fallback_reason {
            None => {
                let map = tables.iter().fold(SubstitutionMap::new(), |map, t| {
                    map.with(&t.table, t.physical.clone())
                });
                let rewritten = rewrite_tables(sql, &map);
                let schema = self.host.prepare(&rewritten).await?;
                RoutedQuery {
                    strategy: RouteStrategy::Cache,
                    sql: rewritten,
                    schema,
                    source_name: source.name.clone(),
                    tables,
                    refreshes,
                    fallback_reason: None,
                }
            }
            Some(reason) => {
                if self.config.enforce_passthrough_flag && !source.passthrough_enabled {
                    return Err(EngineError::PassthroughDisabled {
                        source_name: source.name.clone(),
                    }
                    .into());
                }
                let schema = self.warehouse.describe(&source.credential, sql).await?;
                RoutedQuery {
                    strategy: RouteStrategy::Passthrough,
                    sql: sql.to_string(),
                    schema,
                    source_name: source.name.clone(),
                    tables,
                    refreshes,
                    fallback_reason: Some(reason),
                }
            }
        };

        tracing::info!(
            source = %routed.source_name,
            strategy = %routed.strategy,
            tables = extraction.tables.len(),
            cached = routed.tables.len(),
            reason = ?routed.fallback_reason,
            "query routed"
        );
        Ok(routed)
    }

    /// Route `sql`, then run the final query where the route points.
    pub async fn execute(&self, sql: &str, source_name: &str) -> LakesyncResult<(RoutedQuery, RowSet)> {
        let routed = self.route(sql, source_name).await?;
        let rows = match routed.strategy {
            RouteStrategy::Cache => self.host.execute(&routed.sql).await?,
            RouteStrategy::Passthrough => {
                let source = self
                    .metadata
                    .get_source(&routed.source_name)
                    .await?
                    .ok_or_else(|| NotFoundError::Source {
                        name: routed.source_name.clone(),
                    })?;
                self.warehouse.run_query(&source.credential, &routed.sql).await?
            }
        };
        Ok((routed, rows))
    }

    /// Cache name first (bare references only, case-insensitive), then
    /// monitored-table alias. Caches owned by another source do not count.
    async fn resolve_table(
        &self,
        table: &QualifiedName,
        source: &Source,
    ) -> LakesyncResult<Option<(Cache, MatchKind)>> {
        if table.is_bare() {
            if let Some(cache) = self.metadata.find_cache(&table.table).await? {
                if cache.source_name == source.name {
                    return Ok(Some((cache, MatchKind::CacheName)));
                }
            }
        }
        let by_alias = self
            .metadata
            .get_cache_by_monitored_table(&source.name, &table.to_string())
            .await?;
        Ok(by_alias.map(|cache| (cache, MatchKind::MonitoredTable)))
    }
}
