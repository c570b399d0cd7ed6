//! In-memory lakehouse: catalog storage and host engine in one.
//!
//! Tables live in a map keyed by their normalized three-part name. The host
//! side binds queries through `lakesync-sql` extraction, so it only resolves
//! plain table scans over materialized tables; that is all the router ever
//! hands it.

use async_trait::async_trait;
use lakesync_core::{
    LakesyncResult, ParseError, QualifiedName, RowSet, Schema, StorageError, StorageSettings,
};
use lakesync_sql::{extract_tables, parse_query};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::{CatalogStorage, HostEngine};

#[derive(Debug)]
pub struct InMemoryLakehouse {
    catalog: String,
    attached: AtomicBool,
    settings: RwLock<Option<StorageSettings>>,
    schemas: RwLock<BTreeSet<String>>,
    tables: RwLock<BTreeMap<String, RowSet>>,
    prepares: AtomicU64,
    executions: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryLakehouse {
    pub fn new(catalog: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            attached: AtomicBool::new(false),
            settings: RwLock::new(None),
            schemas: RwLock::new(BTreeSet::new()),
            tables: RwLock::new(BTreeMap::new()),
            prepares: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Settings passed to the last successful `attach`.
    pub async fn settings(&self) -> Option<StorageSettings> {
        self.settings.read().await.clone()
    }

    /// Current contents of a materialized table.
    pub async fn table_rows(&self, table: &QualifiedName) -> Option<RowSet> {
        self.tables.read().await.get(&table.normalized()).cloned()
    }

    /// True once a table has been materialized under `catalog.schema`.
    pub async fn has_schema(&self, catalog: &str, schema: &str) -> bool {
        let key = format!("{}.{}", catalog, schema).to_uppercase();
        self.schemas.read().await.contains(&key)
    }

    pub async fn table_count(&self) -> usize {
        self.tables.read().await.len()
    }

    pub fn prepare_count(&self) -> u64 {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Number of completed `materialize` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_attached(&self) -> Result<(), StorageError> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(StorageError::NotAttached)
        }
    }

    /// Schema key (`CATALOG.SCHEMA`) of a table in this catalog.
    fn schema_key(&self, table: &QualifiedName) -> Result<String, StorageError> {
        match (&table.catalog, &table.schema) {
            (Some(catalog), Some(schema)) if catalog.eq_ignore_ascii_case(&self.catalog) => {
                Ok(format!("{}.{}", catalog, schema).to_uppercase())
            }
            _ => Err(StorageError::MaterializeFailed {
                table: table.to_string(),
                reason: format!("not a table of catalog '{}'", self.catalog),
            }),
        }
    }

    /// Bind every table `sql` reads, in name order.
    async fn bind(&self, sql: &str) -> LakesyncResult<Vec<(QualifiedName, RowSet)>> {
        self.ensure_attached()?;
        parse_query(sql)?;
        let extraction = extract_tables(sql);
        if !extraction.is_fully_structured() {
            return Err(ParseError::UnsupportedStatement {
                kind: format!("relation(s) {}", extraction.opaque.join(", ")),
            }
            .into());
        }

        let tables = self.tables.read().await;
        let mut bound = Vec::with_capacity(extraction.tables.len());
        for table in extraction.tables {
            let rows = tables
                .get(&table.normalized())
                .cloned()
                .ok_or_else(|| StorageError::UnknownTable {
                    table: table.to_string(),
                })?;
            bound.push((table, rows));
        }
        Ok(bound)
    }
}

#[async_trait]
impl CatalogStorage for InMemoryLakehouse {
    async fn attach(&self, settings: &StorageSettings) -> LakesyncResult<()> {
        settings.validate()?;
        let mut current = self.settings.write().await;
        if self.attached.load(Ordering::SeqCst) {
            tracing::debug!(catalog = %self.catalog, "catalog already attached");
            return Ok(());
        }
        *current = Some(settings.clone());
        self.attached.store(true, Ordering::SeqCst);
        tracing::info!(
            catalog = %self.catalog,
            data_path = %settings.data_path,
            "lakehouse catalog attached"
        );
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    fn catalog_name(&self) -> &str {
        &self.catalog
    }

    async fn table_exists(&self, table: &QualifiedName) -> LakesyncResult<bool> {
        self.ensure_attached()?;
        Ok(self.tables.read().await.contains_key(&table.normalized()))
    }

    async fn materialize(&self, table: &QualifiedName, rows: &RowSet) -> LakesyncResult<u64> {
        self.ensure_attached()?;
        let schema_key = self.schema_key(table)?;

        self.schemas.write().await.insert(schema_key);
        self.tables
            .write()
            .await
            .insert(table.normalized(), rows.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(table = %table, rows = rows.row_count(), "table replaced");
        Ok(rows.row_count())
    }

    async fn drop_table(&self, table: &QualifiedName) -> LakesyncResult<bool> {
        self.ensure_attached()?;
        Ok(self.tables.write().await.remove(&table.normalized()).is_some())
    }
}

#[async_trait]
impl HostEngine for InMemoryLakehouse {
    async fn prepare(&self, sql: &str) -> LakesyncResult<Schema> {
        let bound = self.bind(sql).await?;
        self.prepares.fetch_add(1, Ordering::SeqCst);
        let mut schema = Schema::default();
        for (_, rows) in &bound {
            schema.extend(&rows.schema);
        }
        Ok(schema)
    }

    async fn execute(&self, sql: &str) -> LakesyncResult<RowSet> {
        let mut bound = self.bind(sql).await?;
        if bound.len() != 1 {
            return Err(StorageError::CatalogFailed {
                reason: format!(
                    "in-memory host executes single-table scans only, query reads {} tables",
                    bound.len()
                ),
            }
            .into());
        }
        self.executions.fetch_add(1, Ordering::SeqCst);
        let (_, rows) = bound.remove(0);
        Ok(rows)
    }
}
