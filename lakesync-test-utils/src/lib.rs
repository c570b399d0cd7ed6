//! lakesync Test Utilities
//!
//! Centralized test infrastructure for the lakesync workspace:
//! - Proptest generators for names, probe maps, caches and states
//! - A scripted warehouse connector with change markers and failure injection
//! - Test fixtures for common scenarios
//! - Assertions over refresh statuses

// Re-export in-memory collaborators from their source crate
pub use lakesync_storage::{InMemoryLakehouse, InMemoryMetadataStore};

// Re-export core types for convenience
pub use lakesync_core::{
    Cache, CacheSpec, CacheState, Column, DriverKind, Fingerprint, LakesyncError,
    LakesyncResult, QualifiedName, RefreshOutcome, RefreshStatus, RemoteError, RowSet, Schema,
    Source, StorageSettings, Timestamp,
};

use async_trait::async_trait;
use lakesync_sql::extract_tables;
use lakesync_storage::WarehouseConnector;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ============================================================================
// SCRIPTED WAREHOUSE
// ============================================================================

/// In-memory stand-in for a remote warehouse.
///
/// Tables are registered by name and matched on their last name part,
/// case-insensitively, the way the metadata probe matches them. Every data
/// change bumps the table's last-altered marker.
#[derive(Debug, Default)]
pub struct ScriptedWarehouse {
    script: Mutex<WarehouseScript>,
}

#[derive(Debug, Default)]
struct WarehouseScript {
    tables: BTreeMap<String, RemoteTable>,
    responses: BTreeMap<String, RowSet>,
    query_log: Vec<String>,
    credentials: Vec<String>,
    probes: u64,
    describes: u64,
    fail_queries: Option<String>,
    fail_probes: Option<String>,
    probe_latency: Option<Duration>,
}

#[derive(Debug, Clone)]
struct RemoteTable {
    rows: RowSet,
    version: u64,
}

impl RemoteTable {
    fn marker(&self) -> String {
        format!("2024-01-01 00:00:00.{:06}", self.version)
    }
}

fn table_key(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).trim().to_uppercase()
}

fn sql_key(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

impl ScriptedWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, WarehouseScript> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or replace) a table with its rows.
    pub fn add_table(&self, name: &str, rows: RowSet) {
        let mut script = self.script();
        let version = script
            .tables
            .get(&table_key(name))
            .map_or(1, |t| t.version + 1);
        script
            .tables
            .insert(table_key(name), RemoteTable { rows, version });
    }

    /// Replace a table's rows, bumping its change marker.
    pub fn set_rows(&self, name: &str, rows: RowSet) {
        self.add_table(name, rows);
    }

    /// Bump a table's change marker without changing its rows.
    pub fn touch(&self, name: &str) {
        if let Some(table) = self.script().tables.get_mut(&table_key(name)) {
            table.version += 1;
        }
    }

    /// Current change marker of a table.
    pub fn marker(&self, name: &str) -> Option<String> {
        self.script().tables.get(&table_key(name)).map(RemoteTable::marker)
    }

    /// Answer `sql` (whitespace and case-insensitive) with `rows`.
    pub fn respond_to(&self, sql: &str, rows: RowSet) {
        self.script().responses.insert(sql_key(sql), rows);
    }

    /// Make every query fail with `reason` until cleared with `None`.
    pub fn fail_queries(&self, reason: Option<&str>) {
        self.script().fail_queries = reason.map(str::to_string);
    }

    /// Make every metadata probe fail with `reason` until cleared with `None`.
    pub fn fail_probes(&self, reason: Option<&str>) {
        self.script().fail_probes = reason.map(str::to_string);
    }

    /// Delay every metadata probe by `latency` until cleared with `None`.
    pub fn delay_probes(&self, latency: Option<Duration>) {
        self.script().probe_latency = latency;
    }

    /// Every query run, in order.
    pub fn query_log(&self) -> Vec<String> {
        self.script().query_log.clone()
    }

    pub fn query_count(&self) -> usize {
        self.script().query_log.len()
    }

    /// Credentials used by queries, probes and describes, in order.
    pub fn credentials_used(&self) -> Vec<String> {
        self.script().credentials.clone()
    }

    pub fn probe_count(&self) -> u64 {
        self.script().probes
    }

    pub fn describe_count(&self) -> u64 {
        self.script().describes
    }

    fn answer(script: &WarehouseScript, sql: &str) -> LakesyncResult<RowSet> {
        if let Some(rows) = script.responses.get(&sql_key(sql)) {
            return Ok(rows.clone());
        }
        let extraction = extract_tables(sql);
        if !extraction.parsed {
            return Err(RemoteError::QueryFailed {
                reason: format!("SQL compilation error: {}", sql),
            }
            .into());
        }

        let mut result = RowSet::default();
        for table in &extraction.tables {
            let remote = script.tables.get(&table_key(&table.table)).ok_or_else(|| {
                RemoteError::QueryFailed {
                    reason: format!("Object '{}' does not exist or not authorized.", table),
                }
            })?;
            result.schema.extend(&remote.rows.schema);
            if extraction.tables.len() == 1 {
                result.rows = remote.rows.rows.clone();
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl WarehouseConnector for ScriptedWarehouse {
    async fn run_query(&self, credential: &str, sql: &str) -> LakesyncResult<RowSet> {
        let mut script = self.script();
        script.credentials.push(credential.to_string());
        script.query_log.push(sql.to_string());
        if let Some(reason) = &script.fail_queries {
            return Err(RemoteError::QueryFailed {
                reason: reason.clone(),
            }
            .into());
        }
        Self::answer(&script, sql)
    }

    async fn probe_last_modified(
        &self,
        credential: &str,
        tables: &[String],
    ) -> LakesyncResult<BTreeMap<String, String>> {
        let latency = self.script().probe_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut script = self.script();
        script.credentials.push(credential.to_string());
        script.probes += 1;
        if let Some(reason) = &script.fail_probes {
            return Err(RemoteError::ProbeFailed {
                reason: reason.clone(),
            }
            .into());
        }
        Ok(tables
            .iter()
            .filter_map(|name| {
                script
                    .tables
                    .get(&table_key(name))
                    .map(|t| (name.clone(), t.marker()))
            })
            .collect())
    }

    async fn describe(&self, credential: &str, sql: &str) -> LakesyncResult<Schema> {
        let mut script = self.script();
        script.credentials.push(credential.to_string());
        script.describes += 1;
        if let Some(reason) = &script.fail_queries {
            return Err(RemoteError::QueryFailed {
                reason: reason.clone(),
            }
            .into());
        }
        Self::answer(&script, sql).map(|rows| rows.schema)
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating lakesync types.

    use super::*;
    use proptest::prelude::*;

    /// Plain identifier that is never an SQL keyword.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,10}".prop_map(|s| format!("t_{}", s))
    }

    /// One- to three-part table name.
    pub fn arb_qualified_name() -> impl Strategy<Value = QualifiedName> {
        prop::collection::vec(arb_identifier(), 1..=3)
            .prop_map(|parts| QualifiedName::from_parts(&parts).unwrap_or_else(|| QualifiedName::bare("t_x")))
    }

    /// Probe result: table name to change marker.
    pub fn arb_probe_map() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map(
            arb_qualified_name().prop_map(|n| n.normalized()),
            "[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}",
            0..6,
        )
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// Optional TTL in seconds, up to a week.
    pub fn arb_ttl_seconds() -> impl Strategy<Value = Option<u64>> {
        prop::option::of(1u64..604_800)
    }

    pub fn arb_cache_spec(source_name: &str) -> impl Strategy<Value = CacheSpec> {
        let source_name = source_name.to_string();
        (
            arb_identifier(),
            arb_identifier(),
            prop::collection::vec(arb_qualified_name(), 0..4),
            arb_ttl_seconds(),
        )
            .prop_map(move |(name, table, monitored, ttl)| CacheSpec {
                name,
                source_name: source_name.clone(),
                query: format!("SELECT * FROM {}", table),
                monitored_tables: monitored.iter().map(|m| m.to_string()).collect(),
                ttl_seconds: ttl,
            })
    }

    /// State of `cache`: never refreshed, or refreshed at an arbitrary time.
    pub fn arb_cache_state(cache: Cache) -> impl Strategy<Value = CacheState> {
        prop::option::of((arb_timestamp(), arb_probe_map())).prop_map(move |refresh| {
            match refresh {
                None => CacheState::zeroed(cache.name.clone()),
                Some((at, probe)) => CacheState::refreshed(&cache, at, Fingerprint::of(probe)),
            }
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::json;

    pub fn storage_settings() -> StorageSettings {
        StorageSettings::new("postgres:dbname=lakesync_catalog", "/tmp/lakesync-data")
    }

    pub fn snowflake_source(name: &str, passthrough_enabled: bool) -> Source {
        Source {
            name: name.to_string(),
            driver: DriverKind::Snowflake,
            credential: format!("{}_secret", name),
            passthrough_enabled,
            created_at: chrono::Utc::now(),
        }
    }

    /// `orders(id, customer, total)` with `n` rows, totals 0, 50, 100, ...
    pub fn orders_rows(n: usize) -> RowSet {
        RowSet::new(
            Schema::new(vec![
                Column::new("id", "NUMBER"),
                Column::new("customer", "VARCHAR"),
                Column::new("total", "NUMBER"),
            ]),
            (0..n)
                .map(|i| vec![json!(i), json!(format!("customer_{}", i)), json!(i * 50)])
                .collect(),
        )
    }

    /// `shipments(id, order_id, carrier)` with `n` rows.
    pub fn shipments_rows(n: usize) -> RowSet {
        RowSet::new(
            Schema::new(vec![
                Column::new("id", "NUMBER"),
                Column::new("order_id", "NUMBER"),
                Column::new("carrier", "VARCHAR"),
            ]),
            (0..n)
                .map(|i| vec![json!(i), json!(i), json!("ups")])
                .collect(),
        )
    }

    /// Cache spec over `DB.PUBLIC.ORDERS` monitoring that table.
    pub fn orders_cache_spec(source_name: &str, ttl_seconds: Option<u64>) -> CacheSpec {
        let mut spec = CacheSpec::new("orders_cache", source_name, "SELECT * FROM DB.PUBLIC.ORDERS")
            .with_monitored_tables(["DB.PUBLIC.ORDERS"]);
        spec.ttl_seconds = ttl_seconds;
        spec
    }

    /// Warehouse holding `DB.PUBLIC.ORDERS` and `DB.PUBLIC.SHIPMENTS`.
    pub fn warehouse_with_orders(orders: usize, shipments: usize) -> ScriptedWarehouse {
        let warehouse = ScriptedWarehouse::new();
        warehouse.add_table("DB.PUBLIC.ORDERS", orders_rows(orders));
        warehouse.add_table("DB.PUBLIC.SHIPMENTS", shipments_rows(shipments));
        warehouse
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over refresh statuses.

    use super::*;

    #[track_caller]
    pub fn assert_refreshed(status: &RefreshStatus, rows: u64) {
        assert_eq!(
            status.outcome,
            RefreshOutcome::Refreshed,
            "Expected REFRESHED, got: {:?}",
            status
        );
        assert_eq!(status.rows_refreshed, Some(rows), "Wrong row count: {:?}", status);
        assert!(status.duration_ms.is_some(), "Missing duration: {:?}", status);
    }

    #[track_caller]
    pub fn assert_skipped(status: &RefreshStatus) {
        assert_eq!(
            status.outcome,
            RefreshOutcome::Skipped,
            "Expected SKIPPED, got: {:?}",
            status
        );
        assert!(status.rows_refreshed.is_none());
        assert!(status.duration_ms.is_none());
    }

    /// Assert an ERROR status whose message contains `needle`.
    #[track_caller]
    pub fn assert_refresh_error(status: &RefreshStatus, needle: &str) {
        assert_eq!(
            status.outcome,
            RefreshOutcome::Error,
            "Expected ERROR, got: {:?}",
            status
        );
        assert!(
            status.message.contains(needle),
            "Expected message containing {:?}, got {:?}",
            needle,
            status.message
        );
    }
}
