//! Property-Based Tests for query routing
//!
//! Property: for any query over tables T and any subset C of T backed by
//! caches, the strategy is CACHE iff C == T. A PASSTHROUGH route carries the
//! original text; a CACHE route reads only materialized tables.

use lakesync_core::{CacheSpec, EngineConfig, QualifiedName, RouteStrategy};
use lakesync_engine::{Engine, RoutedQuery, Services};
use lakesync_sql::extract_tables;
use lakesync_storage::{CatalogStorage, HostEngine, MetadataStore, WarehouseConnector};
use lakesync_test_utils::fixtures::{orders_rows, storage_settings};
use lakesync_test_utils::{InMemoryLakehouse, InMemoryMetadataStore, ScriptedWarehouse};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// GENERATORS
// ============================================================================

/// Tables, whether each is cached, and whether to use comma joins.
fn arb_routing_case() -> impl Strategy<Value = (Vec<String>, Vec<bool>, bool)> {
    prop::collection::btree_set("t_[a-z]{1,5}", 1..4).prop_flat_map(|set| {
        let tables: Vec<String> = set.into_iter().collect();
        let n = tables.len();
        (Just(tables), prop::collection::vec(any::<bool>(), n), any::<bool>())
    })
}

fn build_query(tables: &[String], comma: bool) -> String {
    let mut sql = format!("SELECT * FROM {}", tables[0]);
    for table in &tables[1..] {
        if comma {
            sql.push_str(&format!(", {}", table));
        } else {
            sql.push_str(&format!(" JOIN {} ON true", table));
        }
    }
    sql
}

// ============================================================================
// HARNESS
// ============================================================================

async fn route_case(tables: &[String], cached: &[bool], sql: &str) -> RoutedQuery {
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let lakehouse = Arc::new(InMemoryLakehouse::new("lakesync"));
    let warehouse = Arc::new(ScriptedWarehouse::new());
    for table in tables {
        warehouse.add_table(table, orders_rows(2));
    }

    let engine = Engine::new(
        EngineConfig::default(),
        Services {
            metadata: metadata as Arc<dyn MetadataStore>,
            catalog: Arc::clone(&lakehouse) as Arc<dyn CatalogStorage>,
            warehouse: warehouse as Arc<dyn WarehouseConnector>,
            host: lakehouse as Arc<dyn HostEngine>,
        },
    )
    .unwrap();
    engine.setup_storage(&storage_settings()).await.unwrap();
    engine
        .add_source("snow", "snowflake", "snow_secret", true)
        .await
        .unwrap();

    for (table, is_cached) in tables.iter().zip(cached) {
        if *is_cached {
            let spec = CacheSpec::new(format!("{}_c", table), "snow", format!("SELECT * FROM {}", table))
                .with_monitored_tables([table.clone()]);
            engine.create_cache(spec).await.unwrap();
        }
    }

    engine.route(sql, "snow").await.unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_routing_is_all_or_nothing((tables, cached, comma) in arb_routing_case()) {
        let sql = build_query(&tables, comma);
        let routed = runtime().block_on(route_case(&tables, &cached, &sql));

        let all_cached = cached.iter().all(|c| *c);
        let expected = if all_cached { RouteStrategy::Cache } else { RouteStrategy::Passthrough };
        prop_assert_eq!(routed.strategy, expected);

        let resolved = cached.iter().filter(|c| **c).count();
        prop_assert_eq!(routed.tables.len(), resolved);

        match routed.strategy {
            RouteStrategy::Passthrough => {
                prop_assert_eq!(&routed.sql, &sql);
            }
            RouteStrategy::Cache => {
                let read = extract_tables(&routed.sql).tables;
                let physical: BTreeSet<QualifiedName> = tables
                    .iter()
                    .map(|t| QualifiedName::three_part("lakesync", "snow", format!("{}_c", t)))
                    .collect();
                prop_assert_eq!(read, physical);
                prop_assert_eq!(routed.schema.len(), 3 * tables.len());
            }
        }
    }
}
