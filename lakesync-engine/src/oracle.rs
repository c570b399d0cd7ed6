//! Staleness oracle: decides whether a cache must be refreshed.
//!
//! The decision is made in two stages. [`StalenessOracle::precheck`] answers
//! from the stored state alone (force, never refreshed, TTL expired, missing
//! fingerprint). Only when that is inconclusive does the oracle pay for one
//! metadata round-trip to the warehouse and compare fingerprints.

use lakesync_core::{Cache, CacheState, Fingerprint, LakesyncResult, Source, Timestamp};
use lakesync_storage::WarehouseConnector;
use std::fmt;
use std::sync::Arc;

/// Outcome of a staleness check, with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Staleness {
    Forced,
    NeverRefreshed,
    TtlExpired,
    /// Refreshed before, but no fingerprint was stored.
    FingerprintMissing,
    FingerprintChanged,
    Fresh,
}

impl Staleness {
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, Self::Fresh)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Forced => "forced",
            Self::NeverRefreshed => "never refreshed",
            Self::TtlExpired => "TTL expired",
            Self::FingerprintMissing => "no stored fingerprint",
            Self::FingerprintChanged => "monitored tables changed",
            Self::Fresh => "fresh",
        }
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

pub struct StalenessOracle {
    warehouse: Arc<dyn WarehouseConnector>,
}

impl StalenessOracle {
    pub fn new(warehouse: Arc<dyn WarehouseConnector>) -> Self {
        Self { warehouse }
    }

    /// Cheap checks that need no network call. `None` means the fingerprint
    /// has to be compared.
    pub fn precheck(
        cache: &Cache,
        state: Option<&CacheState>,
        force: bool,
        now: Timestamp,
    ) -> Option<Staleness> {
        if force {
            return Some(Staleness::Forced);
        }
        let state = match state {
            Some(state) if state.has_been_refreshed() => state,
            _ => return Some(Staleness::NeverRefreshed),
        };
        if state.is_expired_at(cache, now) {
            return Some(Staleness::TtlExpired);
        }
        if state.fingerprint.is_none() {
            return Some(Staleness::FingerprintMissing);
        }
        None
    }

    /// Current fingerprint of the cache's monitored tables.
    ///
    /// A cache without monitored tables hashes the empty map and never hits
    /// the warehouse.
    pub async fn probe(&self, source: &Source, cache: &Cache) -> LakesyncResult<Fingerprint> {
        if cache.monitored_tables.is_empty() {
            return Ok(Fingerprint::of(std::iter::empty::<(String, String)>()));
        }
        let markers = self
            .warehouse
            .probe_last_modified(&source.credential, &cache.monitored_tables)
            .await?;
        tracing::debug!(
            cache = %cache.name,
            monitored = cache.monitored_tables.len(),
            found = markers.len(),
            "probed monitored tables"
        );
        Ok(Fingerprint::of(markers))
    }

    /// Full staleness decision.
    pub async fn assess(
        &self,
        source: &Source,
        cache: &Cache,
        state: Option<&CacheState>,
        force: bool,
        now: Timestamp,
    ) -> LakesyncResult<Staleness> {
        if let Some(decision) = Self::precheck(cache, state, force, now) {
            return Ok(decision);
        }
        let current = self.probe(source, cache).await?;
        let stored = state.and_then(|s| s.fingerprint.as_ref());
        if stored == Some(&current) {
            Ok(Staleness::Fresh)
        } else {
            Ok(Staleness::FingerprintChanged)
        }
    }

    pub async fn needs_refresh(
        &self,
        source: &Source,
        cache: &Cache,
        state: Option<&CacheState>,
        force: bool,
        now: Timestamp,
    ) -> LakesyncResult<bool> {
        Ok(self
            .assess(source, cache, state, force, now)
            .await?
            .needs_refresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use lakesync_core::CacheSpec;
    use lakesync_test_utils::fixtures::{orders_cache_spec, snowflake_source, warehouse_with_orders};
    use lakesync_test_utils::ScriptedWarehouse;

    fn orders_cache(ttl: Option<u64>) -> Cache {
        orders_cache_spec("snow", ttl).into_cache().unwrap()
    }

    fn oracle(warehouse: &Arc<ScriptedWarehouse>) -> StalenessOracle {
        StalenessOracle::new(Arc::clone(warehouse) as Arc<dyn WarehouseConnector>)
    }

    #[tokio::test]
    async fn test_force_wins_without_probe() {
        let warehouse = Arc::new(warehouse_with_orders(1, 0));
        let cache = orders_cache(Some(3600));
        let source = snowflake_source("snow", true);
        let decision = oracle(&warehouse)
            .assess(&source, &cache, None, true, Utc::now())
            .await
            .unwrap();
        assert_eq!(decision, Staleness::Forced);
        assert_eq!(warehouse.probe_count(), 0);
    }

    #[test]
    fn test_precheck_order() {
        let cache = orders_cache(Some(60));
        let now = Utc::now();

        assert_eq!(
            StalenessOracle::precheck(&cache, None, false, now),
            Some(Staleness::NeverRefreshed)
        );
        let zeroed = CacheState::zeroed("orders_cache");
        assert_eq!(
            StalenessOracle::precheck(&cache, Some(&zeroed), false, now),
            Some(Staleness::NeverRefreshed)
        );

        let old = CacheState::refreshed(&cache, now - Duration::seconds(120), Fingerprint::of([("A", "1")]));
        assert_eq!(
            StalenessOracle::precheck(&cache, Some(&old), false, now),
            Some(Staleness::TtlExpired)
        );

        let mut migrated = CacheState::refreshed(&cache, now, Fingerprint::of([("A", "1")]));
        migrated.fingerprint = None;
        assert_eq!(
            StalenessOracle::precheck(&cache, Some(&migrated), false, now),
            Some(Staleness::FingerprintMissing)
        );

        let recent = CacheState::refreshed(&cache, now, Fingerprint::of([("A", "1")]));
        assert_eq!(StalenessOracle::precheck(&cache, Some(&recent), false, now), None);
    }

    #[test]
    fn test_expiry_without_timestamp_is_expired() {
        let cache = orders_cache(Some(60));
        let now = Utc::now();
        let mut state = CacheState::refreshed(&cache, now, Fingerprint::of([("A", "1")]));
        state.expires_at = None;
        assert_eq!(
            StalenessOracle::precheck(&cache, Some(&state), false, now),
            Some(Staleness::TtlExpired)
        );
    }

    #[tokio::test]
    async fn test_fingerprint_compare() {
        let warehouse = Arc::new(warehouse_with_orders(1, 0));
        let oracle = oracle(&warehouse);
        let cache = orders_cache(None);
        let source = snowflake_source("snow", true);
        let now = Utc::now();

        let fingerprint = oracle.probe(&source, &cache).await.unwrap();
        let state = CacheState::refreshed(&cache, now, fingerprint);
        assert_eq!(
            oracle.assess(&source, &cache, Some(&state), false, now).await.unwrap(),
            Staleness::Fresh
        );

        warehouse.touch("DB.PUBLIC.ORDERS");
        assert_eq!(
            oracle.assess(&source, &cache, Some(&state), false, now).await.unwrap(),
            Staleness::FingerprintChanged
        );
        assert!(oracle
            .needs_refresh(&source, &cache, Some(&state), false, now)
            .await
            .unwrap());
        assert_eq!(warehouse.credentials_used()[0], "snow_secret");
    }

    #[tokio::test]
    async fn test_no_monitored_tables_skips_probe() {
        let warehouse = Arc::new(ScriptedWarehouse::new());
        let cache = CacheSpec::new("plain", "snow", "SELECT 1").into_cache().unwrap();
        let source = snowflake_source("snow", true);
        let a = oracle(&warehouse).probe(&source, &cache).await.unwrap();
        let b = oracle(&warehouse).probe(&source, &cache).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(warehouse.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_propagates() {
        let warehouse = Arc::new(warehouse_with_orders(1, 0));
        warehouse.fail_probes(Some("metadata unavailable"));
        let cache = orders_cache(None);
        let state = CacheState::refreshed(&cache, Utc::now(), Fingerprint::of([("A", "1")]));
        let result = oracle(&warehouse)
            .assess(&snowflake_source("snow", true), &cache, Some(&state), false, Utc::now())
            .await;
        assert!(result.is_err());
    }
}
