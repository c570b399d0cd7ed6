//! Metadata records: sources, caches and per-cache refresh state.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{is_plain_identifier, Fingerprint, Timestamp, ValidationError};

// ============================================================================
// SOURCE
// ============================================================================

/// Supported warehouse drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Snowflake,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("snowflake") {
            Ok(Self::Snowflake)
        } else {
            Err(ValidationError::InvalidValue {
                field: "driver".to_string(),
                reason: format!("Unsupported driver: {}. Only 'snowflake' is supported.", s),
            })
        }
    }
}

/// A named warehouse connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub driver: DriverKind,
    /// Name of the secret the connector authenticates with.
    pub credential: String,
    /// Whether queries may be forwarded to the warehouse unchanged.
    pub passthrough_enabled: bool,
    pub created_at: Timestamp,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        driver: DriverKind,
        credential: impl Into<String>,
        passthrough_enabled: bool,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let credential = credential.into();
        validate_name("source name", &name)?;
        if credential.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "credential".to_string(),
            });
        }
        Ok(Self {
            name,
            driver,
            credential,
            passthrough_enabled,
            created_at: Utc::now(),
        })
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// A named materialized copy of a query's result, owned by one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    pub name: String,
    pub source_name: String,
    /// Query run against the source to materialize the cache.
    pub query: String,
    /// Source-side tables whose modification invalidates this cache.
    pub monitored_tables: Vec<String>,
    /// Time-to-live. `None` never expires by time.
    pub ttl: Option<Duration>,
    pub created_at: Timestamp,
}

impl Cache {
    /// True if `table` is one of the monitored tables (case-insensitive).
    pub fn monitors(&self, table: &str) -> bool {
        self.monitored_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
    }

    pub fn ttl_seconds(&self) -> Option<u64> {
        self.ttl.map(|ttl| ttl.as_secs())
    }

    /// Expiry for a refresh completed at `at`, if this cache has a TTL.
    pub fn expiry_from(&self, at: Timestamp) -> Option<Timestamp> {
        let ttl = self.ttl?;
        let expiry = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| at.checked_add_signed(ttl))
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
        Some(expiry)
    }
}

/// Administrative input for registering a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    pub name: String,
    pub source_name: String,
    pub query: String,
    #[serde(default)]
    pub monitored_tables: Vec<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl CacheSpec {
    pub fn new(
        name: impl Into<String>,
        source_name: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_name: source_name.into(),
            query: query.into(),
            monitored_tables: Vec::new(),
            ttl_seconds: None,
        }
    }

    pub fn with_monitored_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.monitored_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("cache name", &self.name)?;
        validate_name("source name", &self.source_name)?;
        if self.query.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "query".to_string(),
            });
        }
        if self.ttl_seconds == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "ttl_seconds".to_string(),
                reason: "TTL must be positive when set".to_string(),
            });
        }
        if let Some(blank) = self.monitored_tables.iter().find(|t| t.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "monitored_tables".to_string(),
                reason: format!("blank table name '{}'", blank),
            });
        }
        Ok(())
    }

    /// Validate and turn into a cache record created now.
    ///
    /// Monitored tables keep their first-seen order; case-insensitive
    /// duplicates are dropped.
    pub fn into_cache(self) -> Result<Cache, ValidationError> {
        self.validate()?;
        let mut monitored_tables: Vec<String> = Vec::with_capacity(self.monitored_tables.len());
        for table in self.monitored_tables {
            let table = table.trim().to_string();
            if !monitored_tables.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
                monitored_tables.push(table);
            }
        }
        Ok(Cache {
            name: self.name,
            source_name: self.source_name,
            query: self.query,
            monitored_tables,
            ttl: self.ttl_seconds.map(Duration::from_secs),
            created_at: Utc::now(),
        })
    }
}

fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    if !is_plain_identifier(name) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!(
                "'{}' must start with a letter or underscore and contain only letters, digits and underscores",
                name
            ),
        });
    }
    Ok(())
}

// ============================================================================
// CACHE STATE
// ============================================================================

/// Freshness bookkeeping for one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
    pub cache_name: String,
    /// Absent means never refreshed.
    pub last_refresh: Option<Timestamp>,
    pub fingerprint: Option<Fingerprint>,
    /// Set iff the cache has a TTL and has been refreshed at least once.
    pub expires_at: Option<Timestamp>,
    pub refresh_count: u64,
}

impl CacheState {
    /// State of a cache that has never been refreshed.
    pub fn zeroed(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            last_refresh: None,
            fingerprint: None,
            expires_at: None,
            refresh_count: 0,
        }
    }

    /// Replacement state after a refresh of `cache` completed at `at`.
    ///
    /// `refresh_count` is left at zero; the metadata store assigns
    /// previous + 1 when the state is written.
    pub fn refreshed(cache: &Cache, at: Timestamp, fingerprint: Fingerprint) -> Self {
        Self {
            cache_name: cache.name.clone(),
            last_refresh: Some(at),
            fingerprint: Some(fingerprint),
            expires_at: cache.expiry_from(at),
            refresh_count: 0,
        }
    }

    pub fn has_been_refreshed(&self) -> bool {
        self.last_refresh.is_some()
    }

    /// TTL set and expiry absent or not in the future.
    pub fn is_expired_at(&self, cache: &Cache, now: Timestamp) -> bool {
        cache.ttl.is_some() && self.expires_at.map_or(true, |expiry| expiry <= now)
    }

    /// Refreshed at least once and not TTL-expired.
    pub fn is_valid_at(&self, cache: &Cache, now: Timestamp) -> bool {
        self.has_been_refreshed() && !self.is_expired_at(cache, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cache_with_ttl(ttl: Option<u64>) -> Cache {
        let mut spec = CacheSpec::new("orders_cache", "snow", "SELECT * FROM orders")
            .with_monitored_tables(["DB.PUBLIC.ORDERS"]);
        spec.ttl_seconds = ttl;
        spec.into_cache().unwrap()
    }

    #[test]
    fn test_driver_parse_case_insensitive() {
        assert_eq!("Snowflake".parse::<DriverKind>().unwrap(), DriverKind::Snowflake);
        assert_eq!("SNOWFLAKE".parse::<DriverKind>().unwrap(), DriverKind::Snowflake);
        let err = "postgres".parse::<DriverKind>().unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn test_source_requires_credential() {
        let err = Source::new("snow", DriverKind::Snowflake, " ", true).unwrap_err();
        assert!(matches!(err, ValidationError::RequiredFieldMissing { .. }));
    }

    #[test]
    fn test_monitors_case_insensitive() {
        let cache = cache_with_ttl(None);
        assert!(cache.monitors("db.public.orders"));
        assert!(!cache.monitors("db.public.shipments"));
    }

    #[test]
    fn test_spec_validation() {
        assert!(CacheSpec::new("", "snow", "SELECT 1").validate().is_err());
        assert!(CacheSpec::new("bad name", "snow", "SELECT 1").validate().is_err());
        assert!(CacheSpec::new("c", "snow", "  ").validate().is_err());
        assert!(CacheSpec::new("c", "snow", "SELECT 1")
            .with_ttl_seconds(0)
            .validate()
            .is_err());
        assert!(CacheSpec::new("c", "snow", "SELECT 1").validate().is_ok());
    }

    #[test]
    fn test_into_cache_dedups_monitored_tables() {
        let cache = CacheSpec::new("c", "snow", "SELECT 1")
            .with_monitored_tables(["ORDERS", "orders", "SHIPMENTS"])
            .into_cache()
            .unwrap();
        assert_eq!(cache.monitored_tables, vec!["ORDERS", "SHIPMENTS"]);
    }

    #[test]
    fn test_expiry_from_ttl() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = cache_with_ttl(Some(3600));
        assert_eq!(
            cache.expiry_from(at),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap())
        );
        assert_eq!(cache_with_ttl(None).expiry_from(at), None);
    }

    #[test]
    fn test_zeroed_state_is_invalid() {
        let cache = cache_with_ttl(None);
        let state = CacheState::zeroed("orders_cache");
        assert!(!state.is_valid_at(&cache, Utc::now()));
        assert_eq!(state.refresh_count, 0);
    }

    #[test]
    fn test_refreshed_state_expiry_only_with_ttl() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fp = Fingerprint::of([("ORDERS", "t1")]);

        let with_ttl = cache_with_ttl(Some(60));
        let state = CacheState::refreshed(&with_ttl, at, fp.clone());
        assert!(state.expires_at.is_some());
        assert!(state.is_valid_at(&with_ttl, at));
        assert!(!state.is_valid_at(&with_ttl, at + chrono::Duration::seconds(60)));

        let no_ttl = cache_with_ttl(None);
        let state = CacheState::refreshed(&no_ttl, at, fp);
        assert!(state.expires_at.is_none());
        assert!(state.is_valid_at(&no_ttl, at + chrono::Duration::days(365)));
    }

    #[test]
    fn test_ttl_without_expiry_counts_as_expired() {
        let cache = cache_with_ttl(Some(60));
        let mut state = CacheState::zeroed("orders_cache");
        state.last_refresh = Some(Utc::now());
        assert!(state.is_expired_at(&cache, Utc::now()));
        assert!(!state.is_valid_at(&cache, Utc::now()));
    }
}
