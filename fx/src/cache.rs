//! Rate cache holding the live snapshot and the delta baseline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use ratecast_common::{
    constants, from_unix_seconds, CurrencyDirectory, RateChangeSet, RateEntry, RateSnapshot,
    RawRates,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::provider::RateProvider;
use crate::simulation::RateSimulator;

/// Configuration for the rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Base currency used when a source does not name one.
    pub base_currency: String,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            base_currency: constants::DEFAULT_BASE_CURRENCY.to_string(),
        }
    }
}

/// Enrich raw rates into a sorted snapshot.
///
/// `change` is the movement against `previous` for codes observed in the
/// previous cycle and zero otherwise. Codes missing from the directory keep
/// an empty name. The base currency is never listed.
pub fn build_snapshot(
    raw: &RawRates,
    previous: &HashMap<String, f64>,
    directory: &CurrencyDirectory,
    fallback_base: &str,
) -> RateSnapshot {
    let base = if raw.base.is_empty() {
        fallback_base
    } else {
        raw.base.as_str()
    };

    let entries = raw
        .rates
        .iter()
        .filter(|(code, _)| code.as_str() != base)
        .map(|(code, rate)| RateEntry {
            code: code.clone(),
            name: directory.name(code).to_string(),
            rate: *rate,
            change: previous.get(code).map(|prev| rate - prev).unwrap_or(0.0),
        })
        .collect();

    RateSnapshot::new(base, from_unix_seconds(raw.timestamp), entries)
}

/// Owner of the current snapshot, the previous raw rates and the currency directory.
///
/// Refreshes are serialized by an async lock held across provider I/O.
/// Readers only take short synchronous locks, so a join during an in-flight
/// refresh is served the last completed snapshot.
pub struct RateCache {
    provider: Arc<dyn RateProvider>,
    simulator: RateSimulator,
    config: RateCacheConfig,
    directory: RwLock<CurrencyDirectory>,
    previous_rates: RwLock<HashMap<String, f64>>,
    current: RwLock<Option<Arc<RateSnapshot>>>,
    refresh_lock: Mutex<()>,
    refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
}

impl RateCache {
    /// Create a new rate cache.
    pub fn new(provider: Arc<dyn RateProvider>, config: RateCacheConfig) -> Self {
        Self {
            provider,
            simulator: RateSimulator::new(config.base_currency.clone()),
            config,
            directory: RwLock::new(CurrencyDirectory::new()),
            previous_rates: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refreshes: AtomicU64::new(0),
            failed_refreshes: AtomicU64::new(0),
        }
    }

    /// Replace the simulator, e.g. with a seeded one.
    pub fn with_simulator(mut self, simulator: RateSimulator) -> Self {
        self.simulator = simulator;
        self
    }

    /// Last completed snapshot, without waiting for an in-flight refresh.
    pub fn current(&self) -> Option<Arc<RateSnapshot>> {
        self.current.read().clone()
    }

    /// Get the current snapshot, producing the first one if none exists.
    ///
    /// Never forces a re-fetch once a snapshot exists.
    pub async fn get_current_snapshot(&self, simulate: bool) -> FxResult<Arc<RateSnapshot>> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have produced it while we waited.
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        self.refresh_locked(simulate).await?;
        self.current().ok_or(FxError::SnapshotUnavailable)
    }

    /// Run one refresh cycle and return the entries that moved.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn refresh(&self, simulate: bool) -> FxResult<RateChangeSet> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked(simulate).await
    }

    async fn refresh_locked(&self, simulate: bool) -> FxResult<RateChangeSet> {
        match self.run_refresh(simulate).await {
            Ok(changes) => {
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                Ok(changes)
            }
            Err(e) => {
                self.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, simulate, "Rate refresh failed");
                Err(e)
            }
        }
    }

    async fn run_refresh(&self, simulate: bool) -> FxResult<RateChangeSet> {
        self.ensure_directory().await?;

        let raw = if simulate {
            let directory = self.directory.read().clone();
            let current = self.current();
            self.simulator.simulate(&directory, current.as_deref())
        } else {
            self.provider.fetch_latest_rates().await?
        };

        let snapshot = {
            let previous = self.previous_rates.read();
            let directory = self.directory.read();
            build_snapshot(&raw, &previous, &directory, &self.config.base_currency)
        };
        let changes = RateChangeSet::from_snapshot(&snapshot);

        info!(
            base = %snapshot.base,
            entries = snapshot.len(),
            changed = changes.len(),
            simulate,
            "Rates refreshed"
        );

        *self.current.write() = Some(Arc::new(snapshot));
        *self.previous_rates.write() = raw.to_baseline();

        Ok(changes)
    }

    async fn ensure_directory(&self) -> FxResult<()> {
        if !self.directory.read().is_empty() {
            return Ok(());
        }

        let names = self.provider.fetch_currency_names().await?;
        debug!(count = names.len(), "Currency directory populated");
        *self.directory.write() = names;
        Ok(())
    }

    /// Copy of the currency directory.
    pub fn directory(&self) -> CurrencyDirectory {
        self.directory.read().clone()
    }

    /// Copy of the raw rates from the last completed cycle.
    pub fn previous_rates(&self) -> HashMap<String, f64> {
        self.previous_rates.read().clone()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let current = self.current();
        CacheStats {
            entries: current.as_ref().map(|s| s.len()).unwrap_or(0),
            last_updated_at: current.as_ref().map(|s| s.last_updated_at),
            directory_size: self.directory.read().len(),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failed_refreshes: self.failed_refreshes.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub directory_size: usize,
    pub refreshes: u64,
    pub failed_refreshes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockRateProvider;
    use proptest::prelude::*;
    use std::time::Duration;

    const TS: i64 = 1_700_000_000;

    fn setup() -> (Arc<MockRateProvider>, Arc<RateCache>) {
        let provider = Arc::new(MockRateProvider::new("test"));
        provider.set_names(CurrencyDirectory::from([("USD", "US Dollar"), ("EUR", "Euro")]));
        provider.set_rates("USD", TS, &[("EUR", 0.90)]);

        let cache = RateCache::new(provider.clone(), RateCacheConfig::default())
            .with_simulator(RateSimulator::seeded("USD", 11));
        (provider, Arc::new(cache))
    }

    #[tokio::test]
    async fn test_first_snapshot_from_live_fetch() {
        let (_provider, cache) = setup();

        let snapshot = cache.get_current_snapshot(false).await.unwrap();

        assert_eq!(snapshot.base, "USD");
        assert_eq!(snapshot.len(), 1);
        let eur = snapshot.get("EUR").unwrap();
        assert_eq!(eur.name, "Euro");
        assert_eq!(eur.rate, 0.90);
        assert_eq!(eur.change, 0.0);
        assert_eq!(cache.previous_rates(), HashMap::from([("EUR".to_string(), 0.90)]));
    }

    #[tokio::test]
    async fn test_get_current_snapshot_does_not_refetch() {
        let (provider, cache) = setup();

        cache.get_current_snapshot(false).await.unwrap();
        cache.get_current_snapshot(false).await.unwrap();
        cache.get_current_snapshot(true).await.unwrap();

        assert_eq!(provider.latest_calls(), 1);
        assert_eq!(provider.names_calls(), 1);
    }

    #[tokio::test]
    async fn test_simulated_refresh_moves_rates() {
        let (_provider, cache) = setup();
        cache.get_current_snapshot(false).await.unwrap();

        let changes = cache.refresh(true).await.unwrap();
        let snapshot = cache.current().unwrap();
        let eur = snapshot.get("EUR").unwrap();

        assert!(eur.rate >= 0.90 * 0.95 && eur.rate <= 0.90 * 1.05);
        assert_eq!(eur.change, eur.rate - 0.90);
        assert_eq!(changes.get("EUR").is_some(), eur.change != 0.0);
    }

    #[test]
    fn test_build_snapshot_change_against_previous() {
        let raw = RawRates {
            base: "USD".to_string(),
            timestamp: TS,
            rates: [("EUR".to_string(), 0.855)].into_iter().collect(),
        };
        let previous = HashMap::from([("EUR".to_string(), 0.90)]);
        let directory = CurrencyDirectory::from([("EUR", "Euro")]);

        let snapshot = build_snapshot(&raw, &previous, &directory, "USD");
        let eur = snapshot.get("EUR").unwrap();

        assert_eq!(eur.rate, 0.855);
        assert!((eur.change + 0.045).abs() < 1e-12);

        let changes = RateChangeSet::from_snapshot(&snapshot);
        assert_eq!(changes.len(), 1);
        assert!(changes.get("EUR").is_some());
    }

    #[tokio::test]
    async fn test_identical_rates_yield_empty_change_set() {
        let (_provider, cache) = setup();

        cache.refresh(false).await.unwrap();
        let changes = cache.refresh(false).await.unwrap();

        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_change_is_cycle_over_cycle() {
        let (provider, cache) = setup();

        cache.refresh(false).await.unwrap();

        provider.set_rates("USD", TS + 10, &[("EUR", 1.0)]);
        let changes = cache.refresh(false).await.unwrap();
        assert!((changes.get("EUR").unwrap().change - 0.10).abs() < 1e-12);

        let changes = cache.refresh(false).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(cache.current().unwrap().get("EUR").unwrap().change, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_codes_kept_and_base_excluded() {
        let (provider, cache) = setup();
        provider.set_rates("USD", TS, &[("USD", 1.0), ("EUR", 0.9), ("XYZ", 3.5)]);

        let snapshot = cache.get_current_snapshot(false).await.unwrap();

        assert!(snapshot.get("USD").is_none());
        assert_eq!(snapshot.get("XYZ").unwrap().name, "");
        assert_eq!(snapshot.rates[0].code, "XYZ");
        assert!(snapshot.is_sorted());
    }

    #[tokio::test]
    async fn test_empty_rates() {
        let (provider, cache) = setup();
        provider.set_rates("USD", TS, &[]);

        let changes = cache.refresh(false).await.unwrap();

        assert!(changes.is_empty());
        assert!(cache.current().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_base_falls_back_to_config() {
        let (provider, cache) = setup();
        provider.set_rates("", TS, &[("EUR", 0.9)]);

        let snapshot = cache.get_current_snapshot(false).await.unwrap();
        assert_eq!(snapshot.base, "USD");
    }

    #[tokio::test]
    async fn test_first_fetch_failure_surfaces() {
        let (provider, cache) = setup();
        provider.set_failing(true);

        let result = cache.get_current_snapshot(false).await;
        assert!(matches!(result, Err(FxError::UpstreamUnavailable { .. })));
        assert!(cache.current().is_none());
        assert_eq!(cache.stats().failed_refreshes, 1);

        provider.set_failing(false);
        assert!(cache.get_current_snapshot(false).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_state() {
        let (provider, cache) = setup();
        cache.refresh(false).await.unwrap();
        let before = cache.current().unwrap();

        provider.set_failing(true);
        assert!(cache.refresh(false).await.is_err());

        assert_eq!(cache.current().unwrap(), before);
        assert_eq!(cache.previous_rates().get("EUR"), Some(&0.90));
    }

    #[tokio::test]
    async fn test_error_body_keeps_snapshot_and_baseline() {
        let (provider, cache) = setup();
        provider.set_latest_payload(Some(serde_json::json!({
            "base": "USD",
            "timestamp": TS,
            "rates": { "EUR": 0.90, "GBP": 0.80 }
        })));
        cache.refresh(false).await.unwrap();
        let before = cache.current().unwrap();
        assert_eq!(before.len(), 2);

        provider.set_latest_payload(Some(serde_json::json!({
            "error": true,
            "status": 401,
            "message": "invalid_app_id"
        })));
        let result = cache.refresh(false).await;
        assert!(matches!(result, Err(FxError::UpstreamSchemaInvalid { .. })));
        assert_eq!(cache.current().unwrap(), before);
        assert_eq!(cache.previous_rates().get("EUR"), Some(&0.90));

        provider.set_latest_payload(Some(serde_json::json!({
            "base": "USD",
            "timestamp": TS + 20,
            "rates": { "EUR": 0.95, "GBP": 0.80 }
        })));
        let changes = cache.refresh(false).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert!((changes.get("EUR").unwrap().change - 0.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_directory_failure_fails_cycle() {
        let (provider, cache) = setup();
        provider.set_names_failing(true);

        assert!(cache.refresh(false).await.is_err());
        assert!(cache.current().is_none());
        assert!(cache.directory().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_cold_start() {
        let (provider, cache) = setup();

        let snapshot = cache.get_current_snapshot(true).await.unwrap();

        assert_eq!(provider.latest_calls(), 0);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("EUR").unwrap().change, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_wait_for_refresh() {
        let (provider, cache) = setup();
        cache.get_current_snapshot(false).await.unwrap();

        provider.set_latency(Duration::from_secs(5));
        let refreshing = cache.clone();
        let handle = tokio::spawn(async move { refreshing.refresh(false).await });
        tokio::task::yield_now().await;

        let snapshot = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_current_snapshot(false),
        )
        .await
        .expect("join blocked behind refresh")
        .unwrap();
        assert_eq!(snapshot.get("EUR").unwrap().rate, 0.90);

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_fetch_once() {
        let (provider, cache) = setup();

        let (a, b) = tokio::join!(
            cache.get_current_snapshot(false),
            cache.get_current_snapshot(false)
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(provider.latest_calls(), 1);
    }

    proptest! {
        #[test]
        fn prop_change_matches_previous(
            raw in prop::collection::btree_map("[A-Z]{3}", 0.001f64..500.0, 0..20),
            previous in prop::collection::hash_map("[A-Z]{3}", 0.001f64..500.0, 0..20),
        ) {
            let raw = RawRates { base: "USD".to_string(), timestamp: TS, rates: raw };
            let snapshot = build_snapshot(&raw, &previous, &CurrencyDirectory::new(), "USD");

            for entry in &snapshot.rates {
                let expected = previous.get(&entry.code).map(|p| entry.rate - p).unwrap_or(0.0);
                prop_assert_eq!(entry.change, expected);
                prop_assert_ne!(entry.code.as_str(), "USD");
            }
            prop_assert!(snapshot.is_sorted());
        }
    }
}
