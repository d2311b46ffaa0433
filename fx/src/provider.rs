//! Rate provider trait and implementations.

use std::time::Duration;

use async_trait::async_trait;
use ratecast_common::{constants, CurrencyDirectory, RawRates};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{FxError, FxResult};
use crate::schema::{self, SchemaMode};

/// Default Open Exchange Rates API root.
pub const DEFAULT_BASE_URL: &str = "https://openexchangerates.org/api";

const LATEST_ENDPOINT: &str = "latest.json";
const CURRENCIES_ENDPOINT: &str = "currencies.json";

/// Trait for upstream exchange-rate sources.
///
/// Implementations do not retry; the refresh cycle that called them decides
/// what a failure means.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the latest rates against the provider's base currency.
    async fn fetch_latest_rates(&self) -> FxResult<RawRates>;

    /// Fetch the code to display-name mapping.
    async fn fetch_currency_names(&self) -> FxResult<CurrencyDirectory>;
}

/// Configuration for the Open Exchange Rates client.
#[derive(Debug, Clone)]
pub struct OpenExchangeRatesConfig {
    /// API root; endpoints are appended to it.
    pub base_url: String,
    /// API key sent as the `app_id` query parameter.
    pub app_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How payload validation failures are treated.
    pub schema_mode: SchemaMode,
}

impl OpenExchangeRatesConfig {
    /// Create a configuration for the public API.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: app_id.into(),
            timeout: constants::default_upstream_timeout(),
            schema_mode: SchemaMode::default(),
        }
    }

    /// Point the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the schema mode.
    pub fn with_schema_mode(mut self, mode: SchemaMode) -> Self {
        self.schema_mode = mode;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for the Open Exchange Rates API.
pub struct OpenExchangeRatesProvider {
    client: reqwest::Client,
    config: OpenExchangeRatesConfig,
}

impl OpenExchangeRatesProvider {
    /// Create a new client.
    pub fn new(config: OpenExchangeRatesConfig) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ratecast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FxError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    async fn get_json(&self, endpoint: &str) -> FxResult<Value> {
        // Errors are stripped of their URL; it carries the API key.
        let response = self
            .client
            .get(self.endpoint_url(endpoint))
            .query(&[("app_id", self.config.app_id.as_str())])
            .send()
            .await
            .map_err(|e| FxError::unavailable(endpoint, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FxError::unavailable(endpoint, format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FxError::unavailable(endpoint, e.without_url()))?;

        serde_json::from_slice(&body).map_err(|e| FxError::UpstreamSchemaInvalid {
            endpoint: endpoint.to_string(),
            issues: vec![format!("body is not JSON: {e}")],
        })
    }
}

#[async_trait]
impl RateProvider for OpenExchangeRatesProvider {
    fn name(&self) -> &str {
        "openexchangerates"
    }

    #[instrument(skip(self))]
    async fn fetch_latest_rates(&self) -> FxResult<RawRates> {
        let payload = self.get_json(LATEST_ENDPOINT).await?;
        let rates = schema::parse_latest(&payload).into_result(
            self.config.schema_mode,
            LATEST_ENDPOINT,
            &payload,
        )?;

        debug!(base = %rates.base, count = rates.rates.len(), "Fetched latest rates");
        Ok(rates)
    }

    #[instrument(skip(self))]
    async fn fetch_currency_names(&self) -> FxResult<CurrencyDirectory> {
        let payload = self.get_json(CURRENCIES_ENDPOINT).await?;
        let names = schema::parse_currencies(&payload).into_result(
            self.config.schema_mode,
            CURRENCIES_ENDPOINT,
            &payload,
        )?;

        debug!(count = names.len(), "Fetched currency names");
        Ok(names)
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    latest: parking_lot::Mutex<RawRates>,
    latest_payload: parking_lot::Mutex<Option<Value>>,
    names: parking_lot::Mutex<CurrencyDirectory>,
    fail_latest: std::sync::atomic::AtomicBool,
    fail_names: std::sync::atomic::AtomicBool,
    latency: parking_lot::Mutex<Option<Duration>>,
    latest_calls: std::sync::atomic::AtomicUsize,
    names_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider with no rates and no names.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latest: parking_lot::Mutex::new(RawRates {
                base: constants::DEFAULT_BASE_CURRENCY.to_string(),
                ..Default::default()
            }),
            latest_payload: parking_lot::Mutex::new(None),
            names: parking_lot::Mutex::new(CurrencyDirectory::new()),
            fail_latest: Default::default(),
            fail_names: Default::default(),
            latency: parking_lot::Mutex::new(None),
            latest_calls: Default::default(),
            names_calls: Default::default(),
        }
    }

    /// Set the currency names.
    pub fn set_names(&self, names: CurrencyDirectory) {
        *self.names.lock() = names;
    }

    /// Set the latest rates.
    pub fn set_rates(&self, base: &str, timestamp: i64, rates: &[(&str, f64)]) {
        *self.latest.lock() = RawRates {
            base: base.to_string(),
            timestamp,
            rates: rates
                .iter()
                .map(|(code, rate)| (code.to_string(), *rate))
                .collect(),
        };
    }

    /// Serve a raw `latest.json` body, validated leniently like a live fetch.
    ///
    /// Takes precedence over [`set_rates`](Self::set_rates) until cleared with `None`.
    pub fn set_latest_payload(&self, payload: Option<Value>) {
        *self.latest_payload.lock() = payload;
    }

    /// Make `fetch_latest_rates` fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail_latest
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make `fetch_currency_names` fail.
    pub fn set_names_failing(&self, failing: bool) {
        self.fail_names
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Delay every fetch by the given duration.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Number of `fetch_latest_rates` calls so far.
    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of `fetch_currency_names` calls so far.
    pub fn names_calls(&self) -> usize {
        self.names_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_latest_rates(&self) -> FxResult<RawRates> {
        use std::sync::atomic::Ordering;

        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(FxError::unavailable(LATEST_ENDPOINT, "injected failure"));
        }

        let payload = self.latest_payload.lock().clone();
        if let Some(payload) = payload {
            return schema::parse_latest(&payload).into_result(
                SchemaMode::Lenient,
                LATEST_ENDPOINT,
                &payload,
            );
        }
        Ok(self.latest.lock().clone())
    }

    async fn fetch_currency_names(&self) -> FxResult<CurrencyDirectory> {
        use std::sync::atomic::Ordering;

        self.names_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        if self.fail_names.load(Ordering::SeqCst) {
            return Err(FxError::unavailable(CURRENCIES_ENDPOINT, "injected failure"));
        }
        Ok(self.names.lock().clone())
    }
}
