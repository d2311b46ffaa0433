//! Hub configuration.

use std::time::Duration;

use ratecast_common::{constants, is_currency_code};
use ratecast_fx::provider::DEFAULT_BASE_URL;
use ratecast_fx::{OpenExchangeRatesConfig, SchemaMode};

/// Upstream provider configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API root of the rate provider.
    pub base_url: String,
    /// API key passed as a query parameter.
    pub app_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Fail cycles on payload validation issues instead of logging them.
    pub strict_schema: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: String::new(),
            timeout: constants::default_upstream_timeout(),
            strict_schema: false,
        }
    }
}

impl UpstreamConfig {
    /// Provider client configuration.
    pub fn provider_config(&self) -> OpenExchangeRatesConfig {
        let mode = if self.strict_schema {
            SchemaMode::Strict
        } else {
            SchemaMode::Lenient
        };

        OpenExchangeRatesConfig::new(self.app_id.clone())
            .with_base_url(self.base_url.clone())
            .with_timeout(self.timeout)
            .with_schema_mode(mode)
    }
}

/// Refresh scheduling configuration.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub delay: Duration,
    /// Simulate the first snapshot instead of fetching it.
    pub initial_simulate: bool,
    /// Simulate demand-driven refreshes instead of fetching them.
    pub refresh_simulate: bool,
    /// Seed for the rate simulator.
    pub simulation_seed: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            delay: constants::default_refresh_delay(),
            initial_simulate: false,
            refresh_simulate: true,
            simulation_seed: None,
        }
    }
}

/// Main hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Currency all rates are quoted against.
    pub base_currency: String,
    /// Upstream provider configuration.
    pub upstream: UpstreamConfig,
    /// Refresh configuration.
    pub refresh: RefreshConfig,
    /// Per-subscriber outbound queue capacity.
    pub subscriber_buffer: usize,
    /// Log level.
    pub log_level: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            base_currency: constants::DEFAULT_BASE_CURRENCY.to_string(),
            upstream: UpstreamConfig::default(),
            refresh: RefreshConfig::default(),
            subscriber_buffer: 64,
            log_level: "info".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

impl HubConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RATECAST_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = env_parse("RATECAST_LISTEN_PORT") {
            config.listen_port = port;
        }

        if let Ok(base) = std::env::var("RATECAST_BASE_CURRENCY") {
            config.base_currency = base.trim().to_ascii_uppercase();
        }

        if let Ok(url) = std::env::var("OPEN_EXCHANGE_RATES_HOST_URL") {
            config.upstream.base_url = url;
        }

        if let Ok(app_id) = std::env::var("OPEN_EXCHANGE_RATES_APP_ID") {
            config.upstream.app_id = app_id;
        }

        if let Some(ms) = env_parse("RATECAST_UPSTREAM_TIMEOUT_MS") {
            config.upstream.timeout = Duration::from_millis(ms);
        }

        if let Some(strict) = env_flag("RATECAST_STRICT_SCHEMA") {
            config.upstream.strict_schema = strict;
        }

        if let Some(ms) = env_parse("RATECAST_REFRESH_DELAY_MS") {
            config.refresh.delay = Duration::from_millis(ms);
        }

        if let Some(simulate) = env_flag("RATECAST_INITIAL_SIMULATE") {
            config.refresh.initial_simulate = simulate;
        }

        if let Some(simulate) = env_flag("RATECAST_REFRESH_SIMULATE") {
            config.refresh.refresh_simulate = simulate;
        }

        if let Some(seed) = env_parse("RATECAST_SIMULATION_SEED") {
            config.refresh.simulation_seed = Some(seed);
        }

        if let Some(buffer) = env_parse("RATECAST_SUBSCRIBER_BUFFER") {
            config.subscriber_buffer = buffer;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if !is_currency_code(&self.base_currency) {
            return Err(format!(
                "Base currency must be a three-letter code, got {:?}",
                self.base_currency
            ));
        }

        if self.upstream.base_url.is_empty() {
            return Err("Upstream base URL cannot be empty".to_string());
        }

        if let Err(e) = reqwest::Url::parse(&self.upstream.base_url) {
            return Err(format!("Upstream base URL is invalid: {e}"));
        }

        if self.upstream.app_id.is_empty() {
            return Err("Upstream app id cannot be empty".to_string());
        }

        if self.refresh.delay.is_zero() {
            return Err("Refresh delay cannot be 0".to_string());
        }

        if self.subscriber_buffer == 0 {
            return Err("Subscriber buffer cannot be 0".to_string());
        }

        Ok(())
    }
}
