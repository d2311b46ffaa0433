//! Ratecast FX
//!
//! Exchange-rate retrieval and caching for the Ratecast hub.
//!
//! # Features
//!
//! - Upstream provider client with lenient or strict payload validation
//! - Randomized simulation source shaped exactly like a provider response
//! - Rate cache holding the current snapshot and the delta baseline
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratecast_fx::{
//!     OpenExchangeRatesConfig, OpenExchangeRatesProvider, RateCache, RateCacheConfig,
//! };
//!
//! let provider = OpenExchangeRatesProvider::new(OpenExchangeRatesConfig::new("app-id"))?;
//! let cache = RateCache::new(Arc::new(provider), RateCacheConfig::default());
//!
//! // First call fetches; later calls return the cached snapshot.
//! let snapshot = cache.get_current_snapshot(false).await?;
//!
//! // Each refresh returns only the entries that moved.
//! let changes = cache.refresh(true).await?;
//! ```

pub mod error;
pub mod schema;
pub mod provider;
pub mod simulation;
pub mod cache;

pub use error::{FxError, FxResult};
pub use schema::{Parsed, SchemaMode};
pub use provider::{OpenExchangeRatesConfig, OpenExchangeRatesProvider, RateProvider};
pub use simulation::RateSimulator;
pub use cache::{build_snapshot, CacheStats, RateCache, RateCacheConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
