//! The rate hub: cache, subscribers and refresh scheduling wired together.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use ratecast_common::{RateSnapshot, SubscriberId};
use ratecast_fx::{RateCache, RateCacheConfig, RateProvider, RateSimulator};

use crate::config::HubConfig;
use crate::dispatcher::BroadcastDispatcher;
use crate::error::{HubError, HubResult};
use crate::metrics::{HubMetrics, SharedMetrics};
use crate::registry::{Subscriber, SubscriberRegistry};
use crate::scheduler::RefreshScheduler;
use crate::state::SchedulerState;

/// Serves the latest snapshot to joining subscribers and pushes rate
/// movements to everyone while anyone is listening.
pub struct RateHub {
    config: HubConfig,
    cache: Arc<RateCache>,
    registry: Arc<SubscriberRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
    scheduler: RefreshScheduler,
    metrics: SharedMetrics,
}

impl RateHub {
    /// Create a new hub over a rate provider.
    pub fn new(config: HubConfig, provider: Arc<dyn RateProvider>) -> Self {
        let simulator = match config.refresh.simulation_seed {
            Some(seed) => RateSimulator::seeded(config.base_currency.clone(), seed),
            None => RateSimulator::new(config.base_currency.clone()),
        };
        let cache = Arc::new(
            RateCache::new(
                provider,
                RateCacheConfig {
                    base_currency: config.base_currency.clone(),
                },
            )
            .with_simulator(simulator),
        );

        let metrics = Arc::new(HubMetrics::new());
        let registry = Arc::new(SubscriberRegistry::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(registry.clone(), metrics.clone()));
        let scheduler = RefreshScheduler::new(
            cache.clone(),
            registry.clone(),
            dispatcher.clone(),
            metrics.clone(),
            &config.refresh,
        );

        Self {
            config,
            cache,
            registry,
            dispatcher,
            scheduler,
            metrics,
        }
    }

    /// Admit a subscriber.
    ///
    /// The subscriber receives the current snapshot before any update and is
    /// then registered for broadcasts. If no snapshot can be produced it gets
    /// an error event instead and is not registered.
    #[instrument(skip(self, subscriber), fields(subscriber_id = %subscriber.id()))]
    pub async fn on_subscriber_connected(&self, subscriber: Subscriber) -> HubResult<()> {
        let fetched = match self
            .cache
            .get_current_snapshot(self.config.refresh.initial_simulate)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let error = HubError::from(e);
                warn!(
                    error = %error,
                    retryable = error.is_retryable(),
                    "Could not serve initial snapshot"
                );
                self.metrics.subscriber_rejected();
                self.dispatcher.send_error(&subscriber, &error);
                return Err(error);
            }
        };

        // A refresh may have committed since the fetch; admit against the
        // latest so no update between the two is missed.
        let admitted = self.registry.add_with(subscriber, |s| {
            let snapshot = self.cache.current().unwrap_or(fetched);
            self.dispatcher.send_snapshot(s, &snapshot);
        });

        if admitted {
            self.metrics.set_subscribers_active(self.registry.count());
        }
        let state = self.scheduler.sync_with_demand();
        info!(admitted, scheduler = %state, "Subscriber connected");

        Ok(())
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn on_subscriber_disconnected(&self, id: &SubscriberId) {
        let removed = self.registry.remove(id);
        self.metrics.set_subscribers_active(self.registry.count());
        let state = self.scheduler.sync_with_demand();
        info!(subscriber_id = %id, removed, scheduler = %state, "Subscriber disconnected");
    }

    /// Last completed snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<RateSnapshot>> {
        self.cache.current()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.count()
    }

    /// Current refresh scheduler state.
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Get the hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Get the rate cache.
    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    /// Get metrics.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Stop scheduling refreshes.
    pub fn shutdown(&self) {
        info!(subscribers = self.registry.count(), "Shutting down rate hub");
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ratecast_common::{CurrencyDirectory, RateChangeSet, RateEvent};
    use ratecast_fx::MockRateProvider;

    use crate::registry::EventReceiver;

    fn provider() -> Arc<MockRateProvider> {
        let provider = Arc::new(MockRateProvider::new("mock"));
        provider.set_names(CurrencyDirectory::from([
            ("USD", "US Dollar"),
            ("EUR", "Euro"),
            ("GBP", "British Pound"),
        ]));
        provider.set_rates("USD", 1_700_000_000, &[("EUR", 0.9), ("GBP", 0.8)]);
        provider
    }

    fn hub(provider: Arc<MockRateProvider>) -> RateHub {
        hub_with(provider, true)
    }

    fn hub_with(provider: Arc<MockRateProvider>, refresh_simulate: bool) -> RateHub {
        let mut config = HubConfig::default();
        config.upstream.app_id = "test".to_string();
        config.refresh.simulation_seed = Some(5);
        config.refresh.refresh_simulate = refresh_simulate;
        RateHub::new(config, provider)
    }

    fn expect_update(rx: &mut EventReceiver) -> RateChangeSet {
        match rx.try_recv().unwrap().as_ref() {
            RateEvent::Update(changes) => changes.clone(),
            other => panic!("expected update, got {other:?}"),
        }
    }

    fn expect_snapshot(rx: &mut EventReceiver) -> RateSnapshot {
        match rx.try_recv().unwrap().as_ref() {
            RateEvent::Snapshot(snapshot) => snapshot.clone(),
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_gets_snapshot_and_arms() {
        let hub = hub(provider());
        let (subscriber, mut rx) = Subscriber::channel(8);

        hub.on_subscriber_connected(subscriber).await.unwrap();

        let snapshot = expect_snapshot(&mut rx);
        assert_eq!(snapshot.base, "USD");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("EUR").map(|e| e.name.as_str()), Some("Euro"));
        assert!(snapshot.rates.iter().all(|e| e.change == 0.0));

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.scheduler_state(), SchedulerState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_join_reuses_snapshot() {
        let provider = provider();
        let hub = hub(provider.clone());

        let (a, mut rx_a) = Subscriber::channel(8);
        let (b, mut rx_b) = Subscriber::channel(8);
        hub.on_subscriber_connected(a).await.unwrap();
        hub.on_subscriber_connected(b).await.unwrap();

        assert_eq!(expect_snapshot(&mut rx_a), expect_snapshot(&mut rx_b));
        assert_eq!(provider.latest_calls(), 1);
        assert_eq!(provider.names_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_failure_sends_error() {
        let provider = provider();
        provider.set_failing(true);
        let hub = hub(provider);
        let (subscriber, mut rx) = Subscriber::channel(8);
        let id = subscriber.id();

        let result = hub.on_subscriber_connected(subscriber).await;
        assert!(matches!(result, Err(HubError::Fx(_))));

        match rx.try_recv().unwrap().as_ref() {
            RateEvent::Error(e) => assert_eq!(e.code, "UPSTREAM_UNAVAILABLE"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(!hub.registry.contains(&id));
        assert_eq!(hub.scheduler_state(), SchedulerState::Disarmed);
        assert_eq!(hub.metrics().snapshot().subscribers_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_follow_snapshot() {
        let hub = hub(provider());
        let (subscriber, mut rx) = Subscriber::channel(8);
        hub.on_subscriber_connected(subscriber).await.unwrap();

        tokio::time::sleep(hub.config().refresh.delay + Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        let first = expect_snapshot(&mut rx);
        match rx.try_recv().unwrap().as_ref() {
            RateEvent::Update(changes) => {
                for entry in changes.iter() {
                    let before = first.get(&entry.code).unwrap();
                    assert!((entry.change - (entry.rate - before.rate)).abs() < 1e-12);
                }
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_during_refresh_gets_last_snapshot() {
        let provider = provider();
        let hub = hub_with(provider.clone(), false);
        let delay = hub.config().refresh.delay;

        let (a, mut rx_a) = Subscriber::channel(8);
        hub.on_subscriber_connected(a).await.unwrap();
        expect_snapshot(&mut rx_a);

        provider.set_latency(Duration::from_secs(5));
        provider.set_rates("USD", 1_700_000_060, &[("EUR", 0.95), ("GBP", 0.8)]);
        tokio::time::sleep(delay + Duration::from_secs(1)).await;
        assert_eq!(hub.scheduler_state(), SchedulerState::Running);

        let (b, mut rx_b) = Subscriber::channel(8);
        tokio::time::timeout(Duration::from_millis(10), hub.on_subscriber_connected(b))
            .await
            .expect("join waited for the refresh")
            .unwrap();

        let snapshot = expect_snapshot(&mut rx_b);
        assert_eq!(snapshot.get("EUR").unwrap().rate, 0.9);
        assert!(rx_b.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;

        for rx in [&mut rx_a, &mut rx_b] {
            let changes = expect_update(rx);
            assert_eq!(changes.len(), 1);
            assert!((changes.get("EUR").unwrap().change - 0.05).abs() < 1e-12);
        }
        assert_eq!(hub.scheduler_state(), SchedulerState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_last_subscriber_disarms() {
        let provider = provider();
        let hub = hub(provider.clone());
        let (subscriber, _rx) = Subscriber::channel(8);
        let id = subscriber.id();

        hub.on_subscriber_connected(subscriber).await.unwrap();
        hub.on_subscriber_disconnected(&id);
        hub.on_subscriber_disconnected(&id);

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.scheduler_state(), SchedulerState::Disarmed);

        tokio::time::sleep(hub.config().refresh.delay * 3).await;
        assert_eq!(hub.cache().stats().refreshes, 1);
        assert_eq!(provider.latest_calls(), 1);
    }
}
