//! Fan-out of rate events to subscribers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use ratecast_common::{RateChangeSet, RateEvent, RateSnapshot};

use crate::error::HubError;
use crate::metrics::SharedMetrics;
use crate::registry::{DeliveryFailure, Subscriber, SubscriberRegistry};

/// Result of pushing one event to every subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers the event was queued for.
    pub delivered: usize,
    /// Subscribers whose queue was full or closed.
    pub dropped: usize,
}

/// Queues events on subscriber channels without ever waiting on a slow one.
pub struct BroadcastDispatcher {
    registry: Arc<SubscriberRegistry>,
    metrics: SharedMetrics,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over a registry.
    pub fn new(registry: Arc<SubscriberRegistry>, metrics: SharedMetrics) -> Self {
        Self { registry, metrics }
    }

    /// Send the full snapshot to a single subscriber.
    pub fn send_snapshot(&self, subscriber: &Subscriber, snapshot: &RateSnapshot) -> bool {
        self.deliver(subscriber, Arc::new(RateEvent::Snapshot(snapshot.clone())))
    }

    /// Send an error event to a single subscriber.
    pub fn send_error(&self, subscriber: &Subscriber, error: &HubError) -> bool {
        let event = RateEvent::error(error.error_code(), error.to_string());
        self.deliver(subscriber, Arc::new(event))
    }

    /// Send a change set to everyone registered. Empty sets are not sent.
    pub fn broadcast(&self, changes: RateChangeSet) -> DeliveryReport {
        if changes.is_empty() {
            return DeliveryReport::default();
        }

        let changed = changes.len();
        let event = Arc::new(RateEvent::Update(changes));
        let mut report = DeliveryReport::default();

        self.registry.for_each(|subscriber| {
            if self.deliver(subscriber, event.clone()) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }
        });

        if report.delivered > 0 {
            self.metrics.update_broadcast();
        }
        info!(
            changed,
            delivered = report.delivered,
            dropped = report.dropped,
            "Update broadcast"
        );

        report
    }

    fn deliver(&self, subscriber: &Subscriber, event: Arc<RateEvent>) -> bool {
        let kind = event.kind();
        match subscriber.try_deliver(event) {
            Ok(()) => {
                self.metrics.event_delivered();
                debug!(subscriber_id = %subscriber.id(), event = kind, "Event queued");
                true
            }
            Err(DeliveryFailure::Full) => {
                self.metrics.event_dropped();
                warn!(
                    subscriber_id = %subscriber.id(),
                    event = kind,
                    "Subscriber queue full, event dropped"
                );
                false
            }
            Err(DeliveryFailure::Closed) => {
                self.metrics.event_dropped();
                debug!(
                    subscriber_id = %subscriber.id(),
                    event = kind,
                    "Subscriber gone, event dropped"
                );
                false
            }
        }
    }
}
