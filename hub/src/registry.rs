//! Subscriber registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use ratecast_common::{RateEvent, SubscriberId};

/// Channel end used to push events to one subscriber.
pub type EventSender = mpsc::Sender<Arc<RateEvent>>;

/// Channel end a transport drains to write events out.
pub type EventReceiver = mpsc::Receiver<Arc<RateEvent>>;

/// Why an event could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The subscriber is not keeping up.
    Full,
    /// The subscriber's transport has gone away.
    Closed,
}

/// A connected real-time subscriber.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sender: EventSender,
}

impl Subscriber {
    /// Wrap an existing sender.
    pub fn new(id: SubscriberId, sender: EventSender) -> Self {
        Self { id, sender }
    }

    /// Create a subscriber with a fresh id and a bounded event queue.
    pub fn channel(buffer: usize) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(SubscriberId::new(), tx), rx)
    }

    /// Subscriber id.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queue an event without waiting.
    pub fn try_deliver(&self, event: Arc<RateEvent>) -> Result<(), DeliveryFailure> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }

    /// Check if the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The set of currently connected subscribers.
///
/// Membership changes take the write lock. Broadcasts iterate over a copy of
/// the membership, so subscribers may join or leave while one is in progress.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    members: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Returns `false` if it was already present.
    pub fn add(&self, subscriber: Subscriber) -> bool {
        self.add_with(subscriber, |_| {})
    }

    /// Register a subscriber, running `on_admit` before anyone else can see
    /// the new membership.
    ///
    /// `on_admit` is not called for a subscriber that is already present.
    pub fn add_with(&self, subscriber: Subscriber, on_admit: impl FnOnce(&Subscriber)) -> bool {
        let mut members = self.members.write();
        let id = subscriber.id();
        if members.contains_key(&id) {
            debug!(subscriber_id = %id, "Subscriber already registered");
            return false;
        }

        on_admit(&subscriber);

        members.insert(id, subscriber);
        info!(subscriber_id = %id, subscribers = members.len(), "Subscriber registered");
        true
    }

    /// Unregister a subscriber. Returns `false` if it was not present.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let mut members = self.members.write();
        match members.remove(id) {
            Some(_) => {
                info!(subscriber_id = %id, subscribers = members.len(), "Subscriber unregistered");
                true
            }
            None => false,
        }
    }

    /// Number of registered subscribers.
    pub fn count(&self) -> usize {
        self.members.read().len()
    }

    /// Check if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Check if a subscriber is registered.
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.members.read().contains_key(id)
    }

    /// Copy of the current membership.
    pub fn members(&self) -> Vec<Subscriber> {
        self.members.read().values().cloned().collect()
    }

    /// Visit every subscriber registered when the call started.
    ///
    /// The callback may add or remove subscribers.
    pub fn for_each(&self, mut f: impl FnMut(&Subscriber)) {
        for subscriber in self.members() {
            f(&subscriber);
        }
    }
}
