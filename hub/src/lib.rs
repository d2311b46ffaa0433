//! Ratecast Hub
//!
//! The hub keeps the latest exchange-rate snapshot, hands it to subscribers
//! as they join, and pushes the entries that moved to everyone on a
//! demand-driven refresh schedule. With no subscribers it makes no upstream
//! calls.

pub mod config;
pub mod error;
pub mod state;
pub mod metrics;
pub mod registry;
pub mod dispatcher;
pub mod scheduler;
pub mod hub;
pub mod gateway;

pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use hub::RateHub;
pub use registry::{Subscriber, SubscriberRegistry};
pub use scheduler::RefreshScheduler;
pub use state::{CycleOutcome, SchedulerState};
