//! Ratecast Common Types
//!
//! This crate contains the types shared across the Ratecast workspace:
//! subscriber identifiers, the exchange-rate data model and the events
//! pushed to real-time subscribers.

pub mod identifiers;
pub mod rates;
pub mod events;
pub mod time;

pub use identifiers::*;
pub use rates::*;
pub use events::*;
pub use time::*;
