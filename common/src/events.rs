//! Events pushed to real-time subscribers.

use serde::{Deserialize, Serialize};

use crate::rates::{RateChangeSet, RateSnapshot};

/// Error payload sent when a subscriber cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// An event on the real-time channel.
///
/// Serialized as `{"event": "<kind>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RateEvent {
    /// Full snapshot, sent once to a subscriber when it joins.
    Snapshot(RateSnapshot),
    /// Entries that moved during the last refresh cycle, sent to everyone.
    Update(RateChangeSet),
    /// The subscriber could not be served.
    Error(EventError),
}

impl RateEvent {
    /// Build an error event.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        RateEvent::Error(EventError {
            code: code.into(),
            message: message.into(),
        })
    }

    /// Event name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RateEvent::Snapshot(_) => "snapshot",
            RateEvent::Update(_) => "update",
            RateEvent::Error(_) => "error",
        }
    }
}
