//! Refresh scheduler state definitions.

/// Scheduler lifecycle state.
///
/// At most one refresh timer is pending and at most one cycle runs at a
/// time. `Disarmed` is the only state in which zero subscribers is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    /// No timer pending and no cycle running.
    #[default]
    Disarmed,
    /// A refresh timer is pending.
    Armed,
    /// A refresh cycle is in progress.
    Running,
}

impl SchedulerState {
    /// Check if a timer is pending.
    pub fn is_armed(&self) -> bool {
        matches!(self, SchedulerState::Armed)
    }

    /// Name used in logs and health output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Disarmed => "disarmed",
            SchedulerState::Armed => "armed",
            SchedulerState::Running => "running",
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a fired timer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Changes were broadcast to this many subscribers.
    Broadcast(usize),
    /// The refresh succeeded but nothing moved.
    Unchanged,
    /// The refresh failed; the previous snapshot stays current.
    Failed,
    /// The timer was stale or cancelled.
    Skipped,
}
