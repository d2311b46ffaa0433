//! Demand-driven refresh scheduling.
//!
//! A single timer is pending while anyone is subscribed. When it fires the
//! cache is refreshed, the movement is broadcast, and the next timer is armed
//! if subscribers remain. The last subscriber leaving cancels the pending
//! timer, so an empty hub makes no upstream calls.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use ratecast_fx::RateCache;

use crate::config::RefreshConfig;
use crate::dispatcher::BroadcastDispatcher;
use crate::metrics::SharedMetrics;
use crate::registry::SubscriberRegistry;
use crate::state::{CycleOutcome, SchedulerState};

/// A timer that has been armed but has not fired.
struct PendingRefresh {
    generation: u64,
    token: CancellationToken,
}

struct Slot {
    state: SchedulerState,
    pending: Option<PendingRefresh>,
    generation: u64,
    shutdown: bool,
}

struct SchedulerInner {
    cache: Arc<RateCache>,
    registry: Arc<SubscriberRegistry>,
    dispatcher: Arc<BroadcastDispatcher>,
    metrics: SharedMetrics,
    delay: Duration,
    simulate: bool,
    slot: Mutex<Slot>,
}

/// Arms, cancels and runs refresh cycles according to subscriber demand.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

impl RefreshScheduler {
    /// Create a disarmed scheduler.
    pub fn new(
        cache: Arc<RateCache>,
        registry: Arc<SubscriberRegistry>,
        dispatcher: Arc<BroadcastDispatcher>,
        metrics: SharedMetrics,
        config: &RefreshConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cache,
                registry,
                dispatcher,
                metrics,
                delay: config.delay,
                simulate: config.refresh_simulate,
                slot: Mutex::new(Slot {
                    state: SchedulerState::Disarmed,
                    pending: None,
                    generation: 0,
                    shutdown: false,
                }),
            }),
        }
    }

    /// Current scheduler state.
    pub fn state(&self) -> SchedulerState {
        self.inner.slot.lock().state
    }

    /// Bring the timer in line with the subscriber count.
    ///
    /// Call after every registry change. Arms when idle with subscribers,
    /// cancels when armed with none, and leaves a running cycle alone: it
    /// re-checks demand when it finishes.
    pub fn sync_with_demand(&self) -> SchedulerState {
        let mut slot = self.inner.slot.lock();
        if slot.shutdown {
            return slot.state;
        }

        let subscribers = self.inner.registry.count();
        match slot.state {
            SchedulerState::Disarmed if subscribers > 0 => {
                arm(&self.inner, &mut slot);
            }
            SchedulerState::Armed if subscribers == 0 => {
                cancel(&self.inner, &mut slot);
                info!("No subscribers left, refresh timer cancelled");
            }
            _ => {}
        }
        slot.state
    }

    /// Run the cycle for a timer generation.
    ///
    /// A stale generation, or a timer that has been cancelled, is skipped.
    pub async fn fire(&self, generation: u64) -> CycleOutcome {
        run_cycle(self.inner.clone(), generation).await
    }

    /// Cancel any pending timer and stop arming new ones.
    ///
    /// A cycle already running completes but does not re-arm.
    pub fn shutdown(&self) {
        let mut slot = self.inner.slot.lock();
        slot.shutdown = true;
        if slot.state.is_armed() {
            cancel(&self.inner, &mut slot);
        }
        info!(state = %slot.state, "Refresh scheduler shut down");
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.inner.slot.lock().generation
    }
}

fn arm(inner: &Arc<SchedulerInner>, slot: &mut Slot) {
    slot.generation += 1;
    let generation = slot.generation;
    let token = CancellationToken::new();

    slot.pending = Some(PendingRefresh {
        generation,
        token: token.clone(),
    });
    slot.state = SchedulerState::Armed;
    inner.metrics.timer_armed();

    debug!(generation, delay = ?inner.delay, "Refresh timer armed");

    let task_inner = inner.clone();
    let delay = inner.delay;
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(generation, "Refresh timer cancelled");
            }
            _ = tokio::time::sleep(delay) => {
                run_cycle(task_inner, generation).await;
            }
        }
    });
}

fn cancel(inner: &SchedulerInner, slot: &mut Slot) {
    if let Some(pending) = slot.pending.take() {
        pending.token.cancel();
        inner.metrics.timer_cancelled();
        debug!(generation = pending.generation, "Cancelling refresh timer");
    }
    slot.state = SchedulerState::Disarmed;
}

#[instrument(skip(inner))]
async fn run_cycle(inner: Arc<SchedulerInner>, generation: u64) -> CycleOutcome {
    {
        let mut slot = inner.slot.lock();
        let current = slot.pending.as_ref().map(|p| p.generation);
        if slot.state != SchedulerState::Armed || current != Some(generation) {
            debug!(?current, state = %slot.state, "Stale refresh timer skipped");
            return CycleOutcome::Skipped;
        }
        slot.pending = None;
        slot.state = SchedulerState::Running;
    }

    inner.metrics.refresh_started();

    let outcome = match inner.cache.refresh(inner.simulate).await {
        Ok(changes) if changes.is_empty() => {
            debug!("Refresh produced no movement");
            CycleOutcome::Unchanged
        }
        Ok(changes) => {
            let report = inner.dispatcher.broadcast(changes);
            CycleOutcome::Broadcast(report.delivered)
        }
        Err(e) => {
            inner.metrics.refresh_failed();
            warn!(
                error = %e,
                code = e.error_code(),
                "Refresh cycle failed, keeping previous snapshot"
            );
            CycleOutcome::Failed
        }
    };

    let mut slot = inner.slot.lock();
    slot.state = SchedulerState::Disarmed;
    if !slot.shutdown && inner.registry.count() > 0 {
        arm(&inner, &mut slot);
    } else {
        info!("Refresh cycle finished with no demand, scheduler disarmed");
    }

    outcome
}
