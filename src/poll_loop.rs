//! Poll loop - fixed-interval device reconciliation
//!
//! Each tick drains the command queue, reads every channel in one batch,
//! reconciles the readings against the session and pushes hardware-originated
//! changes to the surface through the echo guard.
//!
//! ## Lifecycle
//! `Stopped -> Polling` on `start()`, `Polling -> Draining -> Stopped` on
//! `stop()`. A tick that finds the device gone stops the loop by itself and
//! reports `SyncEvent::DeviceLost` to the controller.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::channel::{ChangeOutcome, ChannelId};
use crate::command_queue::FlushReport;
use crate::controller::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::status::{RoasterState, SyncEvent};

/// Poll loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Stopped,
    Polling,
    /// Stop requested; the in-flight tick is finishing
    Draining,
}

/// What one tick did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    /// Another tick was still running, nothing was done
    pub skipped: bool,
    pub commands: FlushReport,
    pub outcomes: Vec<(ChannelId, ChangeOutcome)>,
    pub surface_writes: usize,
    pub roaster_state: Option<RoasterState>,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn outcome(&self, channel: ChannelId) -> Option<ChangeOutcome> {
        self.outcomes
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, outcome)| *outcome)
    }
}

/// Run one reconciliation tick.
///
/// Ticks are serialized by the context's tick gate; if one is already
/// running this returns a skipped report instead of waiting.
pub(crate) async fn run_tick(ctx: &SyncContext) -> SyncResult<TickReport> {
    let Ok(_gate) = ctx.tick_gate.try_lock() else {
        trace!("Tick skipped: previous tick still running");
        return Ok(TickReport::skipped());
    };

    let commands = ctx.queue.flush(ctx.transport.as_ref()).await;
    // Report every dropped command, including those lost to a disconnect
    for failure in &commands.failed {
        ctx.publish(SyncEvent::CommandFailed {
            channel: failure.channel,
            value: failure.value,
            attempts: failure.attempts,
            error: failure.error.clone(),
        });
    }
    if let Some(error) = commands.disconnect_error() {
        return Err(error.clone());
    }

    if !ctx.transport.is_connected() {
        return Err(SyncError::unavailable("transport reports disconnected"));
    }
    let readings = ctx.transport.read_channels().await?;
    let roaster_state = ctx.transport.read_state().await?;
    ctx.update_roaster_state(roaster_state);

    let (outcomes, updates) = ctx.reconcile(&readings)?;
    ctx.push_to_surface(&updates);

    Ok(TickReport {
        skipped: false,
        commands,
        outcomes,
        surface_writes: updates.len(),
        roaster_state,
    })
}

/// Fixed-interval driver for `run_tick`
pub struct PollLoop {
    period: Duration,
    state: Arc<Mutex<PollState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: Arc::new(Mutex::new(PollState::Stopped)),
            shutdown_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.lock()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Begin ticking. The first tick fires one period from now.
    pub(crate) fn start(&mut self, ctx: Arc<SyncContext>) {
        if self.state() != PollState::Stopped {
            debug!("Poll loop already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let state = Arc::clone(&self.state);
        let period = self.period;
        *state.lock() = PollState::Polling;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            // Late ticks are dropped, never queued
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                match run_tick(&ctx).await {
                    Ok(report) => {
                        if report.surface_writes > 0 {
                            trace!("Tick pushed {} value(s) to the surface", report.surface_writes);
                        }
                    }
                    Err(e) if e.is_disconnect() => {
                        warn!("🔌 Device lost during poll: {}", e);
                        *state.lock() = PollState::Stopped;
                        ctx.publish(SyncEvent::DeviceLost {
                            reason: e.to_string(),
                        });
                        return;
                    }
                    Err(e) => {
                        warn!("Poll tick failed: {}", e);
                    }
                }
            }

            *state.lock() = PollState::Stopped;
            debug!("Poll loop exited");
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        info!("▶️  Poll loop started ({}ms)", period.as_millis());
    }

    /// Stop ticking, letting an in-flight tick finish first
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            *self.state.lock() = PollState::Stopped;
            return;
        };

        {
            let mut state = self.state.lock();
            if *state == PollState::Polling {
                *state = PollState::Draining;
            }
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Err(e) = handle.await {
            warn!("Poll loop task ended abnormally: {}", e);
        }

        *self.state.lock() = PollState::Stopped;
        info!("⏹️  Poll loop stopped");
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
