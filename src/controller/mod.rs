//! Sync controller - connection lifecycle and wiring
//!
//! Owns the active session (through the shared context) and the poll loop.
//! User changes from the surface go straight into the context; device loss
//! comes back from the poll loop as an event and is handled by the
//! supervisor loop in [`SyncController::run`], which also reconnects.
//!
//! ```text
//!  surface ──user change──▶ SyncContext::user_input ──▶ CommandQueue
//!     ▲                                                      │ drained per tick
//!     │ set_value(programmatic) via EchoGuard                ▼
//!  SyncContext::reconcile ◀──── PollLoop tick ◀──── DeviceTransport
//! ```

mod context;
mod handle;

#[cfg(test)]
mod tests;

pub(crate) use context::SyncContext;
pub use handle::SyncHandle;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::channel::ChannelId;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::poll_loop::{run_tick, PollLoop, PollState, TickReport};
use crate::session::{ChannelSnapshot, SyncSession};
use crate::status::{ConnectionStatus, EventCallback, RoasterState, StatusCallback, SyncEvent};
use crate::surface::{PresentationSurface, SubscriptionId};
use crate::transport::DeviceTransport;

/// Top-level orchestrator for one device
///
/// Dropping the controller removes its listener from the surface, so a
/// surface can be handed to a new controller afterwards.
pub struct SyncController {
    ctx: Arc<SyncContext>,
    surface: Arc<dyn PresentationSurface>,
    subscription: SubscriptionId,
    poll_loop: PollLoop,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    next_session_id: u64,
}

impl SyncController {
    /// Create a controller and subscribe it to the surface's user changes
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn DeviceTransport>,
        surface: Arc<dyn PresentationSurface>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let poll_loop = PollLoop::new(config.poll_interval());
        let ctx = Arc::new(SyncContext::new(
            config,
            transport,
            Arc::clone(&surface),
            events_tx,
        ));

        // Weak: the context holds the surface, not the other way around
        let weak = Arc::downgrade(&ctx);
        let subscription =
            surface.subscribe_user_changes(Arc::new(move |channel: ChannelId, value: i32| {
                if let Some(ctx) = weak.upgrade() {
                    ctx.on_surface_change(channel, value);
                }
            }));

        Self {
            ctx,
            surface,
            subscription,
            poll_loop,
            events_rx,
            next_session_id: 0,
        }
    }

    /// Cloneable handle for user input and status queries
    pub fn handle(&self) -> SyncHandle {
        SyncHandle::new(Arc::clone(&self.ctx))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.ctx.status()
    }

    pub fn poll_state(&self) -> PollState {
        self.poll_loop.state()
    }

    /// True while a session is active
    pub fn is_connected(&self) -> bool {
        self.ctx.session.lock().is_some()
    }

    /// Id of the active session (increments on every connect)
    pub fn session_id(&self) -> Option<u64> {
        self.ctx.session.lock().as_ref().map(SyncSession::id)
    }

    pub fn snapshot(&self) -> Option<Vec<ChannelSnapshot>> {
        self.ctx.snapshot()
    }

    /// Operating phase from the latest read; `None` while disconnected
    pub fn roaster_state(&self) -> Option<RoasterState> {
        self.ctx.roaster_state()
    }

    pub fn subscribe_status(&self, callback: StatusCallback) {
        self.ctx.subscribe_status(callback);
    }

    pub fn subscribe_events(&self, callback: EventCallback) {
        self.ctx.subscribe_events(callback);
    }

    /// Apply a user-initiated value. Never goes through the echo guard.
    pub fn on_user_input(&self, channel: ChannelId, value: i32) -> SyncResult<()> {
        self.ctx.user_input(channel, value)
    }

    /// Open the transport and run the initial sync
    pub async fn connect(&mut self) -> SyncResult<()> {
        self.ctx.transport.connect().await?;
        if let Err(e) = self.on_connect().await {
            self.ctx.transport.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    /// Start a fresh session on an open transport.
    ///
    /// The surface is made to match the device before polling begins,
    /// never the other way around.
    pub async fn on_connect(&mut self) -> SyncResult<()> {
        self.poll_loop.stop().await;

        let readings = self.ctx.transport.read_channels().await?;
        self.next_session_id += 1;
        let mut session =
            SyncSession::prime(self.next_session_id, &self.ctx.config.channels, &readings)?;
        session.set_roaster_state(self.ctx.transport.read_state().await?);
        let values = session.values();

        self.ctx.queue.clear();
        *self.ctx.session.lock() = Some(session);
        self.ctx.push_to_surface(&values);

        info!(
            "✅ Connected to '{}' (session #{}): {}",
            self.ctx.transport.name(),
            self.next_session_id,
            values
                .iter()
                .map(|(ch, v)| format!("{}={}", ch, v))
                .collect::<Vec<_>>()
                .join(" ")
        );

        self.ctx.emit_status(ConnectionStatus::Connected);
        self.poll_loop.start(Arc::clone(&self.ctx));
        Ok(())
    }

    /// Stop polling and discard the session. The surface keeps its last values.
    pub async fn on_disconnect(&mut self) {
        self.poll_loop.stop().await;

        let discarded = self.ctx.session.lock().take();
        let dropped = self.ctx.queue.clear();
        self.ctx.transport.disconnect().await;

        if let Some(session) = discarded {
            info!(
                "🔌 Session #{} closed after {:.1}s",
                session.id(),
                session.age().as_secs_f32()
            );
        }
        if dropped > 0 {
            debug!("Discarded {} unsent command(s)", dropped);
        }

        self.ctx.emit_status(ConnectionStatus::Disconnected);
    }

    /// Run a single tick immediately, outside the timer
    pub async fn poll_once(&self) -> SyncResult<TickReport> {
        run_tick(&self.ctx).await
    }

    /// Wait for the next device loss reported by the poll loop.
    ///
    /// `CommandFailed` never arrives here; use `subscribe_events` for it.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events_rx.recv().await
    }

    /// React to a poll loop event
    pub async fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::DeviceLost { reason } => {
                warn!("Device lost: {}", reason);
                self.on_disconnect().await;
            }
            SyncEvent::CommandFailed {
                channel,
                value,
                attempts,
                error,
            } => {
                debug!(
                    "{}={} not applied after {} attempt(s): {}",
                    channel, value, attempts, error
                );
            }
        }
    }

    /// Connect, retrying with linear backoff until it succeeds
    async fn connect_with_backoff(&mut self) {
        let mut attempt = 0usize;
        loop {
            if attempt > 0 {
                let delay = self.ctx.config.reconnect.delay_for(attempt);
                debug!("⏳ Reconnect #{} in {}ms", attempt, delay.as_millis());
                self.ctx
                    .emit_status(ConnectionStatus::Reconnecting { attempt });
                sleep(delay).await;
            }

            match self.connect().await {
                Ok(()) => return,
                Err(e) => {
                    debug!("Connect attempt #{} failed: {}", attempt + 1, e);
                    attempt += 1;
                }
            }
        }
    }

    /// Supervisor loop: connect, react to events, reconnect after loss.
    ///
    /// Returns once `shutdown` completes, leaving the device disconnected.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!("Starting sync controller...");

        loop {
            if !self.is_connected() {
                tokio::select! {
                    _ = self.connect_with_backoff() => {}
                    _ = &mut shutdown => break,
                }
            }

            let event = tokio::select! {
                event = self.events_rx.recv() => event,
                _ = &mut shutdown => break,
            };

            match event {
                Some(event) => self.handle_event(event).await,
                None => break,
            }
        }

        info!("Sync controller shutting down");
        self.on_disconnect().await;
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.surface.unsubscribe_user_changes(self.subscription);
    }
}
