//! Shared sync context
//!
//! Everything the controller, its handles, the surface callback and the poll
//! loop need to reach. The session mutex is held for one reconcile or one
//! command submission at a time, never across an `.await`, and surface
//! writes happen only after it is released.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::channel::{ChangeOutcome, ChannelId, ChannelReadings};
use crate::command_queue::CommandQueue;
use crate::config::SyncConfig;
use crate::echo_guard::EchoGuard;
use crate::error::{SyncError, SyncResult};
use crate::session::{ChannelSnapshot, SyncSession};
use crate::status::{ConnectionStatus, EventCallback, RoasterState, StatusCallback, SyncEvent};
use crate::surface::PresentationSurface;
use crate::transport::DeviceTransport;

pub(crate) struct SyncContext {
    pub(crate) config: SyncConfig,
    pub(crate) transport: Arc<dyn DeviceTransport>,
    pub(crate) surface: Arc<dyn PresentationSurface>,
    pub(crate) echo_guard: EchoGuard,
    pub(crate) queue: CommandQueue,
    /// Active session; None while disconnected
    pub(crate) session: Mutex<Option<SyncSession>>,
    /// Serializes ticks; a tick that cannot take it is skipped
    pub(crate) tick_gate: tokio::sync::Mutex<()>,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    status: RwLock<ConnectionStatus>,
    status_callbacks: RwLock<Vec<StatusCallback>>,
    event_callbacks: RwLock<Vec<EventCallback>>,
}

impl SyncContext {
    pub(crate) fn new(
        config: SyncConfig,
        transport: Arc<dyn DeviceTransport>,
        surface: Arc<dyn PresentationSurface>,
        events_tx: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        let queue = CommandQueue::new(config.channels, config.command_retry_count);
        Self {
            config,
            transport,
            surface,
            echo_guard: EchoGuard::new(),
            queue,
            session: Mutex::new(None),
            tick_gate: tokio::sync::Mutex::new(()),
            events_tx,
            status: RwLock::new(ConnectionStatus::Disconnected),
            status_callbacks: RwLock::new(Vec::new()),
            event_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Accept a user-initiated value: optimistic update, then queue the write
    pub(crate) fn user_input(&self, channel: ChannelId, value: i32) -> SyncResult<()> {
        self.config.channels.get(channel).check(channel, value)?;

        let mut guard = self.session.lock();
        let session = guard
            .as_mut()
            .ok_or_else(|| SyncError::unavailable("roaster not connected"))?;
        let state = session
            .channel_mut(channel)
            .ok_or_else(|| SyncError::unavailable(format!("{} missing from session", channel)))?;

        state.mark_pending_write(value)?;
        self.queue.submit(channel, value)?;
        debug!("🎚️  User set {} = {}", channel, value);
        Ok(())
    }

    /// Reconcile a batch of readings against the session.
    ///
    /// Returns the values the surface must show. Channels with a command
    /// still waiting in the queue are left alone this round: the device
    /// cannot reflect a write that has not been sent yet.
    pub(crate) fn reconcile(
        &self,
        readings: &ChannelReadings,
    ) -> SyncResult<(Vec<(ChannelId, ChangeOutcome)>, Vec<(ChannelId, i32)>)> {
        let mut guard = self.session.lock();
        let session = guard
            .as_mut()
            .ok_or_else(|| SyncError::unavailable("no active session"))?;

        let mut outcomes = Vec::new();
        let mut updates = Vec::new();
        for state in session.channels_mut() {
            let channel = state.id();
            let Some(&value) = readings.get(&channel) else {
                warn!("Device reading is missing {}", channel);
                continue;
            };
            if self.queue.is_queued(channel) {
                trace!("Skipping {}: command still queued", channel);
                continue;
            }
            if !state.bounds().contains(value) {
                warn!(
                    "Device reported {}={} outside {}..={}, clamping",
                    channel,
                    value,
                    state.bounds().min,
                    state.bounds().max
                );
            }

            let outcome = state.reconcile(value);
            match outcome {
                ChangeOutcome::NoChange => {}
                ChangeOutcome::ConfirmedPending => {
                    debug!("✅ {} confirmed at {}", channel, state.read());
                }
                ChangeOutcome::ExternalChange { old, new } => {
                    debug!("🔘 {} changed on device: {} -> {}", channel, old, new);
                    updates.push((channel, new));
                }
            }
            outcomes.push((channel, outcome));
        }

        Ok((outcomes, updates))
    }

    /// Write values to the surface with echo suppression
    pub(crate) fn push_to_surface(&self, updates: &[(ChannelId, i32)]) {
        for &(channel, value) in updates {
            self.echo_guard.with_suppressed(channel, || {
                self.surface.set_value(channel, value, true);
            });
        }
    }

    /// Surface-facing entry point for user changes
    pub(crate) fn on_surface_change(&self, channel: ChannelId, value: i32) {
        if self.echo_guard.is_suppressed(channel) {
            trace!("Suppressed echo on {} ({})", channel, value);
            return;
        }
        if let Err(e) = self.user_input(channel, value) {
            warn!("Ignoring user change {}={}: {}", channel, value, e);
        }
    }

    /// Store the phase read this tick, logging transitions
    pub(crate) fn update_roaster_state(&self, state: Option<RoasterState>) {
        let changed = match self.session.lock().as_mut() {
            Some(session) => session.set_roaster_state(state),
            None => false,
        };
        if changed {
            if let Some(state) = state {
                info!("🔥 Roaster {}", state);
            }
        }
    }

    pub(crate) fn roaster_state(&self) -> Option<RoasterState> {
        self.session.lock().as_ref().and_then(SyncSession::roaster_state)
    }

    pub(crate) fn snapshot(&self) -> Option<Vec<ChannelSnapshot>> {
        self.session.lock().as_ref().map(SyncSession::snapshot)
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.status.read().clone()
    }

    /// Emit connection status to the surface and all subscribers
    pub(crate) fn emit_status(&self, status: ConnectionStatus) {
        *self.status.write() = status.clone();
        self.surface.set_connection_status(status.clone());
        let callbacks = self.status_callbacks.read().clone();
        for callback in callbacks {
            callback(status.clone());
        }
    }

    pub(crate) fn subscribe_status(&self, callback: StatusCallback) {
        self.status_callbacks.write().push(callback);
    }

    pub(crate) fn subscribe_events(&self, callback: EventCallback) {
        self.event_callbacks.write().push(callback);
    }

    /// Notify subscribers. Only `DeviceLost` goes on to the supervisor
    /// loop, so the channel stays empty when nobody drains it.
    pub(crate) fn publish(&self, event: SyncEvent) {
        let callbacks = self.event_callbacks.read().clone();
        for callback in callbacks {
            callback(&event);
        }
        if matches!(event, SyncEvent::DeviceLost { .. }) {
            // The receiver is gone once the controller is dropped
            let _ = self.events_tx.send(event);
        }
    }
}
