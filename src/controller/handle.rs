//! Cloneable handle onto a running controller

use std::sync::Arc;

use super::SyncContext;
use crate::channel::ChannelId;
use crate::error::SyncResult;
use crate::session::ChannelSnapshot;
use crate::status::{ConnectionStatus, EventCallback, RoasterState, StatusCallback};

/// Handle for talking to a `SyncController` from other tasks.
///
/// Stays valid after the controller is moved into `run()`.
#[derive(Clone)]
pub struct SyncHandle {
    ctx: Arc<SyncContext>,
}

impl SyncHandle {
    pub(crate) fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Submit a user-initiated value (optimistic update + queued write)
    pub fn on_user_input(&self, channel: ChannelId, value: i32) -> SyncResult<()> {
        self.ctx.user_input(channel, value)
    }

    pub fn snapshot(&self) -> Option<Vec<ChannelSnapshot>> {
        self.ctx.snapshot()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.ctx.status()
    }

    pub fn roaster_state(&self) -> Option<RoasterState> {
        self.ctx.roaster_state()
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.session.lock().is_some()
    }

    /// Number of channels with a command waiting for the next tick
    pub fn queued_commands(&self) -> usize {
        self.ctx.queue.len()
    }

    pub fn subscribe_status(&self, callback: StatusCallback) {
        self.ctx.subscribe_status(callback);
    }

    pub fn subscribe_events(&self, callback: EventCallback) {
        self.ctx.subscribe_events(callback);
    }
}
