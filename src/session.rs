//! Sync session - channel state for one device connection
//!
//! A session is created from a fresh device read on every connect and
//! discarded on disconnect. Nothing in it outlives the connection.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::channel::{ChannelBounds, ChannelId, ChannelReadings, ChannelState};
use crate::config::ChannelsConfig;
use crate::error::{SyncError, SyncResult};
use crate::status::RoasterState;

/// Point-in-time view of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    pub channel: ChannelId,
    pub value: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<i32>,
    pub bounds: ChannelBounds,
}

/// Channel set of one connection
#[derive(Debug)]
pub struct SyncSession {
    id: u64,
    started: Instant,
    channels: BTreeMap<ChannelId, ChannelState>,
    /// Last phase reported by the device, if it reports one
    roaster_state: Option<RoasterState>,
}

impl SyncSession {
    /// Build a session primed from a device read.
    ///
    /// Every channel must be present in `readings`; a partial read is
    /// treated as the device being unavailable.
    pub fn prime(id: u64, bounds: &ChannelsConfig, readings: &ChannelReadings) -> SyncResult<Self> {
        let mut channels = BTreeMap::new();
        for channel in ChannelId::ALL {
            let value = readings.get(&channel).copied().ok_or_else(|| {
                SyncError::unavailable(format!("initial read is missing {}", channel))
            })?;
            let channel_bounds = bounds.get(channel);
            if !channel_bounds.contains(value) {
                warn!(
                    "Initial read {}={} outside {}..={}, clamping",
                    channel, value, channel_bounds.min, channel_bounds.max
                );
            }
            channels.insert(channel, ChannelState::new(channel, channel_bounds, value));
        }

        Ok(Self {
            id,
            started: Instant::now(),
            channels,
            roaster_state: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Time since the session was primed
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelState> {
        self.channels.get(&channel)
    }

    pub fn channel_mut(&mut self, channel: ChannelId) -> Option<&mut ChannelState> {
        self.channels.get_mut(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelState> {
        self.channels.values()
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut ChannelState> {
        self.channels.values_mut()
    }

    pub fn roaster_state(&self) -> Option<RoasterState> {
        self.roaster_state
    }

    /// Record the latest reported phase. Returns true when it changed.
    pub fn set_roaster_state(&mut self, state: Option<RoasterState>) -> bool {
        let changed = self.roaster_state != state;
        self.roaster_state = state;
        changed
    }

    /// Current values, in channel order
    pub fn values(&self) -> Vec<(ChannelId, i32)> {
        self.channels().map(|ch| (ch.id(), ch.read())).collect()
    }

    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        self.channels()
            .map(|ch| ChannelSnapshot {
                channel: ch.id(),
                value: ch.read(),
                pending: ch.pending(),
                bounds: ch.bounds(),
            })
            .collect()
    }
}
