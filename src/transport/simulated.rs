//! Simulated roaster - in-memory transport for demos and tests
//!
//! Behaves like the firmware side of an Aillio R1: channels are clamped to
//! the panel limits, the +/- buttons on the unit change values behind the
//! host's back, and the USB cable can be pulled at any time.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info};

use super::DeviceTransport;
use crate::channel::{ChannelId, ChannelReadings};
use crate::config::ChannelsConfig;
use crate::error::{SyncError, SyncResult};
use crate::status::RoasterState;

struct SimState {
    /// Cable plugged in; `connect` fails otherwise
    plugged: bool,
    connected: bool,
    values: [i32; ChannelId::COUNT],
    roaster_state: RoasterState,
    rejecting: HashSet<ChannelId>,
    writes: Vec<(ChannelId, i32)>,
    reads: u64,
}

/// In-memory roaster implementing `DeviceTransport`
pub struct SimulatedRoaster {
    name: String,
    channels: ChannelsConfig,
    state: Mutex<SimState>,
}

impl SimulatedRoaster {
    /// Create a plugged-in, not yet connected roaster with every channel at its minimum
    pub fn new(channels: ChannelsConfig) -> Self {
        let values = ChannelId::ALL.map(|ch| channels.get(ch).min);
        Self {
            name: "simulated".to_string(),
            channels,
            state: Mutex::new(SimState {
                plugged: true,
                connected: false,
                values,
                roaster_state: RoasterState::Off,
                rejecting: HashSet::new(),
                writes: Vec::new(),
                reads: 0,
            }),
        }
    }

    /// Builder: start with specific firmware values
    pub fn with_values(self, heater: i32, fan: i32, drum: i32) -> Self {
        for (channel, value) in [
            (ChannelId::Heater, heater),
            (ChannelId::Fan, fan),
            (ChannelId::Drum, drum),
        ] {
            self.set_device_value(channel, value);
        }
        self
    }

    /// Current firmware value of a channel
    pub fn device_value(&self, channel: ChannelId) -> i32 {
        self.state.lock().values[channel.index()]
    }

    /// Overwrite a firmware value directly (clamped to the panel limits)
    pub fn set_device_value(&self, channel: ChannelId, value: i32) {
        let clamped = self.channels.get(channel).clamp(value);
        self.state.lock().values[channel.index()] = clamped;
    }

    /// Press a hardware button `delta` times (negative for the minus button)
    ///
    /// Returns the new firmware value. Presses past a limit are ignored, as
    /// on the unit.
    pub fn press(&self, channel: ChannelId, delta: i32) -> i32 {
        let bounds = self.channels.get(channel);
        let mut state = self.state.lock();
        let slot = &mut state.values[channel.index()];
        *slot = bounds.clamp(slot.saturating_add(delta));
        debug!("Hardware button: {} {:+} -> {}", channel, delta, *slot);
        *slot
    }

    /// Move the roaster to another operating phase, as its own buttons would
    pub fn set_state(&self, state: RoasterState) {
        self.state.lock().roaster_state = state;
        debug!("Simulated roaster now {}", state);
    }

    /// Pull the USB cable
    pub fn unplug(&self) {
        let mut state = self.state.lock();
        state.plugged = false;
        state.connected = false;
        info!("Simulated roaster unplugged");
    }

    /// Plug the cable back in. The host still has to `connect`.
    pub fn plug(&self) {
        self.state.lock().plugged = true;
        info!("Simulated roaster plugged in");
    }

    /// Make the firmware refuse (or accept again) writes to a channel
    pub fn set_rejecting(&self, channel: ChannelId, rejecting: bool) {
        let mut state = self.state.lock();
        if rejecting {
            state.rejecting.insert(channel);
        } else {
            state.rejecting.remove(&channel);
        }
    }

    /// Every accepted write, in order
    pub fn writes(&self) -> Vec<(ChannelId, i32)> {
        self.state.lock().writes.clone()
    }

    /// Number of successful batch reads
    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }
}

#[async_trait]
impl DeviceTransport for SimulatedRoaster {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> SyncResult<()> {
        let mut state = self.state.lock();
        if !state.plugged {
            return Err(SyncError::unavailable("roaster not found"));
        }
        state.connected = true;
        debug!("Simulated roaster connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn read_channels(&self) -> SyncResult<ChannelReadings> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(SyncError::unavailable("roaster not connected"));
        }
        state.reads += 1;
        Ok(ChannelId::ALL
            .iter()
            .map(|ch| (*ch, state.values[ch.index()]))
            .collect())
    }

    async fn write_channel(&self, channel: ChannelId, value: i32) -> SyncResult<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(SyncError::unavailable("roaster not connected"));
        }
        if state.rejecting.contains(&channel) {
            return Err(SyncError::DeviceRejected {
                channel,
                value,
                reason: "firmware refused command".to_string(),
            });
        }
        state.values[channel.index()] = self.channels.get(channel).clamp(value);
        state.writes.push((channel, value));
        Ok(())
    }

    async fn read_state(&self) -> SyncResult<Option<RoasterState>> {
        let state = self.state.lock();
        if !state.connected {
            return Err(SyncError::unavailable("roaster not connected"));
        }
        Ok(Some(state.roaster_state))
    }
}
