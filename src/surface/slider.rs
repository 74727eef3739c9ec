//! Slider surface - in-memory bank of bounded sliders
//!
//! Mirrors a toolkit slider widget: moving it emits a change signal only
//! when the value actually changes, and a programmatic write is silent.
//! Counters make the echo behavior observable in tests and in the REPL.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use super::{PresentationSurface, SubscriptionId, UserChangeCallback};
use crate::channel::{ChannelBounds, ChannelId};
use crate::config::ChannelsConfig;
use crate::status::ConnectionStatus;

#[derive(Debug, Clone, Copy)]
struct Slider {
    bounds: ChannelBounds,
    value: i32,
    programmatic_writes: u64,
    user_events: u64,
}

/// One slider per channel
pub struct SliderSurface {
    sliders: Mutex<[Slider; ChannelId::COUNT]>,
    listeners: RwLock<Vec<(SubscriptionId, UserChangeCallback)>>,
    next_subscription: AtomicU64,
    status: RwLock<ConnectionStatus>,
}

impl SliderSurface {
    /// Create sliders positioned at each channel's minimum
    pub fn new(channels: ChannelsConfig) -> Self {
        let sliders = ChannelId::ALL.map(|ch| {
            let bounds = channels.get(ch);
            Slider {
                bounds,
                value: bounds.min,
                programmatic_writes: 0,
                user_events: 0,
            }
        });
        Self {
            sliders: Mutex::new(sliders),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            status: RwLock::new(ConnectionStatus::Disconnected),
        }
    }

    /// Simulate the user dragging a slider to `value` (clamped to its range)
    pub fn move_slider(&self, channel: ChannelId, value: i32) {
        self.set_value(channel, value, false);
    }

    /// Current slider position
    pub fn value(&self, channel: ChannelId) -> i32 {
        self.sliders.lock()[channel.index()].value
    }

    /// Number of programmatic writes received for a channel
    pub fn programmatic_writes(&self, channel: ChannelId) -> u64 {
        self.sliders.lock()[channel.index()].programmatic_writes
    }

    /// Number of user-change notifications emitted for a channel
    pub fn user_events(&self, channel: ChannelId) -> u64 {
        self.sliders.lock()[channel.index()].user_events
    }

    /// Number of registered user-change listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Last rendered connection status
    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.read().clone()
    }

    fn emit(&self, channel: ChannelId, value: i32) {
        // Listeners may call back into this surface; never hold a lock here
        let listeners: Vec<UserChangeCallback> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(channel, value);
        }
    }
}

impl PresentationSurface for SliderSurface {
    fn subscribe_user_changes(&self, callback: UserChangeCallback) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, callback));
        id
    }

    fn unsubscribe_user_changes(&self, id: SubscriptionId) {
        self.listeners.write().retain(|(existing, _)| *existing != id);
    }

    fn set_value(&self, channel: ChannelId, value: i32, programmatic: bool) {
        let changed = {
            let mut sliders = self.sliders.lock();
            let slider = &mut sliders[channel.index()];
            let value = slider.bounds.clamp(value);
            let changed = slider.value != value;
            slider.value = value;
            if programmatic {
                slider.programmatic_writes += 1;
            } else if changed {
                slider.user_events += 1;
            }
            changed.then_some(value)
        };

        match changed {
            Some(value) if !programmatic => self.emit(channel, value),
            Some(value) => trace!("Slider {} set to {} (programmatic)", channel, value),
            None => {}
        }
    }

    fn set_connection_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }
}
