//! Per-channel control state
//!
//! A channel is one bounded integer quantity on the roaster (heater power,
//! fan speed, drum speed). `ChannelState` holds the synchronizer's best
//! knowledge of the device value plus the optional value of a write that has
//! been queued but not yet observed by a poll.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};

/// Controllable quantities on the roaster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    /// Heater power
    Heater,
    /// Fan speed
    Fan,
    /// Drum speed
    Drum,
}

impl ChannelId {
    /// All channels in display order
    pub const ALL: [ChannelId; Self::COUNT] = [ChannelId::Heater, ChannelId::Fan, ChannelId::Drum];

    pub const COUNT: usize = 3;

    /// Dense index, used by fixed-size per-channel tables
    pub const fn index(self) -> usize {
        match self {
            ChannelId::Heater => 0,
            ChannelId::Fan => 1,
            ChannelId::Drum => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Heater => "heater",
            ChannelId::Fan => "fan",
            ChannelId::Drum => "drum",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = String;

    /// Accepts the channel name plus the labels printed on the unit
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heater" | "heat" | "power" | "p" => Ok(ChannelId::Heater),
            "fan" | "f" => Ok(ChannelId::Fan),
            "drum" | "d" => Ok(ChannelId::Drum),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

/// Device readings for one poll, keyed by channel
pub type ChannelReadings = BTreeMap<ChannelId, i32>;

/// Inclusive integer bounds of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBounds {
    pub min: i32,
    pub max: i32,
}

impl ChannelBounds {
    /// Create bounds, returning None when `min > max`
    pub fn new(min: i32, max: i32) -> Option<Self> {
        (min <= max).then_some(Self { min, max })
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    /// Validate a value for `channel`, producing `InvalidChannelValue` when out of range
    pub fn check(&self, channel: ChannelId, value: i32) -> SyncResult<i32> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(SyncError::InvalidChannelValue {
                channel,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Result of comparing a device reading against held state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Device matches what we already knew
    NoChange,
    /// Device now reports the value we asked for; the surface already shows it
    ConfirmedPending,
    /// Device diverged from anything we requested (hardware buttons, rejected write)
    ExternalChange { old: i32, new: i32 },
}

/// State for a single channel within a session
#[derive(Debug, Clone)]
pub struct ChannelState {
    id: ChannelId,
    bounds: ChannelBounds,
    /// Best knowledge of the device value
    last_known: i32,
    /// Value of a queued write not yet seen by a poll
    pending: Option<i32>,
}

impl ChannelState {
    /// Create a channel primed with a device reading (clamped into bounds)
    pub fn new(id: ChannelId, bounds: ChannelBounds, initial: i32) -> Self {
        Self {
            id,
            bounds,
            last_known: bounds.clamp(initial),
            pending: None,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn bounds(&self) -> ChannelBounds {
        self.bounds
    }

    /// Current best-known value
    pub fn read(&self) -> i32 {
        self.last_known
    }

    /// Value of the unconfirmed write, if any
    pub fn pending(&self) -> Option<i32> {
        self.pending
    }

    /// Record a value observed on the device.
    ///
    /// Clears the pending write when the device reports exactly that value.
    pub fn mark_confirmed(&mut self, value: i32) {
        let value = self.bounds.clamp(value);
        if self.pending == Some(value) {
            self.pending = None;
        }
        self.last_known = value;
    }

    /// Record an accepted write: optimistic `last_known` plus pending marker.
    pub fn mark_pending_write(&mut self, value: i32) -> SyncResult<()> {
        let value = self.bounds.check(self.id, value)?;
        self.last_known = value;
        self.pending = Some(value);
        Ok(())
    }

    /// Compare a device reading against held state and update it.
    ///
    /// The pending check comes first: after an optimistic write both
    /// `last_known` and `pending` equal the requested value, and a matching
    /// reading must count as a confirmation.
    pub fn reconcile(&mut self, device_value: i32) -> ChangeOutcome {
        let device_value = self.bounds.clamp(device_value);

        if self.pending == Some(device_value) {
            self.mark_confirmed(device_value);
            return ChangeOutcome::ConfirmedPending;
        }

        if device_value == self.last_known {
            return ChangeOutcome::NoChange;
        }

        let old = self.last_known;
        // A newer value on the device overrides whatever we asked for
        self.pending = None;
        self.last_known = device_value;
        ChangeOutcome::ExternalChange {
            old,
            new: device_value,
        }
    }
}
