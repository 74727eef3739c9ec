//! Connection status, roaster state and sync events
//!
//! Status transitions are pushed to subscribers (and to the presentation
//! surface, which renders the "disconnected" indicator). Events travel from
//! the poll loop back to the controller's supervisor loop.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::channel::ChannelId;
use crate::error::SyncError;

/// Connection status of the roaster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Session active, poll loop running
    Connected,
    /// No session; surface shows stale values
    Disconnected,
    /// Waiting before the given reconnection attempt
    Reconnecting { attempt: usize },
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Reconnecting { attempt } => write!(f, "reconnecting (#{})", attempt),
        }
    }
}

/// Operating phase reported by the roaster. Read-only: the host never sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoasterState {
    Off,
    PreHeating,
    Charge,
    Roasting,
    Cooling,
    Shutdown,
}

impl RoasterState {
    pub const ALL: [RoasterState; 6] = [
        RoasterState::Off,
        RoasterState::PreHeating,
        RoasterState::Charge,
        RoasterState::Roasting,
        RoasterState::Cooling,
        RoasterState::Shutdown,
    ];

    /// Decode the firmware status byte. Unknown codes give `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(RoasterState::Off),
            0x02 => Some(RoasterState::PreHeating),
            0x04 => Some(RoasterState::Charge),
            0x06 => Some(RoasterState::Roasting),
            0x08 => Some(RoasterState::Cooling),
            0x09 => Some(RoasterState::Shutdown),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            RoasterState::Off => 0x00,
            RoasterState::PreHeating => 0x02,
            RoasterState::Charge => 0x04,
            RoasterState::Roasting => 0x06,
            RoasterState::Cooling => 0x08,
            RoasterState::Shutdown => 0x09,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoasterState::Off => "off",
            RoasterState::PreHeating => "pre-heating",
            RoasterState::Charge => "charge",
            RoasterState::Roasting => "roasting",
            RoasterState::Cooling => "cooling",
            RoasterState::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for RoasterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoasterState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "preheat" | "preheating" => Ok(RoasterState::PreHeating),
            other => RoasterState::ALL
                .into_iter()
                .find(|state| state.as_str() == other)
                .ok_or_else(|| format!("unknown roaster state '{}'", other)),
        }
    }
}

/// Events produced by the poll loop and command delivery
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A tick found the device gone; the loop has already stopped itself
    DeviceLost { reason: String },
    /// A queued command was dropped without reaching the device.
    ///
    /// Delivered to `subscribe_events` callbacks only.
    CommandFailed {
        channel: ChannelId,
        value: i32,
        /// Write attempts made. 0 means the command was never tried because
        /// an earlier write in the same drain found the device gone.
        attempts: u32,
        /// For never-tried commands, the disconnect error of that earlier write
        error: SyncError,
    },
}

/// Type alias for connection status callbacks
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Type alias for sync event callbacks
pub type EventCallback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roaster_state_codes() {
        for state in RoasterState::ALL {
            assert_eq!(RoasterState::from_code(state.code()), Some(state));
        }
        assert_eq!(RoasterState::from_code(0x06), Some(RoasterState::Roasting));
        assert_eq!(RoasterState::from_code(0x01), None);
        assert_eq!(RoasterState::from_code(0xff), None);
    }

    #[test]
    fn test_roaster_state_names() {
        assert_eq!(RoasterState::PreHeating.to_string(), "pre-heating");
        assert_eq!("Pre-Heating".parse::<RoasterState>(), Ok(RoasterState::PreHeating));
        assert_eq!("preheat".parse::<RoasterState>(), Ok(RoasterState::PreHeating));
        assert_eq!("cooling".parse::<RoasterState>(), Ok(RoasterState::Cooling));
        assert!("burning".parse::<RoasterState>().is_err());
        assert_eq!(
            serde_json::to_string(&RoasterState::PreHeating).unwrap(),
            "\"pre-heating\""
        );
    }
}
