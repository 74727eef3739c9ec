//! Roast Sync - keeps a roaster's control state and its control surface in agreement
//!
//! The device is the single source of truth. User moves on the surface are
//! applied optimistically and queued as device commands; a poll loop reads
//! the device on a fixed interval and pushes hardware-side changes back to
//! the surface without letting them echo into new commands.

pub mod channel;
pub mod command_queue;
pub mod config;
pub mod controller;
pub mod echo_guard;
pub mod error;
pub mod poll_loop;
pub mod session;
pub mod status;
pub mod surface;
pub mod transport;

pub use channel::{ChangeOutcome, ChannelBounds, ChannelId, ChannelReadings, ChannelState};
pub use config::SyncConfig;
pub use controller::{SyncController, SyncHandle};
pub use error::{SyncError, SyncResult};
pub use poll_loop::{PollState, TickReport};
pub use session::ChannelSnapshot;
pub use status::{ConnectionStatus, RoasterState, SyncEvent};
pub use surface::{PresentationSurface, SliderSurface, SubscriptionId};
pub use transport::{DeviceTransport, SimulatedRoaster};
