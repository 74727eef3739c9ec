//! Device transport
//!
//! The roaster side of the synchronizer. A transport reads the current value
//! of every channel in one batch and writes single channel values. Framing
//! and timeouts are the transport's business, not the core's.

use async_trait::async_trait;

use crate::channel::{ChannelId, ChannelReadings};
use crate::error::SyncResult;
use crate::status::RoasterState;

pub mod simulated;

pub use simulated::SimulatedRoaster;

/// Transport trait - implemented by the USB backend and the simulator
///
/// All methods take &self to support `Arc<dyn DeviceTransport>`;
/// implementations use interior mutability for connection state.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Human-readable name for logs (e.g., "aillio-r1", "simulated")
    fn name(&self) -> &str;

    /// Open the device. Fails with `DeviceUnavailable` when it cannot be found.
    async fn connect(&self) -> SyncResult<()>;

    /// Release the device. Safe to call when already disconnected.
    async fn disconnect(&self);

    /// Current connection state as last observed by the transport
    fn is_connected(&self) -> bool;

    /// Read every channel in one batch. Fails with `DeviceUnavailable`.
    async fn read_channels(&self) -> SyncResult<ChannelReadings>;

    /// Set one channel. Fails with `DeviceUnavailable` or `DeviceRejected`.
    async fn write_channel(&self, channel: ChannelId, value: i32) -> SyncResult<()>;

    /// Operating phase of the roaster, read alongside the channels.
    ///
    /// Default implementation: `None` (device does not report one)
    async fn read_state(&self) -> SyncResult<Option<RoasterState>> {
        Ok(None)
    }
}
