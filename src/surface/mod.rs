//! Presentation surface
//!
//! The user-facing side of the synchronizer (sliders in a GUI, a motorized
//! control panel, a terminal). The core subscribes to user changes and pushes
//! device-originated values back with `programmatic = true`.

use std::sync::Arc;

use crate::channel::ChannelId;
use crate::status::ConnectionStatus;

pub mod slider;

pub use slider::SliderSurface;

/// Callback invoked when the user moves a control
pub type UserChangeCallback = Arc<dyn Fn(ChannelId, i32) + Send + Sync>;

/// Identifies one registered user-change listener
pub type SubscriptionId = u64;

/// Surface trait - implemented by every front end
pub trait PresentationSurface: Send + Sync {
    /// Register a listener for user-initiated changes
    fn subscribe_user_changes(&self, callback: UserChangeCallback) -> SubscriptionId;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe_user_changes(&self, id: SubscriptionId);

    /// Display a value.
    ///
    /// With `programmatic = true` the surface must not notify user-change
    /// listeners; otherwise a change is reported like any user move.
    fn set_value(&self, channel: ChannelId, value: i32, programmatic: bool);

    /// Render the connection indicator
    ///
    /// Default implementation: no-op (surface has no indicator)
    fn set_connection_status(&self, _status: ConnectionStatus) {}
}
