//! Echo guard
//!
//! Prevents control feedback loops: while the core writes a value to the
//! presentation surface, the surface's user-change callback for that channel
//! must be ignored. Suppression lasts for exactly one write and is released
//! on every exit path, including unwinding. Writes may nest or overlap: the
//! channel stays suppressed until the last of them finishes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::channel::ChannelId;

/// Per-channel count of programmatic writes in progress
///
/// Clones share the same counters so the surface callback and the poll loop
/// see one another's writes.
#[derive(Clone, Default)]
pub struct EchoGuard {
    depth: Arc<[AtomicUsize; ChannelId::COUNT]>,
}

/// Releases one level of suppression when dropped
struct Suppression<'a> {
    depth: &'a AtomicUsize,
}

impl Drop for Suppression<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

impl EchoGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` (a programmatic surface write) with `channel` suppressed
    pub fn with_suppressed<R>(&self, channel: ChannelId, f: impl FnOnce() -> R) -> R {
        let depth = &self.depth[channel.index()];
        depth.fetch_add(1, Ordering::AcqRel);
        let _suppression = Suppression { depth };
        f()
    }

    /// True while a programmatic write to `channel` is in progress
    pub fn is_suppressed(&self, channel: ChannelId) -> bool {
        self.depth[channel.index()].load(Ordering::Acquire) > 0
    }
}

impl std::fmt::Debug for EchoGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for channel in ChannelId::ALL {
            map.entry(&channel, &self.is_suppressed(channel));
        }
        map.finish()
    }
}
