//! Command queue - coalescing outbound channel writes
//!
//! Holds at most one unsent value per channel. A newer submit for the same
//! channel replaces the older one (latest wins), so a fast slider drag sends
//! only the value the user let go at. The poll loop drains the queue at the
//! start of every tick, which caps traffic at one write per channel per tick.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::channel::ChannelId;
use crate::config::ChannelsConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::DeviceTransport;

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    value: Option<i32>,
    /// Number of values that were replaced before being sent
    coalesced: u64,
}

/// A command that was given up on
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    pub channel: ChannelId,
    pub value: i32,
    /// Write attempts made (0 when skipped because the device was already gone)
    pub attempts: u32,
    pub error: SyncError,
}

/// Outcome of one drain of the queue
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushReport {
    pub sent: Vec<(ChannelId, i32)>,
    pub failed: Vec<CommandFailure>,
}

impl FlushReport {
    /// The disconnect error, if any write failed because the device is gone
    pub fn disconnect_error(&self) -> Option<&SyncError> {
        self.failed
            .iter()
            .map(|f| &f.error)
            .find(|e| e.is_disconnect())
    }
}

/// Per-channel latest-wins command slots
pub struct CommandQueue {
    slots: Mutex<[Slot; ChannelId::COUNT]>,
    channels: ChannelsConfig,
    retry_count: u32,
}

impl CommandQueue {
    pub fn new(channels: ChannelsConfig, retry_count: u32) -> Self {
        Self {
            slots: Mutex::new([Slot::default(); ChannelId::COUNT]),
            channels,
            retry_count,
        }
    }

    /// Queue a value for delivery.
    ///
    /// Returns as soon as the value is queued. Out-of-range values are
    /// rejected with `InvalidChannelValue` and never forwarded.
    pub fn submit(&self, channel: ChannelId, value: i32) -> SyncResult<()> {
        let value = self.channels.get(channel).check(channel, value)?;

        let mut slots = self.slots.lock();
        let slot = &mut slots[channel.index()];
        if let Some(previous) = slot.value.replace(value) {
            slot.coalesced += 1;
            debug!("Coalesced {} command {} -> {}", channel, previous, value);
        } else {
            debug!("Queued {} command {}", channel, value);
        }
        Ok(())
    }

    /// True while a value for `channel` is waiting to be sent
    pub fn is_queued(&self, channel: ChannelId) -> bool {
        self.slots.lock()[channel.index()].value.is_some()
    }

    /// Unsent value for `channel`
    pub fn queued_value(&self, channel: ChannelId) -> Option<i32> {
        self.slots.lock()[channel.index()].value
    }

    /// Number of channels with an unsent value
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total values replaced before delivery on `channel`
    pub fn coalesced_count(&self, channel: ChannelId) -> u64 {
        self.slots.lock()[channel.index()].coalesced
    }

    /// Drop every unsent command, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .filter_map(|slot| slot.value.take())
            .count()
    }

    /// Take every queued command, in channel order
    fn take_all(&self) -> Vec<(ChannelId, i32)> {
        let mut slots = self.slots.lock();
        ChannelId::ALL
            .iter()
            .filter_map(|ch| slots[ch.index()].value.take().map(|v| (*ch, v)))
            .collect()
    }

    /// Deliver every queued command to the transport.
    ///
    /// Each write gets `1 + retry_count` attempts. Once the device is found
    /// to be unavailable the remaining commands are dropped without trying.
    pub async fn flush(&self, transport: &dyn DeviceTransport) -> FlushReport {
        let mut report = FlushReport::default();
        let mut gone: Option<SyncError> = None;

        for (channel, value) in self.take_all() {
            if let Some(error) = &gone {
                report.failed.push(CommandFailure {
                    channel,
                    value,
                    attempts: 0,
                    error: error.clone(),
                });
                continue;
            }

            match self.send_with_retry(transport, channel, value).await {
                Ok(()) => report.sent.push((channel, value)),
                Err((attempts, error)) => {
                    warn!(
                        "Dropping {}={} after {} attempt(s): {}",
                        channel, value, attempts, error
                    );
                    if error.is_disconnect() {
                        gone = Some(error.clone());
                    }
                    report.failed.push(CommandFailure {
                        channel,
                        value,
                        attempts,
                        error,
                    });
                }
            }
        }

        report
    }

    async fn send_with_retry(
        &self,
        transport: &dyn DeviceTransport,
        channel: ChannelId,
        value: i32,
    ) -> Result<(), (u32, SyncError)> {
        let max_attempts = self.retry_count.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match transport.write_channel(channel, value).await {
                Ok(()) => {
                    debug!("📤 {} <- {} (attempt {})", channel, value, attempt);
                    return Ok(());
                }
                Err(e) if attempt < max_attempts => {
                    debug!("Write {}={} failed (attempt {}): {}", channel, value, attempt, e);
                }
                Err(e) => return Err((attempt, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimulatedRoaster;

    fn queue(retries: u32) -> CommandQueue {
        CommandQueue::new(ChannelsConfig::default(), retries)
    }

    async fn connected_roaster() -> SimulatedRoaster {
        let roaster = SimulatedRoaster::new(ChannelsConfig::default());
        roaster.connect().await.unwrap();
        roaster
    }

    #[test]
    fn test_submit_rejects_out_of_range() {
        let q = queue(0);
        let err = q.submit(ChannelId::Fan, 0).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidChannelValue { channel: ChannelId::Fan, value: 0, min: 1, max: 12 }
        ));
        assert!(q.is_empty());
    }

    #[test]
    fn test_latest_value_wins() {
        let q = queue(0);
        for v in 1..=6 {
            q.submit(ChannelId::Heater, v).unwrap();
        }
        assert_eq!(q.len(), 1);
        assert_eq!(q.queued_value(ChannelId::Heater), Some(6));
        assert_eq!(q.coalesced_count(ChannelId::Heater), 5);
    }

    #[tokio::test]
    async fn test_flush_sends_only_final_values() {
        let q = queue(0);
        let roaster = connected_roaster().await;

        q.submit(ChannelId::Heater, 3).unwrap();
        q.submit(ChannelId::Heater, 7).unwrap();
        q.submit(ChannelId::Drum, 4).unwrap();

        let report = q.flush(&roaster).await;
        assert_eq!(report.sent, vec![(ChannelId::Heater, 7), (ChannelId::Drum, 4)]);
        assert!(report.failed.is_empty());
        assert_eq!(roaster.writes(), vec![(ChannelId::Heater, 7), (ChannelId::Drum, 4)]);
        assert!(q.is_empty());

        // Nothing left to send
        assert_eq!(q.flush(&roaster).await, FlushReport::default());
    }

    #[tokio::test]
    async fn test_rejected_write_dropped_after_retries() {
        let q = queue(2);
        let roaster = connected_roaster().await;
        roaster.set_rejecting(ChannelId::Fan, true);

        q.submit(ChannelId::Fan, 9).unwrap();
        q.submit(ChannelId::Drum, 2).unwrap();
        let report = q.flush(&roaster).await;

        assert_eq!(report.sent, vec![(ChannelId::Drum, 2)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].attempts, 3);
        assert!(report.disconnect_error().is_none());
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_drops_remaining_commands() {
        let q = queue(0);
        let roaster = connected_roaster().await;
        roaster.unplug();

        q.submit(ChannelId::Heater, 1).unwrap();
        q.submit(ChannelId::Fan, 2).unwrap();
        let report = q.flush(&roaster).await;

        assert!(report.sent.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].attempts, 1);
        assert_eq!(report.failed[1].attempts, 0);
        assert!(report.disconnect_error().is_some());
    }

    #[test]
    fn test_clear() {
        let q = queue(0);
        q.submit(ChannelId::Heater, 1).unwrap();
        q.submit(ChannelId::Fan, 2).unwrap();
        assert_eq!(q.clear(), 2);
        assert!(!q.is_queued(ChannelId::Heater));
    }
}
