//! Tests for SyncController

use super::*;
use crate::channel::ChangeOutcome;
use crate::error::SyncError;
use crate::status::RoasterState;
use crate::surface::{SliderSurface, SubscriptionId, UserChangeCallback};
use crate::transport::SimulatedRoaster;
use parking_lot::{Mutex, RwLock};
use std::time::Duration;

struct Rig {
    controller: SyncController,
    roaster: Arc<SimulatedRoaster>,
    surface: Arc<SliderSurface>,
}

fn make_test_config(poll_interval_ms: u64) -> SyncConfig {
    SyncConfig {
        poll_interval_ms,
        ..SyncConfig::default()
    }
}

/// Long poll interval: ticks are driven by hand with `poll_once`
fn rig(heater: i32, fan: i32, drum: i32) -> Rig {
    rig_with(make_test_config(60_000), heater, fan, drum)
}

fn rig_with(config: SyncConfig, heater: i32, fan: i32, drum: i32) -> Rig {
    let roaster = Arc::new(SimulatedRoaster::new(config.channels).with_values(heater, fan, drum));
    let surface = Arc::new(SliderSurface::new(config.channels));
    let controller = SyncController::new(config, roaster.clone(), surface.clone());
    Rig {
        controller,
        roaster,
        surface,
    }
}

fn record_events(controller: &SyncController) -> Arc<Mutex<Vec<SyncEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    controller.subscribe_events(Arc::new(move |event: &SyncEvent| {
        sink.lock().push(event.clone())
    }));
    events
}

/// A surface that ignores the `programmatic` flag and reports every write
/// as a user change, like a widget whose change signal always fires.
#[derive(Default)]
struct EchoingSurface {
    values: Mutex<Vec<(ChannelId, i32)>>,
    listeners: RwLock<Vec<UserChangeCallback>>,
}

impl PresentationSurface for EchoingSurface {
    fn subscribe_user_changes(&self, callback: UserChangeCallback) -> SubscriptionId {
        let mut listeners = self.listeners.write();
        listeners.push(callback);
        listeners.len() as SubscriptionId
    }

    fn unsubscribe_user_changes(&self, _id: SubscriptionId) {}

    fn set_value(&self, channel: ChannelId, value: i32, _programmatic: bool) {
        self.values.lock().push((channel, value));
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(channel, value);
        }
    }
}

#[tokio::test]
async fn test_initial_sync_overrides_surface() {
    let mut rig = rig(3, 6, 2);
    rig.controller.connect().await.unwrap();

    assert_eq!(rig.surface.value(ChannelId::Heater), 3);
    assert_eq!(rig.surface.value(ChannelId::Fan), 6);
    assert_eq!(rig.surface.value(ChannelId::Drum), 2);
    for channel in ChannelId::ALL {
        assert_eq!(rig.surface.programmatic_writes(channel), 1);
        assert_eq!(rig.surface.user_events(channel), 0);
    }

    // Nothing flows toward the device during the initial sync
    assert!(rig.roaster.writes().is_empty());
    assert!(rig
        .controller
        .snapshot()
        .unwrap()
        .iter()
        .all(|c| c.pending.is_none()));
    assert_eq!(rig.controller.status(), ConnectionStatus::Connected);
    assert_eq!(rig.surface.connection_status(), ConnectionStatus::Connected);
    assert_eq!(rig.controller.poll_state(), PollState::Polling);
    assert_eq!(rig.controller.session_id(), Some(1));

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_user_change_confirmed_without_surface_write() {
    let mut rig = rig(0, 1, 1);
    rig.controller.connect().await.unwrap();

    rig.surface.move_slider(ChannelId::Heater, 5);

    let snapshot = rig.controller.snapshot().unwrap();
    assert_eq!(snapshot[0].value, 5);
    assert_eq!(snapshot[0].pending, Some(5));
    assert_eq!(rig.controller.ctx.queue.queued_value(ChannelId::Heater), Some(5));
    assert_eq!(rig.controller.ctx.queue.len(), 1);

    let report = rig.controller.poll_once().await.unwrap();
    assert_eq!(report.commands.sent, vec![(ChannelId::Heater, 5)]);
    assert_eq!(report.outcome(ChannelId::Heater), Some(ChangeOutcome::ConfirmedPending));
    assert_eq!(report.surface_writes, 0);

    assert_eq!(rig.roaster.device_value(ChannelId::Heater), 5);
    // Only the write from the initial sync
    assert_eq!(rig.surface.programmatic_writes(ChannelId::Heater), 1);
    assert_eq!(rig.controller.snapshot().unwrap()[0].pending, None);

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_hardware_change_reaches_surface_without_echo() {
    let mut rig = rig(0, 1, 1);
    rig.controller.connect().await.unwrap();

    assert_eq!(rig.roaster.press(ChannelId::Fan, 6), 7);
    let report = rig.controller.poll_once().await.unwrap();

    assert_eq!(
        report.outcome(ChannelId::Fan),
        Some(ChangeOutcome::ExternalChange { old: 1, new: 7 })
    );
    assert_eq!(rig.surface.value(ChannelId::Fan), 7);
    assert_eq!(rig.surface.user_events(ChannelId::Fan), 0);
    assert!(rig.roaster.writes().is_empty());
    assert!(rig.controller.ctx.queue.is_empty());

    // Repeated polls with no change do nothing
    for _ in 0..3 {
        let report = rig.controller.poll_once().await.unwrap();
        assert!(report
            .outcomes
            .iter()
            .all(|(_, outcome)| *outcome == ChangeOutcome::NoChange));
        assert_eq!(report.surface_writes, 0);
    }
    assert_eq!(rig.surface.programmatic_writes(ChannelId::Fan), 2);

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_echo_guard_stops_feedback_loop() {
    let config = make_test_config(60_000);
    let roaster = Arc::new(SimulatedRoaster::new(config.channels).with_values(4, 4, 4));
    let surface = Arc::new(EchoingSurface::default());
    let mut controller = SyncController::new(config, roaster.clone(), surface.clone());

    controller.connect().await.unwrap();
    roaster.press(ChannelId::Drum, 2);
    roaster.press(ChannelId::Heater, -1);
    controller.poll_once().await.unwrap();
    controller.poll_once().await.unwrap();

    // Every programmatic write echoed, none became a command
    assert_eq!(surface.values.lock().len(), 5);
    assert!(controller.ctx.queue.is_empty());
    assert!(roaster.writes().is_empty());
    assert!(controller.snapshot().unwrap().iter().all(|c| c.pending.is_none()));

    controller.on_disconnect().await;
}

#[tokio::test]
async fn test_out_of_range_user_input_rejected() {
    let mut rig = rig(0, 1, 1);
    rig.controller.connect().await.unwrap();

    let err = rig.controller.on_user_input(ChannelId::Fan, 13).unwrap_err();
    assert_eq!(
        err,
        SyncError::InvalidChannelValue {
            channel: ChannelId::Fan,
            value: 13,
            min: 1,
            max: 12
        }
    );
    assert!(rig.controller.on_user_input(ChannelId::Heater, -1).is_err());
    assert!(rig.controller.ctx.queue.is_empty());
    assert_eq!(rig.controller.snapshot().unwrap()[1].value, 1);

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_drag_coalesces_to_final_value() {
    let mut rig = rig(0, 1, 1);
    rig.controller.connect().await.unwrap();

    for value in 1..=6 {
        rig.surface.move_slider(ChannelId::Heater, value);
    }
    assert_eq!(rig.controller.ctx.queue.len(), 1);
    assert_eq!(rig.controller.ctx.queue.coalesced_count(ChannelId::Heater), 5);

    let report = rig.controller.poll_once().await.unwrap();
    assert_eq!(rig.roaster.writes(), vec![(ChannelId::Heater, 6)]);
    assert_eq!(report.outcome(ChannelId::Heater), Some(ChangeOutcome::ConfirmedPending));

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_rejected_command_self_corrects() {
    let mut config = make_test_config(60_000);
    config.command_retry_count = 2;
    let mut rig = rig_with(config, 0, 1, 1);
    let events = record_events(&rig.controller);
    rig.controller.connect().await.unwrap();
    rig.roaster.set_rejecting(ChannelId::Drum, true);

    rig.surface.move_slider(ChannelId::Drum, 5);
    let report = rig.controller.poll_once().await.unwrap();

    assert_eq!(report.commands.failed.len(), 1);
    assert_eq!(report.commands.failed[0].attempts, 3);
    assert_eq!(
        report.outcome(ChannelId::Drum),
        Some(ChangeOutcome::ExternalChange { old: 5, new: 1 })
    );

    // The surface snaps back to what the device really has
    assert_eq!(rig.surface.value(ChannelId::Drum), 1);
    assert_eq!(rig.controller.snapshot().unwrap()[2].pending, None);

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        SyncEvent::CommandFailed {
            channel: ChannelId::Drum,
            value: 5,
            attempts: 3,
            error: SyncError::DeviceRejected { .. },
        }
    ));
    drop(events);

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_queued_channel_skipped_by_reconcile() {
    let mut rig = rig(0, 1, 1);
    rig.controller.connect().await.unwrap();
    rig.controller.on_user_input(ChannelId::Fan, 9).unwrap();

    // A reading taken before the command went out must not undo it
    let readings = rig.roaster.read_channels().await.unwrap();
    let (outcomes, updates) = rig.controller.ctx.reconcile(&readings).unwrap();

    assert!(outcomes.iter().all(|(ch, _)| *ch != ChannelId::Fan));
    assert!(updates.is_empty());
    assert_eq!(rig.controller.snapshot().unwrap()[1].value, 9);

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_disconnect_keeps_surface_and_reconnect_resyncs() {
    let mut rig = rig(2, 4, 3);
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    rig.controller
        .subscribe_status(Arc::new(move |status: ConnectionStatus| sink.lock().push(status)));

    rig.controller.connect().await.unwrap();
    rig.roaster.unplug();

    let err = rig.controller.poll_once().await.unwrap_err();
    assert!(err.is_disconnect());
    rig.controller.on_disconnect().await;

    assert!(!rig.controller.is_connected());
    assert!(rig.controller.snapshot().is_none());
    assert_eq!(rig.controller.poll_state(), PollState::Stopped);
    assert_eq!(rig.surface.value(ChannelId::Heater), 2);
    assert_eq!(rig.surface.connection_status(), ConnectionStatus::Disconnected);
    assert!(matches!(
        rig.controller.on_user_input(ChannelId::Heater, 5),
        Err(SyncError::DeviceUnavailable(_))
    ));

    // Both sides drift apart while disconnected
    rig.roaster.set_device_value(ChannelId::Heater, 8);
    rig.surface.move_slider(ChannelId::Fan, 10);

    rig.roaster.plug();
    rig.controller.connect().await.unwrap();

    assert_eq!(rig.surface.value(ChannelId::Heater), 8);
    assert_eq!(rig.surface.value(ChannelId::Fan), 4);
    assert!(rig.roaster.writes().is_empty());
    assert_eq!(rig.controller.session_id(), Some(2));
    assert_eq!(
        *statuses.lock(),
        vec![
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connected
        ]
    );

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_connect_fails_when_unplugged() {
    let mut rig = rig(0, 1, 1);
    rig.roaster.unplug();

    assert!(rig.controller.connect().await.is_err());
    assert!(!rig.controller.is_connected());
    assert_eq!(rig.controller.poll_state(), PollState::Stopped);
}

#[tokio::test]
async fn test_overlapping_tick_is_skipped() {
    let mut rig = rig(0, 1, 1);
    rig.controller.connect().await.unwrap();
    rig.roaster.press(ChannelId::Heater, 2);

    let reads = rig.roaster.read_count();
    {
        let _busy = rig.controller.ctx.tick_gate.lock().await;
        let report = rig.controller.poll_once().await.unwrap();
        assert!(report.skipped);
    }
    assert_eq!(rig.roaster.read_count(), reads);
    assert_eq!(rig.surface.value(ChannelId::Heater), 0);

    let report = rig.controller.poll_once().await.unwrap();
    assert!(!report.skipped);
    assert_eq!(rig.surface.value(ChannelId::Heater), 2);

    rig.controller.on_disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_ticks_on_interval() {
    let mut rig = rig_with(make_test_config(100), 0, 1, 1);
    rig.controller.connect().await.unwrap();
    assert_eq!(rig.roaster.read_count(), 1);

    // First tick is one period after start
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rig.roaster.read_count(), 1);

    rig.roaster.press(ChannelId::Drum, 4);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(rig.roaster.read_count(), 2);
    assert_eq!(rig.surface.value(ChannelId::Drum), 5);

    rig.controller.on_disconnect().await;
    assert_eq!(rig.controller.poll_state(), PollState::Stopped);

    let reads = rig.roaster.read_count();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(rig.roaster.read_count(), reads);
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_reports_device_loss() {
    let mut rig = rig_with(make_test_config(100), 0, 1, 1);
    rig.controller.connect().await.unwrap();
    rig.roaster.unplug();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(rig.controller.poll_state(), PollState::Stopped);

    let event = rig.controller.next_event().await.unwrap();
    assert!(matches!(event, SyncEvent::DeviceLost { .. }));

    // Still connected from the controller's point of view until handled
    assert!(rig.controller.is_connected());
    rig.controller.handle_event(event).await;
    assert!(!rig.controller.is_connected());
    assert_eq!(rig.controller.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_commands_lost_to_disconnect_are_reported() {
    let mut rig = rig(0, 1, 1);
    let events = record_events(&rig.controller);
    rig.controller.connect().await.unwrap();

    rig.surface.move_slider(ChannelId::Heater, 5);
    rig.surface.move_slider(ChannelId::Fan, 4);
    rig.roaster.unplug();

    let err = rig.controller.poll_once().await.unwrap_err();
    assert!(err.is_disconnect());

    let events = events.lock().clone();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        SyncEvent::CommandFailed {
            channel: ChannelId::Heater,
            value: 5,
            attempts: 1,
            error: SyncError::DeviceUnavailable(_),
        }
    ));
    assert!(matches!(
        &events[1],
        SyncEvent::CommandFailed {
            channel: ChannelId::Fan,
            value: 4,
            attempts: 0,
            error: SyncError::DeviceUnavailable(_),
        }
    ));

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_command_failures_not_queued_for_supervisor() {
    let mut rig = rig(0, 1, 1);
    rig.controller.connect().await.unwrap();
    rig.roaster.set_rejecting(ChannelId::Heater, true);

    for value in 1..=3 {
        rig.controller.on_user_input(ChannelId::Heater, value).unwrap();
        rig.controller.poll_once().await.unwrap();
    }

    assert!(rig.controller.events_rx.try_recv().is_err());

    rig.controller.on_disconnect().await;
}

#[tokio::test]
async fn test_dropped_controller_releases_surface() {
    let config = make_test_config(60_000);
    let roaster = Arc::new(SimulatedRoaster::new(config.channels));
    let surface = Arc::new(SliderSurface::new(config.channels));

    let first = SyncController::new(config.clone(), roaster.clone(), surface.clone());
    assert_eq!(surface.listener_count(), 1);
    drop(first);
    assert_eq!(surface.listener_count(), 0);

    let mut second = SyncController::new(config, roaster.clone(), surface.clone());
    assert_eq!(surface.listener_count(), 1);
    second.connect().await.unwrap();
    surface.move_slider(ChannelId::Drum, 6);
    second.poll_once().await.unwrap();
    assert_eq!(roaster.writes(), vec![(ChannelId::Drum, 6)]);

    second.on_disconnect().await;
}

#[tokio::test]
async fn test_roaster_state_follows_device() {
    let mut rig = rig(0, 1, 1);
    assert_eq!(rig.controller.roaster_state(), None);

    rig.roaster.set_state(RoasterState::PreHeating);
    rig.controller.connect().await.unwrap();
    assert_eq!(rig.controller.roaster_state(), Some(RoasterState::PreHeating));

    rig.roaster.set_state(RoasterState::Roasting);
    let report = rig.controller.poll_once().await.unwrap();
    assert_eq!(report.roaster_state, Some(RoasterState::Roasting));
    assert_eq!(rig.controller.handle().roaster_state(), Some(RoasterState::Roasting));

    rig.controller.on_disconnect().await;
    assert_eq!(rig.controller.roaster_state(), None);
}
