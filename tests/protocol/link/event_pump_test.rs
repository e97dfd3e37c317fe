mod helpers {
    include!("../../helpers/mod.rs");
}

use espnow_link::core::MacAddress;
use espnow_link::protocol::link::channel_manager::ChannelManager;
use espnow_link::protocol::link::connection::{
    ConnectionConfig, ConnectionLink, ConnectionMachine, ConnectionState, EventKind,
};
use espnow_link::protocol::link::event_pump::{EventPump, PumpConfig, PumpReport, RxLane};
use espnow_link::protocol::link::router::Router;
use espnow_link::protocol::link::send_governor::{GovernorConfig, SendGovernor};
use espnow_link::protocol::transport::frame::{ControlFrame, MessageType, RawFrame};
use helpers::{ManualClock, MockRadio, MockStore, MAC_A, MAC_B};
use std::cell::{Cell, RefCell};

#[tokio::test]
async fn handshake_converges_through_the_pump() {
    let radio = MockRadio::new(MAC_A, 6);
    let store = MockStore::default();
    let clock = ManualClock::default();
    let channels = ChannelManager::new(&radio, &store, &clock);
    let governor = SendGovernor::new(&clock, GovernorConfig::default());
    let link = ConnectionLink::new(&clock);
    let router: Router<'_> = Router::new();
    let rx = RxLane::new();
    let notifications = RefCell::new(Vec::new());
    let observer =
        |from: ConnectionState, to: ConnectionState| notifications.borrow_mut().push((from, to));

    channels.init().await.unwrap();
    let mut machine = ConnectionMachine::new(&link, &governor, ConnectionConfig::default(), 0);
    machine.register_observer(&observer).unwrap();
    let mut pump = EventPump::new(
        &clock,
        &channels,
        &governor,
        machine,
        &router,
        &rx,
        PumpConfig::default(),
    );

    // A stale failure must be cleared when the link comes up.
    radio.set_fail_submit(true);
    governor.send_with_retry(&radio, &MAC_B, &[0], "test");
    radio.set_fail_submit(false);
    assert_eq!(governor.consecutive_failures(), 1);

    link.post_event(EventKind::PeerFound, MAC_B).await.unwrap();
    clock.set(100);
    pump.pump_once().await;
    assert_eq!(link.state(), ConnectionState::Connecting);
    assert_eq!(link.peer_mac(), MAC_B);
    assert!(!channels.is_locked());

    link.post_event(EventKind::PeerRegistered, MAC_B).await.unwrap();
    clock.set(200);
    let report = pump.pump_once().await;
    assert_eq!(
        report,
        PumpReport {
            frames: 0,
            events: 1,
            transitions: 1,
        }
    );

    assert!(link.is_connected());
    assert_eq!(
        *notifications.borrow(),
        [
            (ConnectionState::Idle, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
        ]
    );
    assert_eq!(governor.consecutive_failures(), 0);
    assert!(channels.is_locked());
    assert_eq!(store.stored(), Some(6));
    assert_eq!(pump.machine().connected_time_ms(1_200), 1_000);
}

#[tokio::test]
async fn connecting_times_out() {
    let radio = MockRadio::new(MAC_A, 1);
    let store = MockStore::default();
    let clock = ManualClock::default();
    let channels = ChannelManager::new(&radio, &store, &clock);
    let governor = SendGovernor::new(&clock, GovernorConfig::default());
    let link = ConnectionLink::new(&clock);
    let router: Router<'_> = Router::new();
    let rx = RxLane::new();
    let machine = ConnectionMachine::new(
        &link,
        &governor,
        ConnectionConfig {
            auto_reconnect: false,
            connecting_timeout_ms: 500,
        },
        0,
    );
    let mut pump = EventPump::new(
        &clock,
        &channels,
        &governor,
        machine,
        &router,
        &rx,
        PumpConfig::default(),
    );

    link.post_event(EventKind::ConnectionStart, MacAddress::ZERO)
        .await
        .unwrap();
    pump.pump_once().await;
    assert!(link.is_connecting());

    for now in (100..=400).step_by(100) {
        clock.set(now);
        pump.pump_once().await;
        assert!(link.is_connecting(), "still connecting at {now} ms");
    }

    clock.set(600);
    let report = pump.pump_once().await;
    assert_eq!(report.transitions, 1);
    assert!(link.is_idle());
    assert!(link.peer_mac().is_zero());
}

#[tokio::test]
async fn double_reset_notifies_once_and_releases_the_channel() {
    let radio = MockRadio::new(MAC_A, 3);
    let store = MockStore::default();
    let clock = ManualClock::default();
    let channels = ChannelManager::new(&radio, &store, &clock);
    let governor = SendGovernor::new(&clock, GovernorConfig::default());
    let link = ConnectionLink::new(&clock);
    let router: Router<'_> = Router::new();
    let rx = RxLane::new();
    let idle_notifications = Cell::new(0u32);
    let observer = |_: ConnectionState, to: ConnectionState| {
        if to == ConnectionState::Idle {
            idle_notifications.set(idle_notifications.get() + 1);
        }
    };

    channels.init().await.unwrap();
    let mut machine = ConnectionMachine::new(&link, &governor, ConnectionConfig::default(), 0);
    machine.register_observer(&observer).unwrap();
    let mut pump = EventPump::new(
        &clock,
        &channels,
        &governor,
        machine,
        &router,
        &rx,
        PumpConfig::default(),
    );

    link.post_event(EventKind::PeerFound, MAC_B).await.unwrap();
    link.post_event(EventKind::PeerRegistered, MAC_B).await.unwrap();
    pump.pump_once().await;
    assert!(link.is_connected());
    assert!(channels.is_locked());

    link.post_event(EventKind::ResetConnection, MacAddress::ZERO)
        .await
        .unwrap();
    link.post_event(EventKind::ResetConnection, MacAddress::ZERO)
        .await
        .unwrap();
    clock.set(250);
    let report = pump.pump_once().await;

    assert_eq!(report.events, 2);
    assert_eq!(report.transitions, 1);
    assert_eq!(idle_notifications.get(), 1);
    assert!(link.is_idle());
    assert!(!channels.is_locked());
    assert_eq!(pump.metrics().transitions, 3);
}

#[tokio::test]
async fn received_frames_are_routed() {
    let radio = MockRadio::new(MAC_A, 1);
    let store = MockStore::default();
    let clock = ManualClock::default();
    let channels = ChannelManager::new(&radio, &store, &clock);
    let governor = SendGovernor::new(&clock, GovernorConfig::default());
    let link = ConnectionLink::new(&clock);
    let rx = RxLane::new();
    let reboots = Cell::new(0u32);
    let on_reboot = |frame: &RawFrame| {
        assert_eq!(frame.mac, MAC_B);
        reboots.set(reboots.get() + 1);
    };
    let mut router: Router<'_> = Router::new();
    router.register_route(MessageType::Reboot, &on_reboot).unwrap();

    let machine = ConnectionMachine::new(&link, &governor, ConnectionConfig::default(), 0);
    let mut pump = EventPump::new(
        &clock,
        &channels,
        &governor,
        machine,
        &router,
        &rx,
        PumpConfig::default(),
    );

    let reboot = ControlFrame::Reboot.encode();
    let flash = ControlFrame::FlashLed {
        color: espnow_link::protocol::transport::frame::LedColor::Green,
    }
    .encode();
    assert!(rx.push_from_isr(MAC_B, reboot.as_slice(), 1));
    assert!(rx.push_from_isr(MAC_B, flash.as_slice(), 2));
    assert!(rx.push_from_isr(MAC_B, reboot.as_slice(), 3));
    assert!(!rx.push_from_isr(MAC_B, &[0u8; 251], 4));

    let report = pump.pump_once().await;
    assert_eq!(report.frames, 3);
    assert_eq!(reboots.get(), 2);

    let metrics = pump.metrics();
    assert_eq!(metrics.frames_received, 3);
    assert_eq!(metrics.frames_dropped, 1);
    assert_eq!(metrics.frames_routed, 2);
    assert_eq!(metrics.frames_unrouted, 1);
    assert_eq!(metrics.state, ConnectionState::Idle);
}

#[tokio::test]
async fn silent_peer_is_declared_lost() {
    let radio = MockRadio::new(MAC_A, 1);
    let store = MockStore::default();
    let clock = ManualClock::default();
    let channels = ChannelManager::new(&radio, &store, &clock);
    let governor = SendGovernor::new(&clock, GovernorConfig::default());
    let link = ConnectionLink::new(&clock);
    let router: Router<'_> = Router::new();
    let rx = RxLane::new();
    let machine = ConnectionMachine::new(&link, &governor, ConnectionConfig::default(), 0);
    let mut pump = EventPump::new(
        &clock,
        &channels,
        &governor,
        machine,
        &router,
        &rx,
        PumpConfig {
            interval_ms: 100,
            peer_timeout_ms: 1_000,
        },
    );

    link.post_event_from_isr(EventKind::PeerFound, MAC_B).unwrap();
    link.post_event_from_isr(EventKind::PeerRegistered, MAC_B).unwrap();
    pump.pump_once().await;
    assert!(link.is_connected());

    clock.set(800);
    link.post_event_from_isr(EventKind::DataReceived, MAC_B).unwrap();
    pump.pump_once().await;

    clock.set(1_700);
    pump.pump_once().await;
    assert!(link.is_connected());
    assert_eq!(link.queued_events(), 0);

    clock.set(1_900);
    pump.pump_once().await;
    assert_eq!(link.queued_events(), 1);

    pump.pump_once().await;
    assert!(link.is_idle());
    assert!(!channels.is_locked());
}

#[tokio::test]
async fn pump_resumes_a_paused_governor() {
    let radio = MockRadio::new(MAC_A, 1);
    let store = MockStore::default();
    let clock = ManualClock::default();
    let channels = ChannelManager::new(&radio, &store, &clock);
    let governor = SendGovernor::new(
        &clock,
        GovernorConfig {
            max_failures: 3,
            base_backoff_ms: 1_000,
        },
    );
    let link = ConnectionLink::new(&clock);
    let router: Router<'_> = Router::new();
    let rx = RxLane::new();
    let machine = ConnectionMachine::new(&link, &governor, ConnectionConfig::default(), 0);
    let mut pump = EventPump::new(
        &clock,
        &channels,
        &governor,
        machine,
        &router,
        &rx,
        PumpConfig::default(),
    );

    radio.set_fail_submit(true);
    for _ in 0..4 {
        assert!(!governor.send_with_retry(&radio, &MAC_B, &[1, 2], "telemetry"));
    }
    assert!(governor.is_paused());
    assert_eq!(pump.metrics().sends_skipped, 1);
    assert_eq!(pump.metrics().pauses, 1);

    clock.set(999);
    pump.pump_once().await;
    assert!(governor.is_paused());

    clock.set(1_000);
    pump.pump_once().await;
    assert!(!governor.is_paused());
    assert_eq!(governor.consecutive_failures(), 0);
    // The pump already flushed the deferred log line.
    assert!(!governor.is_deferred_log_pending());
}

#[tokio::test]
async fn auto_reconnect_restarts_discovery() {
    let radio = MockRadio::new(MAC_A, 1);
    let store = MockStore::default();
    let clock = ManualClock::default();
    let channels = ChannelManager::new(&radio, &store, &clock);
    let governor = SendGovernor::new(&clock, GovernorConfig::default());
    let link = ConnectionLink::new(&clock);
    let router: Router<'_> = Router::new();
    let rx = RxLane::new();
    let mut machine = ConnectionMachine::new(&link, &governor, ConnectionConfig::default(), 0);
    machine.set_auto_reconnect(true);
    let mut pump = EventPump::new(
        &clock,
        &channels,
        &governor,
        machine,
        &router,
        &rx,
        PumpConfig::default(),
    );

    link.post_event_from_isr(EventKind::PeerFound, MAC_B).unwrap();
    link.post_event_from_isr(EventKind::PeerRegistered, MAC_B).unwrap();
    link.post_event_from_isr(EventKind::ConnectionLost, MAC_B).unwrap();
    let report = pump.pump_once().await;

    // Lost → IDLE, then the reconnect event → CONNECTING in the same drain.
    assert_eq!(report.transitions, 4);
    assert!(link.is_connecting());
    assert!(link.peer_mac().is_zero());
    assert!(!channels.is_locked());
}
