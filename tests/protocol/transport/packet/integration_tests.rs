//! End-to-end tests for fragmented packets.
//!
//! Each test follows the pattern: fragment → (transmit) → validate → reassemble → compare.

mod helpers {
    include!("../../../helpers/mod.rs");
}

use espnow_link::error::{PacketError, SendPacketError};
use espnow_link::protocol::link::event_pump::RxLane;
use espnow_link::protocol::link::router::Router;
use espnow_link::protocol::link::send_governor::{GovernorConfig, SendGovernor};
use espnow_link::protocol::transport::frame::{MessageType, RawFrame, Subtype};
use espnow_link::protocol::transport::packet::{
    assembler::{AssembleResult, PacketAssembler, ReassemblyPolicy},
    builder::PacketBuilder,
    checksum, PacketInfo, MAX_PACKET_PAYLOAD, PACKET_HEADER_LEN,
};
use helpers::{leak, Air, ManualClock, MockRadio, MockTimer, MAC_A, MAC_B};
use std::cell::RefCell;

fn sample_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

//==================================================================================
// CODEC
//==================================================================================

#[test]
/// A 500-byte CELL_INFO payload travels as three fragments of 230, 230 and 40 bytes.
fn test_five_hundred_bytes_in_three_fragments() {
    let payload = sample_payload(500);
    let frames: Vec<_> = PacketBuilder::new(Subtype::CellInfo, &payload)
        .with_sequence(77)
        .build()
        .map(|frame| frame.expect("fragment must build"))
        .collect();

    assert_eq!(frames.len(), 3);

    let expected_lens = [230usize, 230, 40];
    for (index, frame) in frames.iter().enumerate() {
        let info = PacketInfo::decode(frame.as_slice()).expect("fragment must validate");
        let start = index * MAX_PACKET_PAYLOAD;
        let slice = &payload[start..start + expected_lens[index]];

        assert_eq!(frame.len(), PACKET_HEADER_LEN + expected_lens[index]);
        assert_eq!(frame.as_slice()[0], MessageType::Packet.tag());
        assert_eq!(frame.as_slice()[1], 5);
        assert_eq!(info.seq(), 77);
        assert_eq!(info.subtype(), Subtype::CellInfo);
        assert_eq!(info.header.frag_index as usize, index);
        assert_eq!(info.header.frag_total, 3);
        assert_eq!(info.header.payload_len as usize, expected_lens[index]);
        assert_eq!(info.header.checksum, checksum(slice));
        assert_eq!(info.payload, slice);
    }
}

#[test]
/// Fragments delivered in reverse order, with duplicates, still rebuild the payload once.
fn test_out_of_order_with_duplicates() {
    let payload = sample_payload(700);
    let frames: Vec<_> = PacketBuilder::new(Subtype::Logs, &payload)
        .with_sequence(9)
        .build()
        .map(Result::unwrap)
        .collect();
    assert_eq!(frames.len(), 4);

    let mut assembler: PacketAssembler<1024> = PacketAssembler::default();
    let order = [3usize, 3, 1, 0, 1, 2];
    let mut completed = Vec::new();

    for (step, &index) in order.iter().enumerate() {
        let info = PacketInfo::decode(frames[index].as_slice()).unwrap();
        match assembler.process_fragment(&info, step as u64 * 10) {
            AssembleResult::MessageComplete(message) => completed.push(message),
            AssembleResult::Ignored => assert!(matches!(step, 1 | 4), "step {step} ignored"),
            AssembleResult::FragmentConsumed => {}
        }
    }

    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].subtype, Subtype::Logs);
    assert_eq!(completed[0].seq, 9);
    assert_eq!(completed[0].as_slice(), payload.as_slice());
    assert_eq!(assembler.pending(), 0);
}

#[test]
/// Two interleaved payloads with different sequences are rebuilt independently.
fn test_interleaved_sequences() {
    let first = sample_payload(300);
    let second: Vec<u8> = sample_payload(250).into_iter().rev().collect();
    let a: Vec<_> = PacketBuilder::new(Subtype::Events, &first)
        .with_sequence(1)
        .build()
        .map(Result::unwrap)
        .collect();
    let b: Vec<_> = PacketBuilder::new(Subtype::Events, &second)
        .with_sequence(2)
        .build()
        .map(Result::unwrap)
        .collect();

    let mut assembler: PacketAssembler<512> = PacketAssembler::default();
    let mut rebuilt = Vec::new();
    for frame in [&a[0], &b[1], &b[0], &a[1]] {
        let info = PacketInfo::decode(frame.as_slice()).unwrap();
        if let AssembleResult::MessageComplete(message) = assembler.process_fragment(&info, 0) {
            rebuilt.push((message.seq, message.as_slice().to_vec()));
        }
    }

    assert_eq!(rebuilt, [(2, second), (1, first)]);
}

#[test]
/// A partial payload is forgotten after the idle timeout.
fn test_stale_session_expires() {
    let payload = sample_payload(460);
    let frames: Vec<_> = PacketBuilder::new(Subtype::Settings, &payload)
        .with_sequence(5)
        .build()
        .map(Result::unwrap)
        .collect();

    let mut assembler: PacketAssembler<512> =
        PacketAssembler::new(ReassemblyPolicy::recommended(100));
    let first = PacketInfo::decode(frames[0].as_slice()).unwrap();
    assert_eq!(
        assembler.process_fragment(&first, 0),
        AssembleResult::FragmentConsumed
    );

    // recommended(100) keeps the 2 s floor.
    assert_eq!(assembler.expire_stale(2_000), 0);
    assert_eq!(assembler.expire_stale(2_001), 1);

    // The tail alone can no longer complete the payload.
    let second = PacketInfo::decode(frames[1].as_slice()).unwrap();
    assert_eq!(
        assembler.process_fragment(&second, 2_002),
        AssembleResult::FragmentConsumed
    );
}

#[test]
/// Corrupted fragments are rejected before reaching the assembler.
fn test_corrupted_fragment_is_rejected() {
    let payload = sample_payload(100);
    let mut frame = PacketBuilder::new(Subtype::SystemInfo, &payload)
        .build()
        .next()
        .unwrap()
        .unwrap();

    frame.as_mut_slice()[PACKET_HEADER_LEN + 10] ^= 0xFF;
    assert!(matches!(
        PacketInfo::decode(frame.as_slice()),
        Err(PacketError::ChecksumMismatch { .. })
    ));

    let truncated = &frame.as_slice()[..PACKET_HEADER_LEN + 50];
    assert!(matches!(
        PacketInfo::decode(truncated),
        Err(PacketError::Truncated {
            declared: 100,
            available: 50
        })
    ));
}

//==================================================================================
// OVER THE AIR
//==================================================================================

#[tokio::test]
/// A governed send reaches the subscriber of its subtype and is rebuilt there.
async fn test_packet_reaches_subtype_subscriber() {
    let air = leak(Air::default());
    let sender = leak(MockRadio::new(MAC_A, 6));
    let sender_rx: &'static RxLane = leak(RxLane::new());
    let receiver = leak(MockRadio::new(MAC_B, 6));
    let receiver_rx: &'static RxLane = leak(RxLane::new());
    air.attach(sender, sender_rx);
    air.attach(receiver, receiver_rx);

    let clock = ManualClock::default();
    let governor = SendGovernor::new(&clock, GovernorConfig::default());

    let assembler: RefCell<PacketAssembler<1024>> = RefCell::new(PacketAssembler::default());
    let rebuilt = RefCell::new(Vec::new());
    let on_cell_info = |frame: &RawFrame| {
        let Ok(info) = PacketInfo::decode(frame.as_slice()) else {
            return;
        };
        if let AssembleResult::MessageComplete(message) =
            assembler.borrow_mut().process_fragment(&info, frame.timestamp_ms)
        {
            rebuilt.borrow_mut().push(message.as_slice().to_vec());
        }
    };
    let mut router: Router<'_> = Router::new();
    router
        .register_subtype_route(MessageType::Packet, Subtype::CellInfo.to_byte(), &on_cell_info)
        .unwrap();

    let payload = sample_payload(500);
    let mut timer = MockTimer;
    let sent = governor
        .send_packet(sender, &mut timer, &MAC_B, Subtype::CellInfo, &payload)
        .await;
    assert_eq!(sent, Ok(3));
    assert_eq!(receiver_rx.len(), 3);

    // Another subtype shares the lane but has no subscriber.
    governor
        .send_packet(sender, &mut timer, &MAC_B, Subtype::Logs, &[1, 2, 3])
        .await
        .unwrap();

    while let Some(frame) = receiver_rx.try_next() {
        router.route_message(&frame);
    }

    assert_eq!(*rebuilt.borrow(), [payload]);
    assert_eq!(router.frames_routed(), 3);
    assert_eq!(router.frames_unrouted(), 1);
    assert!(sender_rx.is_empty());
}

#[tokio::test]
/// A refused fragment aborts the rest of the payload.
async fn test_refused_fragment_aborts_send() {
    let radio = MockRadio::new(MAC_A, 1);
    let clock = ManualClock::default();
    let governor = SendGovernor::new(&clock, GovernorConfig::default());
    let mut timer = MockTimer;

    radio.set_fail_submit(true);
    let payload = sample_payload(480);
    assert_eq!(
        governor
            .send_packet(&radio, &mut timer, &MAC_B, Subtype::Events, &payload)
            .await,
        Err(SendPacketError::Refused { index: 0 })
    );
    assert_eq!(governor.submissions(), 1);
    assert!(radio.sent().is_empty());
}
