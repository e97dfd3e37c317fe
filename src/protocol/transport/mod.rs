//! Radio transport layer: raw frame representation, short control frames,
//! fragmented packets, and the driver abstraction traits.
//!
//! ## Link Timing Constants
//!
//! These constants define the delays and deadlines the link layer uses
//! around the radio. All of them are expressed in milliseconds.

pub mod frame;
pub mod packet;
pub mod traits;

/// Delay inserted between two fragments of the same packet (ms).
///
/// The radio submit primitive only queues the frame. Back-to-back submissions
/// of a multi-fragment payload overflow the driver's TX queue on common
/// hardware, so consecutive fragments are spaced out.
///
/// # Recommended Values
///
/// - **5 ms**: Minimum observed to keep the TX queue from overflowing.
/// - **10 ms**: Default; keeps a 3-fragment payload under 25 ms.
pub const PACKET_INTER_FRAGMENT_DELAY_MS: u32 = 10;

/// Deadline for acquiring the channel gate (ms).
///
/// Every channel operation fails with `Busy` rather than blocking when the
/// gate is held for longer than this.
pub const CHANNEL_LOCK_TIMEOUT_MS: u32 = 100;

/// Deadline for enqueuing a connection event when the queue is full (ms).
///
/// Past it, the event is dropped, the drop counter is incremented and a
/// warning is logged.
pub const EVENT_POST_TIMEOUT_MS: u32 = 100;

/// Cadence of the event pump (ms).
///
/// Bounds the precision of the CONNECTING timeout and of the send-governor
/// resume deadline.
pub const PUMP_INTERVAL_MS: u32 = 100;

/// Discovery loop period while it has nothing to scan, and its retry delay
/// after a failed scan step (ms).
pub const PROBE_INTERVAL_MS: u32 = 1000;

/// How long discovery listens for an ACK after each probe (ms).
pub const ACK_WAIT_TIMEOUT_MS: u32 = 2000;

/// Suggested liveness deadline once connected (ms).
///
/// A connected peer that sends nothing for this long is declared lost when the
/// pump's liveness watchdog is enabled.
pub const PEER_LIVENESS_TIMEOUT_MS: u32 = 90_000;
