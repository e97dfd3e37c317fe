//! Connection machinery between the two nodes.
//!
//! * [`channel_manager`] serialises every radio channel change and persists the
//!   channel a connection locks on.
//! * [`send_governor`] wraps directed sends and backs off under repeated
//!   submit failures.
//! * [`connection`] holds the IDLE/CONNECTING/CONNECTED state machine and its
//!   bounded event queue.
//! * [`router`] dispatches inbound frames on `(type, subtype)`.
//! * [`discovery`] converges both peers on a common channel (PROBE/ACK).
//! * [`event_pump`] is the single loop executing transitions.
//!
//! Components are plain values wired together by reference, so firmware
//! typically places them in `static_cell::StaticCell`s and hands `&'static`
//! references to its tasks.
pub mod channel_manager;
pub mod connection;
pub mod discovery;
pub mod event_pump;
pub mod metrics;
pub mod router;
pub mod send_governor;
