//! Inbound frame dispatch on `(message type, packet subtype)`.
//!
//! Routes are registered at startup into a fixed table and matched in
//! registration order; the first match wins. Subtype [`ANY_SUBTYPE`] matches
//! every subtype, and every non-PACKET frame is routed with that subtype.
use heapless::Vec;

use crate::error::RouterError;
use crate::protocol::link::metrics::Counter;
use crate::protocol::transport::frame::{MessageType, RawFrame};
use crate::protocol::transport::packet::PACKET_HEADER_LEN;

/// Wildcard subtype.
pub const ANY_SUBTYPE: u8 = 0xFF;

/// Default route table capacity.
pub const MAX_ROUTES: usize = 20;

/// Receiver of routed frames. The handler value carries its own context.
pub trait MessageHandler {
    fn handle(&self, frame: &RawFrame);
}

impl<F: Fn(&RawFrame)> MessageHandler for F {
    fn handle(&self, frame: &RawFrame) {
        self(frame)
    }
}

#[derive(Clone, Copy)]
struct Route<'h> {
    message_type: u8,
    subtype: u8,
    handler: &'h dyn MessageHandler,
}

/// Leading type byte of `frame`, `None` when empty.
#[inline]
pub fn message_type(frame: &[u8]) -> Option<u8> {
    frame.first().copied()
}

/// Subtype used for matching: the header subtype of a complete PACKET header,
/// [`ANY_SUBTYPE`] otherwise.
#[inline]
pub fn packet_subtype(frame: &[u8]) -> u8 {
    match frame {
        [tag, subtype, ..]
            if *tag == MessageType::Packet.tag() && frame.len() >= PACKET_HEADER_LEN =>
        {
            *subtype
        }
        _ => ANY_SUBTYPE,
    }
}

pub struct Router<'h, const N: usize = MAX_ROUTES> {
    routes: Vec<Route<'h>, N>,
    routed: Counter,
    unrouted: Counter,
}

impl<'h, const N: usize> Default for Router<'h, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'h, const N: usize> Router<'h, N> {
    pub const fn new() -> Self {
        Self {
            routes: Vec::new(),
            routed: Counter::new(),
            unrouted: Counter::new(),
        }
    }

    /// Route every frame of `message_type` to `handler`.
    pub fn register_route(
        &mut self,
        message_type: MessageType,
        handler: &'h dyn MessageHandler,
    ) -> Result<(), RouterError> {
        self.register_subtype_route(message_type, ANY_SUBTYPE, handler)
    }

    /// Route frames of `message_type` whose subtype is `subtype` to `handler`.
    pub fn register_subtype_route(
        &mut self,
        message_type: MessageType,
        subtype: u8,
        handler: &'h dyn MessageHandler,
    ) -> Result<(), RouterError> {
        let route = Route {
            message_type: message_type.tag(),
            subtype,
            handler,
        };
        self.routes.push(route).map_err(|_| {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "route table full ({}), dropped route {} / {}",
                N,
                message_type,
                subtype
            );
            RouterError::TableFull
        })
    }

    /// Register several `(type, subtype, handler)` entries in order, stopping
    /// at the first failure.
    pub fn register_routes(
        &mut self,
        routes: &[(MessageType, u8, &'h dyn MessageHandler)],
    ) -> Result<(), RouterError> {
        for &(message_type, subtype, handler) in routes {
            self.register_subtype_route(message_type, subtype, handler)?;
        }
        Ok(())
    }

    pub fn clear_routes(&mut self) {
        self.routes.clear();
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Hand `frame` to the first matching handler. Returns whether one ran.
    pub fn route_message(&self, frame: &RawFrame) -> bool {
        let bytes = frame.as_slice();
        let Some(tag) = message_type(bytes) else {
            self.unrouted.incr();
            return false;
        };
        let subtype = packet_subtype(bytes);

        let matched = self.routes.iter().find(|route| {
            route.message_type == tag
                && (route.subtype == ANY_SUBTYPE || route.subtype == subtype)
        });

        match matched {
            Some(route) => {
                route.handler.handle(frame);
                self.routed.incr();
                true
            }
            None => {
                #[cfg(feature = "defmt")]
                defmt::debug!("no route for type {} subtype {}", tag, subtype);
                self.unrouted.incr();
                false
            }
        }
    }

    pub fn frames_routed(&self) -> u32 {
        self.routed.get()
    }

    pub fn frames_unrouted(&self) -> u32 {
        self.unrouted.get()
    }
}
