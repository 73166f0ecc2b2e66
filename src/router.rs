//! Broadcast delivery from one endpoint to all accepting endpoints.

use log::{error, trace};

use crate::endpoint::{Endpoint, StatCounters};
use crate::error::{Error, ModeNotOpenSnafu, NoRouteSnafu, Result};
use crate::registry::EndpointRegistry;
use crate::types::{EndpointId, Message, Mode, MAX_TX_FRAME};
use snafu::OptionExt;

pub(crate) struct Router<'a> {
    registry: &'a EndpointRegistry,
}

impl<'a> Router<'a> {
    pub fn new(registry: &'a EndpointRegistry) -> Router<'a> {
        Router { registry }
    }

    /// Deliver `payload` to every other endpoint open for reading whose
    /// filter accepts `tx_address`.
    ///
    /// Each candidate's RX queue is locked on its own, so a full or busy
    /// endpoint never holds up the others. Fails with `NoRoute` if no
    /// endpoint matched.
    pub fn route(&self, source: EndpointId, tx_address: u16, payload: &[u8]) -> Result<()> {
        let mut matched = 0;
        for endpoint in self.registry.iter().filter(|e| e.id() != source) {
            if endpoint.open_count() == 0 || !endpoint.is_open_for(Mode::Read) {
                continue;
            }
            if !endpoint.filter().accepts(tx_address) {
                continue;
            }
            matched += 1;
            endpoint.deliver(payload);
            trace!(
                "{} -> {}: address {:#06x}, {} bytes",
                source,
                endpoint.id(),
                tx_address,
                payload.len()
            );
        }
        if matched == 0 {
            trace!("{}: no route for address {:#06x}", source, tx_address);
            return NoRouteSnafu {
                address: tx_address,
            }
            .fail();
        }
        Ok(())
    }

    /// Whether any endpoint other than `source` is open for reading.
    fn has_listener(&self, source: EndpointId) -> bool {
        self.registry
            .iter()
            .any(|e| e.id() != source && e.is_open_for(Mode::Read))
    }

    /// Route the messages waiting in `source`'s TX queue, oldest first.
    ///
    /// While no other endpoint is open for reading, an unrouted message stays
    /// at the head of the queue and stops the flush, so later messages from
    /// the same writer are never delivered ahead of it. A message that open
    /// readers all filter out is discarded. Returns the number of messages
    /// routed.
    pub fn flush(&self, source: &Endpoint) -> Result<usize> {
        let mut tx = source.lock_tx();
        let queue = tx.as_mut().context(ModeNotOpenSnafu {
            id: source.id(),
            mode: Mode::Write,
        })?;
        let counters = source.counters();
        let mut frame = [0; MAX_TX_FRAME];
        let mut routed = 0;
        while !queue.is_empty() {
            let len = queue.front(&mut frame);
            let message = match Message::from_tx_frame(&frame[..len]) {
                Some(message) => message,
                None => {
                    error!("{}: discarding malformed TX frame of {} bytes", source.id(), len);
                    queue.dequeue(&mut frame);
                    continue;
                }
            };
            match self.route(source.id(), message.address, &message.payload) {
                Ok(()) => {}
                Err(Error::NoRoute { .. }) if !self.has_listener(source.id()) => break,
                Err(Error::NoRoute { address }) => {
                    trace!(
                        "{}: address {:#06x} filtered out by every reader",
                        source.id(),
                        address
                    );
                    queue.dequeue(&mut frame);
                    continue;
                }
                Err(err) => return Err(err),
            }
            queue.dequeue(&mut frame);
            StatCounters::add(&counters.tx_packets, 1);
            StatCounters::add(&counters.tx_bytes_out, len);
            routed += 1;
        }
        Ok(routed)
    }
}
