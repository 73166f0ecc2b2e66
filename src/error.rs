//! Error type shared by every broker operation.

use snafu::Snafu;

use crate::types::{EndpointId, Mode};

/// Errors returned by the broker.
///
/// Queue-local conditions ([`NoBuffers`](Error::NoBuffers)) only ever concern
/// one endpoint. [`NoRoute`](Error::NoRoute) is produced by the router but is
/// not reported as a write failure.
#[derive(Debug, Snafu, PartialEq, Eq, Clone, Copy)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A payload, mode or configuration value is out of range.
    #[snafu(display("Invalid argument: {}", reason))]
    InvalidArgument { reason: &'static str },

    /// The requested mode is already open on the endpoint.
    #[snafu(display("{} is already open for {}", id, mode))]
    Busy { id: EndpointId, mode: Mode },

    /// The endpoint id is not below the broker's endpoint count.
    #[snafu(display("Invalid endpoint id {}, broker has {} endpoints", id, count))]
    InvalidId { id: usize, count: usize },

    /// A TX or RX queue has no free slot.
    #[snafu(display("No buffer space available"))]
    NoBuffers,

    /// No other endpoint is open for reading with a filter accepting the address.
    #[snafu(display("No open endpoint accepts address {:#06x}", address))]
    NoRoute { address: u16 },

    /// A non-blocking read found the RX queue empty.
    #[snafu(display("Operation would block"))]
    WouldBlock,

    /// A blocking read was cancelled through an interrupter.
    #[snafu(display("Interrupted"))]
    Interrupted,

    /// Closing could not flush the TX queue in time; pending messages were discarded.
    #[snafu(display("{} closed with {} undelivered TX messages", id, pending))]
    DrainTimeout { id: EndpointId, pending: usize },

    /// The handle was not opened in the mode the operation needs.
    #[snafu(display("{} is not open for {}", id, mode))]
    ModeNotOpen { id: EndpointId, mode: Mode },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
