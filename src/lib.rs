//! A simulated CAN field bus.
//!
//! The broker stands in for bus hardware when none is present. It owns a
//! fixed set of endpoints (bus nodes) that clients open for reading and/or
//! writing. A message written on one endpoint is broadcast to every other
//! endpoint that is open for reading and whose acceptance filter matches the
//! message address. Each endpoint has bounded TX and RX queues; a full RX
//! queue drops the message for that endpoint only.
//!
//! ```
//! use std::thread;
//! use vcan_broker::{Broker, BrokerConfig, OpenMode};
//! # fn main() -> Result<(), vcan_broker::Error> {
//! let broker = Broker::new(BrokerConfig::default())?;
//! let node = broker.open(1, OpenMode::READ)?;
//!
//! let bus = broker.clone();
//! let writer = thread::spawn(move || -> Result<(), vcan_broker::Error> {
//!     let master = bus.open(0, OpenMode::WRITE)?;
//!     master.write(0x0010, &[0xca, 0xfe])?;
//!     master.close()
//! });
//!
//! let frame = node.read(true)?; // blocks until the write arrives
//! assert_eq!(&frame[..2], &[0xca, 0xfe]);
//! writer.join().expect("writer panicked")?;
//! # Ok(()) }
//! ```
//!
//! Closing a write handle is best-effort: it waits about two seconds for
//! queued messages to find a recipient, then discards them and reports
//! [`Error::DrainTimeout`]. The endpoint is closed either way.

mod broker;
mod buffer;
pub mod command;
mod config;
mod endpoint;
mod error;
mod filter;
mod queue;
mod registry;
mod router;
mod types;

pub use crate::broker::{Broker, Handle, Interrupter};
pub use crate::config::{
    BrokerConfig, DEFAULT_DRAIN_ATTEMPTS, DEFAULT_DRAIN_INTERVAL, DEFAULT_ENDPOINT_COUNT,
    DEFAULT_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY,
};
pub use crate::error::{Error, Result};
pub use crate::filter::{AcceptanceFilter, BROADCAST_START, BROADCAST_START_NODES};
pub use crate::types::{
    EndpointId, Message, Mode, OpenMode, ParseModeError, Payload, Stats, MAX_PAYLOAD,
};
