//! The client-facing surface of the broker. See [`Broker`] and [`Handle`].

use log::{debug, info, warn};
use snafu::ensure;
use std::sync::Arc;
use std::thread;

use crate::config::BrokerConfig;
use crate::endpoint::Endpoint;
use crate::error::{DrainTimeoutSnafu, ModeNotOpenSnafu, Result};
use crate::filter::AcceptanceFilter;
use crate::registry::EndpointRegistry;
use crate::router::Router;
use crate::types::{EndpointId, Message, Mode, OpenMode, Payload, Stats, MAX_PAYLOAD};

/// Simulated field bus with a fixed set of endpoints.
///
/// Cloning a `Broker` is cheap and yields another reference to the same bus,
/// so every client thread can hold its own copy and open its own handles.
///
/// # Example
///
/// ```
/// use vcan_broker::{Broker, BrokerConfig, OpenMode};
/// # fn main() -> Result<(), vcan_broker::Error> {
/// let broker = Broker::new(BrokerConfig::default())?;
/// let sensor = broker.open(0, OpenMode::WRITE)?;
/// let host = broker.open(1, OpenMode::READ)?;
/// host.set_filter_address(0x10);
/// host.set_filter_mask(0xffff);
///
/// sensor.write(0x10, &[0x12, 0x34])?;
/// assert_eq!(host.read(false)?, [0x12, 0x34, 0, 0, 0, 0, 0, 0]);
///
/// sensor.close()?;
/// host.close()?;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct Broker {
    registry: Arc<EndpointRegistry>,
    config: Arc<BrokerConfig>,
}

impl Broker {
    /// Create a broker with `config.endpoint_count` closed endpoints.
    /// # Errors
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) for a configuration without
    /// endpoints or with a queue capacity of zero or above
    /// [`MAX_QUEUE_CAPACITY`](crate::MAX_QUEUE_CAPACITY).
    pub fn new(config: BrokerConfig) -> Result<Broker> {
        config.validate()?;
        info!(
            "broker started: {} endpoints, {} messages per queue",
            config.endpoint_count, config.queue_capacity
        );
        Ok(Broker {
            registry: Arc::new(EndpointRegistry::new(
                config.endpoint_count,
                config.queue_capacity,
            )),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn endpoint_count(&self) -> usize {
        self.registry.len()
    }

    /// Open endpoint `id` in `mode`.
    ///
    /// Each mode can be held by one handle at a time; a reader and a writer
    /// may hold separate handles on the same endpoint.
    /// # Errors
    /// [`Error::InvalidId`](crate::Error::InvalidId) if `id` is out of range, [`Error::Busy`](crate::Error::Busy) if a
    /// requested mode is already open.
    pub fn open(&self, id: usize, mode: OpenMode) -> Result<Handle> {
        let id = EndpointId::new(id);
        let read_generation = self.registry.get(id)?.open(mode)?;
        Ok(Handle {
            broker: self.clone(),
            id,
            mode,
            read_generation: mode.contains(Mode::Read).then_some(read_generation),
            closed: false,
        })
    }
}

/// Cancels blocking reads of one handle, from any thread.
///
/// Once that handle is closed the interrupter does nothing, even if the
/// endpoint is opened for reading again.
#[derive(Debug, Clone)]
pub struct Interrupter {
    registry: Arc<EndpointRegistry>,
    id: EndpointId,
    read_generation: Option<u64>,
}

impl Interrupter {
    /// Make every read currently blocked on the handle return
    /// [`Error::Interrupted`](crate::Error::Interrupted). Reads started later are not affected.
    pub fn interrupt(&self) {
        let generation = match self.read_generation {
            Some(generation) => generation,
            None => return,
        };
        if let Ok(endpoint) = self.registry.get(self.id) {
            if !endpoint.interrupt(generation) {
                debug!("{}: interrupter outlived its reader", self.id);
            }
        }
    }
}

/// An open endpoint.
///
/// Dropping a handle closes it like [`close`](Handle::close) does, except
/// that a drain timeout is only logged.
#[derive(Debug)]
pub struct Handle {
    broker: Broker,
    id: EndpointId,
    mode: OpenMode,
    read_generation: Option<u64>,
    closed: bool,
}

impl Handle {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn endpoint(&self) -> &Endpoint {
        // checked by Broker::open
        &self.broker.registry[self.id]
    }

    fn router(&self) -> Router<'_> {
        Router::new(&self.broker.registry)
    }

    fn require(&self, mode: Mode) -> Result<()> {
        ensure!(
            self.mode.contains(mode),
            ModeNotOpenSnafu { id: self.id, mode }
        );
        Ok(())
    }

    /// Put a message on the bus.
    ///
    /// The message is queued for transmission and routed right away. The
    /// result is the number of bytes (address and payload) accepted into the
    /// TX queue, whether or not any endpoint received the message. A message
    /// no endpoint accepts stays queued and is routed again on the next write
    /// or while closing.
    /// # Errors
    /// [`Error::InvalidArgument`](crate::Error::InvalidArgument) for an empty or oversized payload,
    /// [`Error::NoBuffers`](crate::Error::NoBuffers) if the TX queue is full.
    pub fn write(&self, address: u16, payload: &[u8]) -> Result<usize> {
        self.require(Mode::Write)?;
        let message = Message::new(address, payload)?;
        let endpoint = self.endpoint();
        let accepted = endpoint.enqueue_tx(&message.to_tx_frame())?;
        self.router().flush(endpoint)?;
        Ok(accepted)
    }

    /// Read one message, zero-padded to 8 bytes.
    /// # Errors
    /// [`Error::WouldBlock`](crate::Error::WouldBlock) if `blocking` is false and nothing is queued,
    /// [`Error::Interrupted`](crate::Error::Interrupted) if a blocking read was interrupted.
    pub fn read(&self, blocking: bool) -> Result<[u8; MAX_PAYLOAD]> {
        self.require(Mode::Read)?;
        let mut buf = [0; MAX_PAYLOAD];
        self.endpoint().read(&mut buf, blocking)?;
        Ok(buf)
    }

    /// Like [`read`](Handle::read), keeping the payload's stored length.
    pub fn read_message(&self, blocking: bool) -> Result<Payload> {
        self.require(Mode::Read)?;
        let mut buf = [0; MAX_PAYLOAD];
        let len = self.endpoint().read(&mut buf, blocking)?;
        Ok(buf[..len].iter().copied().collect())
    }

    /// True if a read would return a message without blocking.
    pub fn poll(&self) -> bool {
        self.endpoint().poll()
    }

    /// Interrupter for this handle's blocking reads. It does nothing if the
    /// handle was not opened for reading.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            registry: Arc::clone(&self.broker.registry),
            id: self.id,
            read_generation: self.read_generation,
        }
    }

    pub fn filter(&self) -> AcceptanceFilter {
        self.endpoint().filter()
    }

    pub fn set_filter_address(&self, address: u16) {
        self.endpoint().update_filter(|f| f.set_address(address));
    }

    pub fn set_filter_mask(&self, mask: u16) {
        self.endpoint().update_filter(|f| f.set_mask(mask));
    }

    pub fn set_filter_enabled(&self, enabled: bool) {
        self.endpoint().update_filter(|f| f.set_enabled(enabled));
    }

    /// Counters of the endpoint since its last first-open.
    pub fn stats(&self) -> Stats {
        self.endpoint().stats()
    }

    /// Messages waiting in the TX queue for a recipient.
    pub fn pending_tx(&self) -> usize {
        self.endpoint().pending_tx()
    }

    /// Close the handle.
    ///
    /// A write handle first waits, up to the configured drain timeout, for
    /// its TX queue to empty, retrying delivery on every poll. The handle is
    /// closed even when the queue does not drain: the undelivered messages
    /// are discarded and [`Error::DrainTimeout`](crate::Error::DrainTimeout) is returned.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        let endpoint = self.endpoint();
        let drained = if self.mode.contains(Mode::Write) {
            self.drain(endpoint)
        } else {
            Ok(())
        };
        endpoint.close(self.mode);
        drained
    }

    fn drain(&self, endpoint: &Endpoint) -> Result<()> {
        let config = self.broker.config();
        let router = self.router();
        for _ in 0..config.drain_attempts {
            router.flush(endpoint)?;
            if endpoint.pending_tx() == 0 {
                return Ok(());
            }
            thread::sleep(config.drain_interval);
        }
        router.flush(endpoint)?;
        let pending = endpoint.pending_tx();
        if pending == 0 {
            return Ok(());
        }
        warn!(
            "{}: TX queue not drained after {:?}, discarding {} messages",
            self.id,
            config.drain_timeout(),
            pending
        );
        DrainTimeoutSnafu {
            id: self.id,
            pending,
        }
        .fail()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        debug!("{}: handle dropped without close", self.id);
        if let Err(err) = self.shutdown() {
            warn!("{}: implicit close: {}", self.id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::time::Duration;

    fn broker() -> Broker {
        Broker::new(
            BrokerConfig::default()
                .with_endpoint_count(3)
                .with_drain_interval(Duration::from_millis(1))
                .with_drain_attempts(3),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            Broker::new(BrokerConfig::default().with_endpoint_count(0)),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            Broker::new(BrokerConfig::default().with_queue_capacity(usize::MAX)),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_write_read() {
        let broker = broker();
        let writer = broker.open(0, OpenMode::WRITE).unwrap();
        let reader = broker.open(1, OpenMode::READ).unwrap();
        assert_eq!(writer.write(0x20, &[1, 2, 3]), Ok(5));
        assert!(reader.poll());
        assert_eq!(reader.read_message(false).unwrap().as_slice(), &[1, 2, 3]);
        assert!(!reader.poll());
    }

    #[test]
    fn test_mode_checks() {
        let broker = broker();
        let writer = broker.open(0, OpenMode::WRITE).unwrap();
        let reader = broker.open(1, OpenMode::READ).unwrap();
        assert!(matches!(
            writer.read(false),
            Err(Error::ModeNotOpen { .. })
        ));
        assert!(matches!(
            reader.write(0x10, &[1]),
            Err(Error::ModeNotOpen { .. })
        ));
    }

    #[test]
    fn test_drop_closes() {
        let broker = broker();
        let handle = broker.open(2, OpenMode::READ_WRITE).unwrap();
        drop(handle);
        let handle = broker.open(2, OpenMode::READ_WRITE).unwrap();
        assert_eq!(handle.close(), Ok(()));
    }
}
