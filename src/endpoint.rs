//! One simulated bus node. See [`Endpoint`] for the locking layout.

use core::sync::atomic::{AtomicU64, Ordering};
use log::{debug, warn};
use snafu::{ensure, OptionExt};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{
    BusySnafu, Error, InterruptedSnafu, InvalidArgumentSnafu, ModeNotOpenSnafu, Result,
    WouldBlockSnafu,
};
use crate::filter::AcceptanceFilter;
use crate::queue::QueuePair;
use crate::types::{EndpointId, Mode, OpenMode, Stats, MAX_PAYLOAD, MAX_TX_FRAME};

/// Lock a mutex, taking over the guard if a panicking thread poisoned it.
/// Every critical section in this crate leaves its data consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub rx_packets: AtomicU64,
    pub tx_packets: AtomicU64,
    pub tx_bytes_in: AtomicU64,
    pub tx_bytes_out: AtomicU64,
    pub rx_bytes_in: AtomicU64,
    pub rx_bytes_out: AtomicU64,
    pub rx_fifo_full_count: AtomicU64,
}

impl StatCounters {
    fn counters(&self) -> [&AtomicU64; 7] {
        [
            &self.rx_packets,
            &self.tx_packets,
            &self.tx_bytes_in,
            &self.tx_bytes_out,
            &self.rx_bytes_in,
            &self.rx_bytes_out,
            &self.rx_fifo_full_count,
        ]
    }

    fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        Stats {
            rx_packets: load(&self.rx_packets),
            tx_packets: load(&self.tx_packets),
            tx_bytes_in: load(&self.tx_bytes_in),
            tx_bytes_out: load(&self.tx_bytes_out),
            rx_bytes_in: load(&self.rx_bytes_in),
            rx_bytes_out: load(&self.rx_bytes_out),
            rx_fifo_full_count: load(&self.rx_fifo_full_count),
        }
    }
}

/// Wakes readers blocked on an empty RX queue.
///
/// Readers check the queue while holding `state`, and signals are sent while
/// holding it, so a message enqueued between the check and the wait still
/// wakes the reader.
#[derive(Debug, Default)]
struct Notifier {
    state: Mutex<NotifyState>,
    ready: Condvar,
}

#[derive(Debug, Default)]
struct NotifyState {
    /// Bumped by every interrupt; a waiter that sees it change gives up.
    interrupts: u64,
}

impl Notifier {
    fn signal(&self) {
        let _state = lock(&self.state);
        self.ready.notify_all();
    }

    fn interrupt(&self) {
        let mut state = lock(&self.state);
        state.interrupts = state.interrupts.wrapping_add(1);
        self.ready.notify_all();
    }
}

#[derive(Debug, Default)]
struct OpenState {
    modes: OpenMode,
    open_count: u32,
    /// Bumped every time the endpoint is opened for reading.
    read_generation: u64,
}

/// One simulated bus node.
///
/// The open state, the filter and each direction's queue sit behind their
/// own mutex. Lock order: `tx`, then another endpoint's `rx`, then that
/// endpoint's notifier. `state` is held alone or before this endpoint's
/// own queues or notifier.
#[derive(Debug)]
pub(crate) struct Endpoint {
    id: EndpointId,
    queue_capacity: usize,
    state: Mutex<OpenState>,
    filter: Mutex<AcceptanceFilter>,
    tx: Mutex<Option<QueuePair>>,
    rx: Mutex<Option<QueuePair>>,
    rx_ready: Notifier,
    stats: StatCounters,
}

impl Endpoint {
    pub fn new(id: EndpointId, queue_capacity: usize) -> Endpoint {
        Endpoint {
            id,
            queue_capacity,
            state: Mutex::default(),
            filter: Mutex::default(),
            tx: Mutex::new(None),
            rx: Mutex::new(None),
            rx_ready: Notifier::default(),
            stats: StatCounters::default(),
        }
    }

    pub const fn id(&self) -> EndpointId {
        self.id
    }

    /// Open the endpoint in every mode of `mode`.
    ///
    /// Fails with `Busy` without changing anything if any of the modes is
    /// already open. The first open after the endpoint was fully closed
    /// resets the statistics and the filter.
    ///
    /// Returns the read generation after the open, which identifies the
    /// reader that holds the endpoint.
    pub fn open(&self, mode: OpenMode) -> Result<u64> {
        ensure!(
            !mode.is_empty(),
            InvalidArgumentSnafu {
                reason: "open mode must include read or write",
            }
        );
        let mut state = lock(&self.state);
        for m in mode.iter() {
            ensure!(!state.modes.contains(m), BusySnafu { id: self.id, mode: m });
        }

        if state.open_count == 0 {
            self.stats.reset();
            *lock(&self.filter) = AcceptanceFilter::default();
        }
        for m in mode.iter() {
            *self.queue(m) = Some(match m {
                Mode::Read => QueuePair::new(self.queue_capacity, MAX_PAYLOAD),
                Mode::Write => QueuePair::new(self.queue_capacity, MAX_TX_FRAME),
            });
            state.modes.insert(m);
        }
        if mode.contains(Mode::Read) {
            state.read_generation = state.read_generation.wrapping_add(1);
        }
        state.open_count += 1;
        debug!(
            "{}: opened {} (modes {}, open count {})",
            self.id, mode, state.modes, state.open_count
        );
        Ok(state.read_generation)
    }

    /// Clear `mode` and discard the queues behind it. Pending messages are lost.
    pub fn close(&self, mode: OpenMode) {
        let mut state = lock(&self.state);
        for m in mode.iter() {
            if let Some(queue) = self.queue(m).take() {
                if !queue.is_empty() {
                    debug!("{}: discarding {} queued {} messages", self.id, queue.len(), m);
                }
            }
            state.modes.remove(m);
        }
        state.open_count = state.open_count.saturating_sub(1);
        debug!(
            "{}: closed {} (modes {}, open count {})",
            self.id, mode, state.modes, state.open_count
        );
    }

    fn queue(&self, mode: Mode) -> MutexGuard<'_, Option<QueuePair>> {
        match mode {
            Mode::Read => lock(&self.rx),
            Mode::Write => lock(&self.tx),
        }
    }

    pub fn open_count(&self) -> u32 {
        lock(&self.state).open_count
    }

    pub fn is_open_for(&self, mode: Mode) -> bool {
        let state = lock(&self.state);
        state.open_count > 0 && state.modes.contains(mode)
    }

    pub fn filter(&self) -> AcceptanceFilter {
        *lock(&self.filter)
    }

    pub fn update_filter(&self, update: impl FnOnce(&mut AcceptanceFilter)) {
        let mut filter = lock(&self.filter);
        update(&mut filter);
        debug!(
            "{}: filter address {:#06x} mask {:#06x} enabled {}",
            self.id,
            filter.address(),
            filter.mask(),
            filter.is_enabled()
        );
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    pub fn counters(&self) -> &StatCounters {
        &self.stats
    }

    /// Store one TX frame. Fails with `NoBuffers` if the TX queue is full.
    pub fn enqueue_tx(&self, frame: &[u8]) -> Result<usize> {
        let mut tx = self.queue(Mode::Write);
        let queue = tx.as_mut().context(ModeNotOpenSnafu {
            id: self.id,
            mode: Mode::Write,
        })?;
        queue.enqueue(frame, &self.stats.tx_bytes_in)
    }

    /// Lock the TX queue for the router's flush.
    pub fn lock_tx(&self) -> MutexGuard<'_, Option<QueuePair>> {
        self.queue(Mode::Write)
    }

    pub fn pending_tx(&self) -> usize {
        self.queue(Mode::Write).as_ref().map_or(0, QueuePair::len)
    }

    /// Put a routed payload in the RX queue and wake readers.
    ///
    /// A full queue drops the message and bumps `rx_fifo_full_count`; the
    /// message is still counted in `rx_packets` and readers are still woken.
    /// Returns `false` if the endpoint was closed for reading meanwhile.
    pub fn deliver(&self, payload: &[u8]) -> bool {
        let stored = match self.queue(Mode::Read).as_mut() {
            Some(queue) => queue.enqueue(payload, &self.stats.rx_bytes_in),
            None => return false,
        };
        if let Err(err) = stored {
            StatCounters::add(&self.stats.rx_fifo_full_count, 1);
            warn!("{}: RX queue full, message dropped: {}", self.id, err);
        }
        StatCounters::add(&self.stats.rx_packets, 1);
        self.rx_ready.signal();
        true
    }

    /// Whether a read would find a message.
    pub fn poll(&self) -> bool {
        self.queue(Mode::Read)
            .as_ref()
            .map_or(false, |queue| !queue.is_empty())
    }

    /// Read one message into `buf`, waiting for one if `blocking`.
    ///
    /// A blocked read returns `Interrupted` as soon as [`interrupt`](Self::interrupt)
    /// is called.
    pub fn read(&self, buf: &mut [u8], blocking: bool) -> Result<usize> {
        let mut notify = lock(&self.rx_ready.state);
        let interrupts = notify.interrupts;
        loop {
            if let Some(len) = self.dequeue(buf)? {
                return Ok(len);
            }
            ensure!(blocking, WouldBlockSnafu);
            notify = self
                .rx_ready
                .ready
                .wait(notify)
                .unwrap_or_else(PoisonError::into_inner);
            ensure!(notify.interrupts == interrupts, InterruptedSnafu);
        }
    }

    fn dequeue(&self, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        let mut rx = self.queue(Mode::Read);
        let queue = rx.as_mut().context(ModeNotOpenSnafu {
            id: self.id,
            mode: Mode::Read,
        })?;
        if queue.is_empty() {
            return Ok(None);
        }
        let len = queue.dequeue(buf);
        StatCounters::add(&self.stats.rx_bytes_out, len);
        Ok(Some(len))
    }

    /// Make every read currently blocked on this endpoint return `Interrupted`,
    /// provided the endpoint is still open for reading in `read_generation`.
    ///
    /// Returns `false` if the reader it was meant for has closed.
    pub fn interrupt(&self, read_generation: u64) -> bool {
        let state = lock(&self.state);
        if !state.modes.contains(Mode::Read) || state.read_generation != read_generation {
            return false;
        }
        debug!("{}: interrupting blocked readers", self.id);
        self.rx_ready.interrupt();
        true
    }
}
