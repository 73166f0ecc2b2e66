//! This module defines the small value types shared by the broker: endpoint
//! identities, open modes, bus messages and statistics snapshots.

use arrayvec::ArrayVec;
use core::fmt;
use core::ops::Deref;
use core::str::FromStr;
use snafu::{ensure, Snafu};

use crate::error::{Error, InvalidArgumentSnafu};

/// Largest payload carried by a single bus frame.
pub const MAX_PAYLOAD: usize = 8;

/// Bytes used by the routing address at the head of a TX frame.
pub const ADDRESS_LEN: usize = 2;

/// Largest TX queue entry: address followed by payload.
pub const MAX_TX_FRAME: usize = ADDRESS_LEN + MAX_PAYLOAD;

/// Payload of one bus frame, 1 to 8 bytes.
pub type Payload = ArrayVec<u8, MAX_PAYLOAD>;

pub(crate) type TxFrame = ArrayVec<u8, MAX_TX_FRAME>;

/// Stable identity of one bus endpoint, `0..N` for a broker with `N` endpoints.
///
/// The upper bound depends on the broker, so range checks happen when the
/// id is looked up, which fails with [`Error::InvalidId`].
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct EndpointId(usize);

impl EndpointId {
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl From<usize> for EndpointId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl Deref for EndpointId {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<usize> for EndpointId {
    fn eq(&self, other: &usize) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vcan{}", self.0)
    }
}

/// One direction an endpoint can be opened in.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum Mode {
    /// Receive messages routed from other endpoints.
    Read,
    /// Send messages onto the bus.
    Write,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
        }
    }
}

/// Set of [`Mode`]s a handle holds on an endpoint.
///
/// ## Example
/// ```
/// use vcan_broker::{Mode, OpenMode};
/// let mode: OpenMode = "rw".parse().unwrap();
/// assert!(mode.contains(Mode::Read) && mode.contains(Mode::Write));
/// assert_eq!(mode, OpenMode::READ_WRITE);
/// ```
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash, Default)]
pub struct OpenMode {
    read: bool,
    write: bool,
}

impl OpenMode {
    pub const NONE: OpenMode = OpenMode {
        read: false,
        write: false,
    };
    pub const READ: OpenMode = OpenMode {
        read: true,
        write: false,
    };
    pub const WRITE: OpenMode = OpenMode {
        read: false,
        write: true,
    };
    pub const READ_WRITE: OpenMode = OpenMode {
        read: true,
        write: true,
    };

    pub const fn contains(self, mode: Mode) -> bool {
        match mode {
            Mode::Read => self.read,
            Mode::Write => self.write,
        }
    }

    pub const fn is_empty(self) -> bool {
        !self.read && !self.write
    }

    pub fn insert(&mut self, mode: Mode) {
        match mode {
            Mode::Read => self.read = true,
            Mode::Write => self.write = true,
        }
    }

    pub fn remove(&mut self, mode: Mode) {
        match mode {
            Mode::Read => self.read = false,
            Mode::Write => self.write = false,
        }
    }

    /// The modes present in this set, read first.
    pub fn iter(self) -> impl Iterator<Item = Mode> {
        [Mode::Read, Mode::Write]
            .into_iter()
            .filter(move |mode| self.contains(*mode))
    }
}

impl From<Mode> for OpenMode {
    fn from(mode: Mode) -> Self {
        let mut set = OpenMode::NONE;
        set.insert(mode);
        set
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.read, self.write) {
            (true, true) => write!(f, "rw"),
            (true, false) => write!(f, "r"),
            (false, true) => write!(f, "w"),
            (false, false) => write!(f, "-"),
        }
    }
}

/// Error returned when parsing an [`OpenMode`] from a string fails.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ParseModeError {
    #[snafu(display("Invalid open mode {:?}, expected r, w or rw", mode))]
    UnknownMode { mode: String },
}

impl FromStr for OpenMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenMode::READ),
            "w" => Ok(OpenMode::WRITE),
            "rw" | "wr" => Ok(OpenMode::READ_WRITE),
            _ => UnknownModeSnafu { mode: s }.fail(),
        }
    }
}

/// A bus message: routing address plus frame payload.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Message {
    pub address: u16,
    pub payload: Payload,
}

impl Message {
    /// Create a new message, checking that the payload is 1 to 8 bytes long.
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for an empty or oversized payload.
    pub fn new(address: u16, payload: &[u8]) -> Result<Self, Error> {
        ensure!(
            !payload.is_empty() && payload.len() <= MAX_PAYLOAD,
            InvalidArgumentSnafu {
                reason: "payload must be 1 to 8 bytes",
            }
        );
        Ok(Self {
            address,
            payload: payload.iter().copied().collect(),
        })
    }

    /// TX queue representation: big-endian address, then payload.
    pub(crate) fn to_tx_frame(&self) -> TxFrame {
        let mut frame = TxFrame::new();
        frame.extend(self.address.to_be_bytes());
        frame.extend(self.payload.iter().copied());
        frame
    }

    /// Inverse of [`to_tx_frame`](Self::to_tx_frame). `None` if the frame is
    /// too short to hold an address or too long to be a bus frame.
    pub(crate) fn from_tx_frame(frame: &[u8]) -> Option<Self> {
        if frame.len() < ADDRESS_LEN || frame.len() > MAX_TX_FRAME {
            return None;
        }
        let (address, payload) = frame.split_at(ADDRESS_LEN);
        Some(Self {
            address: u16::from_be_bytes([address[0], address[1]]),
            payload: payload.iter().copied().collect(),
        })
    }
}

/// Snapshot of an endpoint's counters since its last first-open.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub struct Stats {
    /// Messages routed to this endpoint, including ones dropped on a full queue.
    pub rx_packets: u64,
    /// Messages routed out of this endpoint's TX queue.
    pub tx_packets: u64,
    /// Bytes (address and payload) stored into the TX queue.
    pub tx_bytes_in: u64,
    /// Bytes (address and payload) routed out of the TX queue.
    pub tx_bytes_out: u64,
    /// Payload bytes stored into the RX queue.
    pub rx_bytes_in: u64,
    /// Payload bytes handed to readers.
    pub rx_bytes_out: u64,
    /// Messages dropped because the RX queue was full.
    pub rx_fifo_full_count: u64,
}
