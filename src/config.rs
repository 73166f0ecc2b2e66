use core::time::Duration;
use snafu::ensure;

use crate::error::{InvalidArgumentSnafu, Result};

pub const DEFAULT_ENDPOINT_COUNT: usize = 7;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1500;
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_DRAIN_ATTEMPTS: u32 = 40;
/// Largest accepted `queue_capacity`. Every open direction allocates
/// `queue_capacity` × the frame size up front.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Broker settings, fixed for the broker's lifetime.
///
/// ```
/// use std::time::Duration;
/// use vcan_broker::BrokerConfig;
/// let config = BrokerConfig::default()
///     .with_endpoint_count(3)
///     .with_drain_interval(Duration::from_millis(5));
/// assert_eq!(config.queue_capacity, 1500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Number of endpoints, ids `0..endpoint_count`.
    pub endpoint_count: usize,
    /// Messages each TX and RX queue holds.
    pub queue_capacity: usize,
    /// Delay between TX drain polls when closing a write handle.
    pub drain_interval: Duration,
    /// Number of drain polls before a close gives up with `DrainTimeout`.
    pub drain_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint_count: DEFAULT_ENDPOINT_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            drain_attempts: DEFAULT_DRAIN_ATTEMPTS,
        }
    }
}

impl BrokerConfig {
    pub fn with_endpoint_count(mut self, endpoint_count: usize) -> Self {
        self.endpoint_count = endpoint_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_drain_interval(mut self, drain_interval: Duration) -> Self {
        self.drain_interval = drain_interval;
        self
    }

    pub fn with_drain_attempts(mut self, drain_attempts: u32) -> Self {
        self.drain_attempts = drain_attempts;
        self
    }

    /// Upper bound of the drain wait on close.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_interval * self.drain_attempts
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            self.endpoint_count > 0,
            InvalidArgumentSnafu {
                reason: "endpoint count must be at least 1",
            }
        );
        ensure!(
            self.queue_capacity > 0,
            InvalidArgumentSnafu {
                reason: "queue capacity must be at least 1",
            }
        );
        ensure!(
            self.queue_capacity <= MAX_QUEUE_CAPACITY,
            InvalidArgumentSnafu {
                reason: "queue capacity must not exceed MAX_QUEUE_CAPACITY",
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.endpoint_count, 7);
        assert_eq!(config.drain_timeout(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(BrokerConfig::default()
            .with_endpoint_count(0)
            .validate()
            .is_err());
        assert!(BrokerConfig::default()
            .with_queue_capacity(0)
            .validate()
            .is_err());
        assert!(BrokerConfig::default()
            .with_queue_capacity(MAX_QUEUE_CAPACITY)
            .validate()
            .is_ok());
        assert!(BrokerConfig::default()
            .with_queue_capacity(MAX_QUEUE_CAPACITY + 1)
            .validate()
            .is_err());
        assert!(BrokerConfig::default()
            .with_queue_capacity(usize::MAX)
            .validate()
            .is_err());
        assert!(BrokerConfig::default()
            .with_drain_attempts(0)
            .validate()
            .is_ok());
    }
}
