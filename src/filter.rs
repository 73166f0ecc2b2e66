//! Address/mask acceptance filter of a bus endpoint.

/// Reserved "broadcast start" address.
pub const BROADCAST_START: u16 = 0x0001;

/// Node addresses that always accept [`BROADCAST_START`], whatever their mask.
pub const BROADCAST_START_NODES: [u16; 3] = [0x0010, 0x0011, 0x0012];

/// Decides whether an inbound message is relevant to an endpoint.
///
/// A disabled filter accepts everything. An enabled filter accepts a
/// transmit address `a` when `mask & a == address & mask`, with one fixed
/// exception: [`BROADCAST_START`] always reaches endpoints whose filter
/// address is one of [`BROADCAST_START_NODES`].
///
/// ## Example
/// ```
/// use vcan_broker::AcceptanceFilter;
/// let mut filter = AcceptanceFilter::default();
/// filter.set_address(0x10);
/// filter.set_mask(0xffff);
/// assert!(filter.accepts(0x10));
/// assert!(!filter.accepts(0x11));
/// assert!(filter.accepts(0x01)); // broadcast start
/// ```
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct AcceptanceFilter {
    address: u16,
    mask: u16,
    enabled: bool,
}

impl Default for AcceptanceFilter {
    fn default() -> Self {
        Self {
            address: 0,
            mask: 0,
            enabled: true,
        }
    }
}

impl AcceptanceFilter {
    pub fn accepts(&self, tx_address: u16) -> bool {
        if !self.enabled {
            return true;
        }
        if self.mask & tx_address == self.address & self.mask {
            return true;
        }
        tx_address == BROADCAST_START && BROADCAST_START_NODES.contains(&self.address)
    }

    pub const fn address(&self) -> u16 {
        self.address
    }

    pub const fn mask(&self) -> u16 {
        self.mask
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_address(&mut self, address: u16) {
        self.address = address;
    }

    pub fn set_mask(&mut self, mask: u16) {
        self.mask = mask;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(address: u16) -> AcceptanceFilter {
        let mut filter = AcceptanceFilter::default();
        filter.set_address(address);
        filter.set_mask(0xffff);
        filter
    }

    #[test]
    fn test_default_accepts_all() {
        let filter = AcceptanceFilter::default();
        assert!(filter.is_enabled());
        assert!((0..=u16::MAX).step_by(97).all(|a| filter.accepts(a)));
    }

    #[test]
    fn test_mask() {
        let filter = exact(0x10);
        assert!(filter.accepts(0x10));
        assert!(!filter.accepts(0x11));

        let mut filter = AcceptanceFilter::default();
        filter.set_address(0x120);
        filter.set_mask(0xff0);
        assert!(filter.accepts(0x120));
        assert!(filter.accepts(0x12f));
        assert!(filter.accepts(0xf125));
        assert!(!filter.accepts(0x130));
    }

    #[test]
    fn test_broadcast_start() {
        for address in BROADCAST_START_NODES {
            let filter = exact(address);
            assert!(filter.accepts(BROADCAST_START));
            assert!(!filter.accepts(0x0002));
        }
        assert!(!exact(0x13).accepts(BROADCAST_START));
        assert!(!exact(0x20).accepts(BROADCAST_START));
    }

    #[test]
    fn test_disabled() {
        let mut filter = exact(0x10);
        filter.disable();
        assert!(filter.accepts(0x11));
        assert!(filter.accepts(0xffff));
        filter.enable();
        assert!(!filter.accepts(0x11));
    }
}
