// Read-only queries over the channel table, and the record of which
// channels are bound to a connection
use std::cell::Cell;
use std::rc::Rc;

use log::debug;

use wiz_core::{ChannelId, SocketStatus};

use crate::traits::{SharedDriver, SocketDriver};

/// Channels currently bound to a logical connection, one bit per id.
///
/// Clones share the record. A channel stays claimed until its holder lets
/// go of it, whatever the chip reports for it meanwhile.
#[derive(Debug, Clone, Default)]
pub struct ChannelClaims {
    bits: Rc<Cell<u8>>,
}

impl ChannelClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, channel: ChannelId) {
        self.bits.set(self.bits.get() | Self::bit(channel));
    }

    pub fn unclaim(&self, channel: ChannelId) {
        self.bits.set(self.bits.get() & !Self::bit(channel));
    }

    pub fn is_claimed(&self, channel: ChannelId) -> bool {
        self.bits.get() & Self::bit(channel) != 0
    }

    pub fn claimed(&self) -> Vec<ChannelId> {
        (0..8)
            .map(ChannelId)
            .filter(|&channel| self.is_claimed(channel))
            .collect()
    }

    fn bit(channel: ChannelId) -> u8 {
        1u8.checked_shl(channel.0 as u32).unwrap_or(0)
    }
}

pub struct SlotStatusView<'a, D> {
    driver: &'a SharedDriver<D>,
    channels: u8,
}

impl<'a, D: SocketDriver> SlotStatusView<'a, D> {
    pub fn new(driver: &'a SharedDriver<D>, channels: u8) -> Self {
        SlotStatusView { driver, channels }
    }

    /// `None` when the status register could not be read.
    pub fn status(&self, channel: ChannelId) -> Option<SocketStatus> {
        match self.driver.borrow_mut().status(channel) {
            Ok(status) => Some(status),
            Err(e) => {
                debug!("socket:{} status unreadable: {}", channel, e);
                None
            }
        }
    }

    pub fn is(&self, channel: ChannelId, expected: SocketStatus) -> bool {
        self.status(channel) == Some(expected)
    }

    pub fn pending(&self, channel: ChannelId) -> usize {
        self.driver.borrow_mut().rx_occupancy(channel)
    }

    /// Lowest unclaimed channel currently CLOSED. Claimed channels are
    /// skipped without reading their status.
    pub fn first_closed(&self, claims: &ChannelClaims) -> Option<ChannelId> {
        (0..self.channels)
            .map(ChannelId)
            .filter(|&channel| !claims.is_claimed(channel))
            .find(|&channel| self.is(channel, SocketStatus::Closed))
    }

    /// Read and acknowledge the connection-established flag.
    pub fn take_connection_event(&self, channel: ChannelId) -> bool {
        let mut driver = self.driver.borrow_mut();
        if driver.connection_event(channel) {
            driver.clear_connection_event(channel);
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> Vec<(ChannelId, Option<SocketStatus>)> {
        (0..self.channels)
            .map(ChannelId)
            .map(|channel| (channel, self.status(channel)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_claims() {
        let claims = ChannelClaims::new();
        let other = claims.clone();
        claims.claim(ChannelId(0));
        other.claim(ChannelId(5));
        assert_eq!(claims.claimed(), vec![ChannelId(0), ChannelId(5)]);

        other.unclaim(ChannelId(0));
        assert!(!claims.is_claimed(ChannelId(0)));
        assert!(claims.is_claimed(ChannelId(5)));
    }

    #[test]
    fn out_of_range_ids_are_never_claimed() {
        let claims = ChannelClaims::new();
        claims.claim(ChannelId(9));
        assert!(!claims.is_claimed(ChannelId(9)));
        assert!(claims.claimed().is_empty());
    }
}
