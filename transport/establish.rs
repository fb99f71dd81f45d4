// Claims a CLOSED hardware channel and drives it to LISTEN or ESTABLISHED
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::task::Poll;

use log::{debug, warn};

use wiz_core::{
    poll_until, ChannelId, Clock, DriverError, SocketError, SocketMode, SocketResult,
    SocketStatus, DEFAULT_POLL_INTERVAL_MS, MAX_CHANNELS,
};

use crate::status::{ChannelClaims, SlotStatusView};
use crate::traits::{SharedDriver, SocketDriver};

/// What the channel is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client { address: Ipv4Addr, port: u16 },
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Client { address, port } => write!(f, "connect {}:{}", address, port),
            Role::Server => write!(f, "listen"),
        }
    }
}

/// Channel allocator shared by the client and the server.
///
/// Channels are scanned lowest id first, so contention always resolves to
/// the same channel. A failed attempt closes the channel it claimed.
/// Clones share one [`ChannelClaims`], so a channel bound through one
/// clone is never handed out by another.
pub struct Establisher<D> {
    driver: SharedDriver<D>,
    clock: Rc<dyn Clock>,
    claims: ChannelClaims,
    channels: u8,
    poll_interval_ms: u64,
    mode: SocketMode,
}

impl<D> Clone for Establisher<D> {
    fn clone(&self) -> Self {
        Establisher {
            driver: Rc::clone(&self.driver),
            clock: Rc::clone(&self.clock),
            claims: self.claims.clone(),
            channels: self.channels,
            poll_interval_ms: self.poll_interval_ms,
            mode: self.mode,
        }
    }
}

impl<D: SocketDriver> Establisher<D> {
    pub fn new(driver: SharedDriver<D>, clock: Rc<dyn Clock>) -> Self {
        Establisher {
            driver,
            clock,
            claims: ChannelClaims::new(),
            channels: MAX_CHANNELS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            mode: SocketMode::TcpDual,
        }
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels.clamp(1, MAX_CHANNELS);
        self
    }

    pub fn with_poll_interval(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Share an existing claim record, e.g. one held by the chip.
    pub fn with_claims(mut self, claims: ChannelClaims) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_mode(mut self, mode: SocketMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn driver(&self) -> &SharedDriver<D> {
        &self.driver
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn claims(&self) -> &ChannelClaims {
        &self.claims
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn status_view(&self) -> SlotStatusView<'_, D> {
        SlotStatusView::new(&self.driver, self.channels)
    }

    pub fn establish(&self, local_port: u16, role: Role, timeout_ms: u64) -> SocketResult<ChannelId> {
        let port = match role {
            Role::Client { port, .. } => port,
            Role::Server => local_port,
        };
        let view = self.status_view();

        let channel = match view.first_closed(&self.claims) {
            Some(channel) => channel,
            None => {
                warn!("no closed socket for port {} ({} scanned)", port, self.channels);
                return Err(SocketError::SlotExhausted {
                    scanned: self.channels,
                });
            }
        };

        let opened = self.driver.borrow_mut().open(channel, self.mode, local_port, 0);
        match opened {
            Ok(actual) if actual == channel => {}
            Ok(actual) => {
                warn!("socket:{} init error: driver opened {}", channel, actual);
                let _ = self.release(channel);
                return Err(SocketError::OpenFailed {
                    channel,
                    port,
                    source: DriverError::SockNum,
                });
            }
            Err(e) => {
                warn!("socket:{} init error: {}", channel, e);
                let _ = self.release(channel);
                return Err(SocketError::OpenFailed {
                    channel,
                    port,
                    source: e,
                });
            }
        }

        let outcome = poll_until(self.clock.as_ref(), timeout_ms, self.poll_interval_ms, || {
            match view.status(channel) {
                Some(SocketStatus::Init) => {
                    let issued = match role {
                        Role::Client { address, port } => {
                            self.driver.borrow_mut().connect(channel, address, port)
                        }
                        Role::Server => self.driver.borrow_mut().listen(channel),
                    };
                    if let Err(e) = issued {
                        debug!("socket:{} {} rejected: {}", channel, role, e);
                    }
                    Poll::Pending
                }
                Some(SocketStatus::Listen) | Some(SocketStatus::Established) => Poll::Ready(Ok(())),
                Some(SocketStatus::Closed) => Poll::Ready(Err(SocketError::Aborted { channel, port })),
                _ => Poll::Pending,
            }
        });

        let err = match outcome {
            Some(Ok(())) => {
                debug!("socket:{} ready ({}) on port {}", channel, role, port);
                self.claims.claim(channel);
                return Ok(channel);
            }
            Some(Err(e)) => e,
            None => SocketError::EstablishTimeout {
                channel,
                port,
                timeout_ms,
            },
        };
        warn!("{}", err);
        let _ = self.release(channel);
        Err(err)
    }

    /// Close `channel` so it can be claimed again. The claim is dropped even
    /// when the close fails.
    pub fn release(&self, channel: ChannelId) -> Result<(), DriverError> {
        self.claims.unclaim(channel);
        self.driver.borrow_mut().close(channel).map_err(|e| {
            warn!("socket:{} close failed: {}", channel, e);
            e
        })
    }

    /// Drop the claim on a channel the chip already closed by itself.
    pub fn forget(&self, channel: ChannelId) {
        self.claims.unclaim(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{shared, BusOps};
    use std::cell::Cell;
    use wiz_core::{ChipCommand, ChipReply, ManualClock, NetworkIdentity};

    // Driver whose channels all report one fixed status.
    struct FixedStatus {
        status: SocketStatus,
        closed: Vec<ChannelId>,
        opened: Vec<ChannelId>,
        open_result: Option<ChannelId>,
        commands: Rc<Cell<usize>>,
    }

    impl FixedStatus {
        fn new(status: SocketStatus) -> Self {
            FixedStatus {
                status,
                closed: Vec::new(),
                opened: Vec::new(),
                open_result: None,
                commands: Rc::new(Cell::new(0)),
            }
        }
    }

    impl SocketDriver for FixedStatus {
        fn open(&mut self, channel: ChannelId, _mode: SocketMode, _port: u16, _flags: u8) -> Result<ChannelId, DriverError> {
            self.opened.push(channel);
            Ok(self.open_result.unwrap_or(channel))
        }
        fn connect(&mut self, _channel: ChannelId, _address: Ipv4Addr, _port: u16) -> Result<(), DriverError> {
            self.commands.set(self.commands.get() + 1);
            Ok(())
        }
        fn listen(&mut self, _channel: ChannelId) -> Result<(), DriverError> {
            self.commands.set(self.commands.get() + 1);
            Ok(())
        }
        fn close(&mut self, channel: ChannelId) -> Result<(), DriverError> {
            self.closed.push(channel);
            Ok(())
        }
        fn disconnect(&mut self, _channel: ChannelId) -> Result<(), DriverError> {
            Ok(())
        }
        fn send(&mut self, _channel: ChannelId, data: &[u8]) -> Result<usize, DriverError> {
            Ok(data.len())
        }
        fn receive(&mut self, _channel: ChannelId, _buf: &mut [u8]) -> Result<usize, DriverError> {
            Ok(0)
        }
        fn status(&mut self, _channel: ChannelId) -> Result<SocketStatus, DriverError> {
            Ok(self.status)
        }
        fn rx_occupancy(&mut self, _channel: ChannelId) -> usize {
            0
        }
        fn connection_event(&mut self, _channel: ChannelId) -> bool {
            false
        }
        fn clear_connection_event(&mut self, _channel: ChannelId) {}
        fn control_chip(&mut self, _command: ChipCommand) -> Result<ChipReply, DriverError> {
            Ok(ChipReply::Done)
        }
        fn control_network(&mut self, _identity: &NetworkIdentity) -> Result<(), DriverError> {
            Ok(())
        }
        fn attach_bus(&mut self, _bus: Box<dyn BusOps + Send>) {}
    }

    fn establisher(driver: FixedStatus) -> (Establisher<FixedStatus>, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new());
        let est = Establisher::new(shared(driver), clock.clone()).with_poll_interval(5);
        (est, clock)
    }

    #[test]
    fn closed_forever_aborts_on_first_poll() {
        let (est, clock) = establisher(FixedStatus::new(SocketStatus::Closed));
        let err = est.establish(80, Role::Server, 1000).unwrap_err();
        assert_eq!(err, SocketError::Aborted { channel: ChannelId(0), port: 80 });
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(est.driver().borrow().closed, vec![ChannelId(0)]);
    }

    #[test]
    fn no_closed_channel_fails_without_blocking() {
        let (est, clock) = establisher(FixedStatus::new(SocketStatus::Established));
        let err = est.establish(80, Role::Server, 1000).unwrap_err();
        assert_eq!(err, SocketError::SlotExhausted { scanned: 8 });
        assert_eq!(clock.now_ms(), 0);
        assert!(est.driver().borrow().opened.is_empty());
    }

    #[test]
    fn stuck_in_init_times_out_within_one_interval() {
        // CLOSED until opened, INIT from then on
        struct InitAfterOpen(FixedStatus, bool);
        impl SocketDriver for InitAfterOpen {
            fn open(&mut self, c: ChannelId, m: SocketMode, p: u16, f: u8) -> Result<ChannelId, DriverError> {
                self.1 = true;
                self.0.open(c, m, p, f)
            }
            fn connect(&mut self, c: ChannelId, a: Ipv4Addr, p: u16) -> Result<(), DriverError> {
                self.0.connect(c, a, p)
            }
            fn listen(&mut self, c: ChannelId) -> Result<(), DriverError> {
                self.0.listen(c)
            }
            fn close(&mut self, c: ChannelId) -> Result<(), DriverError> {
                self.0.close(c)
            }
            fn disconnect(&mut self, c: ChannelId) -> Result<(), DriverError> {
                self.0.disconnect(c)
            }
            fn send(&mut self, c: ChannelId, d: &[u8]) -> Result<usize, DriverError> {
                self.0.send(c, d)
            }
            fn receive(&mut self, c: ChannelId, b: &mut [u8]) -> Result<usize, DriverError> {
                self.0.receive(c, b)
            }
            fn status(&mut self, _c: ChannelId) -> Result<SocketStatus, DriverError> {
                Ok(if self.1 { SocketStatus::Init } else { SocketStatus::Closed })
            }
            fn rx_occupancy(&mut self, c: ChannelId) -> usize {
                self.0.rx_occupancy(c)
            }
            fn connection_event(&mut self, c: ChannelId) -> bool {
                self.0.connection_event(c)
            }
            fn clear_connection_event(&mut self, c: ChannelId) {
                self.0.clear_connection_event(c)
            }
            fn control_chip(&mut self, cmd: ChipCommand) -> Result<ChipReply, DriverError> {
                self.0.control_chip(cmd)
            }
            fn control_network(&mut self, id: &NetworkIdentity) -> Result<(), DriverError> {
                self.0.control_network(id)
            }
            fn attach_bus(&mut self, bus: Box<dyn BusOps + Send>) {
                self.0.attach_bus(bus)
            }
        }

        let inner = FixedStatus::new(SocketStatus::Closed);
        let commands = inner.commands.clone();
        let clock = Rc::new(ManualClock::new());
        let est = Establisher::new(shared(InitAfterOpen(inner, false)), clock.clone()).with_poll_interval(7);
        let role = Role::Client {
            address: Ipv4Addr::new(10, 0, 0, 9),
            port: 502,
        };

        let err = est.establish(0, role, 100).unwrap_err();
        assert!(matches!(err, SocketError::EstablishTimeout { channel: ChannelId(0), port: 502, timeout_ms: 100 }));
        assert!(clock.now_ms() >= 100 && clock.now_ms() < 107);
        // one connect per INIT observation
        assert_eq!(commands.get(), 16);
        assert_eq!(est.driver().borrow().0.closed, vec![ChannelId(0)]);
    }

    #[test]
    fn wrong_channel_from_open_is_released() {
        let mut driver = FixedStatus::new(SocketStatus::Closed);
        driver.open_result = Some(ChannelId(5));
        let (est, _clock) = establisher(driver);
        let err = est.establish(80, Role::Server, 1000).unwrap_err();
        assert!(matches!(err, SocketError::OpenFailed { channel: ChannelId(0), source: DriverError::SockNum, .. }));
        assert_eq!(est.driver().borrow().closed, vec![ChannelId(0)]);
    }

    #[test]
    fn claimed_channels_are_skipped() {
        let (est, _clock) = establisher(FixedStatus::new(SocketStatus::Closed));
        let other = est.clone();
        other.claims().claim(ChannelId(0));
        other.claims().claim(ChannelId(1));

        let err = est.establish(80, Role::Server, 1000).unwrap_err();
        assert!(matches!(err, SocketError::Aborted { channel: ChannelId(2), .. }));
        assert_eq!(est.driver().borrow().opened, vec![ChannelId(2)]);
        // a failed attempt leaves the other claims alone
        assert_eq!(est.claims().claimed(), vec![ChannelId(0), ChannelId(1)]);
    }

    #[test]
    fn release_and_forget_drop_the_claim() {
        let (est, _clock) = establisher(FixedStatus::new(SocketStatus::Closed));
        est.claims().claim(ChannelId(3));
        est.claims().claim(ChannelId(4));
        est.release(ChannelId(3)).unwrap();
        est.forget(ChannelId(4));
        assert!(est.claims().claimed().is_empty());
        assert_eq!(est.driver().borrow().closed, vec![ChannelId(3)]);
    }

    #[test]
    fn channel_count_is_clamped() {
        let (est, _clock) = establisher(FixedStatus::new(SocketStatus::Closed));
        assert_eq!(est.clone().with_channels(0).channels(), 1);
        assert_eq!(est.with_channels(32).channels(), 8);
    }
}
