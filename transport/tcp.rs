// TCP client over one claimed hardware channel
use std::io;
use std::net::{IpAddr, Ipv4Addr};

use log::{debug, warn};

use wiz_core::{ChannelId, SocketError, SocketResult, SocketStatus, DEFAULT_TIMEOUT_MS};

use crate::establish::{Establisher, Role};
use crate::traits::{SocketDriver, Transport};

pub struct TcpClient<D: SocketDriver> {
    establisher: Establisher<D>,
    channel: Option<ChannelId>,
    remote: Option<(Ipv4Addr, u16)>,
    timeout_ms: u64,
}

impl<D: SocketDriver> TcpClient<D> {
    pub fn new(establisher: Establisher<D>) -> Self {
        TcpClient {
            establisher,
            channel: None,
            remote: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Client with a fixed remote endpoint, for use through [`Transport`].
    pub fn to(establisher: Establisher<D>, address: Ipv4Addr, port: u16) -> Self {
        let mut client = Self::new(establisher);
        client.remote = Some((address, port));
        client
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn timeout(&self) -> u64 {
        self.timeout_ms
    }

    /// Claim a channel and connect it to `address:port`, blocking up to
    /// `timeout_ms`. Any channel held before is released first.
    pub fn connect(&mut self, address: Ipv4Addr, port: u16, timeout_ms: u64) -> SocketResult<ChannelId> {
        self.stop();
        self.remote = Some((address, port));
        let channel = self
            .establisher
            .establish(0, Role::Client { address, port }, timeout_ms)?;
        debug!("socket:{} connected to {}:{}", channel, address, port);
        self.channel = Some(channel);
        Ok(channel)
    }

    /// Connect to an IPv4 literal using the configured timeout.
    pub fn connect_host(&mut self, host: &str, port: u16) -> SocketResult<ChannelId> {
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(address)) => self.connect(address, port, self.timeout_ms),
            Ok(IpAddr::V6(_)) => {
                warn!("ipv6 host {} not supported", host);
                self.stop();
                Err(SocketError::InvalidAddress { host: host.to_string() })
            }
            Err(_) => {
                warn!("host {} is not an ip literal", host);
                Err(SocketError::InvalidAddress { host: host.to_string() })
            }
        }
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    /// Raw channel number, or -1 when nothing is bound.
    pub fn handle(&self) -> i8 {
        self.channel.map_or(-1, |channel| channel.0 as i8)
    }

    /// A channel within the chip's table is bound.
    pub fn is_open(&self) -> bool {
        self.channel
            .map_or(false, |channel| channel.0 < self.establisher.channels())
    }

    pub fn connected(&self) -> bool {
        match self.channel {
            Some(channel) => self
                .establisher
                .status_view()
                .is(channel, SocketStatus::Established),
            None => false,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> usize {
        let Some(channel) = self.channel else {
            return 0;
        };
        match self.establisher.driver().borrow_mut().send(channel, data) {
            Ok(sent) => sent,
            Err(e) => {
                debug!("socket:{} send failed: {}", channel, e);
                0
            }
        }
    }

    pub fn write_byte(&mut self, byte: u8) -> usize {
        self.write(&[byte])
    }

    /// Bytes ready to read, or -1 when nothing is bound.
    pub fn available(&self) -> i32 {
        match self.channel {
            Some(channel) => self.establisher.status_view().pending(channel) as i32,
            None => -1,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(channel) = self.channel else {
            return 0;
        };
        match self.establisher.driver().borrow_mut().receive(channel, buf) {
            Ok(read) => read,
            Err(e) => {
                debug!("socket:{} receive failed: {}", channel, e);
                0
            }
        }
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte) {
            1 => Some(byte[0]),
            _ => None,
        }
    }

    /// The chip offers no non-destructive read.
    pub fn peek(&self) -> Option<u8> {
        None
    }

    pub fn flush(&mut self) {}

    /// Close the channel. The handle is cleared even if the close fails.
    pub fn stop(&mut self) {
        if let Some(channel) = self.channel.take() {
            let _ = self.establisher.release(channel);
        }
    }
}

impl<D: SocketDriver> Drop for TcpClient<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Not connected")
}

impl<D: SocketDriver> Transport for TcpClient<D> {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(channel) = self.channel else {
            return Err(not_connected());
        };
        self.establisher
            .driver()
            .borrow_mut()
            .send(channel, data)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(channel) = self.channel else {
            return Err(not_connected());
        };
        self.establisher
            .driver()
            .borrow_mut()
            .receive(channel, buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn connect(&mut self) -> io::Result<()> {
        let (address, port) = self.remote.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "No remote endpoint")
        })?;
        let timeout_ms = self.timeout_ms;
        TcpClient::connect(self, address, port, timeout_ms)
            .map(|_| ())
            .map_err(|e| match e {
                SocketError::EstablishTimeout { .. } => io::Error::new(io::ErrorKind::TimedOut, e),
                SocketError::SlotExhausted { .. } => io::Error::new(io::ErrorKind::WouldBlock, e),
                other => io::Error::new(io::ErrorKind::ConnectionRefused, other),
            })
    }

    fn disconnect(&mut self) -> io::Result<()> {
        self.stop();
        Ok(())
    }
}
