// Multi-slot TCP server: logical slots lazily bound to hardware channels
use std::io;

use log::{debug, warn};

use wiz_core::{ChannelId, SocketError, SocketResult, SocketStatus, DEFAULT_TIMEOUT_MS};

use crate::establish::{Establisher, Role};
use crate::traits::{SocketDriver, TransportListener};

pub const DEFAULT_SERVER_SLOTS: usize = 4;

/// Server connections sharing one listening port.
///
/// Each slot holds at most one channel. Slots that could not be bound are
/// retried from [`is_available`](TcpServer::is_available), so more slots
/// than channels simply leaves the extra slots unbound.
pub struct TcpServer<D: SocketDriver> {
    establisher: Establisher<D>,
    slots: Vec<Option<ChannelId>>,
    port: Option<u16>,
    timeout_ms: u64,
}

// Outcome of polling one slot
struct SlotPoll {
    available: bool,
    accepted: bool,
}

impl<D: SocketDriver> TcpServer<D> {
    pub fn new(establisher: Establisher<D>, slots: usize) -> Self {
        TcpServer {
            establisher,
            slots: vec![None; slots],
            port: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Server with the default slot count, listening on `port` right away.
    pub fn bound(establisher: Establisher<D>, port: u16) -> Self {
        let mut server = Self::new(establisher, DEFAULT_SERVER_SLOTS);
        server.establish(port);
        server
    }

    /// Record the listening port without binding; see [`TransportListener::bind`].
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn channel(&self, index: usize) -> Option<ChannelId> {
        self.slots.get(index).copied().flatten()
    }

    pub fn status(&self, index: usize) -> Option<SocketStatus> {
        self.channel(index)
            .and_then(|channel| self.establisher.status_view().status(channel))
    }

    /// Start listening on `port` in every slot. Returns true when every
    /// slot got a channel; the rest are retried on later polls.
    pub fn establish(&mut self, port: u16) -> bool {
        self.port = Some(port);
        let mut bound = 0;
        for index in 0..self.slots.len() {
            if self.establish_slot(index).is_ok() {
                bound += 1;
            }
        }
        debug!("server port {}: {}/{} slots listening", port, bound, self.slots.len());
        bound == self.slots.len()
    }

    /// (Re)bind one slot. A channel already held is closed before a new one
    /// is claimed. Fails with `NoListenPort` before a port is known.
    pub fn establish_slot(&mut self, index: usize) -> SocketResult<ChannelId> {
        let slots = self.slots.len();
        let port = self.port.ok_or(SocketError::NoListenPort)?;
        if index >= slots {
            return Err(SocketError::InvalidIndex { index, slots });
        }
        if let Some(previous) = self.slots[index].take() {
            let _ = self.establisher.release(previous);
        }
        let channel = self.establisher.establish(port, Role::Server, self.timeout_ms)?;
        self.slots[index] = Some(channel);
        Ok(channel)
    }

    fn poll_slot(&mut self, index: usize) -> SlotPoll {
        let idle = SlotPoll {
            available: false,
            accepted: false,
        };
        if index >= self.slots.len() {
            debug!("server slot {} out of range", index);
            return idle;
        }

        if self.slots[index].is_none() && self.port.is_some() {
            if let Err(e) = self.establish_slot(index) {
                if e.is_retryable() {
                    debug!("server slot {} has no valid socket: {}", index, e);
                } else {
                    warn!("server slot {} has no valid socket: {}", index, e);
                }
            }
        }

        let Some(channel) = self.slots[index] else {
            return idle;
        };
        let view = self.establisher.status_view();
        match view.status(channel) {
            Some(SocketStatus::Established) => SlotPoll {
                available: true,
                accepted: view.take_connection_event(channel),
            },
            Some(SocketStatus::Closed) => {
                debug!("server slot {} socket:{} closed", index, channel);
                self.slots[index] = None;
                self.establisher.forget(channel);
                idle
            }
            _ => idle,
        }
    }

    /// Whether slot `index` has an established peer. Unbound slots are
    /// re-established first; the connection-accepted flag is acknowledged.
    pub fn is_available(&mut self, index: usize) -> bool {
        self.poll_slot(index).available
    }

    /// Bytes ready on slot `index`, or `0 - status` when there are none.
    ///
    /// An ESTABLISHED slot reports its byte count (possibly 0). A CLOSE_WAIT
    /// slot reports its remaining bytes; once drained it is disconnected so
    /// the channel can close and be reused. Unbound slots report CLOSED (0).
    pub fn available(&mut self, index: usize) -> i32 {
        self.poll_slot(index);
        let Some(channel) = self.channel(index) else {
            return SocketStatus::Closed.negated();
        };
        let view = self.establisher.status_view();
        match view.status(channel) {
            Some(SocketStatus::Established) => view.pending(channel) as i32,
            Some(SocketStatus::CloseWait) => {
                let pending = view.pending(channel);
                if pending > 0 {
                    return pending as i32;
                }
                debug!("server slot {} socket:{} peer closed, disconnecting", index, channel);
                if let Err(e) = self.establisher.driver().borrow_mut().disconnect(channel) {
                    warn!("socket:{} disconnect failed: {}", channel, e);
                }
                SocketStatus::CloseWait.negated()
            }
            Some(SocketStatus::Closed) => {
                self.slots[index] = None;
                self.establisher.forget(channel);
                SocketStatus::Closed.negated()
            }
            None => SocketStatus::Closed.negated(),
            Some(status) => status.negated(),
        }
    }

    pub fn read(&mut self, index: usize, buf: &mut [u8]) -> usize {
        let Some(channel) = self.channel(index) else {
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

    pub fn write(&mut self, index: usize, data: &[u8]) -> usize {
        let Some(channel) = self.channel(index) else {
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

    /// Close slot `index`; it is re-established on the next poll.
    pub fn close(&mut self, index: usize) {
        if let Some(channel) = self.slots.get_mut(index).and_then(Option::take) {
            let _ = self.establisher.release(channel);
        }
    }

    pub fn close_all(&mut self) {
        for index in 0..self.slots.len() {
            self.close(index);
        }
    }
}

impl<D: SocketDriver> Drop for TcpServer<D> {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl<D: SocketDriver> TransportListener for TcpServer<D> {
    fn bind(&mut self) -> io::Result<()> {
        let port = self.port.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "No listening port")
        })?;
        self.establish(port);
        if self.slots.iter().any(Option::is_some) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "No free socket"))
        }
    }

    fn accept(&mut self) -> io::Result<Option<usize>> {
        for index in 0..self.slots.len() {
            let poll = self.poll_slot(index);
            if poll.available && poll.accepted {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}
