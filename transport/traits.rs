// Transport abstraction - the chip driver boundary and the byte-stream traits built on it
use std::cell::RefCell;
use std::io;
use std::net::Ipv4Addr;
use std::rc::Rc;

use wiz_core::{
    ChannelId, ChipCommand, ChipReply, DriverError, NetworkIdentity, SocketMode, SocketStatus,
};

/// Bus operations the chip driver needs to reach the hardware.
///
/// Every operation is required. Use [`NullBus`] to run without hardware.
pub trait BusOps {
    /// Pulse the chip's hardware reset line.
    fn reset(&mut self);
    fn cs_enable(&mut self);
    fn cs_disable(&mut self);
    fn read_byte(&mut self) -> u8;
    fn write_byte(&mut self, byte: u8);
    fn read_burst(&mut self, buf: &mut [u8]);
    fn write_burst(&mut self, buf: &[u8]);
    /// Variable-length frame: clock out `header`, then exchange `data` in place.
    fn transfer(&mut self, header: &[u8], data: &mut [u8]);
}

/// Bus that does nothing: reads yield zero, writes vanish.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl BusOps for NullBus {
    fn reset(&mut self) {}
    fn cs_enable(&mut self) {}
    fn cs_disable(&mut self) {}
    fn read_byte(&mut self) -> u8 {
        0
    }
    fn write_byte(&mut self, _byte: u8) {}
    fn read_burst(&mut self, _buf: &mut [u8]) {}
    fn write_burst(&mut self, _buf: &[u8]) {}
    fn transfer(&mut self, _header: &[u8], _data: &mut [u8]) {}
}

/// Context-free bus handles, for drivers that register plain functions.
#[derive(Clone, Copy)]
pub struct BusCallbacks {
    pub read_byte: fn() -> u8,
    pub write_byte: fn(u8),
    pub read_burst: fn(&mut [u8]),
    pub write_burst: fn(&[u8]),
    pub transfer: fn(&[u8], &mut [u8]),
    pub cs_enable: fn(),
    pub cs_disable: fn(),
}

/// Driver side of the context-free registration.
pub trait BusRegistry {
    fn register_bus(&mut self, callbacks: BusCallbacks);
}

/// Low-level socket driver of the offload chip.
///
/// The chip runs TCP/IP itself; this layer only issues commands against
/// a channel and reads back its status register and buffer occupancy.
pub trait SocketDriver {
    /// Open `channel` in `mode` on local `port`; returns the channel the
    /// driver actually opened.
    fn open(&mut self, channel: ChannelId, mode: SocketMode, port: u16, flags: u8) -> Result<ChannelId, DriverError>;
    fn connect(&mut self, channel: ChannelId, address: Ipv4Addr, port: u16) -> Result<(), DriverError>;
    fn listen(&mut self, channel: ChannelId) -> Result<(), DriverError>;
    fn close(&mut self, channel: ChannelId) -> Result<(), DriverError>;
    fn disconnect(&mut self, channel: ChannelId) -> Result<(), DriverError>;
    fn send(&mut self, channel: ChannelId, data: &[u8]) -> Result<usize, DriverError>;
    fn receive(&mut self, channel: ChannelId, buf: &mut [u8]) -> Result<usize, DriverError>;
    fn status(&mut self, channel: ChannelId) -> Result<SocketStatus, DriverError>;
    /// Bytes waiting in the channel's receive buffer.
    fn rx_occupancy(&mut self, channel: ChannelId) -> usize;
    /// Connection-established interrupt flag.
    fn connection_event(&mut self, channel: ChannelId) -> bool;
    fn clear_connection_event(&mut self, channel: ChannelId);
    fn control_chip(&mut self, command: ChipCommand) -> Result<ChipReply, DriverError>;
    fn control_network(&mut self, identity: &NetworkIdentity) -> Result<(), DriverError>;
    /// Hand the driver its bus; replaces any bus attached before.
    fn attach_bus(&mut self, bus: Box<dyn BusOps + Send>);
}

/// Driver handle shared by every connection on one chip.
pub type SharedDriver<D> = Rc<RefCell<D>>;

pub fn shared<D: SocketDriver>(driver: D) -> SharedDriver<D> {
    Rc::new(RefCell::new(driver))
}

pub trait Transport {
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn connect(&mut self) -> io::Result<()>;
    fn disconnect(&mut self) -> io::Result<()>;
}

pub trait TransportListener {
    /// Start listening on every slot.
    fn bind(&mut self) -> io::Result<()>;
    /// Poll once; returns the slot index of a newly accepted connection.
    fn accept(&mut self) -> io::Result<Option<usize>>;
}
