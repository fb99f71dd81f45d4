// Simulated offload chip: a channel table with status registers, receive
// buffers and a scripted remote peer, driven through the SocketDriver trait
pub mod bus;

pub use bus::*;

use std::collections::HashSet;
use std::net::Ipv4Addr;

use log::trace;

use wiz_buffer::SocketBuffer;
use wiz_core::{
    BufferMap, ChannelId, ChipCommand, ChipReply, DriverError, InterruptMask, LockKind,
    NetworkIdentity, PhyLink, SocketMode, SocketStatus, MAX_CHANNELS,
};
use wiz_transport::{BusCallbacks, BusOps, BusRegistry, SocketDriver};

// Register offsets touched by each simulated access
const SN_MR: u16 = 0x0000;
const SN_CR: u16 = 0x0010;
const SN_IR: u16 = 0x0020;
const SN_SR: u16 = 0x0030;
const SN_RX_RSR: u16 = 0x0224;
const SN_TX_WR: u16 = 0x020C;
const SN_RX_RD: u16 = 0x0228;
const COMMON_PHYSR: u16 = 0x3000;
const COMMON_NETINFO: u16 = 0x4120;

// Local ports handed out when a channel is opened on port 0
const EPHEMERAL_BASE: u16 = 0xC000;

/// Commands the simulated chip received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Reset,
    Open { channel: ChannelId, port: u16 },
    Connect { channel: ChannelId, address: Ipv4Addr, port: u16 },
    Listen(ChannelId),
    Close(ChannelId),
    CloseFailed(ChannelId),
    Disconnect(ChannelId),
}

enum BusBinding {
    Detached,
    Attached(Box<dyn BusOps + Send>),
    Callbacks(BusCallbacks),
}

struct SimChannel {
    status: SocketStatus,
    forced: Option<SocketStatus>,
    local_port: u16,
    remote: Option<(Ipv4Addr, u16)>,
    rx: SocketBuffer,
    outbound: Vec<u8>,
    con_event: bool,
}

impl SimChannel {
    fn new(rx_capacity: usize) -> Self {
        SimChannel {
            status: SocketStatus::Closed,
            forced: None,
            local_port: 0,
            remote: None,
            rx: SocketBuffer::new(rx_capacity),
            outbound: Vec::new(),
            con_event: false,
        }
    }

    fn shut(&mut self) {
        self.status = SocketStatus::Closed;
        self.remote = None;
        self.con_event = false;
        self.rx.clear();
    }
}

pub struct SimChip {
    channels: Vec<SimChannel>,
    bus: BusBinding,
    buffer_map: BufferMap,
    phy_link: PhyLink,
    interrupt_mask: InterruptMask,
    locks: u8,
    identity: Option<NetworkIdentity>,
    unreachable: HashSet<Ipv4Addr>,
    echo: bool,
    fail_close: bool,
    next_ephemeral: u16,
    events: Vec<SimEvent>,
}

impl SimChip {
    pub fn new(channels: u8) -> Self {
        let buffer_map = BufferMap::default();
        let count = channels.clamp(1, MAX_CHANNELS);
        SimChip {
            channels: (0..count)
                .map(|i| SimChannel::new(buffer_map.rx_bytes(ChannelId(i))))
                .collect(),
            bus: BusBinding::Detached,
            buffer_map,
            phy_link: PhyLink::On,
            interrupt_mask: InterruptMask::empty(),
            locks: 0,
            identity: None,
            unreachable: HashSet::new(),
            echo: true,
            fail_close: false,
            next_ephemeral: EPHEMERAL_BASE,
            events: Vec::new(),
        }
    }

    // --- peer and fault scripting ---

    /// Connects to `address` stay in SYNSENT.
    pub fn set_unreachable(&mut self, address: Ipv4Addr) {
        self.unreachable.insert(address);
    }

    /// When on, the peer echoes every byte sent back into the receive buffer.
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Make every close call fail without changing channel state.
    pub fn set_fail_close(&mut self, fail: bool) {
        self.fail_close = fail;
    }

    pub fn set_phy_link(&mut self, link: PhyLink) {
        self.phy_link = link;
    }

    /// Report `status` for `channel` regardless of what happens to it.
    pub fn force_status(&mut self, channel: ChannelId, status: Option<SocketStatus>) {
        if let Some(ch) = self.channels.get_mut(channel.index()) {
            ch.forced = status;
        }
    }

    /// A remote peer connects to a listening channel.
    pub fn accept_peer(&mut self, channel: ChannelId, peer: Ipv4Addr, port: u16) -> bool {
        match self.channels.get_mut(channel.index()) {
            Some(ch) if ch.status == SocketStatus::Listen => {
                ch.status = SocketStatus::Established;
                ch.remote = Some((peer, port));
                ch.con_event = true;
                true
            }
            _ => false,
        }
    }

    /// Bytes arriving from the peer; returns how many fit.
    pub fn peer_send(&mut self, channel: ChannelId, data: &[u8]) -> usize {
        match self.channels.get_mut(channel.index()) {
            Some(ch) if ch.status == SocketStatus::Established => ch.rx.push_slice(data),
            _ => 0,
        }
    }

    /// The peer sends FIN; the channel moves to CLOSE_WAIT.
    pub fn peer_close(&mut self, channel: ChannelId) -> bool {
        match self.channels.get_mut(channel.index()) {
            Some(ch) if ch.status == SocketStatus::Established => {
                ch.status = SocketStatus::CloseWait;
                true
            }
            _ => false,
        }
    }

    /// Everything the chip has sent to the peer on `channel` since the last call.
    pub fn peer_output(&mut self, channel: ChannelId) -> Vec<u8> {
        self.channels
            .get_mut(channel.index())
            .map(|ch| std::mem::take(&mut ch.outbound))
            .unwrap_or_default()
    }

    // --- inspection ---

    /// Current state without the transitions a status read performs.
    pub fn channel_status(&self, channel: ChannelId) -> Option<SocketStatus> {
        self.channels.get(channel.index()).map(|ch| ch.status)
    }

    pub fn local_port(&self, channel: ChannelId) -> Option<u16> {
        self.channels.get(channel.index()).map(|ch| ch.local_port)
    }

    pub fn channel_count(&self) -> u8 {
        self.channels.len() as u8
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn identity(&self) -> Option<&NetworkIdentity> {
        self.identity.as_ref()
    }

    pub fn buffer_map(&self) -> BufferMap {
        self.buffer_map
    }

    pub fn is_locked(&self, kind: LockKind) -> bool {
        self.locks & kind as u8 != 0
    }

    pub fn has_bus(&self) -> bool {
        !matches!(self.bus, BusBinding::Detached)
    }

    // --- internals ---

    fn reset_channels(&mut self) {
        for ch in &mut self.channels {
            ch.shut();
            ch.forced = None;
            ch.outbound.clear();
        }
        self.events.push(SimEvent::Reset);
    }

    // One SPI frame: 16-bit address, control byte, no data phase
    fn frame(&mut self, address: u16, block: u8, write: bool) {
        let control = (block << 3) | if write { 0x04 } else { 0x00 };
        let header = [(address >> 8) as u8, address as u8, control];
        match &mut self.bus {
            BusBinding::Detached => {}
            BusBinding::Attached(bus) => {
                bus.cs_enable();
                bus.write_burst(&header);
                bus.cs_disable();
            }
            BusBinding::Callbacks(callbacks) => {
                (callbacks.cs_enable)();
                (callbacks.write_burst)(&header);
                (callbacks.cs_disable)();
            }
        }
    }

    fn socket_frame(&mut self, channel: ChannelId, address: u16, write: bool) {
        self.frame(address, (channel.0 & 0x07) * 4 + 1, write);
    }

    fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut SimChannel, DriverError> {
        self.channels
            .get_mut(channel.index())
            .ok_or(DriverError::SockNum)
    }
}

impl SocketDriver for SimChip {
    fn open(&mut self, channel: ChannelId, mode: SocketMode, port: u16, _flags: u8) -> Result<ChannelId, DriverError> {
        if !mode.is_tcp() {
            return Err(DriverError::SockMode);
        }
        self.channel_mut(channel)?;
        let port = if port == 0 {
            let assigned = self.next_ephemeral;
            self.next_ephemeral = self.next_ephemeral.checked_add(1).unwrap_or(EPHEMERAL_BASE);
            assigned
        } else {
            port
        };
        self.socket_frame(channel, SN_MR, true);
        self.socket_frame(channel, SN_CR, true);
        let ch = self.channel_mut(channel)?;
        ch.shut();
        ch.local_port = port;
        ch.status = SocketStatus::Init;
        self.events.push(SimEvent::Open { channel, port });
        Ok(channel)
    }

    fn connect(&mut self, channel: ChannelId, address: Ipv4Addr, port: u16) -> Result<(), DriverError> {
        if address.is_unspecified() || address.is_broadcast() {
            return Err(DriverError::IpInvalid);
        }
        if port == 0 {
            return Err(DriverError::PortZero);
        }
        self.socket_frame(channel, SN_CR, true);
        let ch = self.channel_mut(channel)?;
        if ch.status != SocketStatus::Init {
            return Err(DriverError::SockInit);
        }
        ch.status = SocketStatus::SynSent;
        ch.remote = Some((address, port));
        self.events.push(SimEvent::Connect { channel, address, port });
        Ok(())
    }

    fn listen(&mut self, channel: ChannelId) -> Result<(), DriverError> {
        self.socket_frame(channel, SN_CR, true);
        let ch = self.channel_mut(channel)?;
        if ch.status != SocketStatus::Init {
            return Err(DriverError::SockInit);
        }
        ch.status = SocketStatus::Listen;
        self.events.push(SimEvent::Listen(channel));
        Ok(())
    }

    fn close(&mut self, channel: ChannelId) -> Result<(), DriverError> {
        self.socket_frame(channel, SN_CR, true);
        let fail = self.fail_close;
        let ch = self.channel_mut(channel)?;
        if fail {
            self.events.push(SimEvent::CloseFailed(channel));
            return Err(DriverError::SockStatus);
        }
        ch.shut();
        ch.forced = None;
        self.events.push(SimEvent::Close(channel));
        Ok(())
    }

    fn disconnect(&mut self, channel: ChannelId) -> Result<(), DriverError> {
        self.socket_frame(channel, SN_CR, true);
        let ch = self.channel_mut(channel)?;
        match ch.status {
            SocketStatus::Established | SocketStatus::CloseWait => {
                ch.status = SocketStatus::LastAck;
                self.events.push(SimEvent::Disconnect(channel));
                Ok(())
            }
            _ => Err(DriverError::SockStatus),
        }
    }

    fn send(&mut self, channel: ChannelId, data: &[u8]) -> Result<usize, DriverError> {
        if data.is_empty() {
            return Err(DriverError::DataLen);
        }
        self.socket_frame(channel, SN_TX_WR, true);
        let echo = self.echo;
        let ch = self.channel_mut(channel)?;
        if !ch.status.is_readable() {
            return Err(DriverError::SockStatus);
        }
        ch.outbound.extend_from_slice(data);
        let accepted = if echo { ch.rx.push_slice(data) } else { data.len() };
        trace!("sim socket:{} sent {} of {} bytes", channel, accepted, data.len());
        Ok(accepted)
    }

    fn receive(&mut self, channel: ChannelId, buf: &mut [u8]) -> Result<usize, DriverError> {
        self.socket_frame(channel, SN_RX_RD, false);
        let ch = self.channel_mut(channel)?;
        if ch.rx.is_empty() && !ch.status.is_readable() {
            return Err(DriverError::SockStatus);
        }
        Ok(ch.rx.pop_into(buf))
    }

    fn status(&mut self, channel: ChannelId) -> Result<SocketStatus, DriverError> {
        self.socket_frame(channel, SN_SR, false);
        let unreachable = &self.unreachable;
        let ch = self
            .channels
            .get_mut(channel.index())
            .ok_or(DriverError::SockNum)?;
        if let Some(forced) = ch.forced {
            return Ok(forced);
        }
        match ch.status {
            SocketStatus::SynSent => {
                let reachable = ch
                    .remote
                    .map_or(false, |(address, _)| !unreachable.contains(&address));
                if reachable {
                    ch.status = SocketStatus::Established;
                    ch.con_event = true;
                }
            }
            SocketStatus::LastAck => ch.shut(),
            _ => {}
        }
        Ok(ch.status)
    }

    fn rx_occupancy(&mut self, channel: ChannelId) -> usize {
        self.socket_frame(channel, SN_RX_RSR, false);
        self.channels
            .get(channel.index())
            .map_or(0, |ch| ch.rx.len())
    }

    fn connection_event(&mut self, channel: ChannelId) -> bool {
        self.socket_frame(channel, SN_IR, false);
        self.channels
            .get(channel.index())
            .map_or(false, |ch| ch.con_event)
    }

    fn clear_connection_event(&mut self, channel: ChannelId) {
        self.socket_frame(channel, SN_IR, true);
        if let Some(ch) = self.channels.get_mut(channel.index()) {
            ch.con_event = false;
        }
    }

    fn control_chip(&mut self, command: ChipCommand) -> Result<ChipReply, DriverError> {
        match command {
            ChipCommand::GetPhyLink => {
                self.frame(COMMON_PHYSR, 0, false);
                Ok(ChipReply::PhyLink(self.phy_link))
            }
            ChipCommand::InitBuffers(map) => {
                if !map.is_valid() || self.is_locked(LockKind::Chip) {
                    return Err(DriverError::Control);
                }
                self.buffer_map = map;
                for (i, ch) in self.channels.iter_mut().enumerate() {
                    ch.rx = SocketBuffer::new(map.rx_bytes(ChannelId(i as u8)));
                }
                Ok(ChipReply::Done)
            }
            ChipCommand::SetInterruptMask(mask) => {
                self.interrupt_mask = mask;
                Ok(ChipReply::Done)
            }
            ChipCommand::GetInterruptMask => Ok(ChipReply::InterruptMask(self.interrupt_mask)),
            ChipCommand::Lock(kind) => {
                self.locks |= kind as u8;
                Ok(ChipReply::Done)
            }
            ChipCommand::Unlock(kind) => {
                self.locks &= !(kind as u8);
                Ok(ChipReply::Done)
            }
        }
    }

    fn control_network(&mut self, identity: &NetworkIdentity) -> Result<(), DriverError> {
        if self.is_locked(LockKind::Network) {
            return Err(DriverError::Control);
        }
        self.frame(COMMON_NETINFO, 0, true);
        self.identity = Some(identity.clone());
        Ok(())
    }

    /// The adapter pulses reset before handing the bus over, so every
    /// channel starts out CLOSED.
    fn attach_bus(&mut self, bus: Box<dyn BusOps + Send>) {
        self.bus = BusBinding::Attached(bus);
        self.reset_channels();
    }
}

impl BusRegistry for SimChip {
    fn register_bus(&mut self, callbacks: BusCallbacks) {
        self.bus = BusBinding::Callbacks(callbacks);
        self.reset_channels();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_established(chip: &mut SimChip, channel: ChannelId) {
        chip.open(channel, SocketMode::TcpDual, 0, 0).unwrap();
        chip.connect(channel, Ipv4Addr::new(10, 0, 0, 2), 7).unwrap();
        assert_eq!(chip.status(channel).unwrap(), SocketStatus::Established);
    }

    #[test]
    fn ephemeral_ports_count_up() {
        let mut chip = SimChip::new(8);
        chip.open(ChannelId(0), SocketMode::TcpDual, 0, 0).unwrap();
        chip.open(ChannelId(1), SocketMode::TcpDual, 0, 0).unwrap();
        chip.open(ChannelId(2), SocketMode::TcpDual, 80, 0).unwrap();
        assert_eq!(chip.local_port(ChannelId(0)), Some(0xC000));
        assert_eq!(chip.local_port(ChannelId(1)), Some(0xC001));
        assert_eq!(chip.local_port(ChannelId(2)), Some(80));
    }

    #[test]
    fn unreachable_connect_stays_in_synsent() {
        let mut chip = SimChip::new(8);
        let target = Ipv4Addr::new(10, 9, 9, 9);
        chip.set_unreachable(target);
        chip.open(ChannelId(0), SocketMode::TcpDual, 0, 0).unwrap();
        chip.connect(ChannelId(0), target, 80).unwrap();
        for _ in 0..3 {
            assert_eq!(chip.status(ChannelId(0)).unwrap(), SocketStatus::SynSent);
        }
    }

    #[test]
    fn disconnect_goes_through_last_ack() {
        let mut chip = SimChip::new(8);
        open_established(&mut chip, ChannelId(3));
        chip.peer_close(ChannelId(3));
        chip.disconnect(ChannelId(3)).unwrap();
        assert_eq!(chip.channel_status(ChannelId(3)), Some(SocketStatus::LastAck));
        assert_eq!(chip.status(ChannelId(3)).unwrap(), SocketStatus::Closed);
    }

    #[test]
    fn echo_loops_sent_bytes_back() {
        let mut chip = SimChip::new(8);
        open_established(&mut chip, ChannelId(0));
        assert_eq!(chip.send(ChannelId(0), b"ping").unwrap(), 4);
        assert_eq!(chip.rx_occupancy(ChannelId(0)), 4);
        assert_eq!(chip.peer_output(ChannelId(0)), b"ping".to_vec());

        chip.set_echo(false);
        chip.send(ChannelId(0), b"x").unwrap();
        assert_eq!(chip.rx_occupancy(ChannelId(0)), 4);
    }

    #[test]
    fn send_on_closed_channel_is_rejected() {
        let mut chip = SimChip::new(8);
        assert_eq!(chip.send(ChannelId(0), b"a"), Err(DriverError::SockStatus));
        assert_eq!(chip.send(ChannelId(9), b"a"), Err(DriverError::SockNum));
        assert_eq!(chip.receive(ChannelId(0), &mut [0u8; 4]), Err(DriverError::SockStatus));
    }

    #[test]
    fn invalid_buffer_map_is_refused() {
        let mut chip = SimChip::new(8);
        let result = chip.control_chip(ChipCommand::InitBuffers(BufferMap::uniform(4)));
        assert_eq!(result, Err(DriverError::Control));

        let mut map = BufferMap::uniform(0);
        map.rx[0] = 16;
        map.tx[0] = 16;
        chip.control_chip(ChipCommand::InitBuffers(map)).unwrap();
        assert_eq!(chip.buffer_map(), map);
    }

    #[test]
    fn frames_reach_attached_bus() {
        let mut chip = SimChip::new(8);
        let bus = RecordingBus::new();
        let trace = bus.trace();
        chip.attach_bus(Box::new(bus));
        assert_eq!(chip.events(), &[SimEvent::Reset]);
        chip.status(ChannelId(0)).unwrap();
        assert_eq!(trace.frames(), 1);
        assert_eq!(trace.bytes_out(), 3);
    }

    #[test]
    fn channel_without_rx_memory_drops_peer_bytes() {
        let mut chip = SimChip::new(8);
        let mut map = BufferMap::uniform(0);
        map.rx[0] = 16;
        map.tx[0] = 16;
        chip.control_chip(ChipCommand::InitBuffers(map)).unwrap();
        open_established(&mut chip, ChannelId(1));
        assert_eq!(chip.peer_send(ChannelId(1), b"abc"), 0);
        assert_eq!(chip.rx_occupancy(ChannelId(1)), 0);
    }
}
