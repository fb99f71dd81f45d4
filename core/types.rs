// Core types used across all layers
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bitflags::bitflags;

/// Number of socket channels on the chip.
pub const MAX_CHANNELS: u8 = 8;

// Hardware channel index (0..MAX_CHANNELS)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u8);

impl ChannelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// PHY link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PhyLink {
    Off = 0,
    On = 1,
}

// Register groups guarded by the chip's write lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockKind {
    Phy = 1 << 0,
    Network = 1 << 1,
    Chip = 1 << 2,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LockKind::Phy => write!(f, "PHY"),
            LockKind::Network => write!(f, "NET"),
            LockKind::Chip => write!(f, "CHIP"),
        }
    }
}

bitflags! {
    /// Interrupt sources, laid out as IMR (bits 0-7), SIMR (8-15) and SLIMR (16-23).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterruptMask: u32 {
        const PPPOE_TERMINATED = 1 << 0;
        const DEST_UNREACH = 1 << 1;
        const IP_CONFLICT = 1 << 2;
        const DEST_UNREACH6 = 1 << 4;
        const WOL = 1 << 7;
        const NET_ALL = 0x97;

        const SOCK_0 = 1 << 8;
        const SOCK_1 = 1 << 9;
        const SOCK_2 = 1 << 10;
        const SOCK_3 = 1 << 11;
        const SOCK_4 = 1 << 12;
        const SOCK_5 = 1 << 13;
        const SOCK_6 = 1 << 14;
        const SOCK_7 = 1 << 15;
        const SOCK_ALL = 0xFF << 8;

        const SOCKL_TIMEOUT = 1 << 16;
        const SOCKL_ARP4 = 1 << 17;
        const SOCKL_PING4 = 1 << 18;
        const SOCKL_ARP6 = 1 << 19;
        const SOCKL_PING6 = 1 << 20;
        const SOCKL_NS = 1 << 21;
        const SOCKL_RS = 1 << 22;
        const SOCKL_RA = 1 << 23;
        const SOCKL_ALL = 0xFF << 16;
    }
}

impl InterruptMask {
    pub fn for_channel(channel: ChannelId) -> Self {
        InterruptMask::from_bits_truncate(1 << (8 + channel.0 as u32))
    }
}

/// Per-channel TX/RX buffer sizes in KB.
///
/// Each entry must be one of 0, 1, 2, 4, 8, 16 and each direction may
/// use at most 16 KB in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMap {
    pub tx: [u8; MAX_CHANNELS as usize],
    pub rx: [u8; MAX_CHANNELS as usize],
}

impl BufferMap {
    pub const TOTAL_KB: u16 = 16;

    pub fn uniform(kb: u8) -> Self {
        BufferMap {
            tx: [kb; MAX_CHANNELS as usize],
            rx: [kb; MAX_CHANNELS as usize],
        }
    }

    pub fn is_valid(&self) -> bool {
        let sizes_ok = self
            .tx
            .iter()
            .chain(self.rx.iter())
            .all(|kb| matches!(kb, 0 | 1 | 2 | 4 | 8 | 16));
        let tx_total: u16 = self.tx.iter().map(|&kb| kb as u16).sum();
        let rx_total: u16 = self.rx.iter().map(|&kb| kb as u16).sum();
        sizes_ok && tx_total <= Self::TOTAL_KB && rx_total <= Self::TOTAL_KB
    }

    pub fn rx_bytes(&self, channel: ChannelId) -> usize {
        self.rx[channel.index()] as usize * 1024
    }
}

impl Default for BufferMap {
    fn default() -> Self {
        BufferMap::uniform(2)
    }
}

/// Addressing handed to the chip once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    /// IPv6 link-local address
    pub lla: Ipv6Addr,
    /// IPv6 global unicast address
    pub gua: Ipv6Addr,
    /// IPv6 prefix mask
    pub sn6: Ipv6Addr,
    /// IPv6 gateway
    pub gw6: Ipv6Addr,
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        NetworkIdentity {
            mac: [0x00, 0x08, 0xdc, 0xff, 0xff, 0xff],
            ip: Ipv4Addr::new(192, 168, 100, 25),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 100, 1),
            dns: Ipv4Addr::new(168, 126, 63, 1),
            lla: Ipv6Addr::new(0xfe80, 0, 0, 0, 0x0208, 0xdcff, 0xfeff, 0xffff),
            gua: Ipv6Addr::UNSPECIFIED,
            sn6: Ipv6Addr::new(0xffff, 0xffff, 0xffff, 0xffff, 0, 0, 0, 0),
            gw6: Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated) into a MAC address.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(|c| c == ':' || c == '-');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

// Chip-wide control requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipCommand {
    GetPhyLink,
    InitBuffers(BufferMap),
    SetInterruptMask(InterruptMask),
    GetInterruptMask,
    Lock(LockKind),
    Unlock(LockKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipReply {
    Done,
    PhyLink(PhyLink),
    InterruptMask(InterruptMask),
}
