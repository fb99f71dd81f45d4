// Chip protocol codes - status register values, open modes and driver return codes
use std::fmt;
use thiserror::Error;

// Sn_SR values reported by the socket status register
pub const SOCK_CLOSED: u8 = 0x00;
pub const SOCK_INIT: u8 = 0x13;
pub const SOCK_LISTEN: u8 = 0x14;
pub const SOCK_SYNSENT: u8 = 0x15;
pub const SOCK_SYNRECV: u8 = 0x16;
pub const SOCK_ESTABLISHED: u8 = 0x17;
pub const SOCK_FIN_WAIT: u8 = 0x18;
pub const SOCK_CLOSING: u8 = 0x1A;
pub const SOCK_TIME_WAIT: u8 = 0x1B;
pub const SOCK_CLOSE_WAIT: u8 = 0x1C;
pub const SOCK_LAST_ACK: u8 = 0x1D;
pub const SOCK_UDP: u8 = 0x22;
pub const SOCK_IPRAW4: u8 = 0x32;
pub const SOCK_IPRAW6: u8 = 0x33;
pub const SOCK_MACRAW: u8 = 0x42;

/// State of one hardware channel as read from its status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketStatus {
    Closed,
    Init,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
    Udp,
    IpRaw4,
    IpRaw6,
    MacRaw,
    /// Any code this layer does not name; kept so it round-trips unchanged.
    Other(u8),
}

impl SocketStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            SOCK_CLOSED => SocketStatus::Closed,
            SOCK_INIT => SocketStatus::Init,
            SOCK_LISTEN => SocketStatus::Listen,
            SOCK_SYNSENT => SocketStatus::SynSent,
            SOCK_SYNRECV => SocketStatus::SynRecv,
            SOCK_ESTABLISHED => SocketStatus::Established,
            SOCK_FIN_WAIT => SocketStatus::FinWait,
            SOCK_CLOSING => SocketStatus::Closing,
            SOCK_TIME_WAIT => SocketStatus::TimeWait,
            SOCK_CLOSE_WAIT => SocketStatus::CloseWait,
            SOCK_LAST_ACK => SocketStatus::LastAck,
            SOCK_UDP => SocketStatus::Udp,
            SOCK_IPRAW4 => SocketStatus::IpRaw4,
            SOCK_IPRAW6 => SocketStatus::IpRaw6,
            SOCK_MACRAW => SocketStatus::MacRaw,
            other => SocketStatus::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            SocketStatus::Closed => SOCK_CLOSED,
            SocketStatus::Init => SOCK_INIT,
            SocketStatus::Listen => SOCK_LISTEN,
            SocketStatus::SynSent => SOCK_SYNSENT,
            SocketStatus::SynRecv => SOCK_SYNRECV,
            SocketStatus::Established => SOCK_ESTABLISHED,
            SocketStatus::FinWait => SOCK_FIN_WAIT,
            SocketStatus::Closing => SOCK_CLOSING,
            SocketStatus::TimeWait => SOCK_TIME_WAIT,
            SocketStatus::CloseWait => SOCK_CLOSE_WAIT,
            SocketStatus::LastAck => SOCK_LAST_ACK,
            SocketStatus::Udp => SOCK_UDP,
            SocketStatus::IpRaw4 => SOCK_IPRAW4,
            SocketStatus::IpRaw6 => SOCK_IPRAW6,
            SocketStatus::MacRaw => SOCK_MACRAW,
            SocketStatus::Other(code) => code,
        }
    }

    /// Status encoded the way slot polling reports "no data": `0 - status`.
    pub fn negated(self) -> i32 {
        -(self.code() as i32)
    }

    /// Data may still be read from the receive buffer in this state.
    pub fn is_readable(self) -> bool {
        matches!(self, SocketStatus::Established | SocketStatus::CloseWait)
    }
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SocketStatus::Closed => write!(f, "CLOSED"),
            SocketStatus::Init => write!(f, "INIT"),
            SocketStatus::Listen => write!(f, "LISTEN"),
            SocketStatus::SynSent => write!(f, "SYNSENT"),
            SocketStatus::SynRecv => write!(f, "SYNRECV"),
            SocketStatus::Established => write!(f, "ESTABLISHED"),
            SocketStatus::FinWait => write!(f, "FIN_WAIT"),
            SocketStatus::Closing => write!(f, "CLOSING"),
            SocketStatus::TimeWait => write!(f, "TIME_WAIT"),
            SocketStatus::CloseWait => write!(f, "CLOSE_WAIT"),
            SocketStatus::LastAck => write!(f, "LAST_ACK"),
            SocketStatus::Udp => write!(f, "UDP"),
            SocketStatus::IpRaw4 => write!(f, "IPRAW4"),
            SocketStatus::IpRaw6 => write!(f, "IPRAW6"),
            SocketStatus::MacRaw => write!(f, "MACRAW"),
            SocketStatus::Other(code) => write!(f, "0x{:02x}", code),
        }
    }
}

// Sn_MR protocol selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketMode {
    Tcp4 = 0x01,
    Udp4 = 0x02,
    Tcp6 = 0x09,
    /// TCP accepting both address families; what the establisher opens with.
    TcpDual = 0x0D,
}

impl SocketMode {
    pub fn is_tcp(self) -> bool {
        matches!(self, SocketMode::Tcp4 | SocketMode::Tcp6 | SocketMode::TcpDual)
    }
}

/// Return codes of the low-level socket and control calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("socket busy")]
    Busy,
    #[error("invalid socket number")]
    SockNum,
    #[error("invalid socket option")]
    SockOpt,
    #[error("socket not initialised")]
    SockInit,
    #[error("socket closed")]
    SockClosed,
    #[error("invalid socket mode")]
    SockMode,
    #[error("invalid socket flag")]
    SockFlag,
    #[error("invalid socket status")]
    SockStatus,
    #[error("invalid argument")]
    Arg,
    #[error("port is zero")]
    PortZero,
    #[error("invalid ip address")]
    IpInvalid,
    #[error("socket timeout")]
    Timeout,
    #[error("invalid data length")]
    DataLen,
    #[error("insufficient socket buffer")]
    Buffer,
    #[error("fatal socket error")]
    Fatal,
    #[error("chip control request rejected")]
    Control,
    #[error("driver error code {0}")]
    Other(i16),
}

impl DriverError {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => DriverError::Busy,
            -1 => DriverError::SockNum,
            -2 => DriverError::SockOpt,
            -3 => DriverError::SockInit,
            -4 => DriverError::SockClosed,
            -5 => DriverError::SockMode,
            -6 => DriverError::SockFlag,
            -7 => DriverError::SockStatus,
            -10 => DriverError::Arg,
            -11 => DriverError::PortZero,
            -12 => DriverError::IpInvalid,
            -13 => DriverError::Timeout,
            -14 => DriverError::DataLen,
            -15 => DriverError::Buffer,
            -1000 => DriverError::Fatal,
            other => DriverError::Other(other),
        }
    }

    /// Numeric code; socket and control calls share -1, so `Control`
    /// is reported as -1 as well.
    pub fn code(self) -> i16 {
        match self {
            DriverError::Busy => 0,
            DriverError::SockNum => -1,
            DriverError::SockOpt => -2,
            DriverError::SockInit => -3,
            DriverError::SockClosed => -4,
            DriverError::SockMode => -5,
            DriverError::SockFlag => -6,
            DriverError::SockStatus => -7,
            DriverError::Arg => -10,
            DriverError::PortZero => -11,
            DriverError::IpInvalid => -12,
            DriverError::Timeout => -13,
            DriverError::DataLen => -14,
            DriverError::Buffer => -15,
            DriverError::Fatal => -1000,
            DriverError::Control => -1,
            DriverError::Other(code) => code,
        }
    }
}
