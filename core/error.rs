// Errors reported by channel allocation and connection establishment
use thiserror::Error;

use crate::protocol::DriverError;
use crate::types::ChannelId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("no closed channel among {scanned} hardware channels")]
    SlotExhausted { scanned: u8 },
    #[error("channel {channel} on port {port} not ready after {timeout_ms}ms")]
    EstablishTimeout {
        channel: ChannelId,
        port: u16,
        timeout_ms: u64,
    },
    #[error("channel {channel} on port {port} closed while establishing")]
    Aborted { channel: ChannelId, port: u16 },
    #[error("channel {channel} open on port {port} failed: {source}")]
    OpenFailed {
        channel: ChannelId,
        port: u16,
        #[source]
        source: DriverError,
    },
    #[error("no bus operations bound")]
    TransportNotConfigured,
    #[error("slot index {index} out of range ({slots} slots)")]
    InvalidIndex { index: usize, slots: usize },
    #[error("unsupported host {host:?}, expected an IPv4 literal")]
    InvalidAddress { host: String },
    #[error("not connected")]
    NotConnected,
    #[error("no listening port recorded")]
    NoListenPort,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type SocketResult<T> = Result<T, SocketError>;

impl SocketError {
    /// A later attempt may succeed without any change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        match self {
            SocketError::SlotExhausted { .. }
            | SocketError::EstablishTimeout { .. }
            | SocketError::Aborted { .. } => true,
            _ => false,
        }
    }
}
