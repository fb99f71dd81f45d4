// lib: socket stack facade over one offload chip
// Brings the chip up, exposes its chip-wide controls and hands out clients
// and servers that share the chip's channel table

// Re-export core vocabulary and errors
pub use wiz_core::*;

// Re-export transport abstractions
pub use wiz_transport::*;

pub mod config;

pub use config::*;

use std::rc::Rc;

use log::{info, warn};

/// One chip, its clock and the configuration every connection is built from.
///
/// Every establisher handed out shares the chip's channel claims.
pub struct Chip<D: SocketDriver> {
    driver: SharedDriver<D>,
    clock: Rc<dyn Clock>,
    claims: ChannelClaims,
    config: StackConfig,
}

impl<D: SocketDriver> Chip<D> {
    pub fn new(driver: D, config: StackConfig) -> Self {
        Self::with_clock(driver, config, Rc::new(SystemClock::new()))
    }

    pub fn with_clock(driver: D, config: StackConfig, clock: Rc<dyn Clock>) -> Self {
        Chip {
            driver: shared(driver),
            clock,
            claims: ChannelClaims::new(),
            config,
        }
    }

    pub fn driver(&self) -> &SharedDriver<D> {
        &self.driver
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Reset the chip through `adapter`, apply the configured buffer map and
    /// register the network identity.
    pub fn start(&self, adapter: TransportAdapter) -> Result<(), DriverError> {
        adapter.init(&mut *self.driver.borrow_mut());
        self.configure()
    }

    /// Like [`start`](Chip::start) for drivers that only take plain
    /// function handles; the bus is bound process-wide.
    pub fn start_global(&self, adapter: TransportAdapter) -> Result<(), DriverError>
    where
        D: BusRegistry,
    {
        adapter.init_global(&mut *self.driver.borrow_mut());
        self.configure()
    }

    fn configure(&self) -> Result<(), DriverError> {
        if let Some(map) = self.config.buffer_map {
            self.update_buffer_map(map)?;
        }
        self.register_net_info(&self.config.identity)?;
        info!(
            "chip up: ip {} mac {:02x?} channels {}",
            self.config.identity.ip, self.config.identity.mac, self.config.channels
        );
        Ok(())
    }

    fn control(&self, command: ChipCommand) -> Result<ChipReply, DriverError> {
        self.driver
            .borrow_mut()
            .control_chip(command)
            .map_err(|e| {
                warn!("chip control {:?} failed: {}", command, e);
                e
            })
    }

    pub fn is_phy_link_on(&self) -> bool {
        matches!(
            self.control(ChipCommand::GetPhyLink),
            Ok(ChipReply::PhyLink(PhyLink::On))
        )
    }

    pub fn update_buffer_map(&self, map: BufferMap) -> Result<(), DriverError> {
        self.control(ChipCommand::InitBuffers(map)).map(|_| ())
    }

    pub fn set_interrupt_mask(&self, mask: InterruptMask) -> Result<(), DriverError> {
        self.control(ChipCommand::SetInterruptMask(mask)).map(|_| ())
    }

    pub fn interrupt_mask(&self) -> Result<InterruptMask, DriverError> {
        match self.control(ChipCommand::GetInterruptMask)? {
            ChipReply::InterruptMask(mask) => Ok(mask),
            other => {
                warn!("chip control GetInterruptMask: unexpected reply {:?}", other);
                Err(DriverError::Control)
            }
        }
    }

    pub fn chip_lock(&self, kind: LockKind) -> Result<(), DriverError> {
        self.control(ChipCommand::Lock(kind)).map(|_| ())
    }

    pub fn chip_unlock(&self, kind: LockKind) -> Result<(), DriverError> {
        self.control(ChipCommand::Unlock(kind)).map(|_| ())
    }

    pub fn register_net_info(&self, identity: &NetworkIdentity) -> Result<(), DriverError> {
        self.driver
            .borrow_mut()
            .control_network(identity)
            .map_err(|e| {
                warn!("network info {} not registered: {}", identity.ip, e);
                e
            })
    }

    pub fn establisher(&self) -> Establisher<D> {
        Establisher::new(Rc::clone(&self.driver), Rc::clone(&self.clock))
            .with_claims(self.claims.clone())
            .with_channels(self.config.channels)
            .with_poll_interval(self.config.poll_interval_ms)
    }

    pub fn tcp_client(&self) -> TcpClient<D> {
        let mut client = TcpClient::new(self.establisher());
        client.set_timeout(self.config.timeout_ms);
        client
    }

    pub fn tcp_server(&self) -> TcpServer<D> {
        let mut server = TcpServer::new(self.establisher(), self.config.server_slots);
        server.set_timeout(self.config.timeout_ms);
        server
    }
}
