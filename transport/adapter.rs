// Wires a set of bus operations into the chip driver
use log::debug;

use crate::trampoline;
use crate::traits::{BusCallbacks, BusOps, BusRegistry, SocketDriver};

/// Owns the bus operations until they are handed to a driver.
///
/// Both init paths reset the chip once, which the driver sees as every
/// channel returning to CLOSED.
pub struct TransportAdapter {
    ops: Box<dyn BusOps + Send>,
}

impl TransportAdapter {
    pub fn new<B: BusOps + Send + 'static>(ops: B) -> Self {
        TransportAdapter { ops: Box::new(ops) }
    }

    pub fn from_boxed(ops: Box<dyn BusOps + Send>) -> Self {
        TransportAdapter { ops }
    }

    /// Reset the chip and give the bus to `driver`, which passes it along
    /// on every access. A bus attached earlier is replaced.
    pub fn init<D: SocketDriver + ?Sized>(self, driver: &mut D) {
        let mut ops = self.ops;
        ops.reset();
        driver.attach_bus(ops);
        debug!("bus attached to driver");
    }

    /// Bind the bus process-wide and register the trampolines with a driver
    /// that only accepts plain function handles. Replaces any earlier
    /// process-wide binding.
    pub fn init_global<R: BusRegistry + ?Sized>(self, registry: &mut R) {
        trampoline::bind(self.ops);
        trampoline::reset();
        registry.register_bus(BusCallbacks::trampolines());
        debug!("bus trampolines registered");
    }
}
