// Process-wide bus binding behind context-free trampolines.
//
// Some chip drivers register plain function handles and keep no context.
// The trampolines below look the active bus up at call time and do nothing
// when none is bound.
use std::sync::{Mutex, MutexGuard};

use log::debug;
use once_cell::sync::Lazy;

use crate::traits::{BusCallbacks, BusOps};

type BoundBus = Option<Box<dyn BusOps + Send>>;

// Global bus slot - initialized lazily and never dropped
static ACTIVE_BUS: Lazy<Mutex<BoundBus>> = Lazy::new(|| Mutex::new(None));

fn slot() -> MutexGuard<'static, BoundBus> {
    // A panic inside a bus op must not wedge every later transfer
    ACTIVE_BUS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_bus<R>(fallback: R, op: impl FnOnce(&mut dyn BusOps) -> R) -> R {
    let mut guard = slot();
    match guard.as_mut() {
        Some(bus) => op(bus.as_mut()),
        None => fallback,
    }
}

/// Make `bus` the process-wide binding; returns the one it replaced.
///
/// Waits for any transfer running on the previous bus to finish first.
pub fn bind(bus: Box<dyn BusOps + Send>) -> Option<Box<dyn BusOps + Send>> {
    let previous = slot().replace(bus);
    if previous.is_some() {
        debug!("bus binding replaced");
    }
    previous
}

pub fn unbind() -> Option<Box<dyn BusOps + Send>> {
    slot().take()
}

pub fn is_bound() -> bool {
    slot().is_some()
}

pub fn reset() {
    with_bus((), |bus| bus.reset())
}

pub fn read_byte() -> u8 {
    with_bus(0, |bus| bus.read_byte())
}

pub fn write_byte(byte: u8) {
    with_bus((), |bus| bus.write_byte(byte))
}

pub fn read_burst(buf: &mut [u8]) {
    with_bus((), |bus| bus.read_burst(buf))
}

pub fn write_burst(buf: &[u8]) {
    with_bus((), |bus| bus.write_burst(buf))
}

pub fn transfer(header: &[u8], data: &mut [u8]) {
    with_bus((), |bus| bus.transfer(header, data))
}

pub fn cs_enable() {
    with_bus((), |bus| bus.cs_enable())
}

pub fn cs_disable() {
    with_bus((), |bus| bus.cs_disable())
}

impl BusCallbacks {
    /// Handles routed through the process-wide binding.
    pub fn trampolines() -> Self {
        BusCallbacks {
            read_byte,
            write_byte,
            read_burst,
            write_burst,
            transfer,
            cs_enable,
            cs_disable,
        }
    }
}
