// Bus that counts what the driver does with it
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use wiz_transport::BusOps;

#[derive(Debug, Default)]
pub struct BusTrace {
    pub resets: AtomicUsize,
    pub selects: AtomicUsize,
    pub deselects: AtomicUsize,
    pub bytes_out: AtomicUsize,
    pub bytes_in: AtomicUsize,
}

impl BusTrace {
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }

    /// Completed chip-select cycles.
    pub fn frames(&self) -> usize {
        self.deselects.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> usize {
        self.bytes_out.load(Ordering::Relaxed)
    }
}

/// `BusOps` that reads back `fill` and records every call in a shared
/// [`BusTrace`].
pub struct RecordingBus {
    trace: Arc<BusTrace>,
    fill: u8,
}

impl RecordingBus {
    pub fn new() -> Self {
        RecordingBus {
            trace: Arc::new(BusTrace::default()),
            fill: 0xA5,
        }
    }

    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    pub fn trace(&self) -> Arc<BusTrace> {
        Arc::clone(&self.trace)
    }
}

impl Default for RecordingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusOps for RecordingBus {
    fn reset(&mut self) {
        self.trace.resets.fetch_add(1, Ordering::Relaxed);
    }

    fn cs_enable(&mut self) {
        self.trace.selects.fetch_add(1, Ordering::Relaxed);
    }

    fn cs_disable(&mut self) {
        self.trace.deselects.fetch_add(1, Ordering::Relaxed);
    }

    fn read_byte(&mut self) -> u8 {
        self.trace.bytes_in.fetch_add(1, Ordering::Relaxed);
        self.fill
    }

    fn write_byte(&mut self, _byte: u8) {
        self.trace.bytes_out.fetch_add(1, Ordering::Relaxed);
    }

    fn read_burst(&mut self, buf: &mut [u8]) {
        self.trace.bytes_in.fetch_add(buf.len(), Ordering::Relaxed);
        buf.fill(self.fill);
    }

    fn write_burst(&mut self, buf: &[u8]) {
        self.trace.bytes_out.fetch_add(buf.len(), Ordering::Relaxed);
    }

    fn transfer(&mut self, header: &[u8], data: &mut [u8]) {
        self.trace.bytes_out.fetch_add(header.len(), Ordering::Relaxed);
        self.trace.bytes_in.fetch_add(data.len(), Ordering::Relaxed);
        data.fill(self.fill);
    }
}
