// Deadline-bounded polling with an injectable time source
use std::cell::Cell;
use std::task::Poll;
use std::thread;
use std::time::{Duration, Instant};

/// Default bound on a blocking establish, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

/// Monotonic millisecond time source.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn delay_ms(&self, ms: u64);
}

/// Wall clock backed by `Instant`; `delay_ms` sleeps the thread.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn delay_ms(&self, ms: u64) {
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    }
}

/// Clock that only moves when delayed or advanced, for deterministic tests
/// and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn delay_ms(&self, ms: u64) {
        // A zero interval would never reach the deadline
        self.advance(ms.max(1));
    }
}

/// Call `step` until it yields `Ready` or `timeout_ms` has elapsed since the
/// first call, waiting `interval_ms` between attempts.
///
/// The last attempt happens at or after the deadline, so a call returns
/// within `timeout_ms + interval_ms` plus the cost of one `step`.
pub fn poll_until<T, F>(clock: &dyn Clock, timeout_ms: u64, interval_ms: u64, mut step: F) -> Option<T>
where
    F: FnMut() -> Poll<T>,
{
    let start = clock.now_ms();
    loop {
        if let Poll::Ready(value) = step() {
            return Some(value);
        }
        if clock.now_ms().saturating_sub(start) >= timeout_ms {
            return None;
        }
        clock.delay_ms(interval_ms);
    }
}
