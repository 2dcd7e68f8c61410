//! Clocks for driving simulations
//!
//! [`SimulatedClock`] only moves when the driver advances it, so runs are
//! deterministic. [`RealTimeClock`] follows the monotonic system clock for
//! harnesses that pace against wall time.

use bwe_core::Clock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Manually advanced millisecond clock
///
/// Clones share the same time, so a driver can hand copies to senders and
/// keep advancing its own.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    now_ms: Arc<AtomicI64>,
}

impl SimulatedClock {
    /// Create a clock starting at `start_ms`
    pub fn new(start_ms: i64) -> Self {
        SimulatedClock {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    /// Move time forward by `delta_ms`
    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Jump to `time_ms`; never moves backwards
    pub fn advance_to(&self, time_ms: i64) {
        self.now_ms.fetch_max(time_ms, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn time_in_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Monotonic wall clock measured from its creation
#[derive(Debug, Clone, Copy)]
pub struct RealTimeClock {
    origin: Instant,
}

impl RealTimeClock {
    /// Create a clock reading zero now
    pub fn new() -> Self {
        RealTimeClock {
            origin: Instant::now(),
        }
    }
}

impl Default for RealTimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealTimeClock {
    fn time_in_ms(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}
