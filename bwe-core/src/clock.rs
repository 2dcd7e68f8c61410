//! Millisecond clock abstraction
//!
//! Senders and the simulation driver read time through this trait so the
//! same code runs against a simulated clock or a monotonic wall clock.

use std::sync::Arc;

/// Monotonic millisecond clock
pub trait Clock: Send + Sync {
    /// Current time in milliseconds
    fn time_in_ms(&self) -> i64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn time_in_ms(&self) -> i64 {
        (**self).time_in_ms()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn time_in_ms(&self) -> i64 {
        (**self).time_in_ms()
    }
}

/// Clock that never advances
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn time_in_ms(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock(42);
        assert_eq!(clock.time_in_ms(), 42);
    }

    fn read_clock<C: Clock>(clock: C) -> i64 {
        clock.time_in_ms()
    }

    #[test]
    fn test_shared_clock() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(7));
        let shared = clock.clone();
        assert_eq!(shared.time_in_ms(), 7);
        assert_eq!(read_clock(&clock), 7);
    }
}
