//! Windowed receive-rate counter

use std::collections::VecDeque;

/// Default averaging window for the receiving rate (ms)
pub const DEFAULT_RATE_WINDOW_MS: i64 = 1000;

#[derive(Debug, Clone, Copy)]
struct RateSample {
    time_ms: i64,
    payload_size: usize,
}

/// Byte-rate accumulator over a sliding time window
///
/// Samples are kept while they are newer than `latest_time - window`. The
/// rate is the bytes in the window divided by the full window length, so a
/// freshly started flow reads low until a whole window has been observed.
#[derive(Debug, Clone)]
pub struct RateCounter {
    window_ms: i64,
    samples: VecDeque<RateSample>,
    bytes_in_window: u64,
}

impl RateCounter {
    /// Create a counter averaging over `window_ms`
    pub fn new(window_ms: i64) -> Self {
        RateCounter {
            window_ms: window_ms.max(1),
            samples: VecDeque::new(),
            bytes_in_window: 0,
        }
    }

    /// Record `payload_size` bytes observed at `time_ms`
    pub fn update(&mut self, time_ms: i64, payload_size: usize) {
        self.samples.push_back(RateSample {
            time_ms,
            payload_size,
        });
        self.bytes_in_window += payload_size as u64;
        self.evict_before(time_ms - self.window_ms);
    }

    fn evict_before(&mut self, limit_ms: i64) {
        while let Some(front) = self.samples.front() {
            if front.time_ms > limit_ms {
                break;
            }
            self.bytes_in_window -= front.payload_size as u64;
            self.samples.pop_front();
        }
    }

    /// Bits per second over the window
    pub fn bits_per_second(&self) -> u64 {
        self.bytes_in_window * 8 * 1000 / self.window_ms as u64
    }

    /// Packets per second over the window
    pub fn packets_per_second(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.window_ms as u64
    }

    /// Window length in seconds
    pub fn bitrate_window_s(&self) -> f64 {
        self.window_ms as f64 / 1000.0
    }

    /// Window length in milliseconds
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW_MS)
    }
}
