//! Sequence Number Unwrapping
//!
//! Transport sequence numbers are 16-bit values that wrap around every 65536
//! packets. This module turns them into monotonic 64-bit values so packets can
//! be ordered and subtracted across any number of wraps.

/// Size of the 16-bit sequence space
pub const SEQ_NUMBER_MODULUS: i64 = 1 << 16;

/// Half the sequence space; the largest forward step that is taken literally
const HALF_MODULUS: i64 = SEQ_NUMBER_MODULUS / 2;

/// Check whether `a` is ahead of `b` in 16-bit modular order
///
/// When the two values are exactly half the space apart the numerically
/// larger one is considered ahead, so the answer is always deterministic.
#[inline]
pub fn is_newer_sequence_number(a: u16, b: u16) -> bool {
    let diff = a.wrapping_sub(b);
    if diff as i64 == HALF_MODULUS {
        return a > b;
    }
    diff != 0 && (diff as i64) < HALF_MODULUS
}

/// Signed distance from `from` to `to`, in the range `[-32768, 32768]`
///
/// Positive values mean `to` is ahead of `from`.
#[inline]
pub fn forward_distance(from: u16, to: u16) -> i64 {
    let diff = to.wrapping_sub(from) as i64;
    if diff == HALF_MODULUS {
        if to > from {
            diff
        } else {
            -diff
        }
    } else if diff > HALF_MODULUS {
        diff - SEQ_NUMBER_MODULUS
    } else {
        diff
    }
}

/// Stateful unwrapper for 16-bit sequence numbers
///
/// The first value maps to itself. Each later value is placed at whichever
/// candidate (forward or backward across the wrap) lies closest to the last
/// unwrapped value, so reordering within half the sequence space is
/// tolerated. Unwrapped values may go negative if the stream steps backwards
/// past its starting point.
#[derive(Debug, Clone, Default)]
pub struct SequenceUnwrapper {
    last_unwrapped: Option<i64>,
}

impl SequenceUnwrapper {
    /// Create an unwrapper with no history
    pub fn new() -> Self {
        SequenceUnwrapper {
            last_unwrapped: None,
        }
    }

    /// Unwrap a sequence number and remember it as the reference for the next call
    pub fn unwrap(&mut self, sequence_number: u16) -> i64 {
        let unwrapped = self.peek(sequence_number);
        self.last_unwrapped = Some(unwrapped);
        unwrapped
    }

    /// Unwrap a sequence number without updating the reference
    pub fn peek(&self, sequence_number: u16) -> i64 {
        match self.last_unwrapped {
            None => sequence_number as i64,
            Some(last) => {
                let last_raw = last.rem_euclid(SEQ_NUMBER_MODULUS) as u16;
                last + forward_distance(last_raw, sequence_number)
            }
        }
    }

    /// Last unwrapped value, if any
    pub fn last(&self) -> Option<i64> {
        self.last_unwrapped
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.last_unwrapped = None;
    }
}
