//! Media packet traces
//!
//! A trace is any ordered sequence of [`MediaPacket`]s. The player releases
//! packets once the clock reaches their send time.

use bwe_core::packet::{FlowId, MediaPacket};
use std::iter::Peekable;

/// Endless constant-rate packet source
#[derive(Debug, Clone)]
pub struct ConstantRateTrace {
    flow_id: FlowId,
    next_sequence_number: u16,
    next_send_time_ms: i64,
    packet_interval_ms: i64,
    payload_size: usize,
}

impl Iterator for ConstantRateTrace {
    type Item = MediaPacket;

    fn next(&mut self) -> Option<MediaPacket> {
        let packet = MediaPacket::new(
            self.flow_id,
            self.next_sequence_number,
            self.next_send_time_ms,
            self.payload_size,
        );
        self.next_sequence_number = self.next_sequence_number.wrapping_add(1);
        self.next_send_time_ms += self.packet_interval_ms;
        Some(packet)
    }
}

/// Build a trace sending `payload_size` bytes every `packet_interval_ms`
///
/// Sequence numbers start at `first_sequence_number` and wrap at 65536.
pub fn constant_rate_trace(
    flow_id: FlowId,
    first_sequence_number: u16,
    start_ms: i64,
    packet_interval_ms: i64,
    payload_size: usize,
) -> ConstantRateTrace {
    ConstantRateTrace {
        flow_id,
        next_sequence_number: first_sequence_number,
        next_send_time_ms: start_ms,
        packet_interval_ms: packet_interval_ms.max(1),
        payload_size,
    }
}

/// Replays a trace against a clock
pub struct TracePlayer<I: Iterator<Item = MediaPacket>> {
    packets: Peekable<I>,
    played: u64,
}

impl<I: Iterator<Item = MediaPacket>> TracePlayer<I> {
    /// Create a player for a trace ordered by send time
    pub fn new<T: IntoIterator<IntoIter = I>>(trace: T) -> Self {
        TracePlayer {
            packets: trace.into_iter().peekable(),
            played: 0,
        }
    }

    /// Release every packet whose send time is at or before `now_ms`
    pub fn poll(&mut self, now_ms: i64) -> Vec<MediaPacket> {
        let mut due = Vec::new();
        while let Some(packet) = self.packets.next_if(|p| p.send_time_ms <= now_ms) {
            due.push(packet);
        }
        self.played += due.len() as u64;
        due
    }

    /// Send time of the next packet, if any remain
    pub fn next_send_time_ms(&mut self) -> Option<i64> {
        self.packets.peek().map(|p| p.send_time_ms)
    }

    /// Number of packets released so far
    pub fn played(&self) -> u64 {
        self.played
    }
}
