//! Simulated network link
//!
//! Delivers items after a fixed one-way delay. Media links can additionally
//! drop packets following a deterministic loss model, so loss scenarios are
//! reproducible run to run.

use bwe_core::packet::MediaPacket;
use std::collections::VecDeque;

/// Deterministic packet loss pattern
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LossModel {
    /// Deliver everything
    #[default]
    None,
    /// Drop packets whose raw sequence number falls in one of the inclusive ranges
    Ranges(Vec<(u16, u16)>),
    /// Drop every `every`-th packet put on the link
    Periodic {
        /// Drop period in packets; 0 disables dropping
        every: u64,
    },
}

impl LossModel {
    /// Decide whether the `index`-th packet (0-based) with this sequence number is lost
    pub fn drops(&self, sequence_number: u16, index: u64) -> bool {
        match self {
            LossModel::None => false,
            LossModel::Ranges(ranges) => ranges
                .iter()
                .any(|&(start, end)| (start..=end).contains(&sequence_number)),
            LossModel::Periodic { every } => *every > 0 && index % every == every - 1,
        }
    }
}

/// Fixed-delay link
#[derive(Debug, Clone)]
pub struct SimulatedLink<T> {
    delay_ms: i64,
    loss: LossModel,
    in_flight: VecDeque<(i64, T)>,
    sent: u64,
    dropped: u64,
}

impl<T> SimulatedLink<T> {
    /// Create a lossless link with a one-way delay
    pub fn new(delay_ms: i64) -> Self {
        Self::with_loss(delay_ms, LossModel::None)
    }

    /// Create a link with a one-way delay and a loss model
    pub fn with_loss(delay_ms: i64, loss: LossModel) -> Self {
        SimulatedLink {
            delay_ms: delay_ms.max(0),
            loss,
            in_flight: VecDeque::new(),
            sent: 0,
            dropped: 0,
        }
    }

    /// Put an item on the link; it arrives `delay_ms` later
    pub fn send(&mut self, now_ms: i64, item: T) {
        self.sent += 1;
        self.in_flight.push_back((now_ms + self.delay_ms, item));
    }

    /// Take every item that has arrived by `now_ms`, with its arrival time
    pub fn poll(&mut self, now_ms: i64) -> Vec<(i64, T)> {
        let mut arrived = Vec::new();
        while let Some((arrival_ms, _)) = self.in_flight.front() {
            if *arrival_ms > now_ms {
                break;
            }
            if let Some(entry) = self.in_flight.pop_front() {
                arrived.push(entry);
            }
        }
        arrived
    }

    /// Items currently travelling
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Items offered to the link, including dropped ones
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Items dropped by the loss model
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// One-way delay (ms)
    pub fn delay_ms(&self) -> i64 {
        self.delay_ms
    }
}

impl SimulatedLink<MediaPacket> {
    /// Put a media packet on the link, applying the loss model
    ///
    /// Returns false if the packet was dropped.
    pub fn transmit(&mut self, now_ms: i64, packet: MediaPacket) -> bool {
        if self.loss.drops(packet.sequence_number, self.sent) {
            self.sent += 1;
            self.dropped += 1;
            tracing::trace!(
                "Link dropped packet {} of flow {}",
                packet.sequence_number,
                packet.flow_id
            );
            return false;
        }
        self.send(now_ms, packet);
        true
    }
}
