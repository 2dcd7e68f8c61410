//! Receiver-side packet accounting
//!
//! A [`BweReceiver`] tracks one flow. Arriving packets go into a bounded
//! [`LinkedSet`] and a [`RateCounter`]; the set backs the loss statistics and
//! the counter backs the receiving rate. Whenever the set fills up, its loss
//! account is folded into a lifetime total before old records are dropped,
//! so the global loss ratio stays unbiased however long the flow runs.

use crate::linked_set::{LinkedSet, SetError};
use crate::loss::LossAccount;
use crate::packet::{FeedbackKind, FeedbackPacket, FeedbackPayload, FlowId, MediaPacket, PacketArrival};
use crate::rate::RateCounter;
use crate::sender::BandwidthEstimatorType;
use std::collections::VecDeque;
use thiserror::Error;

/// Default number of packets kept in the set
pub const DEFAULT_SET_CAPACITY: usize = 1000;

/// Window used for the recent loss ratio (ms)
pub const PACKET_LOSS_TIME_WINDOW_MS: i64 = 500;

/// Window used for the receiving rate (ms)
pub const RECEIVING_RATE_TIME_WINDOW_MS: i64 = 1000;

/// Receiver errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    #[error("Invalid packet set: {0}")]
    Set(#[from] SetError),

    #[error("Invalid flow id: {0}")]
    InvalidFlowId(FlowId),

    #[error("Feedback interval must be positive, got {0} ms")]
    InvalidFeedbackInterval(i64),

    #[error("{name} must be positive, got {value_ms} ms")]
    InvalidWindow { name: &'static str, value_ms: i64 },
}

/// Receiver tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Capacity of the packet set
    pub set_capacity: usize,
    /// Window for the recent loss ratio (ms)
    pub packet_loss_window_ms: i64,
    /// Window for the receiving rate (ms)
    pub receiving_rate_window_ms: i64,
}

impl ReceiverConfig {
    fn validate_windows(&self) -> Result<(), ReceiverError> {
        for (name, value_ms) in [
            ("packet_loss_window_ms", self.packet_loss_window_ms),
            ("receiving_rate_window_ms", self.receiving_rate_window_ms),
        ] {
            if value_ms <= 0 {
                return Err(ReceiverError::InvalidWindow { name, value_ms });
            }
        }
        Ok(())
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            set_capacity: DEFAULT_SET_CAPACITY,
            packet_loss_window_ms: PACKET_LOSS_TIME_WINDOW_MS,
            receiving_rate_window_ms: RECEIVING_RATE_TIME_WINDOW_MS,
        }
    }
}

/// Receiver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// No packet received yet
    Idle,
    /// At least one packet received
    Receiving,
}

/// Receiver for one simulated flow
#[derive(Debug, Clone)]
pub struct BweReceiver {
    flow_id: FlowId,
    config: ReceiverConfig,
    state: ReceiverState,
    /// Deals with packets received more than once
    received_packets: LinkedSet,
    rate_counter: RateCounter,
    /// Closed-out loss over everything that left the set
    loss_account: LossAccount,
    feedback_kind: FeedbackKind,
    feedback_interval_ms: i64,
    last_feedback_ms: Option<i64>,
    latest_send_time_ms: i64,
    pending_arrivals: VecDeque<PacketArrival>,
    pending_acks: VecDeque<u16>,
    packets_received: u64,
}

/// Create the receiver paired with an estimator kind
pub fn create_bwe_receiver(
    estimator: BandwidthEstimatorType,
    flow_id: FlowId,
    config: ReceiverConfig,
) -> Result<BweReceiver, ReceiverError> {
    BweReceiver::with_feedback(
        flow_id,
        estimator.feedback_kind(),
        estimator.feedback_interval_ms(),
        config,
    )
}

impl BweReceiver {
    /// Create a receiver that never produces feedback
    pub fn new(flow_id: FlowId, config: ReceiverConfig) -> Result<Self, ReceiverError> {
        Self::with_feedback(flow_id, FeedbackKind::None, i64::MAX, config)
    }

    /// Create a receiver producing `feedback_kind` every `feedback_interval_ms`
    pub fn with_feedback(
        flow_id: FlowId,
        feedback_kind: FeedbackKind,
        feedback_interval_ms: i64,
        config: ReceiverConfig,
    ) -> Result<Self, ReceiverError> {
        if flow_id < 0 {
            return Err(ReceiverError::InvalidFlowId(flow_id));
        }
        if feedback_interval_ms <= 0 {
            return Err(ReceiverError::InvalidFeedbackInterval(feedback_interval_ms));
        }
        config.validate_windows()?;

        Ok(BweReceiver {
            flow_id,
            config,
            state: ReceiverState::Idle,
            received_packets: LinkedSet::new(config.set_capacity)?,
            rate_counter: RateCounter::new(config.receiving_rate_window_ms),
            loss_account: LossAccount::default(),
            feedback_kind,
            feedback_interval_ms,
            last_feedback_ms: None,
            latest_send_time_ms: 0,
            pending_arrivals: VecDeque::new(),
            pending_acks: VecDeque::new(),
            packets_received: 0,
        })
    }

    /// Account for an arrived media packet
    pub fn receive_packet(&mut self, arrival_time_ms: i64, packet: &MediaPacket) {
        let unwrapped = self.received_packets.peek_unwrap(packet.sequence_number);
        if self.received_packets.is_full() && !self.received_packets.contains(unwrapped) {
            self.relieve_set_and_update_loss();
        }

        let evicted = self.received_packets.insert(
            packet.sequence_number,
            packet.send_time_ms,
            arrival_time_ms,
            packet.payload_size,
        );
        if let Some(evicted) = evicted {
            tracing::warn!(
                "Flow {} evicted packet {} without loss accounting",
                self.flow_id,
                evicted.unwrapped_sequence_number
            );
        }

        self.rate_counter.update(arrival_time_ms, packet.payload_size);
        self.latest_send_time_ms = self.latest_send_time_ms.max(packet.send_time_ms);
        self.packets_received += 1;
        self.state = ReceiverState::Receiving;

        match self.feedback_kind {
            FeedbackKind::PacketArrivals => {
                if self.pending_arrivals.len() >= self.config.set_capacity {
                    self.pending_arrivals.pop_front();
                }
                self.pending_arrivals.push_back(PacketArrival {
                    sequence_number: packet.sequence_number,
                    send_time_ms: packet.send_time_ms,
                    arrival_time_ms,
                    payload_size: packet.payload_size,
                });
            }
            FeedbackKind::Acks => {
                if self.pending_acks.len() >= self.config.set_capacity {
                    self.pending_acks.pop_front();
                }
                self.pending_acks.push_back(packet.sequence_number);
            }
            FeedbackKind::None | FeedbackKind::ReceiverReport => {}
        }
    }

    /// Build feedback for the paired sender if it is due
    ///
    /// Returns `None` while idle, for receivers without feedback, or when
    /// less than the feedback interval has passed since the last feedback.
    pub fn get_feedback(&mut self, now_ms: i64) -> Option<FeedbackPacket> {
        if self.feedback_kind == FeedbackKind::None || self.state == ReceiverState::Idle {
            return None;
        }
        if let Some(last) = self.last_feedback_ms {
            if now_ms - last < self.feedback_interval_ms {
                return None;
            }
        }

        let payload = match self.feedback_kind {
            FeedbackKind::None => return None,
            FeedbackKind::ReceiverReport => FeedbackPayload::ReceiverReport {
                receiving_rate_kbps: self.recent_kbps(),
                recent_loss_ratio: self.recent_packet_loss_ratio(),
                global_loss_ratio: self.global_receiver_packet_loss_ratio(),
            },
            FeedbackKind::PacketArrivals => {
                FeedbackPayload::PacketArrivals(self.pending_arrivals.drain(..).collect())
            }
            FeedbackKind::Acks => FeedbackPayload::Acks(self.pending_acks.drain(..).collect()),
        };
        self.last_feedback_ms = Some(now_ms);

        tracing::trace!(
            "Flow {} feedback at {} ms: {:?}",
            self.flow_id,
            now_ms,
            payload.kind()
        );

        Some(FeedbackPacket {
            flow_id: self.flow_id,
            creation_time_ms: now_ms,
            latest_send_time_ms: self.latest_send_time_ms,
            payload,
        })
    }

    /// Receiving rate over the rate window, rounded to kbps
    pub fn recent_kbps(&self) -> u32 {
        let kbps = (self.rate_counter.bits_per_second() + 500) / 1000;
        u32::try_from(kbps).unwrap_or(u32::MAX)
    }

    /// Loss ratio over the packets received within the loss window
    ///
    /// Walks the set from the most recent arrival backwards while arrivals
    /// are within the window of the newest one, and compares the number of
    /// packets seen to the sequence-number span they cover. A reordered
    /// packet that arrived before the window counts as missing.
    pub fn recent_packet_loss_ratio(&self) -> f32 {
        let Some(newest) = self.received_packets.front() else {
            return 0.0;
        };

        let time_limit_ms = newest.arrival_time_ms - self.config.packet_loss_window_ms;
        let mut oldest_seq = newest.unwrapped_sequence_number;
        let mut newest_seq = oldest_seq;
        let mut number_received: i64 = 0;

        for record in self
            .received_packets
            .iter()
            .take_while(|r| r.arrival_time_ms >= time_limit_ms)
        {
            oldest_seq = oldest_seq.min(record.unwrapped_sequence_number);
            newest_seq = newest_seq.max(record.unwrapped_sequence_number);
            number_received += 1;
        }

        let gap = newest_seq - oldest_seq + 1;
        (gap - number_received) as f32 / gap as f32
    }

    /// Loss ratio over the whole flow
    ///
    /// Valid up to `usize::MAX` accounted packets.
    pub fn global_receiver_packet_loss_ratio(&self) -> f32 {
        let mut account = self.loss_account;
        account.add(self.linked_set_loss_account());
        account.loss_ratio()
    }

    /// Loss account of the packets currently held in the set
    pub(crate) fn linked_set_loss_account(&self) -> LossAccount {
        if self.received_packets.is_empty() {
            return LossAccount::default();
        }
        let total = self.received_packets.range() as usize;
        let lost = total.saturating_sub(self.received_packets.len());
        LossAccount::new(total, lost)
    }

    /// Fold the set's current loss account into the lifetime total
    pub(crate) fn update_loss(&mut self) {
        let account = self.linked_set_loss_account();
        self.loss_account.add(account);
    }

    /// Drop old records while keeping the lifetime loss account exact
    ///
    /// The whole set is folded in first. Everything but the newest half (by
    /// recency) is then erased, and the account of what is left is subtracted
    /// again since those records will be folded in on a later relief or query.
    pub(crate) fn relieve_set_and_update_loss(&mut self) {
        self.update_loss();

        let keep = self.received_packets.len() / 2;
        let stale: Vec<i64> = self
            .received_packets
            .iter()
            .skip(keep)
            .map(|r| r.unwrapped_sequence_number)
            .collect();

        for seq in &stale {
            self.received_packets.erase(*seq);
        }

        let retained = self.linked_set_loss_account();
        self.loss_account.subtract(retained);

        tracing::debug!(
            "Flow {} relieved packet set: erased {}, retained {}, global account {}/{}",
            self.flow_id,
            stale.len(),
            self.received_packets.len(),
            self.loss_account.num_lost,
            self.loss_account.num_total
        );
    }

    /// Flow this receiver belongs to
    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Lifecycle state
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Capacity of the packet set
    pub fn set_capacity(&self) -> usize {
        self.received_packets.capacity()
    }

    /// Receiving-rate window in seconds
    pub fn bitrate_window_s(&self) -> f64 {
        self.rate_counter.bitrate_window_s()
    }

    /// Packets currently held for loss accounting
    pub fn received_packets(&self) -> &LinkedSet {
        &self.received_packets
    }

    /// Lifetime loss account, excluding the packets still in the set
    pub fn closed_loss_account(&self) -> LossAccount {
        self.loss_account
    }

    /// Feedback interval (ms)
    pub fn feedback_interval_ms(&self) -> i64 {
        self.feedback_interval_ms
    }

    /// Number of packets passed to [`receive_packet`](Self::receive_packet)
    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }
}
