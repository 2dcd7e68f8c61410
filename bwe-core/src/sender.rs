//! Sender-side estimator contract and factory
//!
//! The congestion-control algorithms themselves live outside this crate.
//! What is defined here is the contract every estimator fulfils towards the
//! harness, the enumeration of estimator kinds, and the single factory that
//! picks an implementation for a kind.

use crate::clock::Clock;
use crate::packet::{FeedbackKind, FeedbackPacket, FeedbackPayload, MediaPacket};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Available estimator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandwidthEstimatorType {
    /// No estimation, fixed rate
    Null,
    /// Network-assisted dynamic adaptation
    Nada,
    /// Receiver-estimated maximum bitrate
    Remb,
    /// Send-side estimation from per-packet arrival feedback
    SendSide,
    /// TCP-like window estimation from acknowledgements
    Tcp,
    /// BBR-like model-based estimation
    Bbr,
}

impl BandwidthEstimatorType {
    /// All estimator kinds, in declaration order
    pub const ALL: [BandwidthEstimatorType; 6] = [
        BandwidthEstimatorType::Null,
        BandwidthEstimatorType::Nada,
        BandwidthEstimatorType::Remb,
        BandwidthEstimatorType::SendSide,
        BandwidthEstimatorType::Tcp,
        BandwidthEstimatorType::Bbr,
    ];

    /// Display name used in plots and reports
    pub fn name(self) -> &'static str {
        match self {
            BandwidthEstimatorType::Null => "Null",
            BandwidthEstimatorType::Nada => "NADA",
            BandwidthEstimatorType::Remb => "REMB",
            BandwidthEstimatorType::SendSide => "GoogCc",
            BandwidthEstimatorType::Tcp => "TCP",
            BandwidthEstimatorType::Bbr => "BBR",
        }
    }

    /// How often the receiver should send feedback to this estimator
    pub fn feedback_interval_ms(self) -> i64 {
        match self {
            BandwidthEstimatorType::Null => 1000,
            BandwidthEstimatorType::Nada => 100,
            BandwidthEstimatorType::Remb => 100,
            BandwidthEstimatorType::SendSide => 50,
            BandwidthEstimatorType::Tcp => 10,
            BandwidthEstimatorType::Bbr => 100,
        }
    }

    /// Feedback contents this estimator consumes
    pub fn feedback_kind(self) -> FeedbackKind {
        match self {
            BandwidthEstimatorType::Null => FeedbackKind::None,
            BandwidthEstimatorType::Nada | BandwidthEstimatorType::Remb => {
                FeedbackKind::ReceiverReport
            }
            BandwidthEstimatorType::SendSide | BandwidthEstimatorType::Bbr => {
                FeedbackKind::PacketArrivals
            }
            BandwidthEstimatorType::Tcp => FeedbackKind::Acks,
        }
    }
}

impl fmt::Display for BandwidthEstimatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Unknown estimator name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown estimator: {0}")]
pub struct ParseEstimatorError(pub String);

impl FromStr for BandwidthEstimatorType {
    type Err = ParseEstimatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(BandwidthEstimatorType::Null),
            "nada" => Ok(BandwidthEstimatorType::Nada),
            "remb" => Ok(BandwidthEstimatorType::Remb),
            "sendside" | "send-side" | "googcc" => Ok(BandwidthEstimatorType::SendSide),
            "tcp" => Ok(BandwidthEstimatorType::Tcp),
            "bbr" => Ok(BandwidthEstimatorType::Bbr),
            _ => Err(ParseEstimatorError(s.to_string())),
        }
    }
}

/// Bitrate bounds applied by every sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BweLimits {
    /// Lowest bitrate a sender will report (kbps)
    pub min_bitrate_kbps: u32,
    /// Highest bitrate a sender will report (kbps)
    pub max_bitrate_kbps: u32,
}

impl BweLimits {
    /// Clamp a bitrate into the limits
    pub fn clamp_kbps(&self, kbps: u32) -> u32 {
        kbps.clamp(self.min_bitrate_kbps, self.max_bitrate_kbps)
    }
}

impl Default for BweLimits {
    fn default() -> Self {
        BweLimits {
            min_bitrate_kbps: 10,
            max_bitrate_kbps: 25_000,
        }
    }
}

/// Receives bitrate updates from a sender
pub trait BitrateObserver: Send {
    /// Called with the newly observed bitrate (bits per second)
    fn on_network_changed(&mut self, bitrate_bps: u32);
}

impl<F: FnMut(u32) + Send> BitrateObserver for F {
    fn on_network_changed(&mut self, bitrate_bps: u32) {
        self(bitrate_bps)
    }
}

/// Sender side of an estimator
pub trait BweSender: Send {
    /// Estimator kind implemented by this sender
    fn estimator(&self) -> BandwidthEstimatorType;

    /// Interval at which this sender expects feedback
    fn feedback_interval_ms(&self) -> i64;

    /// Process feedback from the paired receiver
    fn give_feedback(&mut self, feedback: &FeedbackPacket);

    /// Notify the sender of packets just put on the wire
    fn on_packets_sent(&mut self, packets: &[MediaPacket]);

    /// Current target bitrate (kbps)
    fn target_bitrate_kbps(&self) -> u32;
}

/// Create the sender for an estimator kind
///
/// `kbps` is the starting bitrate and is clamped into `limits`.
pub fn create_bwe_sender(
    estimator: BandwidthEstimatorType,
    kbps: u32,
    observer: Box<dyn BitrateObserver>,
    clock: Arc<dyn Clock>,
    limits: BweLimits,
) -> Box<dyn BweSender> {
    let start_kbps = limits.clamp_kbps(kbps);
    if start_kbps != kbps {
        tracing::warn!(
            "{} sender start bitrate {} kbps clamped to {} kbps",
            estimator,
            kbps,
            start_kbps
        );
    }

    match estimator {
        BandwidthEstimatorType::Null => Box::new(NullBweSender::new(start_kbps)),
        BandwidthEstimatorType::Nada
        | BandwidthEstimatorType::Remb
        | BandwidthEstimatorType::SendSide
        | BandwidthEstimatorType::Tcp
        | BandwidthEstimatorType::Bbr => Box::new(ReportingBweSender::new(
            estimator, start_kbps, observer, clock, limits,
        )),
    }
}

/// Sender that never adapts and ignores feedback
#[derive(Debug, Clone)]
pub struct NullBweSender {
    bitrate_kbps: u32,
}

impl NullBweSender {
    /// Create a null sender fixed at `bitrate_kbps`
    pub fn new(bitrate_kbps: u32) -> Self {
        NullBweSender { bitrate_kbps }
    }
}

impl BweSender for NullBweSender {
    fn estimator(&self) -> BandwidthEstimatorType {
        BandwidthEstimatorType::Null
    }

    fn feedback_interval_ms(&self) -> i64 {
        BandwidthEstimatorType::Null.feedback_interval_ms()
    }

    fn give_feedback(&mut self, _feedback: &FeedbackPacket) {}

    fn on_packets_sent(&mut self, _packets: &[MediaPacket]) {}

    fn target_bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }
}

/// Sender that turns feedback into an observed bitrate
///
/// Stands in for an external estimator: it derives the rate the receiver
/// actually saw from whichever feedback kind the estimator consumes, clamps
/// it into the limits and forwards it to the observer.
pub struct ReportingBweSender {
    estimator: BandwidthEstimatorType,
    bitrate_kbps: u32,
    limits: BweLimits,
    observer: Box<dyn BitrateObserver>,
    clock: Arc<dyn Clock>,
    /// Payload sizes of sent packets awaiting acknowledgement
    unacked_sizes: HashMap<u16, usize>,
    /// Creation time of the last processed feedback
    last_feedback_time_ms: Option<i64>,
    /// Local time when the last feedback was processed
    last_feedback_received_ms: Option<i64>,
    feedback_count: u64,
}

impl ReportingBweSender {
    /// Create a reporting sender
    pub fn new(
        estimator: BandwidthEstimatorType,
        bitrate_kbps: u32,
        observer: Box<dyn BitrateObserver>,
        clock: Arc<dyn Clock>,
        limits: BweLimits,
    ) -> Self {
        ReportingBweSender {
            estimator,
            bitrate_kbps,
            limits,
            observer,
            clock,
            unacked_sizes: HashMap::new(),
            last_feedback_time_ms: None,
            last_feedback_received_ms: None,
            feedback_count: 0,
        }
    }

    /// Milliseconds since feedback was last processed
    pub fn time_since_feedback_ms(&self) -> Option<i64> {
        self.last_feedback_received_ms
            .map(|received| self.clock.time_in_ms() - received)
    }

    /// Number of feedback packets processed
    pub fn feedback_count(&self) -> u64 {
        self.feedback_count
    }

    fn observed_bps(&mut self, feedback: &FeedbackPacket) -> Option<u64> {
        match &feedback.payload {
            FeedbackPayload::ReceiverReport {
                receiving_rate_kbps,
                ..
            } => Some(*receiving_rate_kbps as u64 * 1000),
            FeedbackPayload::PacketArrivals(arrivals) => {
                let first = arrivals.first()?;
                let last = arrivals.last()?;
                let span_ms = last.arrival_time_ms - first.arrival_time_ms;
                if span_ms <= 0 {
                    return None;
                }
                let bytes: u64 = arrivals[1..].iter().map(|a| a.payload_size as u64).sum();
                Some(bytes * 8 * 1000 / span_ms as u64)
            }
            FeedbackPayload::Acks(acked) => {
                let interval_ms = match self.last_feedback_time_ms {
                    Some(previous) => feedback.creation_time_ms - previous,
                    None => self.estimator.feedback_interval_ms(),
                };
                if interval_ms <= 0 {
                    return None;
                }
                let bytes: u64 = acked
                    .iter()
                    .filter_map(|seq| self.unacked_sizes.remove(seq))
                    .map(|size| size as u64)
                    .sum();
                Some(bytes * 8 * 1000 / interval_ms as u64)
            }
        }
    }
}

impl BweSender for ReportingBweSender {
    fn estimator(&self) -> BandwidthEstimatorType {
        self.estimator
    }

    fn feedback_interval_ms(&self) -> i64 {
        self.estimator.feedback_interval_ms()
    }

    fn give_feedback(&mut self, feedback: &FeedbackPacket) {
        if feedback.payload.kind() != self.estimator.feedback_kind() {
            tracing::warn!(
                "{} sender ignoring {:?} feedback for flow {}",
                self.estimator,
                feedback.payload.kind(),
                feedback.flow_id
            );
            return;
        }

        let observed = self.observed_bps(feedback);
        self.last_feedback_time_ms = Some(feedback.creation_time_ms);
        self.last_feedback_received_ms = Some(self.clock.time_in_ms());
        self.feedback_count += 1;

        let Some(observed_bps) = observed else {
            return;
        };

        let observed_kbps = u32::try_from(observed_bps / 1000).unwrap_or(u32::MAX);
        let kbps = self.limits.clamp_kbps(observed_kbps);
        if kbps != observed_kbps {
            tracing::debug!(
                "{} sender observed {} kbps, clamped to {} kbps",
                self.estimator,
                observed_kbps,
                kbps
            );
        }

        self.bitrate_kbps = kbps;
        self.observer.on_network_changed(kbps.saturating_mul(1000));
    }

    fn on_packets_sent(&mut self, packets: &[MediaPacket]) {
        if self.estimator.feedback_kind() != FeedbackKind::Acks {
            return;
        }
        for packet in packets {
            self.unacked_sizes
                .insert(packet.sequence_number, packet.payload_size);
        }
    }

    fn target_bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }
}
