//! Media and feedback packets exchanged by a simulated flow
//!
//! Media packets are the input records replayed by a trace player. Feedback
//! packets travel from a receiver back to its paired sender and carry only
//! what the paired estimator needs.

/// Identifier of a simulated flow
pub type FlowId = i32;

/// Number of fractional bits in a 24-bit absolute send time (6.18 fixed point)
const ABS_SEND_TIME_FRACTION_BITS: u32 = 18;

/// Shift applied to a 24-bit absolute send time to fill 32 bits
const ABS_SEND_TIME_UPSHIFT: u32 = 8;

/// Fractional bits once the absolute send time is upshifted
const INTER_ARRIVAL_SHIFT: u32 = ABS_SEND_TIME_FRACTION_BITS + ABS_SEND_TIME_UPSHIFT;

/// Convert a 24-bit 6.18 fixed-point absolute send time to milliseconds
///
/// The result wraps every 64 seconds, like the header extension itself.
pub fn abs_send_time_to_ms(abs_send_time: u32) -> i64 {
    let timestamp = (abs_send_time << ABS_SEND_TIME_UPSHIFT) as u64;
    ((timestamp * 1000) >> INTER_ARRIVAL_SHIFT) as i64
}

/// A media packet as produced by a trace player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    /// Flow this packet belongs to
    pub flow_id: FlowId,
    /// 16-bit transport sequence number
    pub sequence_number: u16,
    /// Send time (ms)
    pub send_time_ms: i64,
    /// Payload size in bytes
    pub payload_size: usize,
}

impl MediaPacket {
    /// Create a media packet
    pub fn new(flow_id: FlowId, sequence_number: u16, send_time_ms: i64, payload_size: usize) -> Self {
        MediaPacket {
            flow_id,
            sequence_number,
            send_time_ms,
            payload_size,
        }
    }

    /// Send time encoded as a 24-bit 6.18 fixed-point absolute send time
    pub fn abs_send_time(&self) -> u32 {
        let fixed = ((self.send_time_ms.max(0) as u64) << ABS_SEND_TIME_FRACTION_BITS) / 1000;
        (fixed & 0x00FF_FFFF) as u32
    }
}

/// Arrival information for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketArrival {
    /// 16-bit transport sequence number
    pub sequence_number: u16,
    /// Send time (ms)
    pub send_time_ms: i64,
    /// Arrival time (ms)
    pub arrival_time_ms: i64,
    /// Payload size in bytes
    pub payload_size: usize,
}

/// Kind of feedback an estimator expects from its receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    /// No feedback at all
    None,
    /// Periodic receive-rate and loss report
    ReceiverReport,
    /// Per-packet arrival times
    PacketArrivals,
    /// Acknowledged sequence numbers
    Acks,
}

/// Estimator-specific feedback contents
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackPayload {
    /// Receive rate and loss summary
    ReceiverReport {
        /// Receiving rate over the rate window (kbps)
        receiving_rate_kbps: u32,
        /// Loss ratio over the recent window
        recent_loss_ratio: f32,
        /// Loss ratio over the whole flow
        global_loss_ratio: f32,
    },
    /// Arrivals observed since the previous feedback, in arrival order
    PacketArrivals(Vec<PacketArrival>),
    /// Sequence numbers received since the previous feedback, in arrival order
    Acks(Vec<u16>),
}

impl FeedbackPayload {
    /// Feedback kind this payload belongs to
    pub fn kind(&self) -> FeedbackKind {
        match self {
            FeedbackPayload::ReceiverReport { .. } => FeedbackKind::ReceiverReport,
            FeedbackPayload::PacketArrivals(_) => FeedbackKind::PacketArrivals,
            FeedbackPayload::Acks(_) => FeedbackKind::Acks,
        }
    }
}

/// Feedback sent from a receiver to its paired sender
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackPacket {
    /// Flow the feedback describes
    pub flow_id: FlowId,
    /// Time the feedback was generated (ms)
    pub creation_time_ms: i64,
    /// Send time of the most recently received media packet (ms)
    pub latest_send_time_ms: i64,
    /// Estimator-specific contents
    pub payload: FeedbackPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs_send_time_conversion() {
        // 1.0 s in 6.18 fixed point
        assert_eq!(abs_send_time_to_ms(1 << 18), 1000);
        // 0.5 s
        assert_eq!(abs_send_time_to_ms(1 << 17), 500);
        assert_eq!(abs_send_time_to_ms(0), 0);
    }

    #[test]
    fn test_media_packet_abs_send_time() {
        let packet = MediaPacket::new(0, 1, 2500, 1200);
        let ms = abs_send_time_to_ms(packet.abs_send_time());
        assert!((ms - 2500).abs() <= 1);
    }

    #[test]
    fn test_abs_send_time_wraps_every_64_seconds() {
        let packet = MediaPacket::new(0, 1, 64_000 + 250, 1200);
        let ms = abs_send_time_to_ms(packet.abs_send_time());
        assert!((ms - 250).abs() <= 1);
    }

    #[test]
    fn test_payload_kind() {
        assert_eq!(
            FeedbackPayload::Acks(vec![1, 2]).kind(),
            FeedbackKind::Acks
        );
        assert_eq!(
            FeedbackPayload::PacketArrivals(Vec::new()).kind(),
            FeedbackKind::PacketArrivals
        );
    }
}
