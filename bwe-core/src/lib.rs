//! Receiver-side packet accounting for bandwidth-estimation simulations
//!
//! This crate implements the core of a BWE test harness: sequence-number
//! unwrapping, a bounded deduplicating packet set, loss accounting, receive
//! rate measurement, the per-flow receiver that ties them together, and the
//! sender contract plus factory for the pluggable estimator family.

pub mod clock;
pub mod linked_set;
pub mod loss;
pub mod packet;
pub mod rate;
pub mod receiver;
pub mod sender;
pub mod sequence;

pub use clock::{Clock, FixedClock};
pub use linked_set::{LinkedSet, PacketRecord, SetError};
pub use loss::LossAccount;
pub use packet::{
    abs_send_time_to_ms, FeedbackKind, FeedbackPacket, FeedbackPayload, FlowId, MediaPacket,
    PacketArrival,
};
pub use rate::RateCounter;
pub use receiver::{
    create_bwe_receiver, BweReceiver, ReceiverConfig, ReceiverError, ReceiverState,
    PACKET_LOSS_TIME_WINDOW_MS, RECEIVING_RATE_TIME_WINDOW_MS,
};
pub use sender::{
    create_bwe_sender, BandwidthEstimatorType, BitrateObserver, BweLimits, BweSender,
    NullBweSender, ParseEstimatorError, ReportingBweSender,
};
pub use sequence::SequenceUnwrapper;
