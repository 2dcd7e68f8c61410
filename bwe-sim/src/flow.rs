//! Single-flow simulation driver
//!
//! Pairs one sender with one receiver over a simulated link and steps the
//! whole loop on a simulated clock: trace player, sender, forward link,
//! receiver, feedback link, and back to the sender.

use crate::clock::SimulatedClock;
use crate::link::{LossModel, SimulatedLink};
use crate::trace::{constant_rate_trace, TracePlayer};
use bwe_core::packet::{FeedbackPacket, FlowId, MediaPacket};
use bwe_core::receiver::{create_bwe_receiver, BweReceiver, ReceiverConfig, ReceiverError};
use bwe_core::sender::{create_bwe_sender, BandwidthEstimatorType, BweLimits, BweSender};
use bwe_core::Clock;
use parking_lot::Mutex;
use std::sync::Arc;

/// Boxed trace accepted by [`FlowSimulation`]
pub type BoxedTrace = Box<dyn Iterator<Item = MediaPacket> + Send>;

/// Parameters for one simulated flow
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Flow identifier
    pub flow_id: FlowId,
    /// Estimator paired on both ends
    pub estimator: BandwidthEstimatorType,
    /// Sender start bitrate (kbps)
    pub start_kbps: u32,
    /// Spacing of media packets (ms)
    pub packet_interval_ms: i64,
    /// Media payload size (bytes)
    pub payload_size: usize,
    /// First transport sequence number
    pub first_sequence_number: u16,
    /// One-way delay in both directions (ms)
    pub one_way_delay_ms: i64,
    /// Loss on the media direction
    pub loss: LossModel,
    /// Sender bitrate limits
    pub limits: BweLimits,
    /// Receiver tuning
    pub receiver: ReceiverConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            flow_id: 0,
            estimator: BandwidthEstimatorType::Nada,
            start_kbps: 300,
            packet_interval_ms: 20,
            payload_size: 1000,
            first_sequence_number: 0,
            one_way_delay_ms: 50,
            loss: LossModel::None,
            limits: BweLimits::default(),
            receiver: ReceiverConfig::default(),
        }
    }
}

/// Outcome of a simulated flow
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    /// Flow identifier
    pub flow_id: FlowId,
    /// Estimator used
    pub estimator: BandwidthEstimatorType,
    /// Simulated time at the end of the run (ms)
    pub end_time_ms: i64,
    /// Packets released by the trace
    pub packets_sent: u64,
    /// Packets dropped on the link
    pub packets_dropped: u64,
    /// Packets handed to the receiver
    pub packets_received: u64,
    /// Feedback packets delivered to the sender
    pub feedback_delivered: u64,
    /// Receiving rate at the end of the run (kbps)
    pub recent_kbps: u32,
    /// Recent loss ratio at the end of the run
    pub recent_loss_ratio: f32,
    /// Loss ratio over the whole run
    pub global_loss_ratio: f32,
    /// Last bitrate reported to the observer (bps)
    pub observed_bitrate_bps: Option<u32>,
    /// Sender target bitrate at the end of the run (kbps)
    pub target_bitrate_kbps: u32,
}

/// One sender/receiver pair on a simulated clock
pub struct FlowSimulation {
    flow_id: FlowId,
    clock: SimulatedClock,
    player: TracePlayer<BoxedTrace>,
    sender: Box<dyn BweSender>,
    receiver: BweReceiver,
    media_link: SimulatedLink<MediaPacket>,
    feedback_link: SimulatedLink<FeedbackPacket>,
    observed_bitrate_bps: Arc<Mutex<Option<u32>>>,
    feedback_delivered: u64,
}

impl FlowSimulation {
    /// Create a flow driven by a constant-rate trace
    pub fn new(config: FlowConfig) -> Result<Self, ReceiverError> {
        let trace = constant_rate_trace(
            config.flow_id,
            config.first_sequence_number,
            0,
            config.packet_interval_ms,
            config.payload_size,
        );
        Self::with_trace(config, Box::new(trace))
    }

    /// Create a flow replaying `trace`
    ///
    /// Trace packets must be ordered by send time and carry the flow's id.
    pub fn with_trace(config: FlowConfig, trace: BoxedTrace) -> Result<Self, ReceiverError> {
        let clock = SimulatedClock::new(0);
        let receiver = create_bwe_receiver(config.estimator, config.flow_id, config.receiver)?;

        let observed_bitrate_bps = Arc::new(Mutex::new(None));
        let sink = observed_bitrate_bps.clone();
        let sender_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let sender = create_bwe_sender(
            config.estimator,
            config.start_kbps,
            Box::new(move |bitrate_bps: u32| {
                *sink.lock() = Some(bitrate_bps);
            }),
            sender_clock,
            config.limits,
        );

        tracing::debug!(
            "Flow {} using {} with {} ms feedback interval",
            config.flow_id,
            config.estimator,
            sender.feedback_interval_ms()
        );

        Ok(FlowSimulation {
            flow_id: config.flow_id,
            clock,
            player: TracePlayer::new(trace),
            sender,
            receiver,
            media_link: SimulatedLink::with_loss(config.one_way_delay_ms, config.loss),
            feedback_link: SimulatedLink::new(config.one_way_delay_ms),
            observed_bitrate_bps,
            feedback_delivered: 0,
        })
    }

    /// Run one step at the current simulated time
    pub fn step(&mut self) {
        let now_ms = self.clock.time_in_ms();

        let sent = self.player.poll(now_ms);
        if !sent.is_empty() {
            self.sender.on_packets_sent(&sent);
            for packet in sent {
                self.media_link.transmit(now_ms, packet);
            }
        }

        for (arrival_ms, packet) in self.media_link.poll(now_ms) {
            self.receiver.receive_packet(arrival_ms, &packet);
        }

        if let Some(feedback) = self.receiver.get_feedback(now_ms) {
            self.feedback_link.send(now_ms, feedback);
        }

        for (_, feedback) in self.feedback_link.poll(now_ms) {
            self.sender.give_feedback(&feedback);
            self.feedback_delivered += 1;
        }
    }

    /// Step every `step_ms` until the clock reaches `end_ms`
    pub fn run_until(&mut self, end_ms: i64, step_ms: i64) -> FlowReport {
        let step_ms = step_ms.max(1);
        while self.clock.time_in_ms() < end_ms {
            self.step();
            self.clock.advance_ms(step_ms);
        }
        self.report()
    }

    /// Snapshot of the flow's statistics
    pub fn report(&self) -> FlowReport {
        FlowReport {
            flow_id: self.flow_id,
            estimator: self.sender.estimator(),
            end_time_ms: self.clock.time_in_ms(),
            packets_sent: self.player.played(),
            packets_dropped: self.media_link.dropped(),
            packets_received: self.receiver.packets_received(),
            feedback_delivered: self.feedback_delivered,
            recent_kbps: self.receiver.recent_kbps(),
            recent_loss_ratio: self.receiver.recent_packet_loss_ratio(),
            global_loss_ratio: self.receiver.global_receiver_packet_loss_ratio(),
            observed_bitrate_bps: *self.observed_bitrate_bps.lock(),
            target_bitrate_kbps: self.sender.target_bitrate_kbps(),
        }
    }

    /// Receiver end of the flow
    pub fn receiver(&self) -> &BweReceiver {
        &self.receiver
    }

    /// Simulation clock
    pub fn clock(&self) -> &SimulatedClock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lossless_flow() {
        let mut flow = FlowSimulation::new(FlowConfig::default()).unwrap();
        let report = flow.run_until(10_000, 1);

        assert_eq!(report.packets_sent, 500);
        assert_eq!(report.packets_dropped, 0);
        // Packets sent in the last 50 ms are still in flight
        assert!(report.packets_received >= 497);
        assert_eq!(report.global_loss_ratio, 0.0);
        assert!((report.recent_kbps as i64 - 400).abs() <= 8);
        assert!(report.feedback_delivered > 0);
        assert!(report.observed_bitrate_bps.is_some());
    }

    #[test]
    fn test_lossy_flow() {
        let config = FlowConfig {
            loss: LossModel::Periodic { every: 10 },
            ..FlowConfig::default()
        };
        let mut flow = FlowSimulation::new(config).unwrap();
        let report = flow.run_until(20_000, 1);

        assert_eq!(report.packets_dropped, 100);
        assert!((report.global_loss_ratio - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_null_flow_gets_no_feedback() {
        let config = FlowConfig {
            estimator: BandwidthEstimatorType::Null,
            ..FlowConfig::default()
        };
        let mut flow = FlowSimulation::new(config).unwrap();
        let report = flow.run_until(2_000, 5);
        assert_eq!(report.feedback_delivered, 0);
        assert_eq!(report.observed_bitrate_bps, None);
        assert_eq!(report.target_bitrate_kbps, 300);
    }

    #[test]
    fn test_invalid_flow_rejected() {
        let config = FlowConfig {
            flow_id: -4,
            ..FlowConfig::default()
        };
        assert!(FlowSimulation::new(config).is_err());
    }
}
