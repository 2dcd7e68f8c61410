//! End-to-end receiver accounting scenarios

use bwe::engine::{FeedbackKind, FeedbackPayload};
use bwe::{create_bwe_receiver, BandwidthEstimatorType, BweReceiver, MediaPacket, ReceiverConfig};

/// Feed `count` packets one millisecond apart, skipping offsets in `lost`
fn feed(receiver: &mut BweReceiver, first_seq: u16, count: u16, lost: &[u16]) {
    for offset in 0..count {
        if lost.contains(&offset) {
            continue;
        }
        let seq = first_seq.wrapping_add(offset);
        let packet = MediaPacket::new(receiver.flow_id(), seq, offset as i64, 1000);
        receiver.receive_packet(offset as i64, &packet);
    }
}

fn receiver(estimator: BandwidthEstimatorType) -> BweReceiver {
    create_bwe_receiver(estimator, 0, ReceiverConfig::default()).unwrap()
}

#[test]
fn test_lossless_stream_across_wraparound() {
    let mut receiver = receiver(BandwidthEstimatorType::Nada);
    feed(&mut receiver, 65000, 1500, &[]);

    assert_eq!(receiver.global_receiver_packet_loss_ratio(), 0.0);
    assert_eq!(receiver.recent_packet_loss_ratio(), 0.0);
    assert_eq!(receiver.recent_kbps(), 8000);
    assert!(receiver.received_packets().len() <= receiver.set_capacity());
    assert_eq!(receiver.packets_received(), 1500);
}

#[test]
fn test_burst_loss_across_wraparound() {
    let mut receiver = receiver(BandwidthEstimatorType::Nada);
    // Offsets 530..540 straddle the 65535 -> 0 wrap
    let lost: Vec<u16> = (530..540).collect();
    feed(&mut receiver, 65000, 1500, &lost);

    let expected = 10.0 / 1500.0;
    assert!((receiver.global_receiver_packet_loss_ratio() - expected).abs() < 1e-6);
    // The burst is older than the loss window by the end of the stream
    assert_eq!(receiver.recent_packet_loss_ratio(), 0.0);
}

#[test]
fn test_recent_burst_is_visible_in_window() {
    let mut receiver = receiver(BandwidthEstimatorType::Remb);
    let lost: Vec<u16> = (1400..1410).collect();
    feed(&mut receiver, 0, 1500, &lost);

    let recent = receiver.recent_packet_loss_ratio();
    assert!((recent - 10.0 / 501.0).abs() < 1e-6);

    let global = receiver.global_receiver_packet_loss_ratio();
    assert!((global - 10.0 / 1500.0).abs() < 1e-6);
}

#[test]
fn test_duplicates_do_not_change_loss() {
    let mut receiver = receiver(BandwidthEstimatorType::Nada);
    feed(&mut receiver, 0, 100, &[]);

    let duplicate = MediaPacket::new(0, 50, 50, 1000);
    receiver.receive_packet(100, &duplicate);

    assert_eq!(receiver.received_packets().len(), 100);
    assert_eq!(receiver.global_receiver_packet_loss_ratio(), 0.0);
}

#[test]
fn test_small_set_keeps_global_loss_exact() {
    let config = ReceiverConfig {
        set_capacity: 64,
        ..ReceiverConfig::default()
    };
    let mut receiver = create_bwe_receiver(BandwidthEstimatorType::Nada, 0, config).unwrap();

    // Every tenth packet lost, sent 20 ms apart so relief always finds stale records
    let mut lost = 0;
    for offset in 0..1000u16 {
        if offset % 10 == 5 {
            lost += 1;
            continue;
        }
        let time_ms = offset as i64 * 20;
        receiver.receive_packet(time_ms, &MediaPacket::new(0, offset, time_ms, 1000));
        assert!(receiver.received_packets().len() <= 64);
    }

    let expected = lost as f32 / 1000.0;
    assert!((receiver.global_receiver_packet_loss_ratio() - expected).abs() < 1e-6);
}

#[test]
fn test_feedback_kind_follows_estimator() {
    for estimator in BandwidthEstimatorType::ALL {
        let mut receiver = receiver(estimator);
        feed(&mut receiver, 0, 100, &[]);

        let feedback = receiver.get_feedback(100);
        match estimator.feedback_kind() {
            FeedbackKind::None => assert!(feedback.is_none()),
            kind => {
                let feedback = feedback.unwrap();
                assert_eq!(feedback.payload.kind(), kind);
                assert_eq!(feedback.latest_send_time_ms, 99);
            }
        }
    }
}

#[test]
fn test_receiver_report_carries_statistics() {
    let mut receiver = receiver(BandwidthEstimatorType::Nada);
    let lost: Vec<u16> = (1400..1410).collect();
    feed(&mut receiver, 0, 1500, &lost);

    let feedback = receiver.get_feedback(1500).unwrap();
    match feedback.payload {
        FeedbackPayload::ReceiverReport {
            receiving_rate_kbps,
            recent_loss_ratio,
            global_loss_ratio,
        } => {
            assert_eq!(receiving_rate_kbps, receiver.recent_kbps());
            assert_eq!(recent_loss_ratio, receiver.recent_packet_loss_ratio());
            assert_eq!(global_loss_ratio, receiver.global_receiver_packet_loss_ratio());
        }
        other => panic!("unexpected feedback {:?}", other),
    }
}

#[test]
fn test_retransmission_after_relief_keeps_lossless_flow_clean() {
    let mut receiver = receiver(BandwidthEstimatorType::Nada);
    for seq in 0..=1000u16 {
        let time_ms = seq as i64 * 20;
        receiver.receive_packet(time_ms, &MediaPacket::new(0, seq, time_ms, 1000));
    }

    // A retransmission of a packet 31 packets old
    receiver.receive_packet(20_020, &MediaPacket::new(0, 970, 19_400, 1000));

    for seq in 1001..1500u16 {
        let time_ms = seq as i64 * 20;
        receiver.receive_packet(time_ms + 20, &MediaPacket::new(0, seq, time_ms, 1000));
    }

    assert_eq!(receiver.global_receiver_packet_loss_ratio(), 0.0);
    assert_eq!(receiver.recent_packet_loss_ratio(), 0.0);
    assert_eq!(receiver.recent_kbps(), 400);
}
