//! Report display and formatting

use bwe_sim::flow::FlowReport;

/// Format a rate given in kbps, switching to Mbps/Gbps for large values
pub fn format_kbps(kbps: u64) -> String {
    if kbps >= 1_000_000 {
        format!("{:.2} Gbps", kbps as f64 / 1_000_000.0)
    } else if kbps >= 1000 {
        format!("{:.2} Mbps", kbps as f64 / 1000.0)
    } else {
        format!("{} kbps", kbps)
    }
}

/// Format a loss ratio as a percentage
pub fn format_ratio(ratio: f32) -> String {
    format!("{:.2}%", ratio * 100.0)
}

/// Format simulated time in human-readable form
pub fn format_sim_time(time_ms: i64) -> String {
    if time_ms >= 60_000 {
        let secs = time_ms / 1000;
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if time_ms >= 1000 {
        format!("{:.2}s", time_ms as f64 / 1000.0)
    } else {
        format!("{}ms", time_ms)
    }
}

/// Display the final per-flow table
pub fn display_flow_reports(reports: &[FlowReport]) {
    println!("\n┌──────┬───────────┬──────────┬──────────┬──────────┬─────────────┬─────────────┬──────────────┐");
    println!("│ Flow │ Estimator │ Sent     │ Dropped  │ Feedback │ Recv rate   │ Loss recent │ Loss overall │");
    println!("├──────┼───────────┼──────────┼──────────┼──────────┼─────────────┼─────────────┼──────────────┤");

    for report in reports {
        display_flow_report_row(report);
    }

    println!("└──────┴───────────┴──────────┴──────────┴──────────┴─────────────┴─────────────┴──────────────┘");
}

fn display_flow_report_row(report: &FlowReport) {
    println!(
        "│ {:4} │ {:9} │ {:8} │ {:8} │ {:8} │ {:11} │ {:11} │ {:12} │",
        report.flow_id,
        report.estimator.name(),
        report.packets_sent,
        report.packets_dropped,
        report.feedback_delivered,
        format_kbps(report.recent_kbps as u64),
        format_ratio(report.recent_loss_ratio),
        format_ratio(report.global_loss_ratio),
    );
}

/// One-line progress summary of a flow
pub fn compact_report(report: &FlowReport) -> String {
    let observed = report
        .observed_bitrate_bps
        .map(|bps| format_kbps(bps as u64 / 1000))
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "[{:>8}] flow {} ({}) | Rate: {} | Loss: {} | Observed: {} | Packets: {}",
        format_sim_time(report.end_time_ms),
        report.flow_id,
        report.estimator,
        format_kbps(report.recent_kbps as u64),
        format_ratio(report.recent_loss_ratio),
        observed,
        report.packets_received
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwe_core::sender::BandwidthEstimatorType;

    #[test]
    fn test_format_kbps() {
        assert_eq!(format_kbps(0), "0 kbps");
        assert_eq!(format_kbps(400), "400 kbps");
        assert_eq!(format_kbps(25_000), "25.00 Mbps");
        assert_eq!(format_kbps(2_500_000), "2.50 Gbps");
    }

    #[test]
    fn test_format_ratio() {
        assert_eq!(format_ratio(0.0), "0.00%");
        assert_eq!(format_ratio(0.1), "10.00%");
    }

    #[test]
    fn test_format_sim_time() {
        assert_eq!(format_sim_time(250), "250ms");
        assert_eq!(format_sim_time(2500), "2.50s");
        assert_eq!(format_sim_time(90_000), "1m 30s");
    }

    #[test]
    fn test_compact_report() {
        let report = FlowReport {
            flow_id: 3,
            estimator: BandwidthEstimatorType::Remb,
            end_time_ms: 5000,
            packets_sent: 250,
            packets_dropped: 0,
            packets_received: 248,
            feedback_delivered: 49,
            recent_kbps: 400,
            recent_loss_ratio: 0.0,
            global_loss_ratio: 0.0,
            observed_bitrate_bps: Some(1_200_000),
            target_bitrate_kbps: 300,
        };

        let line = compact_report(&report);
        assert!(line.contains("flow 3 (REMB)"));
        assert!(line.contains("Rate: 400 kbps"));
        assert!(line.contains("Observed: 1.20 Mbps"));
    }
}
