//! BWE simulator CLI library
//!
//! Scenario files and report formatting for the `bwe-sim` tool.

pub mod config;
pub mod stats;

pub use config::{ConfigError, EstimatorKind, FlowSettings, LossConfig, ScenarioConfig};
pub use stats::{compact_report, display_flow_reports, format_kbps, format_ratio};
