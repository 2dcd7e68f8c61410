//! Scenario file support for the BWE simulator

use bwe_core::receiver::ReceiverConfig;
use bwe_core::sender::{BandwidthEstimatorType, BweLimits};
use bwe_sim::flow::FlowConfig;
use bwe_sim::link::LossModel;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Estimator selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EstimatorKind {
    Null,
    Nada,
    Remb,
    SendSide,
    Tcp,
    Bbr,
}

impl From<EstimatorKind> for BandwidthEstimatorType {
    fn from(kind: EstimatorKind) -> Self {
        match kind {
            EstimatorKind::Null => BandwidthEstimatorType::Null,
            EstimatorKind::Nada => BandwidthEstimatorType::Nada,
            EstimatorKind::Remb => BandwidthEstimatorType::Remb,
            EstimatorKind::SendSide => BandwidthEstimatorType::SendSide,
            EstimatorKind::Tcp => BandwidthEstimatorType::Tcp,
            EstimatorKind::Bbr => BandwidthEstimatorType::Bbr,
        }
    }
}

impl From<BandwidthEstimatorType> for EstimatorKind {
    fn from(estimator: BandwidthEstimatorType) -> Self {
        match estimator {
            BandwidthEstimatorType::Null => EstimatorKind::Null,
            BandwidthEstimatorType::Nada => EstimatorKind::Nada,
            BandwidthEstimatorType::Remb => EstimatorKind::Remb,
            BandwidthEstimatorType::SendSide => EstimatorKind::SendSide,
            BandwidthEstimatorType::Tcp => EstimatorKind::Tcp,
            BandwidthEstimatorType::Bbr => EstimatorKind::Bbr,
        }
    }
}

/// Loss on the media direction of a flow
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum LossConfig {
    /// Lossless link
    #[default]
    None,
    /// Drop inclusive ranges of sequence numbers
    Ranges { ranges: Vec<[u16; 2]> },
    /// Drop every n-th packet
    Periodic { every: u64 },
}

impl From<&LossConfig> for LossModel {
    fn from(loss: &LossConfig) -> Self {
        match loss {
            LossConfig::None => LossModel::None,
            LossConfig::Ranges { ranges } => {
                LossModel::Ranges(ranges.iter().map(|[start, end]| (*start, *end)).collect())
            }
            LossConfig::Periodic { every } => LossModel::Periodic { every: *every },
        }
    }
}

/// Simulation timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulated duration in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: i64,
    /// Clock step in milliseconds
    #[serde(default = "default_step_ms")]
    pub step_ms: i64,
    /// Progress report interval in milliseconds of simulated time
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: i64,
}

fn default_duration_ms() -> i64 {
    30_000
}

fn default_step_ms() -> i64 {
    1
}

fn default_report_interval_ms() -> i64 {
    1_000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            duration_ms: default_duration_ms(),
            step_ms: default_step_ms(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

/// Receiver tuning shared by all flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverSettings {
    /// Capacity of the packet set
    #[serde(default = "default_set_capacity")]
    pub set_capacity: usize,
    /// Recent loss window in milliseconds
    #[serde(default = "default_packet_loss_window_ms")]
    pub packet_loss_window_ms: i64,
    /// Receiving rate window in milliseconds
    #[serde(default = "default_receiving_rate_window_ms")]
    pub receiving_rate_window_ms: i64,
}

fn default_set_capacity() -> usize {
    1000
}

fn default_packet_loss_window_ms() -> i64 {
    500
}

fn default_receiving_rate_window_ms() -> i64 {
    1000
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        ReceiverSettings {
            set_capacity: default_set_capacity(),
            packet_loss_window_ms: default_packet_loss_window_ms(),
            receiving_rate_window_ms: default_receiving_rate_window_ms(),
        }
    }
}

impl From<&ReceiverSettings> for ReceiverConfig {
    fn from(settings: &ReceiverSettings) -> Self {
        ReceiverConfig {
            set_capacity: settings.set_capacity,
            packet_loss_window_ms: settings.packet_loss_window_ms,
            receiving_rate_window_ms: settings.receiving_rate_window_ms,
        }
    }
}

/// Sender bitrate limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_min_bitrate_kbps")]
    pub min_bitrate_kbps: u32,
    #[serde(default = "default_max_bitrate_kbps")]
    pub max_bitrate_kbps: u32,
}

fn default_min_bitrate_kbps() -> u32 {
    10
}

fn default_max_bitrate_kbps() -> u32 {
    25_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            min_bitrate_kbps: default_min_bitrate_kbps(),
            max_bitrate_kbps: default_max_bitrate_kbps(),
        }
    }
}

/// One simulated flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Flow identifier
    pub flow_id: i32,
    /// Estimator on both ends
    pub estimator: EstimatorKind,
    /// Sender start bitrate
    #[serde(default = "default_start_kbps")]
    pub start_kbps: u32,
    /// Media packet spacing
    #[serde(default = "default_packet_interval_ms")]
    pub packet_interval_ms: i64,
    /// Media payload size
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// First transport sequence number
    #[serde(default)]
    pub first_sequence_number: u16,
    /// One-way link delay
    #[serde(default = "default_one_way_delay_ms")]
    pub one_way_delay_ms: i64,
    /// Media loss model
    #[serde(default)]
    pub loss: LossConfig,
}

fn default_start_kbps() -> u32 {
    300
}

fn default_packet_interval_ms() -> i64 {
    20
}

fn default_payload_size() -> usize {
    1000
}

fn default_one_way_delay_ms() -> i64 {
    50
}

impl FlowSettings {
    /// Flow with default media parameters
    pub fn new(flow_id: i32, estimator: EstimatorKind) -> Self {
        FlowSettings {
            flow_id,
            estimator,
            start_kbps: default_start_kbps(),
            packet_interval_ms: default_packet_interval_ms(),
            payload_size: default_payload_size(),
            first_sequence_number: 0,
            one_way_delay_ms: default_one_way_delay_ms(),
            loss: LossConfig::None,
        }
    }
}

/// Complete scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub receiver: ReceiverSettings,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub flows: Vec<FlowSettings>,
}

impl ScenarioConfig {
    /// Load a scenario from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: ScenarioConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save a scenario to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Example scenario: a lossless NADA flow next to a lossy send-side flow
    pub fn example() -> Self {
        let mut lossy = FlowSettings::new(1, EstimatorKind::SendSide);
        lossy.first_sequence_number = 65000;
        lossy.loss = LossConfig::Ranges {
            ranges: vec![[100, 109]],
        };

        ScenarioConfig {
            simulation: SimulationConfig::default(),
            receiver: ReceiverSettings::default(),
            limits: LimitsConfig::default(),
            flows: vec![FlowSettings::new(0, EstimatorKind::Nada), lossy],
        }
    }

    /// Check the scenario for values the simulator cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flows.is_empty() {
            return Err(ConfigError::Invalid("no flows configured".to_string()));
        }
        if self.simulation.duration_ms <= 0 || self.simulation.step_ms <= 0 {
            return Err(ConfigError::Invalid(
                "duration_ms and step_ms must be positive".to_string(),
            ));
        }
        if self.simulation.report_interval_ms <= 0 {
            return Err(ConfigError::Invalid(
                "report_interval_ms must be positive".to_string(),
            ));
        }
        if self.receiver.set_capacity == 0 {
            return Err(ConfigError::Invalid("set_capacity must be at least 1".to_string()));
        }
        if self.receiver.packet_loss_window_ms <= 0 || self.receiver.receiving_rate_window_ms <= 0
        {
            return Err(ConfigError::Invalid(
                "packet_loss_window_ms and receiving_rate_window_ms must be positive".to_string(),
            ));
        }
        if self.limits.min_bitrate_kbps > self.limits.max_bitrate_kbps {
            return Err(ConfigError::Invalid(format!(
                "min_bitrate_kbps {} exceeds max_bitrate_kbps {}",
                self.limits.min_bitrate_kbps, self.limits.max_bitrate_kbps
            )));
        }

        let mut seen = HashSet::new();
        for flow in &self.flows {
            if !seen.insert(flow.flow_id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate flow id {}",
                    flow.flow_id
                )));
            }
            if flow.flow_id < 0 {
                return Err(ConfigError::Invalid(format!(
                    "flow id {} is negative",
                    flow.flow_id
                )));
            }
            if flow.packet_interval_ms <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "flow {}: packet_interval_ms must be positive",
                    flow.flow_id
                )));
            }
        }
        Ok(())
    }

    /// Per-flow simulation parameters
    pub fn flow_configs(&self) -> Vec<FlowConfig> {
        let receiver = ReceiverConfig::from(&self.receiver);
        let limits = BweLimits {
            min_bitrate_kbps: self.limits.min_bitrate_kbps,
            max_bitrate_kbps: self.limits.max_bitrate_kbps,
        };

        self.flows
            .iter()
            .map(|flow| FlowConfig {
                flow_id: flow.flow_id,
                estimator: flow.estimator.into(),
                start_kbps: flow.start_kbps,
                packet_interval_ms: flow.packet_interval_ms,
                payload_size: flow.payload_size,
                first_sequence_number: flow.first_sequence_number,
                one_way_delay_ms: flow.one_way_delay_ms,
                loss: LossModel::from(&flow.loss),
                limits,
                receiver,
            })
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config() {
        let config = ScenarioConfig::example();
        assert!(config.validate().is_ok());
        assert_eq!(config.flows.len(), 2);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = ScenarioConfig::example();
        let toml = toml::to_string(&config).unwrap();
        let parsed: ScenarioConfig = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.flows[1].loss, config.flows[1].loss);
        assert_eq!(parsed.flows[1].estimator, EstimatorKind::SendSide);
    }

    #[test]
    fn test_parse_minimal_scenario() {
        let toml = r#"
            [simulation]
            duration_ms = 5000

            [[flows]]
            flow_id = 7
            estimator = "tcp"
            loss = { model = "periodic", every = 20 }
        "#;
        let config: ScenarioConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.step_ms, 1);
        assert_eq!(config.receiver.set_capacity, 1000);

        let flows = config.flow_configs();
        assert_eq!(flows[0].estimator, BandwidthEstimatorType::Tcp);
        assert_eq!(flows[0].loss, LossModel::Periodic { every: 20 });
        assert_eq!(flows[0].payload_size, 1000);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ScenarioConfig::example();
        config.flows[1].flow_id = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScenarioConfig::example();
        config.receiver.set_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ScenarioConfig::example();
        config.flows.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_receiver_windows_rejected() {
        let toml = r#"
            [receiver]
            packet_loss_window_ms = -1

            [[flows]]
            flow_id = 0
            estimator = "nada"
        "#;
        let config: ScenarioConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScenarioConfig::example();
        config.receiver.receiving_rate_window_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_estimator_kind_conversion() {
        for estimator in BandwidthEstimatorType::ALL {
            let kind = EstimatorKind::from(estimator);
            assert_eq!(BandwidthEstimatorType::from(kind), estimator);
        }
    }
}
