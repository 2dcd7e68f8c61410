//! BWE harness - receiver-side accounting for bandwidth-estimation simulations
//!
//! High-level API re-exporting the receiver core and the simulation pieces.

pub use bwe_core as engine;
pub use bwe_sim as sim;

// Re-export commonly used types
pub use engine::{
    create_bwe_receiver, create_bwe_sender, BandwidthEstimatorType, BweReceiver, BweSender,
    LossAccount, MediaPacket, ReceiverConfig,
};
pub use sim::{FlowConfig, FlowReport, FlowSimulation};
