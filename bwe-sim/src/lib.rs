//! Simulation collaborators for the BWE harness
//!
//! This crate provides the pieces around the receiver core that a test
//! harness needs: simulated and wall clocks, trace replay, a fixed-delay
//! lossy link, and a driver that runs one sender/receiver pair end to end.

pub mod clock;
pub mod flow;
pub mod link;
pub mod trace;

pub use clock::{RealTimeClock, SimulatedClock};
pub use flow::{BoxedTrace, FlowConfig, FlowReport, FlowSimulation};
pub use link::{LossModel, SimulatedLink};
pub use trace::{constant_rate_trace, ConstantRateTrace, TracePlayer};
