//! Fault models and the fault simulator.

pub mod models;
pub mod simulator;

pub use models::{fault_current, guard_denominator, phase_to_sequence, sequence_to_phase};
pub use simulator::{FaultSimulator, PreFaultVoltage};
