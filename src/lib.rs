//! Three-phase transmission grid fault simulator and localizer.
//!
//! Builds bus admittance/impedance matrices and the three sequence
//! networks, solves AC power flow with Newton–Raphson, derives
//! symmetrical-components fault currents, and runs two independent
//! fault-localization procedures (impedance/distance-relay and
//! graph/topology).

pub mod admittance;
pub mod config;
pub mod detectors;
pub mod error;
pub mod faults;
pub mod network;
pub mod powerflow;

pub use admittance::{build_sequence_networks, build_y_bus, build_z_bus, SequenceNetworks, YBusCache};
pub use config::GridConfig;
pub use detectors::{DetectionResult, FaultSection, GraphDetectionResult, GraphDetector, ImpedanceDetector};
pub use error::{GridError, Result};
pub use faults::{FaultSimulator, PreFaultVoltage};
pub use network::{Bus, BusRole, Fault, FaultHandle, FaultKind, FaultLocation, Line, Network};
pub use powerflow::PowerFlowReport;
