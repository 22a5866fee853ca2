//! Fault-localization detectors: independent impedance-based and
//! graph-based approaches.

pub mod graph;
pub mod impedance;

pub use graph::{FaultSection, GraphDetectionResult, GraphDetector};
pub use impedance::{DetectionResult, ImpedanceDetector, RelayMeasurement};
