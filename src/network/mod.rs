//! Grid topology: buses, lines, faults, and the `Network` container.

pub mod bus;
pub mod fault;
pub mod line;
#[allow(clippy::module_inception)]
pub mod network;

pub use bus::{Bus, BusRole};
pub use fault::{Fault, FaultHandle, FaultKind, FaultLocation};
pub use line::Line;
pub use network::Network;
