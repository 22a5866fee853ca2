//! Fault value objects shared by the simulator and detectors.
//!
//! Grounded in `original_source/faults/types.py`. Modeled as a closed,
//! tagged variant (spec.md §9 Design Note) rather than a trait hierarchy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of electrical fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// Single line to ground.
    Slg,
    /// Line to line (no ground).
    Ll,
    /// Double line to ground.
    Dlg,
    /// Three-phase symmetrical.
    Lll,
    /// Open conductor / broken breaker.
    Open,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Slg => write!(f, "SLG"),
            FaultKind::Ll => write!(f, "LL"),
            FaultKind::Dlg => write!(f, "DLG"),
            FaultKind::Lll => write!(f, "LLL"),
            FaultKind::Open => write!(f, "OPEN"),
        }
    }
}

/// Where a fault is located: at a bus, or at a fractional position along a line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FaultLocation {
    Bus(u32),
    Line { id: u32, position: f32 },
}

/// Opaque identifier handed back by the simulator so callers can clear or
/// query a fault without holding a reference into the active-fault list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FaultHandle(pub u32);

/// A fault injected into the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub handle: FaultHandle,
    pub kind: FaultKind,
    pub location: FaultLocation,
    /// Fault resistance, Ohms (>= 0).
    pub resistance_ohm: f32,
    pub active: bool,
    pub detected: bool,
    /// Estimated position (0..1), meaningful only for line faults.
    pub detected_position: Option<f32>,
}

impl Fault {
    pub fn is_bus_fault(&self) -> bool {
        matches!(self.location, FaultLocation::Bus(_))
    }

    pub fn is_line_fault(&self) -> bool {
        matches!(self.location, FaultLocation::Line { .. })
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = match self.location {
            FaultLocation::Bus(id) => format!("Bus {id}"),
            FaultLocation::Line { id, position } => format!("Line {id} @ {:.0}%", position * 100.0),
        };
        let status = if self.active { "ACTIVE" } else { "CLEARED" };
        write!(
            f,
            "Fault({}, {}, Rf={:.2} Ohm, {})",
            self.kind, loc, self.resistance_ohm, status
        )
    }
}
