//! Bus (substation/node) model.
//!
//! Grounded in `original_source/grid/bus.py`, with field/`Display` styling
//! from `mantis::case::Bus`.

use std::fmt;

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::network::fault::FaultKind;

/// Role of a bus in the power-flow formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusRole {
    /// Reference bus: fixed voltage magnitude and angle (0 rad).
    Slack,
    /// Generator (PV) bus: fixed active power and voltage magnitude.
    Generator,
    /// Load (PQ) bus: fixed active and reactive power.
    Load,
}

impl fmt::Display for BusRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusRole::Slack => write!(f, "SLACK"),
            BusRole::Generator => write!(f, "GEN"),
            BusRole::Load => write!(f, "LOAD"),
        }
    }
}

/// A bus (substation/node) in the transmission grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: u32,
    pub name: String,
    pub role: BusRole,
    pub nominal_kv: f32,

    /// Solved voltage magnitude, per-unit.
    pub voltage_pu: f32,
    /// Solved voltage angle, **radians** (spec.md §9 Open Question (a)).
    pub angle_rad: f32,

    /// Specified active generation, MW.
    pub p_gen_mw: f32,
    /// Specified reactive generation, Mvar.
    pub q_gen_mvar: f32,
    /// Specified active load, MW.
    pub p_load_mw: f32,
    /// Specified reactive load, Mvar.
    pub q_load_mvar: f32,

    /// 2-D layout position, consumed only by external visualizers.
    pub position: (f32, f32),

    pub faulted: bool,
    pub fault_kind: Option<FaultKind>,
}

impl Bus {
    pub fn new(id: u32, name: impl Into<String>, role: BusRole, nominal_kv: f32) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            nominal_kv,
            voltage_pu: 1.0,
            angle_rad: 0.0,
            p_gen_mw: 0.0,
            q_gen_mvar: 0.0,
            p_load_mw: 0.0,
            q_load_mvar: 0.0,
            position: (0.0, 0.0),
            faulted: false,
            fault_kind: None,
        }
    }

    pub fn slack(id: u32, name: impl Into<String>, nominal_kv: f32) -> Self {
        Self::new(id, name, BusRole::Slack, nominal_kv)
    }

    pub fn with_generation(mut self, p_gen_mw: f32, q_gen_mvar: f32, v_setpoint_pu: f32) -> Self {
        self.role = BusRole::Generator;
        self.p_gen_mw = p_gen_mw;
        self.q_gen_mvar = q_gen_mvar;
        self.voltage_pu = v_setpoint_pu;
        self
    }

    pub fn with_load(mut self, p_load_mw: f32, q_load_mvar: f32) -> Self {
        self.role = BusRole::Load;
        self.p_load_mw = p_load_mw;
        self.q_load_mvar = q_load_mvar;
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = (x, y);
        self
    }

    /// Net active power injection (generation minus load), MW.
    pub fn p_net_mw(&self) -> f32 {
        self.p_gen_mw - self.p_load_mw
    }

    /// Net reactive power injection, Mvar.
    pub fn q_net_mvar(&self) -> f32 {
        self.q_gen_mvar - self.q_load_mvar
    }

    /// Complex voltage in per-unit: `|V| * e^(j*angle)`.
    pub fn voltage_complex(&self) -> Complex32 {
        Complex32::from_polar(self.voltage_pu, self.angle_rad)
    }

    pub fn apply_fault(&mut self, kind: FaultKind) {
        self.faulted = true;
        self.fault_kind = Some(kind);
    }

    pub fn clear_fault(&mut self) {
        self.faulted = false;
        self.fault_kind = None;
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:>3} {:<16} {:<6} {:>7.2} kV  |V|={:.4} pu  angle={:.4} rad",
            self.id, self.name, self.role, self.nominal_kv, self.voltage_pu, self.angle_rad
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_injections_are_additive() {
        let bus = Bus::new(1, "Test", BusRole::Load, 220.0).with_load(50.0, 10.0);
        assert_eq!(bus.p_net_mw(), -50.0);
        assert_eq!(bus.q_net_mvar(), -10.0);
    }

    #[test]
    fn voltage_complex_matches_polar_form() {
        let mut bus = Bus::slack(1, "Slack", 220.0);
        bus.voltage_pu = 1.0;
        bus.angle_rad = 0.0;
        let v = bus.voltage_complex();
        assert!((v.re - 1.0).abs() < 1e-6);
        assert!(v.im.abs() < 1e-6);
    }

    #[test]
    fn fault_flag_round_trips() {
        let mut bus = Bus::new(2, "B2", BusRole::Load, 220.0);
        bus.apply_fault(FaultKind::Slg);
        assert!(bus.faulted);
        assert_eq!(bus.fault_kind, Some(FaultKind::Slg));
        bus.clear_fault();
        assert!(!bus.faulted);
        assert_eq!(bus.fault_kind, None);
    }
}
