//! Transmission line (PI-model) between two buses.
//!
//! Grounded in `original_source/grid/line.py`; field/`Display` styling
//! from `mantis::case::Branch`.

use std::fmt;

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::config::GridConfig;
use crate::network::fault::FaultKind;

/// A transmission line connecting two buses.
///
/// PI model:
/// ```text
/// from ----[Z]---- to
///       |       |
///      [Y/2]   [Y/2]
///       |       |
///      GND     GND
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: u32,
    pub from: u32,
    pub to: u32,
    pub length_km: f32,

    pub r_per_km_ohm: f32,
    pub x_per_km_ohm: f32,
    pub b_per_km_siemens: f32,

    pub rating_mva: f32,
    pub closed: bool,

    pub faulted: bool,
    pub fault_kind: Option<FaultKind>,
    /// Fault position as a fraction of length from `from` (0..1).
    pub fault_position: f32,

    // Cached per-unit derived quantities, recomputed by `recompute_cache`.
    z_series_pu: Complex32,
    z0_series_pu: Complex32,
    b_total_pu: f32,

    current_pu: f32,
    power_flow_mw: f32,
    loading_percent: f32,
}

impl Line {
    pub fn new(id: u32, from: u32, to: u32, length_km: f32, config: &GridConfig) -> Self {
        let mut line = Self {
            id,
            from,
            to,
            length_km,
            r_per_km_ohm: config.line_r_per_km,
            x_per_km_ohm: config.line_x_per_km,
            b_per_km_siemens: config.line_b_per_km,
            rating_mva: 400.0,
            closed: true,
            faulted: false,
            fault_kind: None,
            fault_position: 0.5,
            z_series_pu: Complex32::new(0.0, 0.0),
            z0_series_pu: Complex32::new(0.0, 0.0),
            b_total_pu: 0.0,
            current_pu: 0.0,
            power_flow_mw: 0.0,
            loading_percent: 0.0,
        };
        line.recompute_cache(config);
        line
    }

    pub fn with_per_km_params(mut self, r: f32, x: f32, b: f32, config: &GridConfig) -> Self {
        self.r_per_km_ohm = r;
        self.x_per_km_ohm = x;
        self.b_per_km_siemens = b;
        self.recompute_cache(config);
        self
    }

    pub fn with_rating(mut self, rating_mva: f32) -> Self {
        self.rating_mva = rating_mva;
        self
    }

    /// Recompute the cached per-unit series impedance, zero-sequence series
    /// impedance, and total shunt susceptance from the line's raw
    /// per-km parameters and length. Must be called after any of those
    /// change.
    pub fn recompute_cache(&mut self, config: &GridConfig) {
        let r_ohm = self.r_per_km_ohm * self.length_km;
        let x_ohm = self.x_per_km_ohm * self.length_km;
        let b_siemens = self.b_per_km_siemens * self.length_km;

        let z_base = config.z_base_ohm();
        self.z_series_pu = Complex32::new(r_ohm / z_base, x_ohm / z_base);
        self.z0_series_pu = Complex32::new(
            (r_ohm / z_base) * config.zero_seq_r_ratio,
            (x_ohm / z_base) * config.zero_seq_x_ratio,
        );
        self.b_total_pu = b_siemens * z_base;
    }

    /// Series impedance, per-unit.
    pub fn z_series_pu(&self) -> Complex32 {
        self.z_series_pu
    }

    /// Zero-sequence series impedance, per-unit.
    pub fn z0_series_pu(&self) -> Complex32 {
        self.z0_series_pu
    }

    /// Total shunt susceptance (both ends combined), per-unit.
    pub fn b_total_pu(&self) -> f32 {
        self.b_total_pu
    }

    /// Series admittance, per-unit. Zero if the series impedance is ~0.
    pub fn y_series_pu(&self) -> Complex32 {
        if self.z_series_pu.norm() > 1e-10 {
            Complex32::new(1.0, 0.0) / self.z_series_pu
        } else {
            Complex32::new(0.0, 0.0)
        }
    }

    /// Whether this line currently contributes admittance/power flow.
    /// True unless open, or faulted with an open-conductor fault
    /// (spec.md §3: "a faulted open-conductor line is equivalent, for
    /// power-flow purposes, to an open line").
    pub fn is_in_service(&self) -> bool {
        self.closed && !(self.faulted && self.fault_kind == Some(FaultKind::Open))
    }

    /// Impedance in per-unit from `from` to a fractional point along the line.
    pub fn impedance_to_point(&self, fraction: f32) -> Complex32 {
        self.z_series_pu * fraction.clamp(0.0, 1.0)
    }

    pub fn zero_seq_impedance_to_point(&self, fraction: f32) -> Complex32 {
        self.z0_series_pu * fraction.clamp(0.0, 1.0)
    }

    pub fn open_line(&mut self) {
        self.closed = false;
    }

    pub fn close_line(&mut self) {
        self.closed = true;
        self.faulted = false;
        self.fault_kind = None;
    }

    pub fn apply_fault(&mut self, kind: FaultKind, position: f32) {
        self.faulted = true;
        self.fault_kind = Some(kind);
        self.fault_position = position.clamp(0.0, 1.0);
        if kind == FaultKind::Open {
            self.closed = false;
        }
    }

    pub fn clear_fault(&mut self) {
        self.faulted = false;
        self.fault_kind = None;
    }

    pub fn update_loading(&mut self, current_pu: f32, power_flow_mw: f32) {
        self.current_pu = current_pu;
        self.power_flow_mw = power_flow_mw;
        self.loading_percent = if self.rating_mva > 0.0 {
            power_flow_mw.abs() / self.rating_mva * 100.0
        } else {
            0.0
        };
    }

    pub fn current_pu(&self) -> f32 {
        self.current_pu
    }

    pub fn power_flow_mw(&self) -> f32 {
        self.power_flow_mw
    }

    pub fn loading_percent(&self) -> f32 {
        self.loading_percent
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.closed { "CLOSED" } else { "OPEN" };
        write!(
            f,
            "Line {:>3} {:>3} -> {:<3} {:>7.1} km  Z={:.4}pu  {}",
            self.id, self.from, self.to, self.length_km, self.z_series_pu, status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_220kv_100km_line_matches_expected_pu_impedance() {
        let config = GridConfig::default();
        let line = Line::new(1, 1, 2, 100.0, &config);
        // r=0.035*100=3.5 ohm, x=0.37*100=37 ohm, z_base=484 ohm
        assert!((line.z_series_pu().re - 3.5 / 484.0).abs() < 1e-6);
        assert!((line.z_series_pu().im - 37.0 / 484.0).abs() < 1e-6);
    }

    #[test]
    fn open_conductor_fault_takes_line_out_of_service() {
        let config = GridConfig::default();
        let mut line = Line::new(1, 1, 2, 50.0, &config);
        assert!(line.is_in_service());
        line.apply_fault(FaultKind::Open, 0.5);
        assert!(!line.is_in_service());
        assert!(!line.closed);
    }

    #[test]
    fn slg_fault_does_not_open_the_line() {
        let config = GridConfig::default();
        let mut line = Line::new(1, 1, 2, 50.0, &config);
        line.apply_fault(FaultKind::Slg, 0.3);
        assert!(line.is_in_service());
        assert!(line.closed);
    }

    #[test]
    fn close_line_clears_any_fault() {
        let config = GridConfig::default();
        let mut line = Line::new(1, 1, 2, 50.0, &config);
        line.apply_fault(FaultKind::Open, 0.5);
        line.close_line();
        assert!(line.closed);
        assert!(!line.faulted);
        assert!(line.is_in_service());
    }
}
