//! Per-unit base values and protection settings for a transmission grid.
//!
//! Grounded in `original_source/config.py`, but kept as an explicit value
//! passed into the network at construction rather than module-level
//! constants (spec.md §9 Design Note).

/// Process-wide per-unit base and protection configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    /// Nominal line-to-line voltage, kV.
    pub nominal_voltage_kv: f32,
    /// Apparent power base, MVA.
    pub s_base_mva: f32,
    /// Default series resistance per km, Ohms/km.
    pub line_r_per_km: f32,
    /// Default series reactance per km, Ohms/km.
    pub line_x_per_km: f32,
    /// Default total shunt susceptance per km, Siemens/km.
    pub line_b_per_km: f32,
    /// Zero-sequence resistance ratio (Z0r / Z1r).
    pub zero_seq_r_ratio: f32,
    /// Zero-sequence reactance ratio (Z0x / Z1x).
    pub zero_seq_x_ratio: f32,
    /// Distance-relay zone 1 reach (fraction of protected line impedance).
    pub zone1_reach: f32,
    /// Distance-relay zone 2 reach.
    pub zone2_reach: f32,
    /// Distance-relay zone 3 reach.
    pub zone3_reach: f32,
    /// Minimum allowed fault resistance, Ohms.
    pub fault_resistance_min_ohm: f32,
    /// Maximum allowed fault resistance, Ohms.
    pub fault_resistance_max_ohm: f32,
}

impl GridConfig {
    /// Impedance base, Ohms: `V_base^2 / S_base`.
    pub fn z_base_ohm(&self) -> f32 {
        (self.nominal_voltage_kv * self.nominal_voltage_kv) / self.s_base_mva
    }

    /// Base current, Amperes: `S_base * 1e6 / (sqrt(3) * V_base * 1e3)`.
    pub fn i_base_a(&self) -> f32 {
        self.s_base_mva * 1.0e6 / (3.0f32.sqrt() * self.nominal_voltage_kv * 1.0e3)
    }

    /// Convert an impedance in Ohms to per-unit.
    pub fn ohm_to_pu(&self, z_ohm: f32) -> f32 {
        z_ohm / self.z_base_ohm()
    }
}

impl Default for GridConfig {
    /// The 220 kV / 100 MVA base values named in spec.md §6.
    fn default() -> Self {
        Self {
            nominal_voltage_kv: 220.0,
            s_base_mva: 100.0,
            line_r_per_km: 0.035,
            line_x_per_km: 0.37,
            line_b_per_km: 4.0e-6,
            zero_seq_r_ratio: 3.0,
            zero_seq_x_ratio: 3.0,
            zone1_reach: 0.80,
            zone2_reach: 1.20,
            zone3_reach: 1.50,
            fault_resistance_min_ohm: 0.0,
            fault_resistance_max_ohm: 50.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_values_match_spec() {
        let cfg = GridConfig::default();
        assert!((cfg.z_base_ohm() - 484.0).abs() < 0.5);
    }

    #[test]
    fn i_base_is_positive_and_finite() {
        let cfg = GridConfig::default();
        let i_base = cfg.i_base_a();
        assert!(i_base > 0.0 && i_base.is_finite());
    }
}
