//! Sequence-network fault current models and the Fortescue transform.
//!
//! Grounded 1:1 in `original_source/faults/models.py`'s five `FaultModel`
//! subclasses. Dispatched by `match` on `FaultKind`, not a trait object
//! (spec.md §9 Design Note).

use num_complex::Complex32;

use crate::network::fault::FaultKind;

/// Treat a denominator of magnitude `< 1e-10` as `1e-10` of the same
/// complex direction, rather than discarding its phase (spec.md §4.3).
/// Generalizes the Python original's `z_total = 1e-10` fallback, which
/// silently drops the original angle.
pub fn guard_denominator(z: Complex32) -> Complex32 {
    let norm = z.norm();
    if norm < 1e-10 {
        if norm > 0.0 {
            z / norm * 1e-10
        } else {
            Complex32::new(1e-10, 0.0)
        }
    } else {
        z
    }
}

/// Sequence fault currents `(I0, I1, I2)` for a given fault kind, pre-fault
/// voltage, sequence impedances at the fault point, and fault resistance
/// (per-unit). Dispatches to one of the five pure per-kind functions below.
pub fn fault_current(
    kind: FaultKind,
    v_f: Complex32,
    z0: Complex32,
    z1: Complex32,
    z2: Complex32,
    z_f: f32,
) -> (Complex32, Complex32, Complex32) {
    match kind {
        FaultKind::Slg => slg(v_f, z0, z1, z2, z_f),
        FaultKind::Ll => ll(v_f, z0, z1, z2, z_f),
        FaultKind::Dlg => dlg(v_f, z0, z1, z2, z_f),
        FaultKind::Lll => lll(v_f, z0, z1, z2, z_f),
        FaultKind::Open => open(v_f, z0, z1, z2, z_f),
    }
}

/// Single line-to-ground: Z0, Z1, Z2 in series.
/// `I0 = I1 = I2 = V_f / (Z0 + Z1 + Z2 + 3*Zf)`.
pub fn slg(v_f: Complex32, z0: Complex32, z1: Complex32, z2: Complex32, z_f: f32) -> (Complex32, Complex32, Complex32) {
    let z_total = guard_denominator(z0 + z1 + z2 + 3.0 * z_f);
    let i_seq = v_f / z_total;
    (i_seq, i_seq, i_seq)
}

/// Line-to-line (no ground): parallel Z1/Z2, no zero-sequence contribution.
/// `I0 = 0`, `I1 = -I2 = V_f / (Z1 + Z2 + Zf)`.
pub fn ll(v_f: Complex32, _z0: Complex32, z1: Complex32, z2: Complex32, z_f: f32) -> (Complex32, Complex32, Complex32) {
    let z_total = guard_denominator(z1 + z2 + z_f);
    let i1 = v_f / z_total;
    (Complex32::new(0.0, 0.0), i1, -i1)
}

/// Double line-to-ground: Z1 in series with the parallel combination of
/// `(Z0 + 3*Zf)` and Z2.
pub fn dlg(v_f: Complex32, z0: Complex32, z1: Complex32, z2: Complex32, z_f: f32) -> (Complex32, Complex32, Complex32) {
    let z0_with_fault = z0 + 3.0 * z_f;
    let sum = z0_with_fault + z2;

    if sum.norm() < 1e-10 {
        let z_total = guard_denominator(z1);
        let i1 = v_f / z_total;
        return (i1 / 2.0, i1, i1 / 2.0);
    }

    let z_parallel = (z0_with_fault * z2) / sum;
    let z_total = guard_denominator(z1 + z_parallel);
    let i1 = v_f / z_total;
    let i0 = -i1 * z2 / sum;
    let i2 = -i1 * z0_with_fault / sum;
    (i0, i1, i2)
}

/// Three-phase symmetrical fault: only the positive-sequence network carries
/// current. `I1 = V_f / (Z1 + Zf)`, `I0 = I2 = 0`.
pub fn lll(v_f: Complex32, _z0: Complex32, z1: Complex32, _z2: Complex32, z_f: f32) -> (Complex32, Complex32, Complex32) {
    let z_total = guard_denominator(z1 + z_f);
    let i1 = v_f / z_total;
    (Complex32::new(0.0, 0.0), i1, Complex32::new(0.0, 0.0))
}

/// Open conductor: no fault current, only a topology change (handled by
/// `Line::is_in_service`).
pub fn open(_v_f: Complex32, _z0: Complex32, _z1: Complex32, _z2: Complex32, _z_f: f32) -> (Complex32, Complex32, Complex32) {
    (Complex32::new(0.0, 0.0), Complex32::new(0.0, 0.0), Complex32::new(0.0, 0.0))
}

/// `a = e^(j2π/3)`, the Fortescue rotation operator.
fn fortescue_operator() -> Complex32 {
    Complex32::from_polar(1.0, 2.0 * std::f32::consts::PI / 3.0)
}

/// Sequence currents/voltages to phase quantities:
/// `[Ia, Ib, Ic] = [[1,1,1],[1,a²,a],[1,a,a²]] · [I0, I1, I2]`.
pub fn sequence_to_phase(i0: Complex32, i1: Complex32, i2: Complex32) -> (Complex32, Complex32, Complex32) {
    let a = fortescue_operator();
    let a2 = a * a;
    let ia = i0 + i1 + i2;
    let ib = i0 + a2 * i1 + a * i2;
    let ic = i0 + a * i1 + a2 * i2;
    (ia, ib, ic)
}

/// Phase to sequence quantities, the inverse Fortescue transform:
/// `[I0, I1, I2] = (1/3) · [[1,1,1],[1,a,a²],[1,a²,a]] · [Ia, Ib, Ic]`.
/// Added because spec.md §8 property 5 ("Fortescue round-trip") requires
/// the inverse direction, which the Python original never implements.
pub fn phase_to_sequence(ia: Complex32, ib: Complex32, ic: Complex32) -> (Complex32, Complex32, Complex32) {
    let a = fortescue_operator();
    let a2 = a * a;
    let third = Complex32::new(1.0 / 3.0, 0.0);
    let i0 = third * (ia + ib + ic);
    let i1 = third * (ia + a * ib + a2 * ic);
    let i2 = third * (ia + a2 * ib + a * ic);
    (i0, i1, i2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Complex32, b: Complex32) -> bool {
        (a - b).norm() < 1e-4
    }

    #[test]
    fn slg_gives_equal_sequence_currents() {
        let v_f = Complex32::new(1.0, 0.0);
        let z = Complex32::new(0.1, 0.3);
        let (i0, i1, i2) = slg(v_f, z, z, z, 0.0);
        assert!(approx_eq(i0, i1));
        assert!(approx_eq(i1, i2));
    }

    #[test]
    fn ll_gives_zero_zero_sequence_and_opposite_i1_i2() {
        let v_f = Complex32::new(1.0, 0.0);
        let z = Complex32::new(0.1, 0.3);
        let (i0, i1, i2) = ll(v_f, z, z, z, 0.0);
        assert!(i0.norm() < 1e-9);
        assert!(approx_eq(i1, -i2));
    }

    #[test]
    fn lll_has_no_zero_or_negative_sequence_current() {
        let v_f = Complex32::new(1.0, 0.0);
        let z = Complex32::new(0.1, 0.3);
        let (i0, i1, i2) = lll(v_f, z, z, z, 0.0);
        assert!(i0.norm() < 1e-9);
        assert!(i2.norm() < 1e-9);
        assert!(i1.norm() > 0.0);
    }

    #[test]
    fn open_fault_has_no_current_at_all() {
        let v_f = Complex32::new(1.0, 0.0);
        let z = Complex32::new(0.1, 0.3);
        let (i0, i1, i2) = open(v_f, z, z, z, 0.0);
        assert_eq!(i0.norm(), 0.0);
        assert_eq!(i1.norm(), 0.0);
        assert_eq!(i2.norm(), 0.0);
    }

    #[test]
    fn guard_denominator_preserves_direction_near_zero() {
        let tiny = Complex32::from_polar(1e-15, 0.7);
        let guarded = guard_denominator(tiny);
        assert!((guarded.norm() - 1e-10).abs() < 1e-15);
        assert!((guarded.arg() - 0.7).abs() < 1e-4);
    }

    #[test]
    fn fortescue_round_trip() {
        let i0 = Complex32::new(0.2, -0.1);
        let i1 = Complex32::new(1.0, 0.3);
        let i2 = Complex32::new(0.05, 0.2);
        let (ia, ib, ic) = sequence_to_phase(i0, i1, i2);
        let (r0, r1, r2) = phase_to_sequence(ia, ib, ic);
        assert!(approx_eq(r0, i0));
        assert!(approx_eq(r1, i1));
        assert!(approx_eq(r2, i2));
    }
}
