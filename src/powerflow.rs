//! Newton–Raphson AC power-flow solver.
//!
//! The iteration structure, polar Jacobian layout, and convergence contract
//! are grounded directly in `original_source/power/flow.py` (`PowerFlow`) —
//! `mantis::loadflow` itself is only a stub fast-decoupled `B'` assembly with
//! no solve, so only its `DMatrix`-based assembly style carries over.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

use crate::admittance::build_y_bus;
use crate::config::GridConfig;
use crate::error::Result;
use crate::network::{BusRole, Network};

const MAX_ITERATIONS: u32 = 50;
const TOLERANCE: f32 = 1e-6;
const PSEUDO_INVERSE_EPS: f32 = 1e-10;

/// Outcome of a Newton–Raphson solve. Non-convergence is data, not an
/// error (spec.md §7) — callers decide what to do with a `converged: false`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerFlowReport {
    pub converged: bool,
    pub iterations: u32,
    pub max_mismatch: f32,
}

/// Solve AC power flow over `network` and write the solved voltage
/// magnitude/angle back onto each bus, plus per-line loading.
pub fn solve(network: &mut Network, config: &GridConfig) -> Result<PowerFlowReport> {
    let cache = build_y_bus(network, config)?;
    let y = &cache.y;
    let bus_order = &cache.bus_order;
    let n = bus_order.len();

    let mut v_mag = DVector::<f32>::from_element(n, 1.0);
    let mut v_ang = DVector::<f32>::zeros(n);
    let mut p_spec = DVector::<f32>::zeros(n);
    let mut q_spec = DVector::<f32>::zeros(n);

    let mut slack_idx = None;
    let mut pq_indices = Vec::new();

    for (idx, &bus_id) in bus_order.iter().enumerate() {
        let bus = network.bus(bus_id).expect("bus_order only lists existing buses");
        v_mag[idx] = bus.voltage_pu;
        v_ang[idx] = bus.angle_rad;
        p_spec[idx] = bus.p_net_mw() / config.s_base_mva;
        q_spec[idx] = bus.q_net_mvar() / config.s_base_mva;

        match bus.role {
            BusRole::Slack => slack_idx = Some(idx),
            BusRole::Generator => {}
            BusRole::Load => pq_indices.push(idx),
        }
    }

    let slack_idx = slack_idx;
    let non_slack: Vec<usize> = (0..n).filter(|&i| Some(i) != slack_idx).collect();

    let mut report = PowerFlowReport {
        converged: false,
        iterations: 0,
        max_mismatch: f32::INFINITY,
    };

    for iteration in 0..MAX_ITERATIONS {
        let (p_calc, q_calc) = calculate_power(y, &v_mag, &v_ang);

        let dp: Vec<f32> = non_slack.iter().map(|&i| p_spec[i] - p_calc[i]).collect();
        let dq: Vec<f32> = pq_indices.iter().map(|&i| q_spec[i] - q_calc[i]).collect();
        let mismatch = DVector::from_iterator(dp.len() + dq.len(), dp.iter().chain(dq.iter()).copied());

        report.max_mismatch = mismatch.iter().fold(0.0_f32, |acc, &v| acc.max(v.abs()));
        if report.max_mismatch < TOLERANCE {
            report.converged = true;
            report.iterations = iteration + 1;
            break;
        }

        let jacobian = build_jacobian(y, &v_mag, &v_ang, &non_slack, &pq_indices);
        let corrections = solve_corrections(&jacobian, &mismatch);

        let n_p = non_slack.len();
        for (i, &idx) in non_slack.iter().enumerate() {
            v_ang[idx] += corrections[i];
        }
        for (i, &idx) in pq_indices.iter().enumerate() {
            v_mag[idx] += corrections[n_p + i] * v_mag[idx];
        }

        report.iterations = iteration + 1;
    }

    if !report.converged {
        warn!(
            "power flow did not converge after {} iterations, max mismatch {:.3e}",
            report.iterations, report.max_mismatch
        );
    } else {
        info!(
            "power flow converged in {} iterations, max mismatch {:.3e}",
            report.iterations, report.max_mismatch
        );
    }

    for (idx, &bus_id) in bus_order.iter().enumerate() {
        if let Some(bus) = network.bus_mut(bus_id) {
            bus.voltage_pu = v_mag[idx];
            bus.angle_rad = v_ang[idx];
        }
    }

    calculate_line_flows(network, y, bus_order, &v_mag, &v_ang, config);

    Ok(report)
}

/// Active/reactive power injected at every bus, given the current voltage
/// state (spec.md §4.2's power-flow equations in polar form).
fn calculate_power(
    y: &DMatrix<num_complex::Complex32>,
    v_mag: &DVector<f32>,
    v_ang: &DVector<f32>,
) -> (DVector<f32>, DVector<f32>) {
    let n = v_mag.len();
    let mut p = DVector::<f32>::zeros(n);
    let mut q = DVector::<f32>::zeros(n);

    for i in 0..n {
        for j in 0..n {
            let g_ij = y[(i, j)].re;
            let b_ij = y[(i, j)].im;
            let angle_diff = v_ang[i] - v_ang[j];
            p[i] += v_mag[i] * v_mag[j] * (g_ij * angle_diff.cos() + b_ij * angle_diff.sin());
            q[i] += v_mag[i] * v_mag[j] * (g_ij * angle_diff.sin() - b_ij * angle_diff.cos());
        }
    }

    (p, q)
}

/// Build the reduced Newton–Raphson Jacobian: rows/cols ordered as
/// `[non_slack angles | pq magnitudes]`, the scaled-ΔV/V convention
/// (spec.md §4.2 — `d_mag` is applied as a relative correction, `v_mag *=
/// 1 + d_mag`, so the magnitude columns here are the raw `dP/dV`/`dQ/dV`
/// entries and the scaling happens at the correction-application step).
fn build_jacobian(
    y: &DMatrix<num_complex::Complex32>,
    v_mag: &DVector<f32>,
    v_ang: &DVector<f32>,
    non_slack: &[usize],
    pq_indices: &[usize],
) -> DMatrix<f32> {
    let n = v_mag.len();
    let mut j11 = DMatrix::<f32>::zeros(n, n);
    let mut j12 = DMatrix::<f32>::zeros(n, n);
    let mut j21 = DMatrix::<f32>::zeros(n, n);
    let mut j22 = DMatrix::<f32>::zeros(n, n);

    for i in 0..n {
        for j in 0..n {
            let g_ij = y[(i, j)].re;
            let b_ij = y[(i, j)].im;
            let angle_diff = v_ang[i] - v_ang[j];

            if i == j {
                let mut p_i = 0.0_f32;
                let mut q_i = 0.0_f32;
                for k in 0..n {
                    let diff = v_ang[i] - v_ang[k];
                    p_i += v_mag[i] * v_mag[k] * (y[(i, k)].re * diff.cos() + y[(i, k)].im * diff.sin());
                    q_i += v_mag[i] * v_mag[k] * (y[(i, k)].re * diff.sin() - y[(i, k)].im * diff.cos());
                }
                j11[(i, i)] = -q_i - b_ij * v_mag[i] * v_mag[i];
                j12[(i, i)] = p_i / v_mag[i] + g_ij * v_mag[i];
                j21[(i, i)] = p_i - g_ij * v_mag[i] * v_mag[i];
                j22[(i, i)] = q_i / v_mag[i] - b_ij * v_mag[i];
            } else {
                j11[(i, j)] = v_mag[i] * v_mag[j] * (g_ij * angle_diff.sin() - b_ij * angle_diff.cos());
                j12[(i, j)] = v_mag[i] * (g_ij * angle_diff.cos() + b_ij * angle_diff.sin());
                j21[(i, j)] = -v_mag[i] * v_mag[j] * (g_ij * angle_diff.cos() + b_ij * angle_diff.sin());
                j22[(i, j)] = v_mag[i] * (g_ij * angle_diff.sin() - b_ij * angle_diff.cos());
            }
        }
    }

    let n_p = non_slack.len();
    let n_q = pq_indices.len();
    let mut jacobian = DMatrix::<f32>::zeros(n_p + n_q, n_p + n_q);

    for (i, &row) in non_slack.iter().enumerate() {
        for (jc, &col) in non_slack.iter().enumerate() {
            jacobian[(i, jc)] = j11[(row, col)];
        }
        for (jc, &col) in pq_indices.iter().enumerate() {
            jacobian[(i, n_p + jc)] = j12[(row, col)];
        }
    }
    for (i, &row) in pq_indices.iter().enumerate() {
        for (jc, &col) in non_slack.iter().enumerate() {
            jacobian[(n_p + i, jc)] = j21[(row, col)];
        }
        for (jc, &col) in pq_indices.iter().enumerate() {
            jacobian[(n_p + i, n_p + jc)] = j22[(row, col)];
        }
    }

    jacobian
}

/// Solve `J * x = mismatch`, falling back to a least-squares (pseudo-inverse)
/// solution if the Jacobian is singular (spec.md §4.2/§7).
fn solve_corrections(jacobian: &DMatrix<f32>, mismatch: &DVector<f32>) -> DVector<f32> {
    let lu = jacobian.clone().lu();
    if let Some(solution) = lu.solve(mismatch) {
        return solution;
    }
    debug!("Jacobian singular, falling back to least-squares pseudo-inverse");
    match jacobian.clone().pseudo_inverse(PSEUDO_INVERSE_EPS) {
        Ok(pinv) => pinv * mismatch,
        Err(_) => DVector::zeros(mismatch.len()),
    }
}

fn calculate_line_flows(
    network: &mut Network,
    y: &DMatrix<num_complex::Complex32>,
    bus_order: &[u32],
    v_mag: &DVector<f32>,
    v_ang: &DVector<f32>,
    config: &GridConfig,
) {
    let _ = y;
    let index_of = |bus_id: u32| bus_order.iter().position(|&id| id == bus_id);

    for line_id in network.line_ids() {
        let (y_series, from_idx, to_idx) = {
            let line = network.line(line_id).expect("line_ids only lists existing lines");
            (line.y_series_pu(), index_of(line.from), index_of(line.to))
        };

        let line = network.line_mut(line_id).unwrap();
        if !line.is_in_service() {
            line.update_loading(0.0, 0.0);
            continue;
        }

        let (Some(i), Some(j)) = (from_idx, to_idx) else {
            line.update_loading(0.0, 0.0);
            continue;
        };

        let v_i = num_complex::Complex32::from_polar(v_mag[i], v_ang[i]);
        let v_j = num_complex::Complex32::from_polar(v_mag[j], v_ang[j]);
        let i_ij = (v_i - v_j) * y_series;
        let s_ij = v_i * i_ij.conj() * config.s_base_mva;

        line.update_loading(i_ij.norm(), s_ij.re);
    }
}
