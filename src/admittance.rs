//! Y-bus/Z-bus assembly and the three sequence networks.
//!
//! Grounded in `original_source/grid/network.py::build_y_bus`/`build_z_bus`
//! and `power/impedance.py::build_sequence_networks`; `DMatrix`-based
//! assembly style kept from `mantis::loadflow`.

use log::{debug, warn};
use nalgebra::DMatrix;
use num_complex::Complex32;

use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::network::Network;

/// Regularization added to the diagonal when a Y-bus is singular, so it can
/// still be inverted (spec.md §4.1/§7).
const SINGULAR_REGULARIZATION: f32 = 1e-10;

/// The positive-sequence Y-bus, plus the bus-id-to-matrix-index ordering it
/// was built with (ascending bus key — spec.md §4.1's canonical order).
#[derive(Debug, Clone)]
pub struct YBusCache {
    pub bus_order: Vec<u32>,
    pub y: DMatrix<Complex32>,
}

impl YBusCache {
    pub fn index_of(&self, bus_id: u32) -> Option<usize> {
        self.bus_order.iter().position(|&id| id == bus_id)
    }
}

/// The three per-unit sequence impedance (Z-bus) matrices, sharing the same
/// bus ordering. Positive and negative sequence coincide for transmission
/// lines (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct SequenceNetworks {
    pub bus_order: Vec<u32>,
    pub z0: DMatrix<Complex32>,
    pub z1: DMatrix<Complex32>,
    pub z2: DMatrix<Complex32>,
}

/// Assemble the positive-sequence Y-bus from the network's in-service lines.
///
/// `Y_ii = sum` of admittances incident on bus `i`; `Y_ij = -y_series(i, j)`.
/// Each line contributes half its total shunt susceptance at each terminal.
pub fn build_y_bus(network: &Network, config: &GridConfig) -> Result<YBusCache> {
    let bus_order = network.bus_ids();
    let n = bus_order.len();
    let mut y = DMatrix::<Complex32>::zeros(n, n);

    let index_of = |bus_id: u32| bus_order.iter().position(|&id| id == bus_id);

    for line in network.lines() {
        if !line.is_in_service() {
            continue;
        }
        let (Some(i), Some(j)) = (index_of(line.from), index_of(line.to)) else {
            continue;
        };

        let y_series = line.y_series_pu();
        let y_shunt = Complex32::new(0.0, line.b_total_pu() / 2.0);

        y[(i, j)] -= y_series;
        y[(j, i)] -= y_series;
        y[(i, i)] += y_series + y_shunt;
        y[(j, j)] += y_series + y_shunt;
    }

    let _ = config;
    debug!("built Y-bus for {n} buses");
    Ok(YBusCache { bus_order, y })
}

/// Assemble the zero-sequence Y-bus. Unlike the positive sequence, there is
/// no shunt-susceptance contribution (spec.md §4.3 — the zero-sequence
/// network models series coupling only).
fn build_zero_seq_y_bus(network: &Network, bus_order: &[u32]) -> DMatrix<Complex32> {
    let n = bus_order.len();
    let mut y0 = DMatrix::<Complex32>::zeros(n, n);
    let index_of = |bus_id: u32| bus_order.iter().position(|&id| id == bus_id);

    for line in network.lines() {
        if !line.is_in_service() {
            continue;
        }
        let (Some(i), Some(j)) = (index_of(line.from), index_of(line.to)) else {
            continue;
        };

        let z0 = line.z0_series_pu();
        let y0_series = if z0.norm() > 1e-10 {
            Complex32::new(1.0, 0.0) / z0
        } else {
            Complex32::new(0.0, 0.0)
        };

        y0[(i, j)] -= y0_series;
        y0[(j, i)] -= y0_series;
        y0[(i, i)] += y0_series;
        y0[(j, j)] += y0_series;
    }

    y0
}

/// Invert a Y-bus into a Z-bus. On a singular matrix, retry once with a
/// small diagonal regularization (spec.md §7); a second failure surfaces
/// `GridError::Singular`.
fn invert_with_regularization(y: &DMatrix<Complex32>) -> Result<DMatrix<Complex32>> {
    if let Some(z) = y.clone().try_inverse() {
        return Ok(z);
    }
    warn!("Y-bus singular, retrying with {SINGULAR_REGULARIZATION} regularization");
    let n = y.nrows();
    let regularized = y + DMatrix::<Complex32>::identity(n, n) * Complex32::new(SINGULAR_REGULARIZATION, 0.0);
    regularized.try_inverse().ok_or(GridError::Singular)
}

/// Build the positive-sequence Z-bus (the inverse of the Y-bus).
pub fn build_z_bus(network: &Network, config: &GridConfig) -> Result<DMatrix<Complex32>> {
    let cache = build_y_bus(network, config)?;
    invert_with_regularization(&cache.y)
}

/// Build all three sequence networks fresh (spec.md §3 Lifecycle — cheap
/// relative to the fault model itself, never cached, so the result always
/// reflects the current topology).
pub fn build_sequence_networks(network: &Network, config: &GridConfig) -> Result<SequenceNetworks> {
    let y_bus = build_y_bus(network, config)?;
    let z1 = invert_with_regularization(&y_bus.y)?;
    let z2 = z1.clone();

    let y0 = build_zero_seq_y_bus(network, &y_bus.bus_order);
    let z0 = invert_with_regularization(&y0)?;

    Ok(SequenceNetworks {
        bus_order: y_bus.bus_order,
        z0,
        z1,
        z2,
    })
}
