//! Fault injection, clearing, and fault-current bookkeeping.
//!
//! Grounded in `original_source/faults/simulator.py`'s `FaultSimulator`.

use std::collections::BTreeMap;

use log::info;
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::Rng;

use crate::admittance::build_sequence_networks;
use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::faults::models::{fault_current, sequence_to_phase};
use crate::network::fault::{Fault, FaultHandle, FaultKind, FaultLocation};
use crate::network::Network;

/// Which pre-fault voltage to use as the Thevenin source when deriving a
/// fault current (spec.md §9 Open Question (b)). The Python original
/// always assumes a flat `1.0+j0` profile; this crate also lets a caller
/// reuse the last power-flow solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreFaultVoltage {
    /// Assume `1.0 pu` at every bus, matching
    /// `original_source/faults/simulator.py`.
    Flat,
    /// Use each bus's last solved `voltage_complex()`.
    Solved,
}

/// Injects and tracks faults, deriving fault current via symmetrical
/// components each time a fault is created.
pub struct FaultSimulator {
    pre_fault_voltage: PreFaultVoltage,
    next_handle: u32,
    active_faults: BTreeMap<FaultHandle, Fault>,
    fault_currents: BTreeMap<FaultHandle, (f32, f32, f32)>,
}

impl FaultSimulator {
    pub fn new(pre_fault_voltage: PreFaultVoltage) -> Self {
        Self {
            pre_fault_voltage,
            next_handle: 0,
            active_faults: BTreeMap::new(),
            fault_currents: BTreeMap::new(),
        }
    }

    fn next_handle(&mut self) -> FaultHandle {
        let handle = FaultHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn pre_fault_voltage_at(&self, network: &Network, bus_id: u32) -> Complex32 {
        match self.pre_fault_voltage {
            PreFaultVoltage::Flat => Complex32::new(1.0, 0.0),
            PreFaultVoltage::Solved => network
                .bus(bus_id)
                .map(|b| b.voltage_complex())
                .unwrap_or(Complex32::new(1.0, 0.0)),
        }
    }

    /// Inject a fault at a bus and compute its fault current immediately.
    pub fn inject_bus_fault(
        &mut self,
        network: &mut Network,
        bus_id: u32,
        kind: FaultKind,
        resistance_ohm: f32,
        config: &GridConfig,
    ) -> Result<FaultHandle> {
        if network.bus(bus_id).is_none() {
            return Err(GridError::NotFound { kind: "bus", id: bus_id });
        }

        let handle = self.next_handle();
        let fault = Fault {
            handle,
            kind,
            location: FaultLocation::Bus(bus_id),
            resistance_ohm,
            active: true,
            detected: false,
            detected_position: None,
        };

        network.bus_mut(bus_id).unwrap().apply_fault(kind);

        let currents = self.calculate_bus_fault_current(network, &fault, config)?;
        self.fault_currents.insert(handle, currents);
        self.active_faults.insert(handle, fault);
        info!("injected {kind} fault at bus {bus_id}");
        Ok(handle)
    }

    /// Inject a fault along a line at a fractional position and compute its
    /// fault current immediately.
    pub fn inject_line_fault(
        &mut self,
        network: &mut Network,
        line_id: u32,
        kind: FaultKind,
        position: f32,
        resistance_ohm: f32,
        config: &GridConfig,
    ) -> Result<FaultHandle> {
        if network.line(line_id).is_none() {
            return Err(GridError::NotFound { kind: "line", id: line_id });
        }
        let position = position.clamp(0.0, 1.0);

        let handle = self.next_handle();
        let fault = Fault {
            handle,
            kind,
            location: FaultLocation::Line { id: line_id, position },
            resistance_ohm,
            active: true,
            detected: false,
            detected_position: None,
        };

        network.mark_line_faulted(line_id, kind, position)?;

        let currents = self.calculate_line_fault_current(network, &fault, config)?;
        self.fault_currents.insert(handle, currents);
        self.active_faults.insert(handle, fault);
        info!("injected {kind} fault on line {line_id} @ {:.0}%", position * 100.0);
        Ok(handle)
    }

    /// Inject a fault at a random location and of a random kind, weighted
    /// as spec.md §4.4 / `original_source`'s `inject_random_fault`
    /// specify: kind drawn `SLG 0.7 / LL 0.1 / DLG 0.1 / LLL 0.05 / OPEN
    /// 0.05`; location `80%` line (uniform position in `[0.1, 0.9]`,
    /// resistance uniform in `[0, 10]` Ohm) / `20%` bus (resistance
    /// uniform in `[0, 5]` Ohm). Returns `Ok(None)` if the network has
    /// neither buses nor lines to fault.
    pub fn inject_random_fault(
        &mut self,
        network: &mut Network,
        config: &GridConfig,
        rng: &mut StdRng,
    ) -> Result<Option<FaultHandle>> {
        let kind = {
            let draw: f32 = rng.gen_range(0.0..1.0);
            let weights = [
                (FaultKind::Slg, 0.7),
                (FaultKind::Ll, 0.1),
                (FaultKind::Dlg, 0.1),
                (FaultKind::Lll, 0.05),
                (FaultKind::Open, 0.05),
            ];
            let mut cumulative = 0.0;
            let mut chosen = FaultKind::Slg;
            for (k, p) in weights {
                cumulative += p;
                if draw < cumulative {
                    chosen = k;
                    break;
                }
            }
            chosen
        };

        let line_ids = network.line_ids();
        let bus_ids = network.bus_ids();

        if rng.gen_range(0.0..1.0) < 0.8 && !line_ids.is_empty() {
            let line_id = line_ids[rng.gen_range(0..line_ids.len())];
            let position = rng.gen_range(0.1..0.9);
            let resistance = rng.gen_range(0.0..10.0);
            return self
                .inject_line_fault(network, line_id, kind, position, resistance, config)
                .map(Some);
        }

        if !bus_ids.is_empty() {
            let bus_id = bus_ids[rng.gen_range(0..bus_ids.len())];
            let resistance = rng.gen_range(0.0..5.0);
            return self.inject_bus_fault(network, bus_id, kind, resistance, config).map(Some);
        }

        Ok(None)
    }

    /// Clear a fault, restoring the faulted bus/line to normal service.
    pub fn clear_fault(&mut self, network: &mut Network, handle: FaultHandle) -> Result<()> {
        let fault = self
            .active_faults
            .remove(&handle)
            .ok_or(GridError::NotFound { kind: "fault", id: handle.0 })?;

        match fault.location {
            FaultLocation::Bus(bus_id) => {
                if let Some(bus) = network.bus_mut(bus_id) {
                    bus.clear_fault();
                }
            }
            FaultLocation::Line { id, .. } => {
                network.clear_line_fault(id)?;
            }
        }

        self.fault_currents.remove(&handle);
        Ok(())
    }

    /// Clear every active fault.
    pub fn clear_all_faults(&mut self, network: &mut Network) -> Result<()> {
        let handles: Vec<FaultHandle> = self.active_faults.keys().copied().collect();
        for handle in handles {
            self.clear_fault(network, handle)?;
        }
        Ok(())
    }

    pub fn fault_current(&self, handle: FaultHandle) -> Option<(f32, f32, f32)> {
        self.fault_currents.get(&handle).copied()
    }

    pub fn active_fault(&self, handle: FaultHandle) -> Option<&Fault> {
        self.active_faults.get(&handle)
    }

    /// Mutable access to an active fault, used by detectors to record
    /// `detected`/`detected_position` after a successful localization.
    pub fn active_fault_mut(&mut self, handle: FaultHandle) -> Option<&mut Fault> {
        self.active_faults.get_mut(&handle)
    }

    pub fn active_faults(&self) -> impl Iterator<Item = &Fault> {
        self.active_faults.values()
    }

    fn calculate_bus_fault_current(
        &self,
        network: &Network,
        fault: &Fault,
        config: &GridConfig,
    ) -> Result<(f32, f32, f32)> {
        let bus_id = match fault.location {
            FaultLocation::Bus(id) => id,
            FaultLocation::Line { .. } => unreachable!("called only for bus faults"),
        };

        let seq = build_sequence_networks(network, config)?;
        let idx = seq
            .bus_order
            .iter()
            .position(|&id| id == bus_id)
            .ok_or(GridError::NotFound { kind: "bus", id: bus_id })?;

        let v_f = self.pre_fault_voltage_at(network, bus_id);
        let z0 = seq.z0[(idx, idx)];
        let z1 = seq.z1[(idx, idx)];
        let z2 = seq.z2[(idx, idx)];
        let z_f = config.ohm_to_pu(fault.resistance_ohm);

        Ok(self.phase_currents_amperes(fault.kind, v_f, z0, z1, z2, z_f, config))
    }

    fn calculate_line_fault_current(
        &self,
        network: &Network,
        fault: &Fault,
        config: &GridConfig,
    ) -> Result<(f32, f32, f32)> {
        let (line_id, position) = match fault.location {
            FaultLocation::Line { id, position } => (id, position),
            FaultLocation::Bus(_) => unreachable!("called only for line faults"),
        };
        let line = network.line(line_id).ok_or(GridError::NotFound { kind: "line", id: line_id })?;

        let seq = build_sequence_networks(network, config)?;
        let from_idx = seq
            .bus_order
            .iter()
            .position(|&id| id == line.from)
            .ok_or(GridError::NotFound { kind: "bus", id: line.from })?;

        let v_f = self.pre_fault_voltage_at(network, line.from);
        let z_line_to_fault = line.impedance_to_point(position);
        let z0_line = line.zero_seq_impedance_to_point(position);

        let z0 = seq.z0[(from_idx, from_idx)] + z0_line;
        let z1 = seq.z1[(from_idx, from_idx)] + z_line_to_fault;
        let z2 = seq.z2[(from_idx, from_idx)] + z_line_to_fault;
        let z_f = config.ohm_to_pu(fault.resistance_ohm);

        Ok(self.phase_currents_amperes(fault.kind, v_f, z0, z1, z2, z_f, config))
    }

    fn phase_currents_amperes(
        &self,
        kind: FaultKind,
        v_f: Complex32,
        z0: Complex32,
        z1: Complex32,
        z2: Complex32,
        z_f: f32,
        config: &GridConfig,
    ) -> (f32, f32, f32) {
        let (i0, i1, i2) = fault_current(kind, v_f, z0, z1, z2, z_f);
        let (ia, ib, ic) = sequence_to_phase(i0, i1, i2);
        let i_base = config.i_base_a();
        (ia.norm() * i_base, ib.norm() * i_base, ic.norm() * i_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Bus, BusRole, Line};
    use rand::SeedableRng;

    fn two_bus_network() -> Network {
        let config = GridConfig::default();
        let mut net = Network::new("test");
        net.add_bus(Bus::slack(1, "A", 220.0));
        net.add_bus(Bus::new(2, "B", BusRole::Load, 220.0).with_load(50.0, 10.0));
        net.add_line(Line::new(1, 1, 2, 100.0, &config)).unwrap();
        net
    }

    #[test]
    fn bus_fault_marks_bus_and_produces_nonzero_current() {
        let config = GridConfig::default();
        let mut net = two_bus_network();
        let mut sim = FaultSimulator::new(PreFaultVoltage::Flat);
        let handle = sim.inject_bus_fault(&mut net, 2, FaultKind::Slg, 0.0, &config).unwrap();
        assert!(net.bus(2).unwrap().faulted);
        let (ia, ib, ic) = sim.fault_current(handle).unwrap();
        assert!(ia > 0.0 && ib > 0.0 && ic > 0.0);
    }

    #[test]
    fn clear_fault_restores_bus() {
        let config = GridConfig::default();
        let mut net = two_bus_network();
        let mut sim = FaultSimulator::new(PreFaultVoltage::Flat);
        let handle = sim.inject_bus_fault(&mut net, 2, FaultKind::Slg, 0.0, &config).unwrap();
        sim.clear_fault(&mut net, handle).unwrap();
        assert!(!net.bus(2).unwrap().faulted);
        assert!(sim.active_fault(handle).is_none());
    }

    #[test]
    fn open_line_fault_opens_the_line() {
        let config = GridConfig::default();
        let mut net = two_bus_network();
        let mut sim = FaultSimulator::new(PreFaultVoltage::Flat);
        sim.inject_line_fault(&mut net, 1, FaultKind::Open, 0.5, 0.0, &config).unwrap();
        assert!(!net.line(1).unwrap().is_in_service());
    }

    #[test]
    fn unknown_bus_fault_is_rejected() {
        let config = GridConfig::default();
        let mut net = two_bus_network();
        let mut sim = FaultSimulator::new(PreFaultVoltage::Flat);
        let err = sim.inject_bus_fault(&mut net, 99, FaultKind::Slg, 0.0, &config).unwrap_err();
        assert!(matches!(err, GridError::NotFound { kind: "bus", id: 99 }));
    }

    #[test]
    fn random_fault_is_reproducible_with_the_same_seed() {
        let config = GridConfig::default();
        let mut net_a = two_bus_network();
        let mut net_b = two_bus_network();
        let mut sim_a = FaultSimulator::new(PreFaultVoltage::Flat);
        let mut sim_b = FaultSimulator::new(PreFaultVoltage::Flat);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);

        let handle_a = sim_a.inject_random_fault(&mut net_a, &config, &mut rng_a).unwrap();
        let handle_b = sim_b.inject_random_fault(&mut net_b, &config, &mut rng_b).unwrap();

        assert!(handle_a.is_some());
        assert_eq!(
            sim_a.active_fault(handle_a.unwrap()).map(|f| f.location),
            sim_b.active_fault(handle_b.unwrap()).map(|f| f.location)
        );
    }
}
