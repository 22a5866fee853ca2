//! Graph-based (topology) fault detection and localization.
//!
//! Grounded in `original_source/detection/graph_based.py`
//! (`_localize_fault`, `_two_terminal_location`, `find_shortest_path`,
//! `get_network_sections`).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::network::fault::{Fault, FaultLocation};
use crate::network::Network;

const AFFECTED_VOLTAGE_THRESHOLD: f32 = 0.05;

/// A suspected faulted region: the buses/lines implicated, a probability,
/// and the evidence that led to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultSection {
    pub bus_ids: BTreeSet<u32>,
    pub line_ids: BTreeSet<u32>,
    pub probability: f32,
    pub evidence: Vec<String>,
}

/// Outcome of one `detect` pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDetectionResult {
    pub detected: bool,
    pub fault_sections: Vec<FaultSection>,
    pub faulted_line_id: Option<u32>,
    pub faulted_bus_id: Option<u32>,
    pub estimated_position: Option<f32>,
    pub message: String,
}

impl GraphDetectionResult {
    fn not_detected(message: impl Into<String>) -> Self {
        Self {
            detected: false,
            fault_sections: Vec::new(),
            faulted_line_id: None,
            faulted_bus_id: None,
            estimated_position: None,
            message: message.into(),
        }
    }
}

/// Localizes faults from network topology and voltage/current anomalies,
/// without any impedance-model knowledge.
pub struct GraphDetector {
    voltage_deviations: BTreeMap<u32, f32>,
    current_anomalies: BTreeMap<u32, f32>,
}

impl GraphDetector {
    pub fn new() -> Self {
        Self {
            voltage_deviations: BTreeMap::new(),
            current_anomalies: BTreeMap::new(),
        }
    }

    pub fn detect(&mut self, network: &Network, fault: Option<&mut Fault>) -> GraphDetectionResult {
        let Some(fault) = fault.filter(|f| f.active) else {
            return GraphDetectionResult::not_detected("No active fault in the system");
        };

        self.analyze_voltages(network);
        self.analyze_currents(network);
        let affected_buses = self.find_affected_buses();

        self.localize_fault(network, fault, &affected_buses)
    }

    /// Voltage deviation from nominal (`1.0 pu`) at each bus — large
    /// deviations indicate proximity to a fault.
    fn analyze_voltages(&mut self, network: &Network) {
        self.voltage_deviations.clear();
        for bus in network.buses() {
            self.voltage_deviations.insert(bus.id, (1.0 - bus.voltage_pu).abs());
        }
    }

    /// Current-flow anomaly score per line, from loading percent; faulted
    /// lines get a fixed high anomaly regardless of their computed loading.
    fn analyze_currents(&mut self, network: &Network) {
        self.current_anomalies.clear();
        for line in network.lines() {
            let anomaly = if line.closed {
                if line.faulted {
                    5.0
                } else {
                    line.loading_percent() / 100.0
                }
            } else {
                0.0
            };
            self.current_anomalies.insert(line.id, anomaly);
        }
    }

    fn find_affected_buses(&self) -> BTreeSet<u32> {
        self.voltage_deviations
            .iter()
            .filter(|&(_, &deviation)| deviation >= AFFECTED_VOLTAGE_THRESHOLD)
            .map(|(&bus_id, _)| bus_id)
            .collect()
    }

    fn localize_fault(&self, network: &Network, fault: &mut Fault, affected_buses: &BTreeSet<u32>) -> GraphDetectionResult {
        // Pass 1: direct indicators — a line or bus carrying its own fault flag.
        for line in network.lines() {
            if !line.faulted {
                continue;
            }
            let section = FaultSection {
                bus_ids: BTreeSet::from([line.from, line.to]),
                line_ids: BTreeSet::from([line.id]),
                probability: 0.95,
                evidence: vec![
                    format!("Line {} has fault indicator", line.id),
                    format!(
                        "Current anomaly: {:.2}",
                        self.current_anomalies.get(&line.id).copied().unwrap_or(0.0)
                    ),
                    format!(
                        "Voltage deviation at bus {}: {:.3}",
                        line.from,
                        self.voltage_deviations.get(&line.from).copied().unwrap_or(0.0)
                    ),
                ],
            };

            let estimated_pos = self.two_terminal_location(network, line.from, line.to);

            if matches!(fault.location, FaultLocation::Line { id, .. } if id == line.id) {
                fault.detected = true;
                fault.detected_position = Some(estimated_pos);
            }

            return GraphDetectionResult {
                detected: true,
                fault_sections: vec![section],
                faulted_line_id: Some(line.id),
                faulted_bus_id: None,
                estimated_position: Some(estimated_pos),
                message: format!("Fault localized to Line {} at estimated position {:.1}%", line.id, estimated_pos * 100.0),
            };
        }

        for bus in network.buses() {
            if !bus.faulted {
                continue;
            }
            let connected: BTreeSet<u32> = network.connected_lines(bus.id).iter().map(|l| l.id).collect();
            let section = FaultSection {
                bus_ids: BTreeSet::from([bus.id]),
                line_ids: connected,
                probability: 0.9,
                evidence: vec![
                    format!("Bus {} ({}) has fault indicator", bus.id, bus.name),
                    format!(
                        "Voltage deviation: {:.3}",
                        self.voltage_deviations.get(&bus.id).copied().unwrap_or(0.0)
                    ),
                ],
            };

            if matches!(fault.location, FaultLocation::Bus(id) if id == bus.id) {
                fault.detected = true;
            }

            return GraphDetectionResult {
                detected: true,
                fault_sections: vec![section],
                faulted_line_id: None,
                faulted_bus_id: Some(bus.id),
                estimated_position: None,
                message: format!("Fault localized to Bus {} ({})", bus.id, bus.name),
            };
        }

        // Pass 2: no direct indicator — fall back to the voltage-anomaly region.
        if !affected_buses.is_empty() {
            let max_drop_bus = *affected_buses
                .iter()
                .max_by(|&&a, &&b| {
                    let da = self.voltage_deviations.get(&a).copied().unwrap_or(0.0);
                    let db = self.voltage_deviations.get(&b).copied().unwrap_or(0.0);
                    da.partial_cmp(&db).unwrap()
                })
                .expect("affected_buses is non-empty");

            let section = FaultSection {
                bus_ids: affected_buses.clone(),
                line_ids: BTreeSet::new(),
                probability: 0.5,
                evidence: vec![
                    format!("Region centered on Bus {max_drop_bus} shows voltage anomalies"),
                    format!("Affected buses: {}", affected_buses.len()),
                ],
            };

            return GraphDetectionResult {
                detected: true,
                fault_sections: vec![section],
                faulted_line_id: None,
                faulted_bus_id: Some(max_drop_bus),
                estimated_position: None,
                message: format!("Possible fault in region around Bus {max_drop_bus}"),
            };
        }

        GraphDetectionResult::not_detected("Could not localize fault using graph analysis")
    }

    /// Estimate a line fault's position by linear interpolation between the
    /// two terminal voltage drops — the terminal with the larger drop is
    /// closer to the fault.
    fn two_terminal_location(&self, network: &Network, from: u32, to: u32) -> f32 {
        let v_from = network.bus(from).map(|b| b.voltage_pu).unwrap_or(1.0);
        let v_to = network.bus(to).map(|b| b.voltage_pu).unwrap_or(1.0);

        if v_from + v_to < 1e-10 {
            return 0.5;
        }

        let drop_from = 1.0 - v_from;
        let drop_to = 1.0 - v_to;
        let total_drop = drop_from + drop_to;
        if total_drop.abs() < 1e-10 {
            return 0.5;
        }

        (drop_from / total_drop).clamp(0.0, 1.0)
    }

    /// Shortest path (by hop count) between two buses, via BFS over the
    /// full adjacency (open lines included — this is a topology query, not
    /// a power-flow one).
    pub fn shortest_path(network: &Network, from: u32, to: u32) -> Vec<u32> {
        if from == to {
            return vec![from];
        }

        let mut visited = BTreeSet::from([from]);
        let mut queue = VecDeque::from([vec![from]]);

        while let Some(path) = queue.pop_front() {
            let current = *path.last().unwrap();
            for &neighbor in network.neighbors(current) {
                if neighbor == to {
                    let mut found = path.clone();
                    found.push(neighbor);
                    return found;
                }
                if visited.insert(neighbor) {
                    let mut extended = path.clone();
                    extended.push(neighbor);
                    queue.push_back(extended);
                }
            }
        }

        Vec::new()
    }

    /// Connected sections (islands) of the network, considering only
    /// closed lines — used to detect whether a fault has split the grid.
    pub fn connected_sections(network: &Network) -> Vec<BTreeSet<u32>> {
        let mut visited = BTreeSet::new();
        let mut sections = Vec::new();

        for bus_id in network.bus_ids() {
            if visited.contains(&bus_id) {
                continue;
            }

            let mut section = BTreeSet::new();
            let mut queue = VecDeque::from([bus_id]);

            while let Some(current) = queue.pop_front() {
                if !visited.insert(current) {
                    continue;
                }
                section.insert(current);

                for &neighbor in network.neighbors(current) {
                    if visited.contains(&neighbor) {
                        continue;
                    }
                    let closed = network.line_between(current, neighbor).map(|l| l.closed).unwrap_or(false);
                    if closed {
                        queue.push_back(neighbor);
                    }
                }
            }

            if !section.is_empty() {
                sections.push(section);
            }
        }

        sections
    }
}

impl Default for GraphDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;
    use crate::faults::simulator::{FaultSimulator, PreFaultVoltage};
    use crate::network::fault::FaultKind;
    use crate::network::{Bus, BusRole, Line};
    use crate::powerflow;

    fn three_bus_chain() -> Network {
        let config = GridConfig::default();
        let mut net = Network::new("chain");
        net.add_bus(Bus::slack(1, "A", 220.0));
        net.add_bus(Bus::new(2, "B", BusRole::Load, 220.0).with_load(20.0, 5.0));
        net.add_bus(Bus::new(3, "C", BusRole::Load, 220.0).with_load(20.0, 5.0));
        net.add_line(Line::new(1, 1, 2, 50.0, &config)).unwrap();
        net.add_line(Line::new(2, 2, 3, 50.0, &config)).unwrap();
        powerflow::solve(&mut net, &config).unwrap();
        net
    }

    #[test]
    fn no_active_fault_means_not_detected() {
        let net = three_bus_chain();
        let mut detector = GraphDetector::new();
        let result = detector.detect(&net, None);
        assert!(!result.detected);
    }

    #[test]
    fn a_faulted_line_is_localized_directly() {
        let config = GridConfig::default();
        let mut net = three_bus_chain();
        let mut sim = FaultSimulator::new(PreFaultVoltage::Solved);
        let handle = sim
            .inject_line_fault(&mut net, 2, FaultKind::Slg, 0.4, 0.0, &config)
            .unwrap();
        let fault = sim.active_fault_mut(handle).unwrap();

        let mut detector = GraphDetector::new();
        let result = detector.detect(&net, Some(fault));
        assert!(result.detected);
        assert_eq!(result.faulted_line_id, Some(2));
        assert!(sim.active_fault(handle).unwrap().detected);
    }

    #[test]
    fn a_faulted_bus_is_localized_directly() {
        let config = GridConfig::default();
        let mut net = three_bus_chain();
        let mut sim = FaultSimulator::new(PreFaultVoltage::Solved);
        let handle = sim.inject_bus_fault(&mut net, 3, FaultKind::Slg, 0.0, &config).unwrap();
        let fault = sim.active_fault_mut(handle).unwrap();

        let mut detector = GraphDetector::new();
        let result = detector.detect(&net, Some(fault));
        assert!(result.detected);
        assert_eq!(result.faulted_bus_id, Some(3));
    }

    #[test]
    fn shortest_path_between_endpoints_of_a_chain() {
        let net = three_bus_chain();
        let path = GraphDetector::shortest_path(&net, 1, 3);
        assert_eq!(path, vec![1, 2, 3]);
    }

    #[test]
    fn opening_the_middle_line_splits_the_network_into_two_sections() {
        let mut net = three_bus_chain();
        net.open_line(2).unwrap();
        let sections = GraphDetector::connected_sections(&net);
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn fully_connected_network_is_a_single_section() {
        let net = three_bus_chain();
        let sections = GraphDetector::connected_sections(&net);
        assert_eq!(sections.len(), 1);
    }
}
