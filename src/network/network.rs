//! The network model: buses, lines, adjacency, and the cached Y-bus.
//!
//! Grounded in `original_source/grid/network.py`; `mantis::case::Network`
//! contributes the `Display` style and `mantis::server`'s cascade-delete
//! convention for bus removal.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;

use crate::admittance::{self, YBusCache};
use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::network::bus::Bus;
use crate::network::line::Line;

/// The transmission grid: buses, lines, and the adjacency derived from them.
pub struct Network {
    pub name: String,
    buses: BTreeMap<u32, Bus>,
    lines: BTreeMap<u32, Line>,
    adjacency: BTreeMap<u32, Vec<u32>>,
    y_bus_cache: RefCell<Option<YBusCache>>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buses: BTreeMap::new(),
            lines: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            y_bus_cache: RefCell::new(None),
        }
    }

    fn invalidate(&self) {
        *self.y_bus_cache.borrow_mut() = None;
    }

    // -- bus lifecycle ----------------------------------------------------

    pub fn add_bus(&mut self, bus: Bus) {
        self.adjacency.entry(bus.id).or_default();
        self.buses.insert(bus.id, bus);
        self.invalidate();
    }

    /// Remove a bus and cascade-delete any incident lines.
    pub fn remove_bus(&mut self, id: u32) -> Result<()> {
        if self.buses.remove(&id).is_none() {
            return Err(GridError::NotFound { kind: "bus", id });
        }
        let incident: Vec<u32> = self
            .lines
            .values()
            .filter(|l| l.from == id || l.to == id)
            .map(|l| l.id)
            .collect();
        for line_id in incident {
            self.lines.remove(&line_id);
        }
        self.rebuild_adjacency();
        self.invalidate();
        Ok(())
    }

    pub fn bus(&self, id: u32) -> Option<&Bus> {
        self.buses.get(&id)
    }

    pub fn bus_mut(&mut self, id: u32) -> Option<&mut Bus> {
        // Electrical state (voltage/angle/fault flags) changes don't
        // invalidate the Y-bus; topology does. Callers that mutate role
        // or injections should call `invalidate_cache` explicitly if the
        // change should force a Y-bus rebuild (it never does in this
        // model — role doesn't affect Y-bus — so no call is needed).
        self.buses.get_mut(&id)
    }

    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.buses.values()
    }

    /// Bus keys in ascending order — the canonical matrix-row ordering
    /// (spec.md §4.1).
    pub fn bus_ids(&self) -> Vec<u32> {
        self.buses.keys().copied().collect()
    }

    pub fn slack_bus(&self) -> Option<&Bus> {
        self.buses
            .values()
            .find(|b| b.role == crate::network::bus::BusRole::Slack)
    }

    // -- line lifecycle -----------------------------------------------------

    pub fn add_line(&mut self, line: Line) -> Result<()> {
        if line.from == line.to {
            return Err(GridError::InvalidTopology(format!(
                "line {} is a self-loop at bus {}",
                line.id, line.from
            )));
        }
        if !self.buses.contains_key(&line.from) {
            return Err(GridError::NotFound {
                kind: "bus",
                id: line.from,
            });
        }
        if !self.buses.contains_key(&line.to) {
            return Err(GridError::NotFound {
                kind: "bus",
                id: line.to,
            });
        }
        self.lines.insert(line.id, line);
        self.rebuild_adjacency();
        self.invalidate();
        Ok(())
    }

    pub fn remove_line(&mut self, id: u32) -> Result<()> {
        if self.lines.remove(&id).is_none() {
            return Err(GridError::NotFound { kind: "line", id });
        }
        self.rebuild_adjacency();
        self.invalidate();
        Ok(())
    }

    pub fn line(&self, id: u32) -> Option<&Line> {
        self.lines.get(&id)
    }

    pub fn line_mut(&mut self, id: u32) -> Option<&mut Line> {
        self.lines.get_mut(&id)
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    pub fn line_ids(&self) -> Vec<u32> {
        self.lines.keys().copied().collect()
    }

    pub fn open_line(&mut self, id: u32) -> Result<()> {
        let line = self
            .lines
            .get_mut(&id)
            .ok_or(GridError::NotFound { kind: "line", id })?;
        line.open_line();
        self.invalidate();
        Ok(())
    }

    pub fn close_line(&mut self, id: u32) -> Result<()> {
        let line = self
            .lines
            .get_mut(&id)
            .ok_or(GridError::NotFound { kind: "line", id })?;
        line.close_line();
        self.invalidate();
        Ok(())
    }

    /// Mark a line faulted and invalidate the Y-bus (always correct, even
    /// though only OPEN faults actually change topology — cheap and keeps
    /// callers from needing to know which fault kinds are topology-affecting).
    pub fn mark_line_faulted(&mut self, id: u32, kind: crate::network::fault::FaultKind, position: f32) -> Result<()> {
        let line = self
            .lines
            .get_mut(&id)
            .ok_or(GridError::NotFound { kind: "line", id })?;
        line.apply_fault(kind, position);
        self.invalidate();
        Ok(())
    }

    pub fn clear_line_fault(&mut self, id: u32) -> Result<()> {
        let line = self
            .lines
            .get_mut(&id)
            .ok_or(GridError::NotFound { kind: "line", id })?;
        let was_open_fault = line.fault_kind == Some(crate::network::fault::FaultKind::Open);
        line.clear_fault();
        if was_open_fault {
            line.close_line();
        }
        self.invalidate();
        Ok(())
    }

    // -- graph queries --------------------------------------------------

    pub fn neighbors(&self, bus_id: u32) -> &[u32] {
        self.adjacency
            .get(&bus_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn line_between(&self, a: u32, b: u32) -> Option<&Line> {
        self.lines
            .values()
            .find(|l| (l.from == a && l.to == b) || (l.from == b && l.to == a))
    }

    pub fn connected_lines(&self, bus_id: u32) -> Vec<&Line> {
        self.lines
            .values()
            .filter(|l| l.from == bus_id || l.to == bus_id)
            .collect()
    }

    fn rebuild_adjacency(&mut self) {
        for adj in self.adjacency.values_mut() {
            adj.clear();
        }
        for id in self.buses.keys() {
            self.adjacency.entry(*id).or_default();
        }
        for line in self.lines.values() {
            let from_adj = self.adjacency.entry(line.from).or_default();
            if !from_adj.contains(&line.to) {
                from_adj.push(line.to);
            }
            let to_adj = self.adjacency.entry(line.to).or_default();
            if !to_adj.contains(&line.from) {
                to_adj.push(line.from);
            }
        }
    }

    // -- cached matrices --------------------------------------------------

    /// Mark the cached Y-bus invalid. Called automatically by topology
    /// mutators; exposed so external host code that mutates buses/lines
    /// through other means can force a rebuild too.
    pub fn invalidate_cache(&self) {
        self.invalidate();
    }

    /// The positive-sequence Y-bus, rebuilt lazily on first access after
    /// any invalidation (spec.md §4.1). Never exposes a stale matrix.
    pub fn y_bus(&self, config: &GridConfig) -> Result<Ref<'_, YBusCache>> {
        {
            let mut cache = self.y_bus_cache.borrow_mut();
            if cache.is_none() {
                *cache = Some(admittance::build_y_bus(self, config)?);
            }
        }
        Ok(Ref::map(self.y_bus_cache.borrow(), |c| c.as_ref().unwrap()))
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Network '{}': {} buses, {} lines",
            self.name,
            self.buses.len(),
            self.lines.len()
        )?;
        for bus in self.buses.values() {
            writeln!(f, "  {bus}")?;
        }
        for line in self.lines.values() {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::bus::BusRole;

    fn two_bus_network() -> Network {
        let config = GridConfig::default();
        let mut net = Network::new("test");
        net.add_bus(Bus::slack(1, "A", 220.0));
        net.add_bus(Bus::new(2, "B", BusRole::Load, 220.0).with_load(50.0, 10.0));
        net.add_line(Line::new(1, 1, 2, 100.0, &config)).unwrap();
        net
    }

    #[test]
    fn neighbors_are_bidirectional() {
        let net = two_bus_network();
        assert_eq!(net.neighbors(1), &[2]);
        assert_eq!(net.neighbors(2), &[1]);
    }

    #[test]
    fn self_loop_line_is_rejected() {
        let config = GridConfig::default();
        let mut net = Network::new("test");
        net.add_bus(Bus::slack(1, "A", 220.0));
        let err = net.add_line(Line::new(9, 1, 1, 10.0, &config)).unwrap_err();
        assert!(matches!(err, GridError::InvalidTopology(_)));
    }

    #[test]
    fn line_with_missing_endpoint_is_rejected() {
        let config = GridConfig::default();
        let mut net = Network::new("test");
        net.add_bus(Bus::slack(1, "A", 220.0));
        let err = net.add_line(Line::new(9, 1, 99, 10.0, &config)).unwrap_err();
        assert!(matches!(err, GridError::NotFound { kind: "bus", id: 99 }));
    }

    #[test]
    fn removing_bus_cascades_to_incident_lines() {
        let mut net = two_bus_network();
        net.remove_bus(2).unwrap();
        assert!(net.line(1).is_none());
        assert!(net.neighbors(1).is_empty());
    }

    #[test]
    fn removing_unknown_bus_is_a_noop_error() {
        let mut net = two_bus_network();
        let err = net.remove_bus(42).unwrap_err();
        assert!(matches!(err, GridError::NotFound { kind: "bus", id: 42 }));
        assert_eq!(net.bus_ids(), vec![1, 2]);
    }

    #[test]
    fn bus_ids_are_ascending() {
        let config = GridConfig::default();
        let mut net = Network::new("test");
        net.add_bus(Bus::new(5, "E", BusRole::Load, 220.0));
        net.add_bus(Bus::slack(1, "A", 220.0));
        net.add_bus(Bus::new(3, "C", BusRole::Load, 220.0));
        let _ = &config;
        assert_eq!(net.bus_ids(), vec![1, 3, 5]);
    }
}
