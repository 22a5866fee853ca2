//! Runnable smoke test: build the 12-bus Northern India regional grid
//! fixture, solve power flow, inject a fault, and run both detectors.
//!
//! Not a product surface — no argument parsing, no PSS/E I/O. Ported from
//! `original_source/grid/demo_grid.py::create_demo_grid`. Wired up with
//! `env_logger` the way `mantis::main` does.

use log::info;

use gridfault::faults::{FaultSimulator, PreFaultVoltage};
use gridfault::network::fault::FaultKind;
use gridfault::{detectors, powerflow, Bus, GridConfig, Network};

fn build_demo_grid(config: &GridConfig) -> Network {
    let mut net = Network::new("220kV Northern India Regional Grid");

    let mut delhi = Bus::slack(1, "Delhi", 220.0);
    delhi.p_gen_mw = 500.0;
    net.add_bus(delhi);
    net.add_bus(Bus::new(2, "Gurugram", gridfault::BusRole::Load, 220.0).with_load(150.0, 50.0));
    net.add_bus(Bus::new(3, "Noida", gridfault::BusRole::Generator, 220.0).with_generation(200.0, 50.0, 1.02));
    net.add_bus(Bus::new(4, "Ghaziabad", gridfault::BusRole::Load, 220.0).with_load(180.0, 60.0));
    net.add_bus(Bus::new(5, "Jaipur", gridfault::BusRole::Generator, 220.0).with_generation(300.0, 100.0, 1.01));
    net.add_bus(Bus::new(6, "Agra", gridfault::BusRole::Load, 220.0).with_load(200.0, 70.0));
    net.add_bus(Bus::new(7, "Meerut", gridfault::BusRole::Load, 220.0).with_load(120.0, 40.0));
    net.add_bus(Bus::new(8, "Ajmer", gridfault::BusRole::Load, 220.0).with_load(80.0, 25.0));
    net.add_bus(Bus::new(9, "Mathura", gridfault::BusRole::Load, 220.0).with_load(90.0, 30.0));
    net.add_bus(Bus::new(10, "Saharanpur", gridfault::BusRole::Load, 220.0).with_load(100.0, 35.0));
    net.add_bus(Bus::new(11, "Udaipur", gridfault::BusRole::Generator, 220.0).with_generation(250.0, 80.0, 1.0));
    net.add_bus(Bus::new(12, "Lucknow", gridfault::BusRole::Generator, 220.0).with_generation(350.0, 120.0, 1.02));

    let lines: &[(u32, u32, u32, f32)] = &[
        (1, 1, 2, 30.0),
        (2, 1, 3, 25.0),
        (3, 1, 4, 35.0),
        (4, 2, 5, 250.0),
        (5, 3, 6, 200.0),
        (6, 4, 7, 70.0),
        (7, 5, 6, 240.0),
        (8, 6, 7, 180.0),
        (9, 5, 8, 140.0),
        (10, 5, 9, 260.0),
        (11, 6, 9, 60.0),
        (12, 7, 10, 170.0),
        (13, 8, 11, 280.0),
        (14, 9, 12, 400.0),
        (15, 10, 12, 350.0),
        (16, 2, 3, 40.0),
        (17, 3, 4, 30.0),
    ];

    for &(id, from, to, length_km) in lines {
        net.add_line(gridfault::Line::new(id, from, to, length_km, config))
            .expect("demo grid topology is self-consistent");
    }

    net
}

fn main() {
    env_logger::Builder::from_default_env().filter_level(log::LevelFilter::Info).init();

    let config = GridConfig::default();
    let mut network = build_demo_grid(&config);
    info!(
        "built '{}': {} buses, {} lines",
        network.name,
        network.bus_ids().len(),
        network.line_ids().len()
    );

    let report = powerflow::solve(&mut network, &config).expect("Y-bus should be well-conditioned for this topology");
    info!(
        "power flow: converged={} iterations={} max_mismatch={:.3e}",
        report.converged, report.iterations, report.max_mismatch
    );

    let mut simulator = FaultSimulator::new(PreFaultVoltage::Solved);
    let handle = simulator
        .inject_line_fault(&mut network, 7, FaultKind::Slg, 0.35, 5.0, &config)
        .expect("line 7 exists in the demo grid");
    let (ia, ib, ic) = simulator.fault_current(handle).expect("just-injected fault has a current");
    info!("SLG fault on line 7 @ 35%: Ia={ia:.1}A Ib={ib:.1}A Ic={ic:.1}A");

    let mut impedance_detector = detectors::ImpedanceDetector::new();
    let fault = simulator.active_fault_mut(handle).expect("fault handle is still active");
    let impedance_result = impedance_detector.detect(&network, Some(fault), &config);
    info!("impedance detector: {}", impedance_result.message);

    let mut graph_detector = detectors::GraphDetector::new();
    let fault = simulator.active_fault_mut(handle).expect("fault handle is still active");
    let graph_result = graph_detector.detect(&network, Some(fault));
    info!("graph detector: {}", graph_result.message);

    simulator.clear_fault(&mut network, handle).expect("handle is valid");
    info!("fault cleared");
}
