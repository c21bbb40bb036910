//! Simulated devices exposed as a bridge plugin.

mod sensors;

pub use sensors::{SimulatedDevices, SimulationPlugin, run_sensor_simulation};
