//! Device sources that feed the bridge.
//!
//! Current sources:
//! - `simulation`: simulated sensors and a light for development and testing

pub mod simulation;

pub use simulation::SimulationPlugin;
