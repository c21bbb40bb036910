//! Bridge orchestration: plugins, instances and the lifecycle controller.

pub mod controller;
pub mod instance;
pub mod plugin;
pub mod signals;
pub mod updater;

pub use controller::{BridgeController, BridgeEvent, BridgeExit, BridgeSignal};
pub use instance::{BridgeFactory, BridgeInstance};
pub use plugin::{Plugin, PluginContext, PluginRegistry};
pub use updater::{CommandUpdater, SoftwareUpdater};
