//! Sensor simulation for testing.
//!
//! Provides a plugin with a door contact, a motion sensor, a climate sensor
//! and a dimmable light. While the bridge is online the sensors change state
//! periodically, which exercises attribute reporting end to end.

use crate::bridge::{Plugin, PluginContext};
use crate::error::Result;
use crate::matter::clusters::{boolean_state, level_control, measurement, occupancy_sensing, on_off};
use crate::matter::device_types::{
    CONTACT_SENSOR, DIMMABLE_LIGHT, HUMIDITY_SENSOR, OCCUPANCY_SENSOR, TEMPERATURE_SENSOR,
};
use crate::matter::{AttributeValue, Endpoint};
use async_trait::async_trait;
use log::{info, warn};
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;

pub const DOOR: &str = "Sim Door";
pub const MOTION: &str = "Sim Motion";
pub const CLIMATE: &str = "Sim Climate";
pub const LIGHT: &str = "Sim Light";

/// Handles to the simulated devices of the running instance.
#[derive(Debug, Clone)]
pub struct SimulatedDevices {
    pub door: Endpoint,
    pub motion: Endpoint,
    pub climate: Endpoint,
}

impl SimulatedDevices {
    fn from_endpoints(devices: &[Endpoint]) -> Option<Self> {
        let find = |id: &str| devices.iter().find(|d| d.id() == id).cloned();
        Some(Self {
            door: find(DOOR)?,
            motion: find(MOTION)?,
            climate: find(CLIMATE)?,
        })
    }

    /// Advance every sensor by one step.
    pub async fn step(&self) -> Result<()> {
        let open = !self
            .door
            .get_attribute(boolean_state::CLUSTER_ID, boolean_state::STATE_VALUE)?
            .as_bool()
            .unwrap_or(false);
        self.door
            .set_attribute(boolean_state::CLUSTER_ID, boolean_state::STATE_VALUE, open)
            .await?;
        info!("[Sim] Contact sensor toggled to: {}", open);

        let occupied = self
            .motion
            .get_attribute(occupancy_sensing::CLUSTER_ID, occupancy_sensing::OCCUPANCY)?
            .as_i64()
            .unwrap_or(0)
            == 0;
        self.motion
            .set_attribute(
                occupancy_sensing::CLUSTER_ID,
                occupancy_sensing::OCCUPANCY,
                u8::from(occupied),
            )
            .await?;
        info!("[Sim] Occupancy sensor toggled to: {}", occupied);

        let (temperature, humidity) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1800..=2600i16), rng.gen_range(3500..=6000u16))
        };
        self.climate
            .set_attribute(
                measurement::TEMPERATURE_CLUSTER_ID,
                measurement::MEASURED_VALUE,
                temperature,
            )
            .await?;
        self.climate
            .set_attribute(
                measurement::RELATIVE_HUMIDITY_CLUSTER_ID,
                measurement::MEASURED_VALUE,
                humidity,
            )
            .await?;
        info!(
            "[Sim] Climate: {:.2}°C, {:.2}%",
            f64::from(temperature) / 100.0,
            f64::from(humidity) / 100.0
        );
        Ok(())
    }
}

/// Spawn a task that advances the simulated sensors every `period` until
/// `cancel` fires.
pub fn run_sensor_simulation(
    devices: SimulatedDevices,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = devices.step().await {
                        warn!("[Sim] Simulation step failed: {}", e);
                    }
                }
            }
        }
        info!("[Sim] Simulation stopped");
    })
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Plugin serving the simulated devices.
pub struct SimulationPlugin {
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl SimulationPlugin {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            running: Mutex::new(None),
        }
    }
}

impl Default for SimulationPlugin {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Plugin for SimulationPlugin {
    fn name(&self) -> &str {
        "simulation"
    }

    async fn register(&self, _ctx: &PluginContext) -> Result<Vec<Endpoint>> {
        let door = Endpoint::with_required_clusters(DOOR, CONTACT_SENSOR)?;

        let motion = Endpoint::with_required_clusters(MOTION, OCCUPANCY_SENSOR)?;

        let climate = Endpoint::new(CLIMATE, TEMPERATURE_SENSOR);
        climate.add_cluster_server(measurement::temperature_cluster_server(2100))?;
        climate.add_device_type_with_cluster_server(
            &[HUMIDITY_SENSOR],
            &[crate::matter::clusters::identify::IDENTIFY_CLUSTER_ID],
        )?;
        climate.add_cluster_server(measurement::relative_humidity_cluster_server(4500))?;

        let light = Endpoint::with_required_clusters(LIGHT, DIMMABLE_LIGHT)?;
        light.subscribe_attribute(on_off::CLUSTER_ID, on_off::ON_OFF, |new, _old| {
            let state = if new == &AttributeValue::Bool(true) { "on" } else { "off" };
            info!("[Sim] Light turned {}", state);
        })?;
        light.subscribe_attribute(
            level_control::CLUSTER_ID,
            level_control::CURRENT_LEVEL,
            |new, old| info!("[Sim] Light level {} -> {}", old, new),
        )?;

        Ok(vec![door, motion, climate, light])
    }

    async fn on_start(&self, devices: &[Endpoint]) -> Result<()> {
        let Some(simulated) = SimulatedDevices::from_endpoints(devices) else {
            warn!("[Sim] Simulated devices missing, not starting simulation");
            return Ok(());
        };
        let cancel = CancellationToken::new();
        let task = run_sensor_simulation(simulated, self.period, cancel.clone());
        if let Some(previous) = self.running.lock().replace(Running { cancel, task }) {
            previous.cancel.cancel();
        }
        info!("[Sim] Simulation running every {:?}", self.period);
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<()> {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.task.await {
                warn!("[Sim] Simulation task ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeMode;

    fn ctx() -> PluginContext {
        PluginContext {
            bridge_name: "test".to_string(),
            mode: BridgeMode::Bridge,
            generation: 1,
        }
    }

    #[tokio::test]
    async fn test_register_builds_complete_devices() {
        let plugin = SimulationPlugin::default();
        let devices = plugin.register(&ctx()).await.unwrap();
        let ids: Vec<_> = devices.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec![DOOR, MOTION, CLIMATE, LIGHT]);
        for device in &devices {
            assert!(device.missing_required_clusters().is_empty(), "{:?}", device);
        }
    }

    #[tokio::test]
    async fn test_step_changes_sensors() {
        let plugin = SimulationPlugin::default();
        let devices = plugin.register(&ctx()).await.unwrap();
        let simulated = SimulatedDevices::from_endpoints(&devices).unwrap();

        simulated.step().await.unwrap();
        assert_eq!(
            simulated
                .door
                .get_attribute(boolean_state::CLUSTER_ID, boolean_state::STATE_VALUE)
                .unwrap(),
            AttributeValue::Bool(true)
        );
        assert_eq!(
            simulated
                .motion
                .get_attribute(occupancy_sensing::CLUSTER_ID, occupancy_sensing::OCCUPANCY)
                .unwrap(),
            AttributeValue::Int(1)
        );
        let temperature = simulated
            .climate
            .get_attribute(measurement::TEMPERATURE_CLUSTER_ID, measurement::MEASURED_VALUE)
            .unwrap()
            .as_i64()
            .unwrap();
        assert!((1800..=2600).contains(&temperature));

        simulated.step().await.unwrap();
        assert_eq!(
            simulated
                .door
                .get_attribute(boolean_state::CLUSTER_ID, boolean_state::STATE_VALUE)
                .unwrap(),
            AttributeValue::Bool(false)
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let plugin = SimulationPlugin::new(Duration::from_millis(5));
        let devices = plugin.register(&ctx()).await.unwrap();
        plugin.on_start(&devices).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        plugin.on_shutdown().await.unwrap();
        assert!(plugin.running.lock().is_none());
        // A second shutdown has nothing to stop
        plugin.on_shutdown().await.unwrap();
    }
}
