//! Bridge instance: the server nodes and plugin devices of one generation.
//!
//! [`BridgeFactory`] builds a fresh [`BridgeInstance`] from the plugin
//! registry on startup and on every restart or update. In `bridge` mode all
//! plugins share one node and aggregator; in `childbridge` mode every plugin
//! gets its own node, on consecutive ports.

use super::plugin::{Plugin, PluginContext, PluginRegistry};
use crate::config::{BridgeMode, Config};
use crate::error::{BridgeError, Result};
use crate::matter::clusters::bridged_device_basic_info::{self, BridgedDeviceInfo};
use crate::matter::device_types::{AGGREGATOR, BRIDGED_NODE};
use crate::matter::runtime::ProtocolRuntime;
use crate::matter::{ContextRequest, Endpoint, ServerNode, ServerNodeContext};
use crate::storage::Storage;
use futures_util::future::join_all;
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    devices: Vec<Endpoint>,
    started: bool,
}

pub struct BridgeInstance {
    generation: u64,
    nodes: Vec<ServerNode>,
    plugins: Vec<LoadedPlugin>,
}

impl BridgeInstance {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn nodes(&self) -> &[ServerNode] {
        &self.nodes
    }

    pub fn device_count(&self) -> usize {
        self.plugins.iter().map(|p| p.devices.len()).sum()
    }

    pub fn is_online(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter().all(ServerNode::is_online)
    }

    /// Start every node, then notify plugins. If a node fails to start, the
    /// nodes already started are stopped again.
    pub async fn start(&mut self) -> Result<()> {
        for index in 0..self.nodes.len() {
            if let Err(e) = self.nodes[index].start().await {
                error!("[Bridge] Node {} failed to start: {}", self.nodes[index].name(), e);
                if let Err(stop_err) = self.stop().await {
                    warn!("[Bridge] Cleanup after failed start: {}", stop_err);
                }
                return Err(e);
            }
        }

        for loaded in &mut self.plugins {
            if let Err(e) = loaded.plugin.on_start(&loaded.devices).await {
                warn!("[Bridge] Plugin {} on_start failed: {}", loaded.plugin.name(), e);
            }
            loaded.started = true;
        }

        info!(
            "[Bridge] Instance {} online: {} node(s), {} device(s)",
            self.generation,
            self.nodes.len(),
            self.device_count()
        );
        Ok(())
    }

    /// Notify started plugins concurrently, then stop every node. All nodes
    /// are stopped even if some fail; the first failure is returned.
    pub async fn stop(&mut self) -> Result<()> {
        let started: Vec<&mut LoadedPlugin> =
            self.plugins.iter_mut().filter(|loaded| loaded.started).collect();
        let shutdowns = join_all(started.iter().map(|loaded| loaded.plugin.on_shutdown())).await;
        for (loaded, result) in started.into_iter().zip(shutdowns) {
            loaded.started = false;
            if let Err(e) = result {
                warn!("[Bridge] Plugin {} on_shutdown failed: {}", loaded.plugin.name(), e);
            }
        }

        let mut first_error = None;
        for node in &mut self.nodes {
            if let Err(e) = node.stop().await {
                warn!("[Bridge] {}", e);
                first_error.get_or_insert(e);
            }
        }
        info!("[Bridge] Instance {} stopped", self.generation);
        first_error.map_or(Ok(()), Err)
    }
}

pub struct BridgeFactory {
    config: Config,
    runtime: Arc<dyn ProtocolRuntime>,
    storage: Storage,
    plugins: PluginRegistry,
}

impl BridgeFactory {
    pub fn new(
        config: Config,
        runtime: Arc<dyn ProtocolRuntime>,
        storage: Storage,
        plugins: PluginRegistry,
    ) -> Self {
        Self {
            config,
            runtime,
            storage,
            plugins,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a new instance: create nodes, register every plugin and attach
    /// its devices. Nothing is started yet.
    pub async fn build(&self, generation: u64) -> Result<BridgeInstance> {
        let ctx = PluginContext {
            bridge_name: self.config.bridge.name.clone(),
            mode: self.config.bridge.mode,
            generation,
        };
        let mut instance = BridgeInstance {
            generation,
            nodes: Vec::new(),
            plugins: Vec::new(),
        };

        match self.config.bridge.mode {
            BridgeMode::Bridge => {
                let (node, aggregator) =
                    self.create_node(&self.config.bridge.name, self.config.matter.port, true)?;
                for plugin in self.plugins.iter() {
                    let devices = self.register_plugin(plugin, &ctx, &node, &aggregator).await;
                    instance.plugins.push(LoadedPlugin {
                        plugin: plugin.clone(),
                        devices,
                        started: false,
                    });
                }
                instance.nodes.push(node);
            }
            BridgeMode::ChildBridge => {
                for (index, plugin) in self.plugins.iter().enumerate() {
                    let port = u16::try_from(index)
                        .ok()
                        .and_then(|offset| self.config.matter.port.checked_add(offset))
                        .ok_or_else(|| {
                            BridgeError::UnhandledFault(format!(
                                "no port left for child bridge {}",
                                plugin.name()
                            ))
                        })?;
                    let (node, aggregator) = self.create_node(plugin.name(), port, false)?;
                    let devices = self.register_plugin(plugin, &ctx, &node, &aggregator).await;
                    instance.plugins.push(LoadedPlugin {
                        plugin: plugin.clone(),
                        devices,
                        started: false,
                    });
                    instance.nodes.push(node);
                }
            }
        }

        info!(
            "[Bridge] Built instance {} in {} mode: {} node(s), {} device(s)",
            generation,
            self.config.bridge.mode,
            instance.nodes.len(),
            instance.device_count()
        );
        Ok(instance)
    }

    fn create_node(
        &self,
        store_id: &str,
        port: u16,
        fixed_credentials: bool,
    ) -> Result<(ServerNode, Endpoint)> {
        let matter = &self.config.matter;
        let mut request = ContextRequest::new(store_id, store_id, AGGREGATOR)
            .vendor(matter.vendor_id, matter.vendor_name.clone())
            .product(matter.product_id, matter.product_name.clone())
            .port(port);
        // Child bridges each keep their own generated credentials
        if fixed_credentials {
            request.discriminator = matter.discriminator;
            request.passcode = matter.passcode;
        }

        let context = ServerNodeContext::create(self.runtime.clone(), &self.storage, request)?;
        let mut node = ServerNode::create(context.clone())?;
        let aggregator = context.create_aggregator();
        node.add(aggregator.clone())?;
        Ok((node, aggregator))
    }

    /// Register a plugin and attach its devices under the aggregator.
    /// Devices that cannot be published are logged and left out.
    async fn register_plugin(
        &self,
        plugin: &Arc<dyn Plugin>,
        ctx: &PluginContext,
        node: &ServerNode,
        aggregator: &Endpoint,
    ) -> Vec<Endpoint> {
        let devices = match plugin.register(ctx).await {
            Ok(devices) => devices,
            Err(e) => {
                error!("[Bridge] Plugin {} failed to register: {}", plugin.name(), e);
                return Vec::new();
            }
        };

        let mut used: HashSet<String> = node
            .endpoints()
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        let mut accepted = Vec::new();
        for device in devices {
            match attach_bridged(aggregator, &device, plugin.name(), &used) {
                Ok(()) => {
                    used.extend(device.walk().iter().map(|e| e.id().to_string()));
                    accepted.push(device);
                }
                Err(e) => warn!(
                    "[Bridge] Plugin {}: skipping device {}: {}",
                    plugin.name(),
                    device.id(),
                    e
                ),
            }
        }

        info!(
            "[Bridge] Plugin {} registered {} device(s)",
            plugin.name(),
            accepted.len()
        );
        accepted
    }
}

/// Decorate a device as a bridged node and attach it to the aggregator.
/// A rejected device is left as the plugin built it.
fn attach_bridged(
    aggregator: &Endpoint,
    device: &Endpoint,
    vendor: &str,
    used: &HashSet<String>,
) -> Result<()> {
    aggregator.check_child(device)?;
    if let Some(clash) = device.walk().into_iter().find(|e| used.contains(e.id())) {
        return Err(BridgeError::DuplicateEndpointId(clash.id().to_string()));
    }
    for endpoint in device.walk() {
        if let Some((device_type, cluster_id)) = endpoint.missing_required_clusters().first() {
            return Err(BridgeError::MissingRequiredCluster {
                endpoint: endpoint.id().to_string(),
                device_type: device_type.name.to_string(),
                cluster_id: *cluster_id,
            });
        }
    }

    if !device.has_cluster_server(bridged_device_basic_info::CLUSTER_ID) {
        device.add_cluster_server(
            BridgedDeviceInfo::new(device.id())
                .with_vendor(vendor)
                .cluster_server(),
        )?;
    }
    device.add_device_type(BRIDGED_NODE)?;
    aggregator.add_child(device.clone())
}
