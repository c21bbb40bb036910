//! Plugin interface.
//!
//! A plugin contributes devices as endpoint trees. The bridge calls
//! [`Plugin::register`] every time it builds an instance, so endpoints from a
//! previous instance must not be reused: drop them in
//! [`Plugin::on_shutdown`] and hand out fresh ones on the next register.

use crate::config::BridgeMode;
use crate::error::Result;
use crate::matter::Endpoint;
use async_trait::async_trait;
use std::sync::Arc;

/// What a plugin is told about the bridge it is registering with.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub bridge_name: String,
    pub mode: BridgeMode,
    /// Instance counter, bumped on every restart or update
    pub generation: u64,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Build this plugin's devices for a new bridge instance.
    async fn register(&self, ctx: &PluginContext) -> Result<Vec<Endpoint>>;

    /// Called once the devices are published and their node is online.
    async fn on_start(&self, _devices: &[Endpoint]) -> Result<()> {
        Ok(())
    }

    /// Called before the devices' node goes offline.
    async fn on_shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Ordered set of plugins loaded into the bridge.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.register(Arc::new(plugin));
        self
    }

    /// Add a plugin. A plugin whose name is already loaded is ignored.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> bool {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            log::warn!("[Bridge] Plugin {} already registered, ignoring", plugin.name());
            return false;
        }
        self.plugins.push(plugin);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn register(&self, _ctx: &PluginContext) -> Result<Vec<Endpoint>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_registry_keeps_order_and_rejects_duplicates() {
        let mut registry = PluginRegistry::new().with(Named("b")).with(Named("a"));
        assert!(!registry.register(Arc::new(Named("b"))));
        assert_eq!(registry.names(), vec!["b", "a"]);
        assert_eq!(registry.len(), 2);
    }
}
