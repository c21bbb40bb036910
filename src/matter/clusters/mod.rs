//! Cluster schemas known to the bridge.
//!
//! Every cluster a plugin can attach is declared here as a static
//! [`ClusterSchema`]. Composition looks cluster ids up in this registry, so an
//! unknown id is rejected when the endpoint is built rather than when the
//! protocol runtime first touches it.

use super::cluster_server::ClusterServer;

pub mod attribute;
pub mod boolean_state;
pub mod bridged_device_basic_info;
pub mod identify;
pub mod level_control;
pub mod measurement;
pub mod occupancy_sensing;
pub mod on_off;

pub use attribute::{AttrId, AttributeDefault, AttributeSpec, AttributeType, AttributeValue};

/// Matter cluster ID
pub type ClusterId = u32;

/// Static description of a cluster: identity, revision and attribute table.
#[derive(Debug, PartialEq, Eq)]
pub struct ClusterSchema {
    pub id: ClusterId,
    pub name: &'static str,
    pub revision: u16,
    pub attributes: &'static [AttributeSpec],
}

impl ClusterSchema {
    /// Look up an attribute declaration by name.
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSpec> {
        self.attributes.iter().find(|spec| spec.name == name)
    }
}

/// All clusters the bridge can serve.
pub const REGISTRY: &[&ClusterSchema] = &[
    &identify::IDENTIFY,
    &identify::GROUPS,
    &on_off::SCHEMA,
    &level_control::SCHEMA,
    &bridged_device_basic_info::SCHEMA,
    &boolean_state::SCHEMA,
    &measurement::ILLUMINANCE,
    &measurement::TEMPERATURE,
    &measurement::PRESSURE,
    &measurement::FLOW,
    &measurement::RELATIVE_HUMIDITY,
    &occupancy_sensing::SCHEMA,
];

/// Find the schema for a cluster id.
pub fn schema(id: ClusterId) -> Option<&'static ClusterSchema> {
    REGISTRY.iter().copied().find(|schema| schema.id == id)
}

/// Build a cluster server for `id` populated with the schema defaults.
pub fn default_cluster_server(id: ClusterId) -> Option<ClusterServer> {
    schema(id).map(ClusterServer::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_ids_are_unique() {
        let ids: HashSet<_> = REGISTRY.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), REGISTRY.len());
    }

    #[test]
    fn test_schema_defaults_conform() {
        for schema in REGISTRY {
            for spec in schema.attributes {
                assert!(
                    spec.normalize(spec.default.to_value()).is_some(),
                    "{}.{} default does not match its own spec",
                    schema.name,
                    spec.name
                );
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(schema(on_off::CLUSTER_ID).map(|s| s.name), Some("onOff"));
        assert!(schema(0xFFFF).is_none());
        assert!(default_cluster_server(boolean_state::CLUSTER_ID).is_some());
    }
}
