//! Cluster server: one capability bundle attached to an endpoint.
//!
//! A `ClusterServer` pairs a static [`ClusterSchema`] with live attribute
//! slots. Plugins build one through a factory (e.g.
//! `boolean_state::cluster_server(false)`) and hand it to
//! `Endpoint::add_cluster_server`, after which the endpoint's attribute store
//! owns it.

use super::attribute_store::AttributeSlot;
use super::clusters::{self, AttributeValue, ClusterId, ClusterSchema};
use crate::error::{BridgeError, Result};
use log::warn;
use std::collections::BTreeMap;

pub struct ClusterServer {
    schema: &'static ClusterSchema,
    slots: BTreeMap<&'static str, AttributeSlot>,
}

impl ClusterServer {
    /// Create a cluster server with every attribute at its schema default.
    pub fn new(schema: &'static ClusterSchema) -> Self {
        let slots = schema
            .attributes
            .iter()
            .map(|spec| (spec.name, AttributeSlot::new(spec, spec.default.to_value())))
            .collect();
        Self { schema, slots }
    }

    /// Create a default cluster server for a registered cluster id.
    pub fn for_cluster(id: ClusterId) -> Result<Self> {
        clusters::default_cluster_server(id)
            .ok_or_else(|| BridgeError::NotFound(format!("cluster 0x{:04X}", id)))
    }

    /// Override an attribute's initial value, validated against the schema.
    pub fn with_value(
        mut self,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<Self> {
        self.assign(attribute, value.into())?;
        Ok(self)
    }

    /// Infallible variant of [`with_value`](Self::with_value) for factory
    /// defaults: a rejected value is logged and the previous value kept.
    pub(crate) fn preset(mut self, attribute: &str, value: impl Into<AttributeValue>) -> Self {
        if let Err(e) = self.assign(attribute, value.into()) {
            warn!("[Cluster] {}: ignoring preset: {}", self.schema.name, e);
        }
        self
    }

    fn assign(&mut self, attribute: &str, value: AttributeValue) -> Result<()> {
        let name = self.schema.name;
        let slot = self
            .slots
            .get_mut(attribute)
            .ok_or_else(|| BridgeError::NotFound(format!("{}.{}", name, attribute)))?;
        let normalized = slot
            .spec()
            .normalize(value.clone())
            .ok_or_else(|| BridgeError::TypeMismatch {
                attribute: format!("{}.{}", name, attribute),
                expected: slot.spec().describe(),
                actual: value.to_string(),
            })?;
        slot.value = normalized;
        Ok(())
    }

    pub fn id(&self) -> ClusterId {
        self.schema.id
    }

    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    pub fn revision(&self) -> u16 {
        self.schema.revision
    }

    pub fn schema(&self) -> &'static ClusterSchema {
        self.schema
    }

    /// Current value of an attribute, if declared.
    pub fn value(&self, attribute: &str) -> Option<&AttributeValue> {
        self.slots.get(attribute).map(|slot| &slot.value)
    }

    pub(crate) fn slot(&self, attribute: &str) -> Option<&AttributeSlot> {
        self.slots.get(attribute)
    }

    pub(crate) fn slot_mut(&mut self, attribute: &str) -> Option<&mut AttributeSlot> {
        self.slots.get_mut(attribute)
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = &AttributeSlot> {
        self.slots.values()
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut AttributeSlot> {
        self.slots.values_mut()
    }
}

impl std::fmt::Debug for ClusterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values: BTreeMap<_, _> = self
            .slots
            .iter()
            .map(|(name, slot)| (*name, &slot.value))
            .collect();
        f.debug_struct("ClusterServer")
            .field("id", &format_args!("0x{:04X}", self.schema.id))
            .field("name", &self.schema.name)
            .field("values", &values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::clusters::{boolean_state, level_control, measurement, on_off};

    #[test]
    fn test_defaults_from_schema() {
        let server = ClusterServer::new(&on_off::SCHEMA);
        assert_eq!(server.id(), on_off::CLUSTER_ID);
        assert_eq!(server.value(on_off::ON_OFF), Some(&AttributeValue::Bool(false)));
        assert_eq!(
            server.value(on_off::GLOBAL_SCENE_CONTROL),
            Some(&AttributeValue::Bool(true))
        );
        assert_eq!(server.value(on_off::START_UP_ON_OFF), Some(&AttributeValue::Null));
    }

    #[test]
    fn test_factories_apply_initial_value() {
        let server = boolean_state::cluster_server(true);
        assert_eq!(
            server.value(boolean_state::STATE_VALUE),
            Some(&AttributeValue::Bool(true))
        );

        let server = measurement::temperature_cluster_server(2500);
        assert_eq!(
            server.value(measurement::MEASURED_VALUE),
            Some(&AttributeValue::Int(2500))
        );
    }

    #[test]
    fn test_preset_out_of_range_keeps_default() {
        let server = level_control::cluster_server(255);
        assert_eq!(
            server.value(level_control::CURRENT_LEVEL),
            Some(&AttributeValue::Int(254))
        );
    }

    #[test]
    fn test_with_value_rejects_mismatch() {
        let result = ClusterServer::new(&on_off::SCHEMA).with_value(on_off::ON_OFF, "yes");
        assert!(matches!(result, Err(BridgeError::TypeMismatch { .. })));

        let result = ClusterServer::new(&on_off::SCHEMA).with_value("brightness", 3u8);
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }

    #[test]
    fn test_for_unknown_cluster() {
        assert!(matches!(
            ClusterServer::for_cluster(0x1234),
            Err(BridgeError::NotFound(_))
        ));
    }
}
